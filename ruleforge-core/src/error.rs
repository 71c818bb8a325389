//! Error types for ruleforge-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading rules, config, or selectors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with file path and line context from serde_yaml.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Front-matter was present but did not describe a valid rule.
    #[error("invalid front-matter in {path}: {message}")]
    FrontMatter { path: PathBuf, message: String },

    /// A value could not be canonicalized.
    #[error("canonicalization failed: {0}")]
    Canonical(#[from] CanonicalError),

    /// `.ruleforge/config.yaml` did not exist at the expected path.
    #[error("config not found at {path}")]
    ConfigNotFound { path: PathBuf },

    /// Config parsed but is semantically invalid.
    #[error("invalid config: {message}")]
    Config { message: String },

    /// A selector string could not be parsed.
    #[error("invalid selector '{selector}': {reason}")]
    Selector { selector: String, reason: String },
}

/// Errors from canonical serialization.
///
/// Anything that cannot be represented as plain JSON fails here rather than
/// being coerced into a different value.
#[derive(Debug, Error)]
pub enum CanonicalError {
    /// The value at `path` has no JSON representation.
    #[error("value at '{path}' is not JSON-representable: {reason}")]
    NotRepresentable { path: String, reason: String },

    /// The YAML text itself could not be parsed.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// serde_json refused to serialize the value.
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Convenience constructor for [`CoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
