//! Error types for ruleforge-exporters.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while rendering an export.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Tera template engine error.
    #[error("template engine error: {0}")]
    Tera(#[from] tera::Error),

    /// JSON serialization error (building tera context, JSON config files).
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error (front-matter, YAML config files).
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Filesystem error while reading previously written output.
    #[error("export io error at {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    /// An existing output file could not be merged.
    #[error("cannot merge into {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    /// A per-exporter knob has an unusable value.
    #[error("invalid config for exporter '{exporter}': {message}")]
    Knob { exporter: String, message: String },

    /// Requested exporter is not registered.
    #[error("unknown exporter '{0}'")]
    Unknown(String),

    /// Canonical model error (front-matter rendering, rule import).
    #[error(transparent)]
    Core(#[from] ruleforge_core::CoreError),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ExportError {
    ExportError::Io {
        path: path.into(),
        source,
    }
}
