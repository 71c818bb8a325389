//! Error types for ruleforge-sync.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use ruleforge_core::CoreError;
use ruleforge_exporters::ExportError;

/// One file that could not be restored during rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackFailure {
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for RollbackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

fn join_failures(failures: &[RollbackFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Canonical model or config error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An error from an exporter.
    #[error("export error: {0}")]
    Export(#[from] ExportError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON error (checksum store, lockfile).
    #[error("JSON error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// YAML error (allow-list).
    #[error("YAML error at {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Hashing a value failed.
    #[error(transparent)]
    Canonical(#[from] ruleforge_core::CanonicalError),

    /// A tracked file was edited outside ruleforge and no handler allowed
    /// overwriting it.
    #[error("{path} was modified outside ruleforge (expected {expected}, found {actual}); re-run with --force to overwrite")]
    ManualEdit {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// The checksum handler chose to abort.
    #[error("aborted at {path}")]
    Aborted { path: PathBuf },

    /// Rollback could not restore every file.
    #[error("rollback failed for {} file(s): {}", .failures.len(), join_failures(.failures))]
    Rollback { failures: Vec<RollbackFailure> },

    /// Invalid user input: unknown exporter, bad overlay, duplicate rule id.
    #[error("{0}")]
    Input(String),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn json_err(path: impl Into<PathBuf>, source: serde_json::Error) -> SyncError {
    SyncError::Json {
        path: path.into(),
        source,
    }
}

pub(crate) fn yaml_err(path: impl Into<PathBuf>, source: serde_yaml::Error) -> SyncError {
    SyncError::Yaml {
        path: path.into(),
        source,
    }
}
