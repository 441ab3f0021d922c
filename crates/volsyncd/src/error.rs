//! Synchronization error types.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while admitting or executing a sync job.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("invalid sync request: {0}")]
    Validation(String),

    #[error("unsupported source type: {0}")]
    UnsupportedSource(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("filesystem operation failed on '{path}': {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// A directory swap failed and the rollback failed too. Both paths
    /// survive on disk and need manual attention; nothing was deleted.
    #[error(
        "replace failed and rollback failed: target expected at '{target}', \
         original content preserved at '{backup}'"
    )]
    ReplaceRollback { target: PathBuf, backup: PathBuf },

    #[error("{0}")]
    Unknown(String),
}

/// Coarse error categories, for logging the outcome of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Auth,
    Network,
    Filesystem,
    Timeout,
    Unknown,
}

impl ErrorKind {
    /// Stable lowercase label used in log output.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Auth => "authentication",
            ErrorKind::Network => "network",
            ErrorKind::Filesystem => "filesystem",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl SyncError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Validation(_) | SyncError::UnsupportedSource(_) => ErrorKind::Validation,
            SyncError::Auth(_) => ErrorKind::Auth,
            SyncError::Network(_) => ErrorKind::Network,
            SyncError::Filesystem { .. } | SyncError::ReplaceRollback { .. } => {
                ErrorKind::Filesystem
            }
            SyncError::Timeout(_) => ErrorKind::Timeout,
            SyncError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// True for errors that must be reported to the caller at admission
    /// time instead of being logged as an asynchronous job outcome.
    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    /// Shorthand for a filesystem error tied to a path.
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

/// Classifies subprocess stderr into a more specific error variant.
///
/// The input must already be masked; the text ends up in logs verbatim.
pub fn classify_command_error(stderr: &str) -> SyncError {
    let lower = stderr.to_lowercase();

    if lower.contains("could not resolve host")
        || lower.contains("connection refused")
        || lower.contains("connection timed out")
        || lower.contains("network is unreachable")
        || lower.contains("unable to access")
        || lower.contains("failed to connect")
        || lower.contains("no route to host")
        || lower.contains("the remote end hung up unexpectedly")
    {
        return SyncError::Network(stderr.trim().to_string());
    }

    if lower.contains("authentication failed")
        || lower.contains("permission denied")
        || lower.contains("invalid credentials")
        || lower.contains("host key verification failed")
        || lower.contains("access denied")
    {
        return SyncError::Auth(stderr.trim().to_string());
    }

    SyncError::Unknown(stderr.trim().to_string())
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
