//! Typed errors shared across the Carrel crates.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, CarrelError>;

/// Error taxonomy for the record store and scheduler.
///
/// Errors local to one item never abort processing of other items; the
/// scheduler logs and skips, explicit operations return these to the caller.
#[derive(Debug, Error)]
pub enum CarrelError {
    /// Operation referenced an unknown item id or path. Never fatal.
    #[error("item not found: {0}")]
    NotFound(String),

    /// Manual notify requested for a task without an enabled interval rule.
    #[error("task '{0}' has no enabled interval recurrence")]
    NotIntervalTask(String),

    /// Malformed or inconsistent recurrence configuration.
    #[error("invalid recurrence: {0}")]
    InvalidRecurrence(String),

    /// Transient lock/permission failure that survived the retry budget.
    #[error("filesystem contention at {path} after {attempts} attempts: {source}")]
    Contention {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    /// A record write did not reach disk.
    #[error("failed to persist {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    /// Traversal guard: the resolved path left the store root.
    #[error("path escapes the store root: {0}")]
    PathOutsideStore(PathBuf),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata (de)serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl CarrelError {
    /// Whether the underlying I/O failure looks like transient lock
    /// contention (the class of error the copy-then-delete fallback and
    /// bounded retries exist for).
    pub fn is_contention_kind(err: &std::io::Error) -> bool {
        matches!(
            err.kind(),
            std::io::ErrorKind::PermissionDenied
                | std::io::ErrorKind::ResourceBusy
                | std::io::ErrorKind::DirectoryNotEmpty
        )
    }
}
