//! Append-only, capped change log linking every content mutation to its backup.

mod store;
mod types;

use std::path::PathBuf;

pub use store::{ChangeLog, CHANGE_LOG_VERSION};
pub use types::{
    BulkRollbackReport, ChangeLogEntry, ChangeStats, FieldChange, RollbackFailure,
    RollbackOutcome,
};

/// Errors raised by the change log.
#[derive(Debug, thiserror::Error)]
pub enum ChangeLogError {
    #[error("Change log entry not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Backup(#[from] crate::backup::BackupError),

    #[error("Failed to read change log {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse change log {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Unsupported change log version {found} (this build reads up to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error(transparent)]
    Write(#[from] crate::document::DocumentError),
}
