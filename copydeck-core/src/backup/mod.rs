//! Write-once backups of content files taken before every mutation.

mod manager;

use std::path::PathBuf;

pub use manager::{BackupInfo, BackupManager, PruneFailure, PruneReport};

/// Errors raised while creating, restoring or pruning backups.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("Cannot read {path:?} for backup: {source}")]
    SourceUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot write backup {path:?}: {source}")]
    DestinationUnwritable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Backup file not found: {0:?}")]
    Missing(PathBuf),

    #[error("Cannot restore {target:?} from {backup:?}: {reason}")]
    Restore {
        backup: PathBuf,
        target: PathBuf,
        reason: String,
    },

    #[error("Cannot scan backup directory {path:?}: {source}")]
    Scan {
        path: PathBuf,
        source: std::io::Error,
    },
}
