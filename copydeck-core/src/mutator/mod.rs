//! Applies approved field edits to content files, one write per file.

mod approved;
mod batch;

use std::path::PathBuf;

pub use approved::{load_approved_changes, save_approved_changes, ApprovedChange};
pub use batch::{AppliedFile, BatchMutator, BatchReport, FailedChange};

/// Errors reading or writing an approved-changes file.
#[derive(Debug, thiserror::Error)]
pub enum ApprovedChangesError {
    #[error("No approved changes file at {0:?}")]
    Missing(PathBuf),

    #[error("Failed to read approved changes {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse approved changes {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Write(#[from] crate::document::DocumentError),
}
