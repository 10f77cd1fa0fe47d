use thiserror::Error;

use crate::backup::BackupError;
use crate::document::DocumentError;
use crate::history::ChangeLogError;
use crate::mutator::ApprovedChangesError;
use crate::status::StatusError;
use crate::workflow::WorkflowError;

/// Any failure raised by a pipeline component.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Backup error: {0}")]
    Backup(#[from] BackupError),

    #[error("Change log error: {0}")]
    ChangeLog(#[from] ChangeLogError),

    #[error("Status error: {0}")]
    Status(#[from] StatusError),

    #[error("Approved changes error: {0}")]
    ApprovedChanges(#[from] ApprovedChangesError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),
}
