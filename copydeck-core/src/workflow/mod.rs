//! Drives sections through analyze → improve → review → implement.

mod collaborators;
mod implement;
mod orchestrator;

pub use collaborators::{
    ProposedChange, ReviewOutcome, ReviewSurface, SectionAnalysis, SectionAnalyzer,
    SectionImprover,
};
pub use implement::{implement_changes, ImplementOutcome};
pub use orchestrator::{Collaborators, Orchestrator, PipelinePhase, SectionFailure, StageReport};

/// Failures that stop a stage as a whole.
///
/// Per-section failures never surface here; they are collected in
/// [`StageReport::failed`].
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    ApprovedChanges(#[from] crate::mutator::ApprovedChangesError),

    #[error(transparent)]
    Persist(#[from] crate::document::DocumentError),
}
