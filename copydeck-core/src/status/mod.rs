//! Per-section progress through the analyze → improve → review → implement
//! pipeline, persisted as a single JSON status file.

mod tracker;
mod types;

use std::path::PathBuf;

pub use tracker::StatusTracker;
pub use types::{
    NextAction, ReviewDecision, SectionRecord, SectionState, Stage, StatusEvent, StatusStats,
};

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("Unknown section '{0}'")]
    UnknownSection(String),

    #[error("Unknown stage '{0}' (expected analyze, improve, review or implement)")]
    UnknownStage(String),

    #[error("Unknown review decision '{0}' (expected approved, rejected or partial)")]
    UnknownDecision(String),

    #[error("Section '{section}' cannot complete {stage}: {missing} has not completed")]
    PrerequisiteMissing {
        section: String,
        stage: Stage,
        missing: Stage,
    },

    #[error("Section '{section}' has already completed {stage}")]
    AlreadyCompleted { section: String, stage: Stage },

    #[error("Completing review for section '{0}' requires a decision")]
    DecisionRequired(String),

    #[error("A review decision only applies to the review stage, not {0}")]
    DecisionNotApplicable(Stage),

    #[error("Section '{0}' was sent back for rework; record an improve completion first")]
    AwaitingRework(String),

    #[error("Failed to read status file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse status file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Status file {path:?} marks section '{section}' past a stage it never completed")]
    Inconsistent { path: PathBuf, section: String },

    #[error(transparent)]
    Write(#[from] crate::document::DocumentError),
}
