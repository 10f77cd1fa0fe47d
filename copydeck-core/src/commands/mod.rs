//! Operations exposed to the command line.
//!
//! Each command opens the components it needs from a [`PipelineConfig`],
//! performs one operation and returns a serialisable report.
//!
//! [`PipelineConfig`]: crate::config::PipelineConfig

pub mod apply;
pub mod cleanup;
pub mod history;
pub mod rollback;
pub mod status;

pub use apply::{apply_approved_changes, ApplyReport};
pub use cleanup::cleanup_backups;
pub use history::{change_stats, list_history};
pub use rollback::{rollback_all, rollback_entry, rollback_section, RollbackAllResult};
pub use status::{
    mark_stage, next_action, reset_status, show_status, NextActionReport, ResetResult,
    SectionStatusRow, StatusReport,
};
