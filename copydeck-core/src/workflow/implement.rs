use serde::Serialize;
use tracing::warn;

use super::orchestrator::SectionFailure;
use crate::config::PipelineConfig;
use crate::history::ChangeLog;
use crate::mutator::{ApprovedChange, BatchMutator, BatchReport};

/// Result of applying the approved changes of a set of sections.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImplementOutcome {
    pub batch: BatchReport,
    /// Sections whose changes all applied (or that had none).
    pub completed: Vec<String>,
    pub failed: Vec<SectionFailure>,
    /// Changes to keep in the approved-changes file: those of other
    /// sections and the ones that failed to apply.
    #[serde(skip)]
    pub remaining: Vec<ApprovedChange>,
}

/// Apply the approved changes belonging to `sections`.
///
/// A section only counts as completed when none of its changes failed.
/// Changes that reached disk are consumed; the failed ones, and those of
/// unselected sections, are handed back in [`ImplementOutcome::remaining`]
/// so a later run retries only what is still missing.
pub fn implement_changes(
    config: &PipelineConfig,
    log: &mut ChangeLog,
    changes: Vec<ApprovedChange>,
    sections: &[String],
) -> ImplementOutcome {
    let (selected, mut remaining): (Vec<_>, Vec<_>) = changes
        .into_iter()
        .partition(|change| sections.contains(&change.section_name()));

    let batch = BatchMutator::new(config, log).apply(&selected);
    let failed_sections = batch.failed_sections();

    let mut outcome = ImplementOutcome::default();
    for section in sections {
        if failed_sections.contains(section) {
            let count = batch.failed.iter().filter(|f| &f.section == section).count();
            warn!("Section '{}' has {} failed changes, not implemented", section, count);
            outcome.failed.push(SectionFailure {
                section: section.clone(),
                reason: format!("{} approved changes could not be applied", count),
            });
        } else {
            outcome.completed.push(section.clone());
        }
    }

    remaining.extend(
        selected
            .into_iter()
            .filter(|change| change_failed(&batch, change)),
    );

    outcome.batch = batch;
    outcome.remaining = remaining;
    outcome
}

/// Whether `change` is among the batch failures, either by field or
/// because its whole file failed.
fn change_failed(batch: &BatchReport, change: &ApprovedChange) -> bool {
    let section = change.section_name();
    batch.failed.iter().any(|failure| {
        failure.file == change.file
            && match &failure.field {
                Some(field) => *field == change.field,
                None => failure.section == section,
            }
    })
}
