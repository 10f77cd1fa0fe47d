use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::history::ChangeLog;
use crate::mutator::{load_approved_changes, save_approved_changes, BatchReport};
use crate::status::{Stage, StatusTracker};
use crate::workflow::{implement_changes, SectionFailure};

/// Result of `apply`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    pub source: PathBuf,
    /// Where the consumed approved-changes file was moved.
    pub archived: Option<PathBuf>,
    pub total_changes: usize,
    pub batch: BatchReport,
    /// Sections marked implemented in the status file.
    pub implemented: Vec<String>,
    pub section_failures: Vec<SectionFailure>,
    /// Changes written back for a retry.
    pub remaining: usize,
}

/// Apply every change in an approved-changes file.
///
/// Fails only when the file cannot be loaded; per-file and per-field
/// problems are reported in [`ApplyReport::batch`]. The consumed file is
/// archived next to itself, and changes that failed are written back to the
/// original path. Once content files have been written the report is always
/// returned; bookkeeping problems after that point are only logged.
pub fn apply_approved_changes(
    config: &PipelineConfig,
    file: Option<&Path>,
) -> anyhow::Result<ApplyReport> {
    let source = file
        .map(|f| config.resolve(f))
        .unwrap_or_else(|| config.approved_changes_path());
    let changes = load_approved_changes(&source)
        .with_context(|| format!("Cannot apply approved changes from {}", source.display()))?;

    let mut report = ApplyReport {
        source: source.clone(),
        archived: None,
        total_changes: changes.len(),
        batch: BatchReport::default(),
        implemented: Vec::new(),
        section_failures: Vec::new(),
        remaining: 0,
    };
    if changes.is_empty() {
        info!("No approved changes in {:?}", source);
        return Ok(report);
    }

    let mut log = ChangeLog::open(config).context("Failed to open change log")?;
    let mut tracker = StatusTracker::open(config).context("Failed to open section status")?;

    let mut sections: Vec<String> = Vec::new();
    for change in &changes {
        let section = change.section_name();
        if !sections.contains(&section) {
            sections.push(section);
        }
    }

    let outcome = implement_changes(config, &mut log, changes, &sections);

    let archive = archive_path(&source);
    match std::fs::rename(&source, &archive) {
        Ok(()) => {
            info!("Archived applied changes to {:?}", archive);
            report.archived = Some(archive);
        }
        Err(e) => warn!("Failed to archive {:?}, rewriting it in place: {}", source, e),
    }

    // Without an archive the source still lists consumed changes
    if !outcome.remaining.is_empty() || report.archived.is_none() {
        if let Err(e) = save_approved_changes(&source, &outcome.remaining) {
            warn!(
                "Failed to write {} unapplied changes back to {:?}: {}",
                outcome.remaining.len(),
                source,
                e
            );
        }
    }
    report.remaining = outcome.remaining.len();

    for section in &outcome.completed {
        let pending = tracker
            .section(section)
            .is_some_and(|record| tracker.is_pending(record, Stage::Implement));
        if !pending {
            continue;
        }
        match tracker.complete_stage(section, Stage::Implement, None) {
            Ok(_) => report.implemented.push(section.clone()),
            Err(e) => warn!("Could not mark '{}' implemented: {}", section, e),
        }
    }

    report.batch = outcome.batch;
    report.section_failures = outcome.failed;
    Ok(report)
}

/// `approved-changes.json` → `approved-changes.20261018T093012.applied.json`.
fn archive_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "approved-changes".to_string());
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%3f");
    source.with_file_name(format!("{stem}.{stamp}.applied.json"))
}
