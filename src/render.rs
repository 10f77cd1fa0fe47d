//! Plain-text rendering of command reports.

use chrono::{DateTime, Utc};

use copydeck_core::backup::PruneReport;
use copydeck_core::commands::{
    ApplyReport, NextActionReport, ResetResult, RollbackAllResult, SectionStatusRow, StatusReport,
};
use copydeck_core::history::{BulkRollbackReport, ChangeLogEntry, ChangeStats, RollbackOutcome};
use copydeck_core::status::NextAction;

fn when(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string())
}

fn finish(lines: Vec<String>) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

pub fn apply_report(report: &ApplyReport) -> String {
    let mut lines = vec![format!(
        "Applied {} of {} changes from {}",
        report
            .batch
            .successful
            .iter()
            .map(|f| f.fields.len())
            .sum::<usize>(),
        report.total_changes,
        report.source.display()
    )];
    for file in &report.batch.successful {
        lines.push(format!(
            "  ✓ {} [{}] {} field(s), backup {}",
            file.file,
            file.section,
            file.fields.len(),
            file.backup_path
        ));
    }
    for failure in &report.batch.failed {
        let target = match &failure.field {
            Some(field) => format!("{}:{}", failure.file, field),
            None => failure.file.clone(),
        };
        lines.push(format!("  ✗ {} [{}] {}", target, failure.section, failure.reason));
    }
    if !report.implemented.is_empty() {
        lines.push(format!("Implemented: {}", report.implemented.join(", ")));
    }
    if let Some(archived) = &report.archived {
        lines.push(format!("Archived to {}", archived.display()));
    }
    if report.remaining > 0 {
        lines.push(format!(
            "{} change(s) kept in {} for a retry",
            report.remaining,
            report.source.display()
        ));
    }
    finish(lines)
}

pub fn rollback_outcome(outcome: &RollbackOutcome) -> String {
    match outcome {
        RollbackOutcome::Restored {
            entry_id,
            file_path,
            backup_path,
        } => finish(vec![format!(
            "Rolled back {entry_id}: restored {file_path} from {backup_path}"
        )]),
        RollbackOutcome::AlreadyRolledBack { entry_id } => {
            finish(vec![format!("Change {entry_id} was already rolled back, nothing to do")])
        }
    }
}

pub fn bulk_rollback(report: &BulkRollbackReport) -> String {
    let mut lines = vec![format!(
        "Rolled back {} of {} changes",
        report.succeeded, report.attempted
    )];
    for failure in &report.failures {
        lines.push(format!(
            "  ✗ {} ({}): {}",
            failure.entry_id, failure.file_path, failure.reason
        ));
    }
    finish(lines)
}

pub fn rollback_all(result: &RollbackAllResult) -> String {
    match result {
        RollbackAllResult::NotConfirmed { live_entries } => finish(vec![
            format!("This would roll back {live_entries} change(s)."),
            "Re-run with --confirm to proceed.".to_string(),
        ]),
        RollbackAllResult::Completed(report) => bulk_rollback(report),
    }
}

pub fn prune_report(report: &PruneReport) -> String {
    let mut lines = vec![format!(
        "Removed {} backup(s) older than {} days",
        report.removed.len(),
        report.max_age_days
    )];
    if !report.protected.is_empty() {
        lines.push(format!(
            "Kept {} old backup(s) still referenced by the change log (use --force to remove)",
            report.protected.len()
        ));
    }
    for failure in &report.failed {
        lines.push(format!("  ✗ {}: {}", failure.path.display(), failure.reason));
    }
    finish(lines)
}

pub fn history(entries: &[ChangeLogEntry]) -> String {
    if entries.is_empty() {
        return finish(vec!["No changes recorded".to_string()]);
    }
    let lines = entries
        .iter()
        .map(|entry| {
            format!(
                "{}  {}  {:<12} {:<24} {} field(s){}",
                entry.id,
                when(Some(entry.timestamp)),
                entry.section,
                entry.file_path,
                entry.changes.len(),
                if entry.rolled_back { "  [rolled back]" } else { "" }
            )
        })
        .collect();
    finish(lines)
}

pub fn change_stats(stats: &ChangeStats) -> String {
    finish(vec![
        format!("Changes:        {}", stats.total_changes),
        format!("Rollbacks:      {}", stats.total_rollbacks),
        format!("Files modified: {}", stats.files_modified.len()),
        format!("Last change:    {}", when(stats.last_change)),
        format!("Last rollback:  {}", when(stats.last_rollback)),
    ])
}

fn flag(done: bool) -> &'static str {
    if done {
        "✓"
    } else {
        "·"
    }
}

pub fn section_row(row: &SectionStatusRow) -> String {
    let record = &row.record;
    let decision = record
        .review_decision
        .map(|d| d.to_string())
        .unwrap_or_default();
    let mut line = format!(
        "{:<14} {}  {}  {}  {}  {:<9}",
        row.name,
        flag(record.analyzed),
        flag(record.improved),
        flag(record.reviewed),
        flag(record.implemented),
        decision
    );
    if record.awaiting_rework {
        line.push_str(" (awaiting rework)");
    }
    finish(vec![line.trim_end().to_string()])
}

pub fn status_report(report: &StatusReport) -> String {
    let mut out = format!("{:<14} A  I  R  D  decision\n", "section");
    for row in &report.sections {
        out.push_str(&section_row(row));
    }
    out.push_str(&format!(
        "\n{} sections: {} analyzed, {} improved, {} reviewed, {} implemented\n",
        report.stats.total,
        report.stats.analyzed,
        report.stats.improved,
        report.stats.reviewed,
        report.stats.implemented
    ));
    out.push_str(&format!("Next: {}\n", report.next_action));
    out
}

pub fn next_action(report: &NextActionReport) -> String {
    match report.action {
        NextAction::Complete => finish(vec!["All sections are complete".to_string()]),
        action => finish(vec![format!(
            "Next: {} ({})",
            action,
            report.sections.join(", ")
        )]),
    }
}

pub fn reset_result(result: &ResetResult) -> String {
    match result {
        ResetResult::NotConfirmed { sections } => finish(vec![
            format!("This would reset {sections} section(s) to pending."),
            "Re-run with --confirm to proceed.".to_string(),
        ]),
        ResetResult::Reset { sections } => {
            finish(vec![format!("Reset {sections} section(s) to pending")])
        }
    }
}
