use anyhow::Context;
use serde::Serialize;
use tracing::info;

use crate::config::PipelineConfig;
use crate::status::{
    NextAction, ReviewDecision, SectionRecord, SectionState, Stage, StatusEvent, StatusStats,
    StatusTracker,
};

/// Number of history events included in a status report.
const RECENT_EVENTS: usize = 10;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionStatusRow {
    pub name: String,
    pub state: SectionState,
    #[serde(flatten)]
    pub record: SectionRecord,
}

impl SectionStatusRow {
    fn new(name: &str, record: &SectionRecord) -> Self {
        Self {
            name: name.to_string(),
            state: record.state(),
            record: record.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub sections: Vec<SectionStatusRow>,
    pub stats: StatusStats,
    pub next_action: NextAction,
    /// Most recent events, newest last.
    pub recent: Vec<StatusEvent>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextActionReport {
    pub action: NextAction,
    /// Sections pending for `action`.
    pub sections: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ResetResult {
    NotConfirmed { sections: usize },
    Reset { sections: usize },
}

fn open_tracker(config: &PipelineConfig) -> anyhow::Result<StatusTracker> {
    StatusTracker::open(config).context("Failed to open section status")
}

pub fn show_status(config: &PipelineConfig) -> anyhow::Result<StatusReport> {
    let tracker = open_tracker(config)?;
    let history = tracker.history();
    Ok(StatusReport {
        sections: tracker
            .sections()
            .iter()
            .map(|(name, record)| SectionStatusRow::new(name, record))
            .collect(),
        stats: tracker.summary(),
        next_action: tracker.next_action(),
        recent: history[history.len().saturating_sub(RECENT_EVENTS)..].to_vec(),
    })
}

pub fn next_action(config: &PipelineConfig) -> anyhow::Result<NextActionReport> {
    let tracker = open_tracker(config)?;
    let action = tracker.next_action();
    let sections = action
        .stage()
        .map(|stage| tracker.pending_sections(stage))
        .unwrap_or_default();
    Ok(NextActionReport { action, sections })
}

/// Record a stage completion by hand, e.g. after an offline review.
pub fn mark_stage(
    config: &PipelineConfig,
    section: &str,
    stage: &str,
    decision: Option<&str>,
) -> anyhow::Result<SectionStatusRow> {
    let stage: Stage = stage.parse()?;
    let decision = decision.map(str::parse::<ReviewDecision>).transpose()?;

    let mut tracker = open_tracker(config)?;
    let record = tracker
        .complete_stage(section, stage, decision)
        .with_context(|| format!("Cannot mark '{}' as {}", section, stage))?;
    Ok(SectionStatusRow::new(section, record))
}

/// Return every section to pending, only when `confirm` is set.
pub fn reset_status(config: &PipelineConfig, confirm: bool) -> anyhow::Result<ResetResult> {
    let mut tracker = open_tracker(config)?;
    if !confirm {
        info!("reset not confirmed, section status untouched");
        return Ok(ResetResult::NotConfirmed {
            sections: tracker.sections().len(),
        });
    }
    let sections = tracker.reset_all().context("Failed to reset section status")?;
    Ok(ResetResult::Reset { sections })
}
