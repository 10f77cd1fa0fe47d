use anyhow::Context;

use crate::config::PipelineConfig;
use crate::history::{ChangeLog, ChangeLogEntry, ChangeStats};

/// Change log entries, most recent first.
pub fn list_history(
    config: &PipelineConfig,
    limit: Option<usize>,
    section: Option<&str>,
) -> anyhow::Result<Vec<ChangeLogEntry>> {
    let log = ChangeLog::open(config).context("Failed to open change log")?;
    Ok(log.history(limit, section).into_iter().cloned().collect())
}

pub fn change_stats(config: &PipelineConfig) -> anyhow::Result<ChangeStats> {
    let log = ChangeLog::open(config).context("Failed to open change log")?;
    Ok(log.stats())
}
