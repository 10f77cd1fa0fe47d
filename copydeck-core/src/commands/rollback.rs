use anyhow::Context;
use serde::Serialize;
use tracing::info;

use crate::config::PipelineConfig;
use crate::history::{BulkRollbackReport, ChangeLog, RollbackOutcome};

/// Result of `rollback-all`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RollbackAllResult {
    /// Nothing was touched; the caller must confirm first.
    NotConfirmed { live_entries: usize },
    Completed(BulkRollbackReport),
}

fn open_log(config: &PipelineConfig) -> anyhow::Result<ChangeLog> {
    ChangeLog::open(config).context("Failed to open change log")
}

/// Restore the file changed by one log entry.
pub fn rollback_entry(config: &PipelineConfig, id: &str) -> anyhow::Result<RollbackOutcome> {
    let mut log = open_log(config)?;
    log.rollback(id)
        .with_context(|| format!("Rollback of change {} failed", id))
}

/// Roll back every live change of one section.
pub fn rollback_section(
    config: &PipelineConfig,
    section: &str,
) -> anyhow::Result<BulkRollbackReport> {
    let mut log = open_log(config)?;
    log.rollback_section(section)
        .with_context(|| format!("Rollback of section '{}' failed", section))
}

/// Roll back every live change, only when `confirm` is set.
pub fn rollback_all(config: &PipelineConfig, confirm: bool) -> anyhow::Result<RollbackAllResult> {
    let mut log = open_log(config)?;
    if !confirm {
        let live_entries = log.entries().iter().filter(|e| !e.rolled_back).count();
        info!("rollback-all not confirmed, {} live changes untouched", live_entries);
        return Ok(RollbackAllResult::NotConfirmed { live_entries });
    }
    let report = log.rollback_all().context("Rollback of all changes failed")?;
    Ok(RollbackAllResult::Completed(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use tempfile::TempDir;

    fn setup_with_change() -> (TempDir, PipelineConfig, String) {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig::defaults(dir.path());
        let file = config.content_path("hero.json");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, r#"{"title":"old"}"#).unwrap();

        let mut log = ChangeLog::open(&config).unwrap();
        let entry = log.record("hero", &file, Vec::new(), Map::new()).unwrap();
        std::fs::write(&file, r#"{"title":"new"}"#).unwrap();
        (dir, config, entry.id)
    }

    #[test]
    fn test_rollback_all_requires_confirmation() {
        let (_dir, config, _id) = setup_with_change();

        let result = rollback_all(&config, false).unwrap();

        assert!(matches!(
            result,
            RollbackAllResult::NotConfirmed { live_entries: 1 }
        ));
        assert_eq!(
            std::fs::read_to_string(config.content_path("hero.json")).unwrap(),
            r#"{"title":"new"}"#
        );
    }

    #[test]
    fn test_rollback_all_confirmed() {
        let (_dir, config, _id) = setup_with_change();

        let RollbackAllResult::Completed(report) = rollback_all(&config, true).unwrap() else {
            panic!("expected a completed rollback");
        };

        assert_eq!(report.succeeded, 1);
        assert_eq!(
            std::fs::read_to_string(config.content_path("hero.json")).unwrap(),
            r#"{"title":"old"}"#
        );
    }

    #[test]
    fn test_rollback_entry_twice_is_noop() {
        let (_dir, config, id) = setup_with_change();

        rollback_entry(&config, &id).unwrap();
        let second = rollback_entry(&config, &id).unwrap();

        assert!(matches!(second, RollbackOutcome::AlreadyRolledBack { .. }));
    }

    #[test]
    fn test_rollback_unknown_entry_is_error() {
        let (_dir, config, _id) = setup_with_change();
        assert!(rollback_entry(&config, "missing").is_err());
    }
}
