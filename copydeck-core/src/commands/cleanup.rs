use anyhow::Context;
use std::collections::HashSet;
use tracing::warn;

use crate::backup::{BackupManager, PruneReport};
use crate::config::PipelineConfig;
use crate::history::ChangeLog;

/// Delete backups older than `days` (or the configured retention).
///
/// Backups still referenced by a change that has not been rolled back are
/// kept unless `force` is set.
pub fn cleanup_backups(
    config: &PipelineConfig,
    days: Option<u32>,
    force: bool,
) -> anyhow::Result<PruneReport> {
    let days = days.unwrap_or(config.backup_retention_days);
    let protected = if force {
        warn!("Forced cleanup: backups referenced by the change log may be deleted");
        HashSet::new()
    } else {
        ChangeLog::open(config)
            .context("Failed to open change log")?
            .live_backup_paths()
    };

    BackupManager::new(config)
        .prune(days, &protected)
        .context("Failed to prune backups")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use filetime::{set_file_mtime, FileTime};
    use serde_json::Map;
    use std::path::Path;
    use tempfile::TempDir;

    fn age(path: &Path, days: i64) {
        let then = Utc::now() - Duration::days(days);
        set_file_mtime(path, FileTime::from_unix_time(then.timestamp(), 0)).unwrap();
    }

    #[test]
    fn test_referenced_backups_survive_unless_forced() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig::defaults(dir.path());
        let file = config.content_path("hero.json");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, "{}").unwrap();

        let mut log = ChangeLog::open(&config).unwrap();
        let entry = log.record("hero", &file, Vec::new(), Map::new()).unwrap();
        let orphan = BackupManager::new(&config).create_backup(&file).unwrap();
        age(Path::new(&entry.backup_path), 60);
        age(&orphan, 60);

        let report = cleanup_backups(&config, None, false).unwrap();
        assert_eq!(report.removed, vec![orphan]);
        assert_eq!(report.protected.len(), 1);
        assert!(Path::new(&entry.backup_path).exists());

        let forced = cleanup_backups(&config, Some(30), true).unwrap();
        assert_eq!(forced.removed.len(), 1);
        assert!(!Path::new(&entry.backup_path).exists());
    }
}
