use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{
    BulkRollbackReport, ChangeLogEntry, ChangeStats, FieldChange, RollbackFailure,
    RollbackOutcome, StatsSnapshot,
};
use super::ChangeLogError;
use crate::backup::{BackupError, BackupManager};
use crate::config::PipelineConfig;
use crate::document::write_json_atomic;

/// Highest change log format version this build reads and the one it writes.
pub const CHANGE_LOG_VERSION: u32 = 1;

#[derive(Serialize)]
struct ChangeLogFileRef<'a> {
    version: u32,
    entries: &'a [ChangeLogEntry],
    stats: StatsSnapshot,
}

#[derive(Deserialize)]
struct ChangeLogFile {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    entries: Vec<ChangeLogEntry>,
    #[serde(default)]
    stats: Option<StatsSnapshot>,
}

fn default_version() -> u32 {
    CHANGE_LOG_VERSION
}

/// Capped, most-recent-first log of content mutations, persisted as JSON.
///
/// Every entry is created through [`ChangeLog::record`], which takes the
/// backup first; there is no way to add an entry without one. The whole file
/// is rewritten on every change and in-memory state is only updated once that
/// write succeeded.
pub struct ChangeLog {
    path: PathBuf,
    max_entries: usize,
    backups: BackupManager,
    entries: Vec<ChangeLogEntry>,
}

impl ChangeLog {
    /// Open the change log configured for this project.
    pub fn open(config: &PipelineConfig) -> Result<Self, ChangeLogError> {
        Self::open_at(
            config.change_log_path(),
            config.max_log_entries,
            BackupManager::new(config),
        )
    }

    /// Open (or start) a change log at `path`.
    pub fn open_at(
        path: impl Into<PathBuf>,
        max_entries: usize,
        backups: BackupManager,
    ) -> Result<Self, ChangeLogError> {
        let path = path.into();
        let mut entries = load_entries(&path)?;
        if entries.len() > max_entries {
            debug!(
                "Change log holds {} entries, trimming to {}",
                entries.len(),
                max_entries
            );
            entries.truncate(max_entries);
        }

        Ok(Self {
            path,
            max_entries,
            backups,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    /// All entries, most recent first.
    pub fn entries(&self) -> &[ChangeLogEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&ChangeLogEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Back up `file_path` and record the mutation about to be written to it.
    ///
    /// If the backup cannot be taken nothing is recorded and the error tells
    /// the caller to abort the write. Entries evicted by the cap keep their
    /// backup files.
    pub fn record(
        &mut self,
        section: &str,
        file_path: &Path,
        changes: Vec<FieldChange>,
        metadata: Map<String, Value>,
    ) -> Result<ChangeLogEntry, ChangeLogError> {
        let backup_path = self.backups.create_backup(file_path)?;

        let entry = ChangeLogEntry {
            id: Uuid::now_v7().to_string(),
            timestamp: Utc::now(),
            section: section.to_string(),
            file_path: absolute_string(file_path),
            backup_path: absolute_string(&backup_path),
            changes,
            metadata,
            rolled_back: false,
            rollback_timestamp: None,
        };

        let mut next = Vec::with_capacity(self.entries.len() + 1);
        next.push(entry.clone());
        next.extend(self.entries.iter().cloned());
        if next.len() > self.max_entries {
            for evicted in &next[self.max_entries..] {
                debug!(
                    "Evicting change log entry {} (backup {} kept)",
                    evicted.id, evicted.backup_path
                );
            }
            next.truncate(self.max_entries);
        }

        self.save(&next)?;
        self.entries = next;

        info!(
            "Recorded change {} for section '{}' ({} fields in {})",
            entry.id,
            entry.section,
            entry.changes.len(),
            entry.file_path
        );
        Ok(entry)
    }

    /// Drop an entry whose write never happened.
    ///
    /// The backup file stays on disk; only the log reference goes.
    pub fn retract(&mut self, id: &str) -> Result<ChangeLogEntry, ChangeLogError> {
        let index = self.index_of(id)?;
        let mut next = self.entries.clone();
        let removed = next.remove(index);

        self.save(&next)?;
        self.entries = next;

        info!("Retracted change log entry {}", id);
        Ok(removed)
    }

    /// Restore the file of one entry from its backup.
    ///
    /// Rolling back an entry twice is a reported no-op. A missing backup is
    /// returned as an error and the entry stays live.
    pub fn rollback(&mut self, id: &str) -> Result<RollbackOutcome, ChangeLogError> {
        let index = self.index_of(id)?;
        if self.entries[index].rolled_back {
            info!("Change {} was already rolled back", id);
            return Ok(RollbackOutcome::AlreadyRolledBack {
                entry_id: id.to_string(),
            });
        }

        let mut next = self.entries.clone();
        restore_entry(&self.backups, &mut next[index])?;
        self.save(&next)?;
        self.entries = next;

        let entry = &self.entries[index];
        Ok(RollbackOutcome::Restored {
            entry_id: entry.id.clone(),
            file_path: entry.file_path.clone(),
            backup_path: entry.backup_path.clone(),
        })
    }

    /// Roll back every live entry that touched `section`, most recent first.
    pub fn rollback_section(&mut self, section: &str) -> Result<BulkRollbackReport, ChangeLogError> {
        self.rollback_matching(|entry| entry.touches_section(section))
    }

    /// Roll back every live entry, most recent first.
    pub fn rollback_all(&mut self) -> Result<BulkRollbackReport, ChangeLogError> {
        self.rollback_matching(|_| true)
    }

    fn rollback_matching<F>(&mut self, matches: F) -> Result<BulkRollbackReport, ChangeLogError>
    where
        F: Fn(&ChangeLogEntry) -> bool,
    {
        let mut report = BulkRollbackReport::default();
        let mut next = self.entries.clone();

        for entry in next.iter_mut().filter(|e| !e.rolled_back && matches(&**e)) {
            report.attempted += 1;
            match restore_entry(&self.backups, entry) {
                Ok(()) => {
                    report.succeeded += 1;
                    report.restored.push(entry.id.clone());
                }
                Err(e) => {
                    warn!("Rollback of change {} failed: {}", entry.id, e);
                    report.failures.push(RollbackFailure {
                        entry_id: entry.id.clone(),
                        file_path: entry.file_path.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if report.succeeded > 0 {
            self.save(&next)?;
            self.entries = next;
        }

        info!(
            "Rolled back {} of {} changes",
            report.succeeded, report.attempted
        );
        Ok(report)
    }

    /// Aggregate statistics, recomputed from the current entries.
    pub fn stats(&self) -> ChangeStats {
        ChangeStats::from_entries(&self.entries)
    }

    /// Entries most recent first, optionally filtered by section and capped.
    pub fn history(&self, limit: Option<usize>, section: Option<&str>) -> Vec<&ChangeLogEntry> {
        self.entries
            .iter()
            .filter(|entry| section.map_or(true, |s| entry.touches_section(s)))
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }

    /// Backups a rollback could still need.
    pub fn live_backup_paths(&self) -> HashSet<PathBuf> {
        self.entries
            .iter()
            .filter(|entry| !entry.rolled_back)
            .map(|entry| PathBuf::from(&entry.backup_path))
            .collect()
    }

    fn index_of(&self, id: &str) -> Result<usize, ChangeLogError> {
        self.entries
            .iter()
            .position(|entry| entry.id == id)
            .ok_or_else(|| ChangeLogError::NotFound(id.to_string()))
    }

    fn save(&self, entries: &[ChangeLogEntry]) -> Result<(), ChangeLogError> {
        let stats = ChangeStats::from_entries(entries);
        let file = ChangeLogFileRef {
            version: CHANGE_LOG_VERSION,
            entries,
            stats: StatsSnapshot::from(&stats),
        };
        write_json_atomic(&file, &self.path)?;
        debug!("Saved change log with {} entries to {:?}", entries.len(), self.path);
        Ok(())
    }
}

/// Entries outlive the working directory they were written from, so their
/// paths are stored absolute.
fn absolute_string(path: &Path) -> String {
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

fn restore_entry(backups: &BackupManager, entry: &mut ChangeLogEntry) -> Result<(), BackupError> {
    backups.restore(Path::new(&entry.backup_path), Path::new(&entry.file_path))?;
    entry.rolled_back = true;
    entry.rollback_timestamp = Some(Utc::now());
    Ok(())
}

fn load_entries(path: &Path) -> Result<Vec<ChangeLogEntry>, ChangeLogError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No change log at {:?}, starting empty", path);
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(ChangeLogError::Read {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    let file: ChangeLogFile =
        serde_json::from_str(&content).map_err(|e| ChangeLogError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
    if file.version > CHANGE_LOG_VERSION {
        return Err(ChangeLogError::UnsupportedVersion {
            found: file.version,
            supported: CHANGE_LOG_VERSION,
        });
    }

    if let Some(stored) = file.stats {
        if ChangeStats::from(stored) != ChangeStats::from_entries(&file.entries) {
            debug!("Stored change log stats in {:?} were stale, recomputing", path);
        }
    }

    debug!("Loaded {} change log entries from {:?}", file.entries.len(), path);
    Ok(file.entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        log: ChangeLog,
    }

    impl Fixture {
        fn content(&self, name: &str) -> PathBuf {
            self.dir.path().join("content").join(name)
        }

        fn write(&self, name: &str, body: &str) -> PathBuf {
            let path = self.content(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, body).unwrap();
            path
        }

        fn reopen(&self, max_entries: usize) -> ChangeLog {
            ChangeLog::open_at(
                self.log.path(),
                max_entries,
                BackupManager::with_dir(self.dir.path().join("backups")),
            )
            .unwrap()
        }
    }

    fn create_test_log(max_entries: usize) -> Fixture {
        let dir = TempDir::new().unwrap();
        let log = ChangeLog::open_at(
            dir.path().join("change-log.json"),
            max_entries,
            BackupManager::with_dir(dir.path().join("backups")),
        )
        .unwrap();
        Fixture { dir, log }
    }

    fn title_change(before: &str, after: &str) -> Vec<FieldChange> {
        vec![FieldChange {
            field: "title".into(),
            before: json!(before),
            after: json!(after),
        }]
    }

    /// Record a change and perform the write it describes.
    fn mutate(fx: &mut Fixture, section: &str, file: &Path, after: &str) -> ChangeLogEntry {
        let entry = fx
            .log
            .record(section, file, title_change("", after), Map::new())
            .unwrap();
        std::fs::write(file, format!("{{\"title\":\"{after}\"}}")).unwrap();
        entry
    }

    #[test]
    fn test_record_takes_backup_and_inserts_at_head() {
        let mut fx = create_test_log(100);
        let file = fx.write("hero.json", r#"{"title":"old"}"#);

        let first = mutate(&mut fx, "hero", &file, "one");
        let second = mutate(&mut fx, "hero", &file, "two");

        assert_eq!(fx.log.entries()[0].id, second.id);
        assert_eq!(fx.log.entries()[1].id, first.id);
        assert!(first.id < second.id, "ids are time-ordered");
        assert_eq!(
            std::fs::read_to_string(&first.backup_path).unwrap(),
            r#"{"title":"old"}"#
        );
        assert!(fx.log.path().exists());
    }

    #[test]
    fn test_record_fails_closed_without_backup() {
        let mut fx = create_test_log(100);
        let missing = fx.content("missing.json");

        let result = fx
            .log
            .record("hero", &missing, title_change("a", "b"), Map::new());

        assert!(matches!(result, Err(ChangeLogError::Backup(_))));
        assert!(fx.log.entries().is_empty());
        assert!(!fx.log.path().exists());
    }

    #[test]
    fn test_cap_evicts_oldest_but_keeps_backups() {
        let mut fx = create_test_log(3);
        let file = fx.write("hero.json", r#"{"title":"v0"}"#);

        let entries: Vec<_> = (1..=5)
            .map(|i| mutate(&mut fx, "hero", &file, &format!("v{i}")))
            .collect();

        let kept: Vec<_> = fx.log.entries().iter().map(|e| e.id.clone()).collect();
        let expected: Vec<_> = entries.iter().rev().take(3).map(|e| e.id.clone()).collect();
        assert_eq!(kept, expected);
        for entry in &entries {
            assert!(Path::new(&entry.backup_path).exists());
        }
    }

    #[test]
    fn test_rollback_is_idempotent() {
        let mut fx = create_test_log(100);
        let file = fx.write("hero.json", r#"{"title":"old"}"#);
        let entry = mutate(&mut fx, "hero", &file, "new");

        let first = fx.log.rollback(&entry.id).unwrap();
        assert!(matches!(first, RollbackOutcome::Restored { .. }));
        let content_after_first = std::fs::read(&file).unwrap();
        let stats_after_first = fx.log.stats();

        let second = fx.log.rollback(&entry.id).unwrap();
        assert_eq!(
            second,
            RollbackOutcome::AlreadyRolledBack {
                entry_id: entry.id.clone()
            }
        );
        assert_eq!(std::fs::read(&file).unwrap(), content_after_first);
        assert_eq!(fx.log.stats(), stats_after_first);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), r#"{"title":"old"}"#);
        assert!(fx.log.get(&entry.id).unwrap().rolled_back);
    }

    #[test]
    fn test_rollback_with_missing_backup_is_hard_failure() {
        let mut fx = create_test_log(100);
        let file = fx.write("hero.json", r#"{"title":"old"}"#);
        let entry = mutate(&mut fx, "hero", &file, "new");
        std::fs::remove_file(&entry.backup_path).unwrap();

        let result = fx.log.rollback(&entry.id);

        assert!(matches!(
            result,
            Err(ChangeLogError::Backup(BackupError::Missing(_)))
        ));
        assert!(!fx.log.get(&entry.id).unwrap().rolled_back);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), r#"{"title":"new"}"#);
    }

    #[test]
    fn test_rollback_unknown_id() {
        let mut fx = create_test_log(100);
        assert!(matches!(
            fx.log.rollback("nope"),
            Err(ChangeLogError::NotFound(_))
        ));
    }

    #[test]
    fn test_rollback_section_only_touches_that_section() {
        let mut fx = create_test_log(100);
        let hero = fx.write("hero.json", r#"{"title":"hero"}"#);
        let pricing = fx.write("pricing.json", r#"{"title":"pricing"}"#);
        mutate(&mut fx, "hero", &hero, "hero 2");
        let pricing_entry = mutate(&mut fx, "pricing", &pricing, "pricing 2");

        let report = fx.log.rollback_section("hero").unwrap();

        assert_eq!(report.attempted, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(std::fs::read_to_string(&hero).unwrap(), r#"{"title":"hero"}"#);
        assert_eq!(
            std::fs::read_to_string(&pricing).unwrap(),
            r#"{"title":"pricing 2"}"#
        );
        assert!(!fx.log.get(&pricing_entry.id).unwrap().rolled_back);
    }

    #[test]
    fn test_rollback_section_includes_shared_file_entries() {
        let mut fx = create_test_log(100);
        let landing = fx.write("landing.json", r#"{"title":"landing"}"#);
        let mut metadata = Map::new();
        metadata.insert("sections".to_string(), json!(["hero", "cta"]));
        let entry = fx
            .log
            .record("hero", &landing, title_change("landing", "both"), metadata)
            .unwrap();
        std::fs::write(&landing, r#"{"title":"both"}"#).unwrap();

        assert_eq!(fx.log.history(None, Some("cta")).len(), 1);
        let report = fx.log.rollback_section("cta").unwrap();

        assert_eq!(report.attempted, 1);
        assert_eq!(report.restored, vec![entry.id]);
        assert_eq!(
            std::fs::read_to_string(&landing).unwrap(),
            r#"{"title":"landing"}"#
        );
    }

    #[test]
    fn test_recorded_paths_are_absolute() {
        let mut fx = create_test_log(100);
        let file = fx.write("hero.json", r#"{"title":"old"}"#);
        let entry = mutate(&mut fx, "hero", &file, "new");

        assert!(Path::new(&entry.file_path).is_absolute());
        assert!(Path::new(&entry.backup_path).is_absolute());
    }

    #[test]
    fn test_rollback_all_tolerates_partial_failure() {
        let mut fx = create_test_log(100);
        let a = fx.write("a.json", r#"{"title":"a"}"#);
        let b = fx.write("b.json", r#"{"title":"b"}"#);
        let c = fx.write("c.json", r#"{"title":"c"}"#);
        mutate(&mut fx, "a", &a, "a2");
        let broken = mutate(&mut fx, "b", &b, "b2");
        mutate(&mut fx, "c", &c, "c2");
        std::fs::remove_file(&broken.backup_path).unwrap();

        let report = fx.log.rollback_all().unwrap();

        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].entry_id, broken.id);
        assert_eq!(std::fs::read_to_string(&a).unwrap(), r#"{"title":"a"}"#);
        assert_eq!(std::fs::read_to_string(&c).unwrap(), r#"{"title":"c"}"#);
        assert_eq!(fx.log.stats().total_rollbacks, 2);

        // A second pass only retries the entry that failed
        let retry = fx.log.rollback_all().unwrap();
        assert_eq!(retry.attempted, 1);
        assert_eq!(retry.succeeded, 0);
    }

    #[test]
    fn test_retract_removes_entry_keeps_backup() {
        let mut fx = create_test_log(100);
        let file = fx.write("hero.json", r#"{"title":"old"}"#);
        let entry = fx
            .log
            .record("hero", &file, title_change("old", "new"), Map::new())
            .unwrap();

        fx.log.retract(&entry.id).unwrap();

        assert!(fx.log.entries().is_empty());
        assert!(Path::new(&entry.backup_path).exists());
        assert!(fx.reopen(100).entries().is_empty());
    }

    #[test]
    fn test_state_survives_reopen() {
        let mut fx = create_test_log(100);
        let file = fx.write("hero.json", r#"{"title":"old"}"#);
        let first = mutate(&mut fx, "hero", &file, "one");
        mutate(&mut fx, "hero", &file, "two");
        fx.log.rollback(&first.id).unwrap();

        let reopened = fx.reopen(100);

        assert_eq!(reopened.entries(), fx.log.entries());
        let stats = reopened.stats();
        assert_eq!(stats.total_changes, 2);
        assert_eq!(stats.total_rollbacks, 1);
        assert_eq!(stats.files_modified.len(), 1);

        let raw: Value =
            serde_json::from_str(&std::fs::read_to_string(reopened.path()).unwrap()).unwrap();
        assert_eq!(raw["version"], json!(CHANGE_LOG_VERSION));
        assert_eq!(raw["stats"]["filesModified"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let fx = create_test_log(100);
        std::fs::write(fx.log.path(), r#"{"version": 99, "entries": []}"#).unwrap();

        let result = ChangeLog::open_at(
            fx.log.path(),
            100,
            BackupManager::with_dir(fx.dir.path().join("backups")),
        );
        assert!(matches!(
            result,
            Err(ChangeLogError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn test_history_filters_and_limits() {
        let mut fx = create_test_log(100);
        let hero = fx.write("hero.json", r#"{"title":"h"}"#);
        let faq = fx.write("faq.json", r#"{"title":"f"}"#);
        mutate(&mut fx, "hero", &hero, "h1");
        mutate(&mut fx, "faq", &faq, "f1");
        let latest_hero = mutate(&mut fx, "hero", &hero, "h2");

        let hero_only = fx.log.history(None, Some("hero"));
        assert_eq!(hero_only.len(), 2);
        assert_eq!(hero_only[0].id, latest_hero.id);
        assert_eq!(fx.log.history(Some(1), None).len(), 1);
    }

    #[test]
    fn test_live_backup_paths_exclude_rolled_back() {
        let mut fx = create_test_log(100);
        let file = fx.write("hero.json", r#"{"title":"old"}"#);
        let first = mutate(&mut fx, "hero", &file, "one");
        let second = mutate(&mut fx, "hero", &file, "two");
        fx.log.rollback(&first.id).unwrap();

        let live = fx.log.live_backup_paths();
        assert!(live.contains(&PathBuf::from(&second.backup_path)));
        assert!(!live.contains(&PathBuf::from(&first.backup_path)));
    }
}
