use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use super::BackupError;
use crate::config::PipelineConfig;
use crate::document::writer::write_bytes_atomic;

const BACKUP_EXTENSION: &str = "bak";

/// Disambiguates backups of same-named files taken within one clock tick.
static BACKUP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// One backup file found on disk.
#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    pub path: PathBuf,
    /// File name of the content file this backup was taken from.
    pub original_name: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// A backup that could not be deleted during pruning.
#[derive(Debug, Clone, Serialize)]
pub struct PruneFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of a pruning pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneReport {
    pub max_age_days: u32,
    pub removed: Vec<PathBuf>,
    /// Old enough to prune, but still referenced by a live change log entry.
    pub protected: Vec<PathBuf>,
    pub failed: Vec<PruneFailure>,
}

/// Creates, restores and prunes timestamped file backups.
///
/// Backups are write-once: a new file is opened with `create_new` for every
/// backup and existing backup files are never modified, only deleted by
/// [`BackupManager::prune`].
#[derive(Debug, Clone)]
pub struct BackupManager {
    dir: PathBuf,
}

impl BackupManager {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            dir: config.backup_dir(),
        }
    }

    /// Manager storing backups directly in `dir`.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy `source` byte-for-byte into a new backup file.
    ///
    /// The backup name embeds the source file name, a microsecond UTC
    /// timestamp and a process-wide sequence number, e.g.
    /// `hero.json.20261018T093012123456.0007.bak`.
    pub fn create_backup(&self, source: &Path) -> Result<PathBuf, BackupError> {
        let bytes = std::fs::read(source).map_err(|e| BackupError::SourceUnreadable {
            path: source.to_path_buf(),
            source: e,
        })?;
        let file_name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| BackupError::SourceUnreadable {
                path: source.to_path_buf(),
                source: std::io::Error::new(ErrorKind::InvalidInput, "path has no file name"),
            })?;

        std::fs::create_dir_all(&self.dir).map_err(|e| BackupError::DestinationUnwritable {
            path: self.dir.clone(),
            source: e,
        })?;

        loop {
            let sequence = BACKUP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
            let stamp = Utc::now().format("%Y%m%dT%H%M%S%6f");
            let backup_path = self.dir.join(format!(
                "{}.{}.{:04}.{}",
                file_name, stamp, sequence, BACKUP_EXTENSION
            ));

            let mut file = match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&backup_path)
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(BackupError::DestinationUnwritable {
                        path: backup_path,
                        source: e,
                    })
                }
            };

            if let Err(e) = file.write_all(&bytes).and_then(|_| file.sync_all()) {
                // Never leave a truncated backup that a rollback could trust
                let _ = std::fs::remove_file(&backup_path);
                return Err(BackupError::DestinationUnwritable {
                    path: backup_path,
                    source: e,
                });
            }

            info!("Backed up {:?} to {:?}", source, backup_path);
            return Ok(backup_path);
        }
    }

    /// Copy a backup back over `target`, byte-for-byte.
    pub fn restore(&self, backup: &Path, target: &Path) -> Result<(), BackupError> {
        if !backup.exists() {
            return Err(BackupError::Missing(backup.to_path_buf()));
        }

        let bytes = std::fs::read(backup).map_err(|e| BackupError::Restore {
            backup: backup.to_path_buf(),
            target: target.to_path_buf(),
            reason: e.to_string(),
        })?;
        write_bytes_atomic(&bytes, target).map_err(|e| BackupError::Restore {
            backup: backup.to_path_buf(),
            target: target.to_path_buf(),
            reason: e.to_string(),
        })?;

        info!("Restored {:?} from backup {:?}", target, backup);
        Ok(())
    }

    /// All backups in the backup directory, newest first.
    pub fn list(&self) -> Result<Vec<BackupInfo>, BackupError> {
        let mut backups = Vec::new();
        for path in self.backup_files()? {
            let metadata = match std::fs::metadata(&path) {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Skipping unreadable backup {:?}: {}", path, e);
                    continue;
                }
            };
            let modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            let original_name = original_name(&path).unwrap_or_default();

            backups.push(BackupInfo {
                path,
                original_name,
                size: metadata.len(),
                modified,
            });
        }

        backups.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.path.cmp(&a.path)));
        Ok(backups)
    }

    /// Delete backups older than `max_age_days`.
    ///
    /// Paths in `protected` are left in place and reported separately, so a
    /// backup still needed for a rollback is not silently invalidated. They
    /// are compared by canonical path, so relative or symlinked spellings of
    /// the same file still match.
    pub fn prune(
        &self,
        max_age_days: u32,
        protected: &HashSet<PathBuf>,
    ) -> Result<PruneReport, BackupError> {
        let cutoff = Utc::now() - Duration::days(i64::from(max_age_days));
        let mut report = PruneReport {
            max_age_days,
            ..Default::default()
        };
        let protected: HashSet<PathBuf> = protected
            .iter()
            .filter_map(|path| path.canonicalize().ok())
            .collect();

        for backup in self.list()? {
            if backup.modified >= cutoff {
                continue;
            }
            let referenced = backup
                .path
                .canonicalize()
                .is_ok_and(|path| protected.contains(&path));
            if referenced {
                debug!("Keeping referenced backup {:?}", backup.path);
                report.protected.push(backup.path);
                continue;
            }
            match std::fs::remove_file(&backup.path) {
                Ok(()) => report.removed.push(backup.path),
                Err(e) => {
                    warn!("Failed to delete backup {:?}: {}", backup.path, e);
                    report.failed.push(PruneFailure {
                        path: backup.path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Pruned {} backups older than {} days ({} protected, {} failed)",
            report.removed.len(),
            max_age_days,
            report.protected.len(),
            report.failed.len()
        );
        Ok(report)
    }

    fn backup_files(&self) -> Result<Vec<PathBuf>, BackupError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(BackupError::Scan {
                    path: self.dir.clone(),
                    source: e,
                })
            }
        };

        Ok(entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path.extension().and_then(|ext| ext.to_str()) == Some(BACKUP_EXTENSION)
            })
            .collect())
    }
}

/// Recover the source file name from `<name>.<stamp>.<seq>.bak`.
fn original_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(".bak")?;
    let mut parts = stem.rsplitn(3, '.');
    let _sequence = parts.next()?;
    let _stamp = parts.next()?;
    parts.next().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use tempfile::TempDir;

    fn setup() -> (BackupManager, TempDir) {
        let dir = TempDir::new().unwrap();
        let manager = BackupManager::with_dir(dir.path().join("backups"));
        (manager, dir)
    }

    fn age_file(path: &Path, days: i64) {
        let then = Utc::now() - Duration::days(days);
        set_file_mtime(path, FileTime::from_unix_time(then.timestamp(), 0)).unwrap();
    }

    #[test]
    fn test_backup_round_trip_is_byte_identical() {
        let (manager, dir) = setup();
        let file = dir.path().join("hero.json");
        let original: Vec<u8> = vec![0xff, 0x00, 0xfe, b'{', b'}', 0x80];
        std::fs::write(&file, &original).unwrap();

        let backup = manager.create_backup(&file).unwrap();
        std::fs::write(&file, b"{\"title\":\"changed\"}").unwrap();
        manager.restore(&backup, &file).unwrap();

        assert_eq!(std::fs::read(&file).unwrap(), original);
    }

    #[test]
    fn test_backup_of_empty_file() {
        let (manager, dir) = setup();
        let file = dir.path().join("empty.json");
        std::fs::write(&file, b"").unwrap();

        let backup = manager.create_backup(&file).unwrap();
        std::fs::write(&file, b"not empty").unwrap();
        manager.restore(&backup, &file).unwrap();

        assert!(std::fs::read(&file).unwrap().is_empty());
    }

    #[test]
    fn test_backup_names_are_unique_and_embed_source_name() {
        let (manager, dir) = setup();
        let file = dir.path().join("pricing.json");
        std::fs::write(&file, b"{}").unwrap();

        let first = manager.create_backup(&file).unwrap();
        let second = manager.create_backup(&file).unwrap();

        assert_ne!(first, second);
        assert_eq!(original_name(&first).as_deref(), Some("pricing.json"));
        assert!(first
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("pricing.json."));
    }

    #[test]
    fn test_backup_of_missing_source_fails() {
        let (manager, dir) = setup();
        let result = manager.create_backup(&dir.path().join("nope.json"));
        assert!(matches!(result, Err(BackupError::SourceUnreadable { .. })));
        assert!(manager.list().unwrap().is_empty());
    }

    #[test]
    fn test_restore_from_missing_backup_fails() {
        let (manager, dir) = setup();
        let target = dir.path().join("hero.json");
        std::fs::write(&target, b"current").unwrap();

        let result = manager.restore(&dir.path().join("gone.bak"), &target);
        assert!(matches!(result, Err(BackupError::Missing(_))));
        assert_eq!(std::fs::read(&target).unwrap(), b"current");
    }

    #[test]
    fn test_prune_removes_only_old_unprotected_backups() {
        let (manager, dir) = setup();
        let file = dir.path().join("faq.json");
        std::fs::write(&file, b"{}").unwrap();

        let fresh = manager.create_backup(&file).unwrap();
        let old = manager.create_backup(&file).unwrap();
        let old_protected = manager.create_backup(&file).unwrap();
        age_file(&old, 45);
        age_file(&old_protected, 45);

        let protected: HashSet<PathBuf> = [old_protected.clone()].into_iter().collect();
        let report = manager.prune(30, &protected).unwrap();

        assert_eq!(report.removed, vec![old.clone()]);
        assert_eq!(report.protected, vec![old_protected.clone()]);
        assert!(report.failed.is_empty());
        assert!(fresh.exists());
        assert!(!old.exists());
        assert!(old_protected.exists());
    }

    #[test]
    fn test_prune_matches_protected_paths_spelled_differently() {
        let (manager, dir) = setup();
        let file = dir.path().join("faq.json");
        std::fs::write(&file, b"{}").unwrap();
        let backup = manager.create_backup(&file).unwrap();
        age_file(&backup, 45);

        let spelled = dir
            .path()
            .join("backups")
            .join("..")
            .join("backups")
            .join(backup.file_name().unwrap());
        let protected: HashSet<PathBuf> = [spelled].into_iter().collect();
        let report = manager.prune(30, &protected).unwrap();

        assert!(report.removed.is_empty());
        assert_eq!(report.protected, vec![backup.clone()]);
        assert!(backup.exists());
    }

    #[test]
    fn test_prune_without_backup_dir_is_empty() {
        let (manager, _dir) = setup();
        let report = manager.prune(30, &HashSet::new()).unwrap();
        assert!(report.removed.is_empty());
    }

    #[test]
    fn test_list_newest_first() {
        let (manager, dir) = setup();
        let file = dir.path().join("cta.json");
        std::fs::write(&file, b"{}").unwrap();

        let older = manager.create_backup(&file).unwrap();
        let newer = manager.create_backup(&file).unwrap();
        age_file(&older, 2);

        let listed = manager.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].path, newer);
        assert_eq!(listed[1].path, older);
        assert_eq!(listed[0].original_name, "cta.json");
    }
}
