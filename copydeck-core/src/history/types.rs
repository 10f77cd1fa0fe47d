use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// One field replaced by a mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    pub field: String,
    /// Value found in the file before the write.
    pub before: Value,
    pub after: Value,
}

/// Audit record for one mutating write of one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLogEntry {
    /// Time-ordered unique id (UUIDv7).
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub section: String,
    pub file_path: String,
    pub backup_path: String,
    pub changes: Vec<FieldChange>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub rolled_back: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_timestamp: Option<DateTime<Utc>>,
}

impl ChangeLogEntry {
    /// Whether this write carried changes for `section`.
    ///
    /// A file edited for several sections at once is logged under the first
    /// of them, with the full list in `metadata.sections`.
    pub fn touches_section(&self, section: &str) -> bool {
        self.section == section
            || self
                .metadata
                .get("sections")
                .and_then(Value::as_array)
                .is_some_and(|sections| sections.iter().any(|s| s.as_str() == Some(section)))
    }
}

/// Aggregate statistics, always derived from the current entry list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeStats {
    pub total_changes: usize,
    pub total_rollbacks: usize,
    pub files_modified: BTreeSet<String>,
    pub last_change: Option<DateTime<Utc>>,
    pub last_rollback: Option<DateTime<Utc>>,
}

impl ChangeStats {
    pub fn from_entries(entries: &[ChangeLogEntry]) -> Self {
        let mut stats = ChangeStats::default();
        for entry in entries {
            stats.total_changes += 1;
            stats.files_modified.insert(entry.file_path.clone());
            stats.last_change = stats.last_change.max(Some(entry.timestamp));
            if entry.rolled_back {
                stats.total_rollbacks += 1;
                stats.last_rollback = stats.last_rollback.max(entry.rollback_timestamp);
            }
        }
        stats
    }
}

/// On-disk shape of [`ChangeStats`]: the file set travels as a plain array.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct StatsSnapshot {
    pub total_changes: usize,
    pub total_rollbacks: usize,
    pub files_modified: Vec<String>,
    pub last_change: Option<DateTime<Utc>>,
    pub last_rollback: Option<DateTime<Utc>>,
}

impl From<&ChangeStats> for StatsSnapshot {
    fn from(stats: &ChangeStats) -> Self {
        Self {
            total_changes: stats.total_changes,
            total_rollbacks: stats.total_rollbacks,
            files_modified: stats.files_modified.iter().cloned().collect(),
            last_change: stats.last_change,
            last_rollback: stats.last_rollback,
        }
    }
}

impl From<StatsSnapshot> for ChangeStats {
    fn from(snapshot: StatsSnapshot) -> Self {
        Self {
            total_changes: snapshot.total_changes,
            total_rollbacks: snapshot.total_rollbacks,
            files_modified: snapshot.files_modified.into_iter().collect(),
            last_change: snapshot.last_change,
            last_rollback: snapshot.last_rollback,
        }
    }
}

/// Result of rolling back a single entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RollbackOutcome {
    Restored {
        entry_id: String,
        file_path: String,
        backup_path: String,
    },
    /// The entry had already been rolled back; nothing was touched.
    AlreadyRolledBack { entry_id: String },
}

/// An entry that could not be rolled back during a bulk rollback.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackFailure {
    pub entry_id: String,
    pub file_path: String,
    pub reason: String,
}

/// Result of rolling back several entries independently.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRollbackReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub restored: Vec<String>,
    pub failures: Vec<RollbackFailure>,
}
