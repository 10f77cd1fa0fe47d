use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::approved::ApprovedChange;
use crate::config::PipelineConfig;
use crate::document::{read_document, write_document_atomic, ContentDocument, FieldPath};
use crate::history::{ChangeLog, FieldChange};

/// A content file that was rewritten.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedFile {
    pub file: String,
    pub path: PathBuf,
    pub section: String,
    pub entry_id: String,
    pub backup_path: String,
    /// Field paths that were replaced, in application order.
    pub fields: Vec<String>,
}

/// A change, or a whole file, that could not be applied.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedChange {
    pub file: String,
    /// `None` when the whole file failed.
    pub field: Option<String>,
    pub section: String,
    pub reason: String,
}

/// Per-file outcome of a batch.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub successful: Vec<AppliedFile>,
    pub failed: Vec<FailedChange>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Sections with at least one failed change.
    pub fn failed_sections(&self) -> BTreeSet<String> {
        self.failed.iter().map(|f| f.section.clone()).collect()
    }
}

/// Applies approved changes file by file.
///
/// Each file is read once, every resolvable change is applied in memory,
/// and the file is written once. The change log entry (and so the backup)
/// is created before that write; if it cannot be created the file is left
/// untouched.
pub struct BatchMutator<'a> {
    config: &'a PipelineConfig,
    log: &'a mut ChangeLog,
}

impl<'a> BatchMutator<'a> {
    pub fn new(config: &'a PipelineConfig, log: &'a mut ChangeLog) -> Self {
        Self { config, log }
    }

    pub fn apply(&mut self, changes: &[ApprovedChange]) -> BatchReport {
        let mut report = BatchReport::default();

        for (file, file_changes) in group_by_file(changes) {
            self.apply_file(file, &file_changes, &mut report);
        }

        info!(
            "Batch complete: {} files written, {} failures",
            report.successful.len(),
            report.failed.len()
        );
        report
    }

    fn apply_file(&mut self, file: &str, changes: &[&ApprovedChange], report: &mut BatchReport) {
        let path = self.config.content_path(file);
        let mut doc = match read_document(&path) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Skipping {}: {}", file, e);
                fail_file(report, file, changes, e.to_string());
                return;
            }
        };

        let mut applied: Vec<(&ApprovedChange, FieldChange)> = Vec::new();
        for &change in changes {
            match self.apply_field(&mut doc, change) {
                Ok(Some(field_change)) => applied.push((change, field_change)),
                Ok(None) => {
                    debug!("{} in {} already holds the improved text", change.field, file);
                }
                Err(reason) => {
                    warn!("Change to {} in {} failed: {}", change.field, file, reason);
                    report.failed.push(FailedChange {
                        file: file.to_string(),
                        field: Some(change.field.clone()),
                        section: change.section_name(),
                        reason,
                    });
                }
            }
        }

        if applied.is_empty() {
            debug!("No change resolved in {}, leaving it untouched", file);
            return;
        }

        let sections: Vec<String> = applied
            .iter()
            .map(|(change, _)| change.section_name())
            .fold(Vec::new(), |mut acc, section| {
                if !acc.contains(&section) {
                    acc.push(section);
                }
                acc
            });
        let applied_changes: Vec<&ApprovedChange> = applied.iter().map(|(c, _)| *c).collect();
        let field_changes: Vec<FieldChange> = applied.into_iter().map(|(_, fc)| fc).collect();
        let fields: Vec<String> = field_changes.iter().map(|fc| fc.field.clone()).collect();

        let mut metadata = Map::new();
        metadata.insert("file".to_string(), json!(file));
        if sections.len() > 1 {
            metadata.insert("sections".to_string(), json!(sections));
        }

        let entry = match self.log.record(&sections[0], &path, field_changes, metadata) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Not writing {}: {}", file, e);
                fail_file(
                    report,
                    file,
                    &applied_changes,
                    format!("no backup, write refused: {}", e),
                );
                return;
            }
        };

        if let Err(e) = write_document_atomic(&doc, &path, self.config.json_indent) {
            warn!("Failed to write {}: {}", file, e);
            if let Err(retract_err) = self.log.retract(&entry.id) {
                warn!("Could not retract change {}: {}", entry.id, retract_err);
            }
            fail_file(report, file, &applied_changes, e.to_string());
            return;
        }

        info!("Applied {} changes to {}", fields.len(), file);
        report.successful.push(AppliedFile {
            file: file.to_string(),
            path,
            section: entry.section,
            entry_id: entry.id,
            backup_path: entry.backup_path,
            fields,
        });
    }

    fn apply_field(
        &self,
        doc: &mut ContentDocument,
        change: &ApprovedChange,
    ) -> Result<Option<FieldChange>, String> {
        let path = FieldPath::parse(&change.field).map_err(|e| e.to_string())?;

        if let Some(current) = doc.get(&path) {
            if current.as_str() == Some(change.improved.as_str()) {
                return Ok(None);
            }
            if current.as_str() != Some(change.original.as_str()) {
                if self.config.policy.require_original_match {
                    return Err(format!(
                        "current value {} does not match the reviewed original",
                        current
                    ));
                }
                warn!(
                    "{}: current value {} differs from reviewed original, applying anyway",
                    change.field, current
                );
            }
        }

        let after = Value::String(change.improved.clone());
        let before = doc.set(&path, after.clone()).map_err(|e| e.to_string())?;
        Ok(Some(FieldChange {
            field: change.field.clone(),
            before,
            after,
        }))
    }
}

/// Group changes by file, in first-appearance order, keeping per-file order.
fn group_by_file(changes: &[ApprovedChange]) -> Vec<(&str, Vec<&ApprovedChange>)> {
    let mut groups: Vec<(&str, Vec<&ApprovedChange>)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for change in changes {
        let slot = *index.entry(change.file.as_str()).or_insert_with(|| {
            groups.push((change.file.as_str(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(change);
    }
    groups
}

/// Record a whole-file failure once per section touching the file.
fn fail_file(report: &mut BatchReport, file: &str, changes: &[&ApprovedChange], reason: String) {
    let sections: BTreeSet<String> = changes.iter().map(|c| c.section_name()).collect();
    for section in sections {
        report.failed.push(FailedChange {
            file: file.to_string(),
            field: None,
            section,
            reason: reason.clone(),
        });
    }
}
