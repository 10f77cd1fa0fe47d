use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use super::ApprovedChangesError;
use crate::document::write_json_atomic;

/// One reviewed replacement of a field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovedChange {
    /// Content file, relative to the content directory unless absolute.
    pub file: String,
    /// Field path inside the file, e.g. `plans[0].name`.
    pub field: String,
    pub original: String,
    pub improved: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

impl ApprovedChange {
    /// Section this change belongs to; the file stem when not tagged.
    pub fn section_name(&self) -> String {
        if let Some(section) = &self.section {
            return section.clone();
        }
        Path::new(&self.file)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file.clone())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ApprovedChangesFile {
    List(Vec<ApprovedChange>),
    Wrapped { changes: Vec<ApprovedChange> },
}

/// Read an approved-changes file.
///
/// Accepts a bare array of changes or an object with a `changes` array.
pub fn load_approved_changes(path: &Path) -> Result<Vec<ApprovedChange>, ApprovedChangesError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApprovedChangesError::Missing(path.to_path_buf()))
        }
        Err(e) => {
            return Err(ApprovedChangesError::Read {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    let file: ApprovedChangesFile =
        serde_json::from_str(&content).map_err(|e| ApprovedChangesError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
    let changes = match file {
        ApprovedChangesFile::List(changes) | ApprovedChangesFile::Wrapped { changes } => changes,
    };

    debug!("Loaded {} approved changes from {:?}", changes.len(), path);
    Ok(changes)
}

/// Write `changes` as a JSON array, replacing the file atomically.
pub fn save_approved_changes(
    path: &Path,
    changes: &[ApprovedChange],
) -> Result<(), ApprovedChangesError> {
    write_json_atomic(changes, path)?;
    debug!("Saved {} approved changes to {:?}", changes.len(), path);
    Ok(())
}
