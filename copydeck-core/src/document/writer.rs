use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::info;

use super::types::ContentDocument;
use super::DocumentError;

/// Write a content document to disk atomically.
///
/// Uses a temporary file in the same directory as `target_path`, writes the
/// JSON content, then atomically renames the temp file over the target. An
/// interrupted or failed write never leaves a partial file behind.
pub fn write_document_atomic(
    doc: &ContentDocument,
    target_path: &Path,
    indent: usize,
) -> Result<(), DocumentError> {
    let json = doc.to_json_pretty(indent)?;
    write_bytes_atomic(json.as_bytes(), target_path)?;

    info!("Wrote content document to {:?}", target_path);
    Ok(())
}

/// Serialize any value as pretty JSON and write it atomically.
///
/// Used for the pipeline's own state files (change log, section status,
/// review-cycle files), which are always rewritten whole.
pub fn write_json_atomic<T: Serialize + ?Sized>(
    value: &T,
    target_path: &Path,
) -> Result<(), DocumentError> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    write_bytes_atomic(json.as_bytes(), target_path)
}

/// Same-directory temp file + rename.
pub(crate) fn write_bytes_atomic(bytes: &[u8], target_path: &Path) -> Result<(), DocumentError> {
    let write_err = |source: std::io::Error| DocumentError::Write {
        path: target_path.to_path_buf(),
        source,
    };

    let parent = match target_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    // Ensure the parent directory exists
    std::fs::create_dir_all(parent).map_err(write_err)?;

    // Create temp file in the same directory (same filesystem for atomic rename)
    let mut temp = NamedTempFile::new_in(parent).map_err(write_err)?;
    temp.write_all(bytes).map_err(write_err)?;
    temp.flush().map_err(write_err)?;
    temp.as_file().sync_all().map_err(write_err)?;

    // Atomic rename
    temp.persist(target_path).map_err(|e| write_err(e.error))?;
    Ok(())
}
