use std::path::Path;
use tracing::debug;

use super::types::ContentDocument;
use super::DocumentError;

/// Read a content document from a JSON file on disk.
pub fn read_document(path: &Path) -> Result<ContentDocument, DocumentError> {
    let content = std::fs::read_to_string(path).map_err(|source| DocumentError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let doc = ContentDocument::from_json(&content).map_err(|source| DocumentError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    debug!("Read content document {:?} ({} bytes)", path, content.len());
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_missing_file_is_read_error() {
        let dir = TempDir::new().unwrap();
        let result = read_document(&dir.path().join("missing.json"));
        assert!(matches!(result, Err(DocumentError::Read { .. })));
    }

    #[test]
    fn test_read_invalid_json_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{\"title\": ").unwrap();
        let result = read_document(&path);
        assert!(matches!(result, Err(DocumentError::Parse { .. })));
    }
}
