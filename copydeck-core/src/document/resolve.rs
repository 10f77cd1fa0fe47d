//! Read and replace leaves of a JSON document by [`FieldPath`].
//!
//! Both operations walk every segment but the last to find the parent
//! container. Nothing is created along the way: a missing key, a non-array
//! under an indexed segment or an out-of-range index is a failure, and the
//! document is left exactly as it was.

use serde_json::Value;

use super::path::{FieldPath, Segment};

/// Why a path could not be resolved against a document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("'{path}': key '{key}' not found")]
    MissingKey { path: String, key: String },

    #[error("'{path}': cannot read '{key}' from a non-object value")]
    NotAnObject { path: String, key: String },

    #[error("'{path}': '{key}' is not an array")]
    NotAnArray { path: String, key: String },

    #[error("'{path}': index {index} out of range for '{key}' (length {len})")]
    IndexOutOfRange {
        path: String,
        key: String,
        index: usize,
        len: usize,
    },
}

/// Return the value at `path`, or `None` if any segment does not resolve.
pub fn get<'a>(doc: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(doc, |node, segment| match segment {
            Segment::Key(key) => node.as_object()?.get(key),
            Segment::Index(key, index) => node.as_object()?.get(key)?.as_array()?.get(*index),
        })
}

/// Replace the value at `path`, returning the value it replaced.
///
/// The leaf must already exist; this never inserts keys or extends arrays.
#[must_use = "a failed write leaves the document unchanged and must be reported"]
pub fn set(doc: &mut Value, path: &FieldPath, value: Value) -> Result<Value, ResolveError> {
    let rendered = path.to_string();
    let (parents, leaf) = path.split_leaf();

    let mut node = doc;
    for segment in parents {
        node = step_mut(node, segment, &rendered)?;
    }
    let slot = step_mut(node, leaf, &rendered)?;

    Ok(std::mem::replace(slot, value))
}

fn step_mut<'a>(
    node: &'a mut Value,
    segment: &Segment,
    path: &str,
) -> Result<&'a mut Value, ResolveError> {
    let key = segment.key();
    let object = node.as_object_mut().ok_or_else(|| ResolveError::NotAnObject {
        path: path.to_string(),
        key: key.to_string(),
    })?;
    let child = object.get_mut(key).ok_or_else(|| ResolveError::MissingKey {
        path: path.to_string(),
        key: key.to_string(),
    })?;

    match segment {
        Segment::Key(_) => Ok(child),
        Segment::Index(_, index) => {
            let items = child.as_array_mut().ok_or_else(|| ResolveError::NotAnArray {
                path: path.to_string(),
                key: key.to_string(),
            })?;
            let len = items.len();
            items
                .get_mut(*index)
                .ok_or_else(|| ResolveError::IndexOutOfRange {
                    path: path.to_string(),
                    key: key.to_string(),
                    index: *index,
                    len,
                })
        }
    }
}
