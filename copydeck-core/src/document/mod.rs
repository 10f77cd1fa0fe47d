//! Content documents and field-path addressing.
//!
//! Content files are arbitrary nested JSON documents. A [`FieldPath`] such as
//! `plans[1].features[0]` is parsed once into typed segments and then walked
//! against a document by the functions in [`resolve`].

pub mod path;
pub mod reader;
pub mod resolve;
pub mod types;
pub mod writer;

use std::path::PathBuf;

pub use path::{FieldPath, PathError, Segment};
pub use reader::read_document;
pub use resolve::ResolveError;
pub use types::ContentDocument;
pub use writer::{write_document_atomic, write_json_atomic};

/// Errors raised while reading or writing JSON files.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to serialize JSON: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}
