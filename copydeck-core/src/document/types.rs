use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use serde_json::Value;

use super::path::FieldPath;
use super::resolve::{self, ResolveError};
use super::DocumentError;

/// A content file held in memory.
///
/// Wraps the raw JSON `Value` so every field survives a read/modify/write
/// cycle untouched, in its original key order.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentDocument {
    data: Value,
}

impl ContentDocument {
    /// Parse a document from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let data: Value = serde_json::from_str(json)?;
        Ok(Self { data })
    }

    pub fn from_value(data: Value) -> Self {
        Self { data }
    }

    /// Serialize with `indent` spaces per level and a trailing newline.
    pub fn to_json_pretty(&self, indent: usize) -> Result<String, DocumentError> {
        let indent = " ".repeat(indent);
        let mut buf = Vec::new();
        let formatter = PrettyFormatter::with_indent(indent.as_bytes());
        let mut ser = Serializer::with_formatter(&mut buf, formatter);
        self.data.serialize(&mut ser)?;
        // serde_json only ever emits valid UTF-8
        let mut s = String::from_utf8_lossy(&buf).into_owned();
        if !s.ends_with('\n') {
            s.push('\n');
        }
        Ok(s)
    }

    /// Value at `path`, if it resolves.
    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        resolve::get(&self.data, path)
    }

    /// Replace the value at `path`, returning the previous value.
    pub fn set(&mut self, path: &FieldPath, value: Value) -> Result<Value, ResolveError> {
        resolve::set(&mut self.data, path, value)
    }

    pub fn raw(&self) -> &Value {
        &self.data
    }

    pub fn into_value(self) -> Value {
        self.data
    }
}
