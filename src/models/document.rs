//! Documents and stored rows.

use crate::{Error, Result};
use serde_json::{Map, Value};
use std::fmt;

/// A schemaless document: an ordered mapping from field names to JSON values.
///
/// Field order is preserved as inserted (`serde_json` is built with
/// `preserve_order`), so documents serialize back in the order callers wrote
/// them.
pub type Document = Map<String, Value>;

/// Name of the logical primary-key field carried inside documents.
pub const ID_FIELD: &str = "id";

/// Physical primary key of a stored row.
///
/// Assigned by the backing store and only used to target updates and
/// deletes. Collections never hand it out to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowKey(i64);

impl RowKey {
    /// Wraps a raw key.
    #[must_use]
    pub const fn new(key: i64) -> Self {
        Self(key)
    }

    /// Returns the raw key.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored row: physical key plus document.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Physical key.
    pub key: RowKey,
    /// Stored document.
    pub doc: Document,
}

impl Row {
    /// Creates a row.
    #[must_use]
    pub const fn new(key: RowKey, doc: Document) -> Self {
        Self { key, doc }
    }
}

/// Converts a JSON value into a document.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the value is not a JSON object.
pub fn into_document(value: Value) -> Result<Document> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(Error::InvalidInput(format!(
            "expected a document (JSON object), got {}",
            kind_of(&other)
        ))),
    }
}

/// Returns the logical id of a document, if it carries a string `id`.
#[must_use]
pub fn logical_id(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

pub(crate) const fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_into_document_accepts_objects() {
        let doc = into_document(json!({"id": "a", "n": 1})).unwrap();
        assert_eq!(doc.len(), 2);
        assert_eq!(logical_id(&doc), Some("a"));
    }

    #[test]
    fn test_into_document_rejects_scalars() {
        let err = into_document(json!([1, 2])).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(msg) if msg.contains("array")));
    }

    #[test]
    fn test_logical_id_ignores_non_strings() {
        let doc = into_document(json!({"id": 7})).unwrap();
        assert_eq!(logical_id(&doc), None);
    }

    #[test]
    fn test_field_order_preserved() {
        let doc = into_document(json!({"z": 1, "a": 2, "m": 3})).unwrap();
        let keys: Vec<&str> = doc.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_row_key_roundtrip() {
        let key = RowKey::new(42);
        assert_eq!(key.get(), 42);
        assert_eq!(key.to_string(), "42");
    }
}
