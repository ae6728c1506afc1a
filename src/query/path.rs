//! Dotted field paths over documents.
//!
//! `a.b.c` walks nested objects. Reads treat any missing or non-object
//! intermediate as absent; writes create (or overwrite with) empty objects
//! along the way.

use crate::models::Document;
use serde_json::{Map, Value};

static NULL: Value = Value::Null;

/// Resolves a dotted path, returning `None` when any segment is missing.
#[must_use]
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = doc.get(first)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Resolves a dotted path, treating absence as JSON `null`.
#[must_use]
pub fn get_path_or_null<'a>(doc: &'a Document, path: &str) -> &'a Value {
    get_path(doc, path).unwrap_or(&NULL)
}

/// Writes `value` at a dotted path.
///
/// Missing intermediate levels are created as empty objects; a non-object
/// found at an intermediate level is replaced by an empty object.
pub fn set_path(doc: &mut Document, path: &str, value: Value) {
    let mut parts: Vec<&str> = path.split('.').collect();
    let Some(last) = parts.pop() else {
        return;
    };

    let mut current = doc;
    for part in parts {
        let slot = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(next) = slot else {
            return;
        };
        current = next;
    }
    current.insert(last.to_string(), value);
}

/// Removes the value at a dotted path, returning it if present.
pub fn remove_path(doc: &mut Document, path: &str) -> Option<Value> {
    let mut parts: Vec<&str> = path.split('.').collect();
    let last = parts.pop()?;

    let mut current = doc;
    for part in parts {
        current = current.get_mut(part)?.as_object_mut()?;
    }
    current.shift_remove(last)
}
