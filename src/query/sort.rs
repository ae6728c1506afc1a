//! Sort engine.
//!
//! Keys are applied from last to first, each as a stable sort, so the first
//! declared key dominates and ties fall through to later keys and finally to
//! the incoming order.
//!
//! Values order as: null, then scalars (booleans, numbers, strings; each
//! compared natively), then arrays and objects compared by their JSON text.

use super::path::get_path_or_null;
use super::value::compare_numbers;
use crate::models::{Document, SortDirection, kind_of};
use crate::{Error, Result};
use serde_json::{Number, Value};
use std::cmp::Ordering;

/// An ordered list of `(path, direction)` sort keys.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SortSpec {
    keys: Vec<(String, SortDirection)>,
}

impl SortSpec {
    /// Creates an empty spec.
    #[must_use]
    pub const fn new() -> Self {
        Self { keys: Vec::new() }
    }

    /// Appends a key; earlier keys are more significant.
    #[must_use]
    pub fn then(mut self, path: impl Into<String>, direction: SortDirection) -> Self {
        self.push(path, direction);
        self
    }

    /// Appends a key in place.
    pub fn push(&mut self, path: impl Into<String>, direction: SortDirection) {
        self.keys.push((path.into(), direction));
    }

    /// Parses a `{"path": 1 | -1, ...}` object, preserving key order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the spec is not an object or a
    /// direction is not a number.
    pub fn parse(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(Error::InvalidInput(format!(
                "sort spec must be an object, got {}",
                kind_of(value)
            )));
        };

        let mut spec = Self::new();
        for (path, direction) in map {
            let sign = direction.as_f64().ok_or_else(|| {
                Error::InvalidInput(format!(
                    "sort direction for '{path}' must be a number, got {}",
                    kind_of(direction)
                ))
            })?;
            let direction = if sign < 0.0 {
                SortDirection::Descending
            } else {
                SortDirection::Ascending
            };
            spec.push(path.clone(), direction);
        }
        Ok(spec)
    }

    /// Returns the keys in declaration order.
    #[must_use]
    pub fn keys(&self) -> &[(String, SortDirection)] {
        &self.keys
    }

    /// Returns true if there are no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Sorts documents in place.
    pub fn apply(&self, docs: &mut [Document]) {
        for (path, direction) in self.keys.iter().rev() {
            sort_by_path(docs, path, *direction);
        }
    }
}

/// Stable single-key sort.
pub fn sort_by_path(docs: &mut [Document], path: &str, direction: SortDirection) {
    docs.sort_by(|a, b| {
        let ordering = compare_values(get_path_or_null(a, path), get_path_or_null(b, path));
        match direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    });
}

/// Total order over JSON values used for sorting.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    SortKey::of(a).cmp(&SortKey::of(b))
}

#[derive(Debug)]
enum SortKey<'a> {
    Null,
    Bool(bool),
    Number(&'a Number),
    String(&'a str),
    Composite(String),
}

impl<'a> SortKey<'a> {
    fn of(value: &'a Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::String(s),
            composite => Self::Composite(composite.to_string()),
        }
    }

    const fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Number(_) => 2,
            Self::String(_) => 3,
            Self::Composite(_) => 4,
        }
    }
}

impl Ord for SortKey<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Number(a), Self::Number(b)) => compare_numbers(a, b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Composite(a), Self::Composite(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for SortKey<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SortKey<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortKey<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::into_document;
    use serde_json::json;

    fn docs(values: Vec<Value>) -> Vec<Document> {
        values
            .into_iter()
            .map(|v| into_document(v).unwrap())
            .collect()
    }

    fn ids(docs: &[Document]) -> Vec<&str> {
        docs.iter()
            .map(|d| d.get("id").and_then(Value::as_str).unwrap_or(""))
            .collect()
    }

    #[test]
    fn test_nulls_first_ascending_last_descending() {
        let mut items = docs(vec![
            json!({"id": "a", "created_at": null}),
            json!({"id": "b", "created_at": "2024-01-01"}),
        ]);
        SortSpec::new()
            .then("created_at", SortDirection::Descending)
            .apply(&mut items);
        assert_eq!(ids(&items), vec!["b", "a"]);

        SortSpec::new()
            .then("created_at", SortDirection::Ascending)
            .apply(&mut items);
        assert_eq!(ids(&items), vec!["a", "b"]);
    }

    #[test]
    fn test_missing_field_sorts_as_null() {
        let mut items = docs(vec![json!({"id": "x", "n": 1}), json!({"id": "y"})]);
        sort_by_path(&mut items, "n", SortDirection::Ascending);
        assert_eq!(ids(&items), vec!["y", "x"]);
    }

    #[test]
    fn test_numbers_sort_numerically() {
        let mut items = docs(vec![
            json!({"id": "a", "n": 10}),
            json!({"id": "b", "n": 9.5}),
            json!({"id": "c", "n": -2}),
        ]);
        sort_by_path(&mut items, "n", SortDirection::Ascending);
        assert_eq!(ids(&items), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_type_ranks() {
        let mut items = docs(vec![
            json!({"id": "obj", "v": {"k": 1}}),
            json!({"id": "str", "v": "a"}),
            json!({"id": "num", "v": 1}),
            json!({"id": "arr", "v": [1]}),
            json!({"id": "bool", "v": false}),
            json!({"id": "null", "v": null}),
        ]);
        sort_by_path(&mut items, "v", SortDirection::Ascending);
        assert_eq!(ids(&items), vec!["null", "bool", "num", "str", "arr", "obj"]);
    }

    #[test]
    fn test_first_key_dominates_and_ties_are_stable() {
        let mut items = docs(vec![
            json!({"id": "1", "group": "b", "rank": 2}),
            json!({"id": "2", "group": "a", "rank": 2}),
            json!({"id": "3", "group": "b", "rank": 1}),
            json!({"id": "4", "group": "a", "rank": 2}),
        ]);
        SortSpec::new()
            .then("group", SortDirection::Ascending)
            .then("rank", SortDirection::Descending)
            .apply(&mut items);
        assert_eq!(ids(&items), vec!["2", "4", "1", "3"]);
    }

    #[test]
    fn test_descending_keeps_ties_in_input_order() {
        let mut items = docs(vec![
            json!({"id": "first", "n": 1}),
            json!({"id": "second", "n": 1}),
        ]);
        sort_by_path(&mut items, "n", SortDirection::Descending);
        assert_eq!(ids(&items), vec!["first", "second"]);
    }

    #[test]
    fn test_parse_preserves_declaration_order() {
        let spec = SortSpec::parse(&json!({"created_at": -1, "id": 1})).unwrap();
        assert_eq!(
            spec.keys(),
            &[
                ("created_at".to_string(), SortDirection::Descending),
                ("id".to_string(), SortDirection::Ascending),
            ]
        );
    }

    #[test]
    fn test_parse_rejects_non_numeric_direction() {
        assert!(matches!(
            SortSpec::parse(&json!({"created_at": "desc"})),
            Err(Error::InvalidInput(_))
        ));
    }
}
