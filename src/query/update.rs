//! Update applier.
//!
//! An update is a JSON object of operators, each mapping dotted field paths to
//! values. Operators run in the order given:
//!
//! - `$set` writes the value at the path.
//! - `$inc` adds a numeric delta to the current number (absent counts as 0).
//! - `$push` appends to the array at the path, starting a new array if needed.
//! - `$pull` removes every element equal to the value from the array at the
//!   path; a missing or non-array field is left alone.
//!
//! Any other top-level key is ignored. Callers must not rely on unknown
//! operators raising.

use super::path::{get_path, set_path};
use super::value::values_equal;
use crate::models::{Document, kind_of};
use crate::{Error, Result};
use serde_json::{Number, Value};

/// A parsed update expression.
#[derive(Debug, Clone, Default)]
pub struct Update {
    ops: Vec<UpdateOp>,
}

/// One recognized operator with its field assignments.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// `$set`
    Set(Vec<(String, Value)>),
    /// `$inc`
    Inc(Vec<(String, Number)>),
    /// `$push`
    Push(Vec<(String, Value)>),
    /// `$pull`
    Pull(Vec<(String, Value)>),
}

impl Update {
    /// Parses an update expression.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the update or an operator payload is
    /// not an object, or an `$inc` delta is not a number.
    pub fn parse(value: &Value) -> Result<Self> {
        let map = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            other => {
                return Err(Error::InvalidInput(format!(
                    "update must be an object, got {}",
                    kind_of(other)
                )));
            },
        };

        let mut ops = Vec::with_capacity(map.len());
        for (op, payload) in map {
            let parsed = match op.as_str() {
                "$set" => UpdateOp::Set(assignments(op, payload)?),
                "$push" => UpdateOp::Push(assignments(op, payload)?),
                "$pull" => UpdateOp::Pull(assignments(op, payload)?),
                "$inc" => UpdateOp::Inc(
                    assignments(op, payload)?
                        .into_iter()
                        .map(|(field, delta)| match delta {
                            Value::Number(n) => Ok((field, n)),
                            other => Err(Error::InvalidInput(format!(
                                "$inc delta for '{field}' must be a number, got {}",
                                kind_of(&other)
                            ))),
                        })
                        .collect::<Result<Vec<_>>>()?,
                ),
                unknown => {
                    tracing::debug!(operator = unknown, "ignoring unsupported update operator");
                    continue;
                },
            };
            ops.push(parsed);
        }

        Ok(Self { ops })
    }

    /// Returns the recognized operators in application order.
    #[must_use]
    pub fn ops(&self) -> &[UpdateOp] {
        &self.ops
    }

    /// Returns true if no recognized operator is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Applies the update to a copy of `doc`.
    #[must_use]
    pub fn apply(&self, doc: &Document) -> Document {
        let mut next = doc.clone();
        for op in &self.ops {
            op.apply_to(&mut next);
        }
        next
    }
}

impl UpdateOp {
    fn apply_to(&self, doc: &mut Document) {
        match self {
            Self::Set(fields) => {
                for (field, value) in fields {
                    set_path(doc, field, value.clone());
                }
            },
            Self::Inc(fields) => {
                for (field, delta) in fields {
                    let current = get_path(doc, field).and_then(|v| match v {
                        Value::Number(n) => Some(n),
                        _ => None,
                    });
                    let sum = add_numbers(current, delta);
                    set_path(doc, field, Value::Number(sum));
                }
            },
            Self::Push(fields) => {
                for (field, value) in fields {
                    let mut items = match get_path(doc, field) {
                        Some(Value::Array(items)) => items.clone(),
                        _ => Vec::new(),
                    };
                    items.push(value.clone());
                    set_path(doc, field, Value::Array(items));
                }
            },
            Self::Pull(fields) => {
                for (field, value) in fields {
                    let Some(Value::Array(items)) = get_path(doc, field) else {
                        continue;
                    };
                    let kept: Vec<Value> = items
                        .iter()
                        .filter(|item| !values_equal(item, value))
                        .cloned()
                        .collect();
                    set_path(doc, field, Value::Array(kept));
                }
            },
        }
    }
}

fn assignments(op: &str, payload: &Value) -> Result<Vec<(String, Value)>> {
    match payload {
        Value::Object(fields) => Ok(fields
            .iter()
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect()),
        other => Err(Error::InvalidInput(format!(
            "{op} expects an object of field paths, got {}",
            kind_of(other)
        ))),
    }
}

/// Adds `delta` to `current` (absent or non-numeric counts as zero).
///
/// Stays in integers when both sides are integers and the sum fits, otherwise
/// falls back to floating point.
fn add_numbers(current: Option<&Number>, delta: &Number) -> Number {
    let Some(current) = current else {
        return delta.clone();
    };
    if let (Some(a), Some(b)) = (current.as_i64(), delta.as_i64()) {
        if let Some(sum) = a.checked_add(b) {
            return Number::from(sum);
        }
    }
    let sum = current.as_f64().unwrap_or(0.0) + delta.as_f64().unwrap_or(0.0);
    Number::from_f64(sum).unwrap_or_else(|| current.clone())
}

/// Parses `update` and applies it to a copy of `doc`.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the update is malformed.
pub fn apply(doc: &Document, update: &Value) -> Result<Document> {
    Ok(Update::parse(update)?.apply(doc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::into_document;
    use serde_json::json;

    fn post() -> Document {
        into_document(json!({
            "id": "p1",
            "likes": 2,
            "comments": [{"id": "c1"}],
            "tags": ["rust", "db", "rust"],
            "stats": {"views": 10}
        }))
        .unwrap()
    }

    #[test]
    fn test_set_top_level_and_nested() {
        let next = apply(&post(), &json!({"$set": {"title": "Hi", "stats.shares": 1}})).unwrap();
        assert_eq!(next.get("title"), Some(&json!("Hi")));
        assert_eq!(next.get("stats"), Some(&json!({"views": 10, "shares": 1})));
    }

    #[test]
    fn test_apply_does_not_mutate_input() {
        let doc = post();
        let _ = apply(&doc, &json!({"$set": {"likes": 99}})).unwrap();
        assert_eq!(doc.get("likes"), Some(&json!(2)));
    }

    #[test]
    fn test_set_is_idempotent() {
        let update = Update::parse(&json!({"$set": {"a.b": 1, "likes": 5}})).unwrap();
        let once = update.apply(&post());
        let twice = update.apply(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_inc_existing_and_absent() {
        let next = apply(&post(), &json!({"$inc": {"likes": 3, "stats.views": -1, "shares": 1}}))
            .unwrap();
        assert_eq!(next.get("likes"), Some(&json!(5)));
        assert_eq!(next.get("stats"), Some(&json!({"views": 9})));
        assert_eq!(next.get("shares"), Some(&json!(1)));
    }

    #[test]
    fn test_inc_mixed_float() {
        let next = apply(&post(), &json!({"$inc": {"likes": 0.5}})).unwrap();
        assert_eq!(next.get("likes"), Some(&json!(2.5)));
    }

    #[test]
    fn test_inc_rejects_non_numeric_delta() {
        let err = Update::parse(&json!({"$inc": {"likes": "1"}})).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(msg) if msg.contains("likes")));
    }

    #[test]
    fn test_push_appends_or_initialises() {
        let next = apply(
            &post(),
            &json!({"$push": {"comments": {"id": "c2"}, "likes": "x", "fresh": 1}}),
        )
        .unwrap();
        assert_eq!(
            next.get("comments"),
            Some(&json!([{"id": "c1"}, {"id": "c2"}]))
        );
        assert_eq!(next.get("likes"), Some(&json!(["x"])));
        assert_eq!(next.get("fresh"), Some(&json!([1])));
    }

    #[test]
    fn test_pull_removes_all_equal_elements() {
        let next = apply(&post(), &json!({"$pull": {"tags": "rust"}})).unwrap();
        assert_eq!(next.get("tags"), Some(&json!(["db"])));
    }

    #[test]
    fn test_pull_on_missing_or_scalar_is_noop() {
        let doc = post();
        let next = apply(&doc, &json!({"$pull": {"nothing": 1, "likes": 2}})).unwrap();
        assert_eq!(next, doc);
    }

    #[test]
    fn test_unknown_operators_are_ignored() {
        let update = Update::parse(&json!({"$rename": {"a": "b"}, "$set": {"x": 1}})).unwrap();
        assert_eq!(update.ops().len(), 1);
        let next = update.apply(&post());
        assert_eq!(next.get("x"), Some(&json!(1)));
        assert!(next.contains_key("likes"));
    }

    #[test]
    fn test_operators_apply_in_order() {
        let next = apply(
            &post(),
            &json!({"$set": {"likes": 10}, "$inc": {"likes": 1}}),
        )
        .unwrap();
        assert_eq!(next.get("likes"), Some(&json!(11)));
    }
}
