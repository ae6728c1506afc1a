//! Expression evaluator for aggregation stages.
//!
//! Grammar (as JSON):
//!
//! ```text
//! expr := "$$ROOT"                      the whole document
//!       | "$field.path"                 value at a dotted path (null if absent)
//!       | {"$cond": [expr, expr, expr]} if / then / else
//!       | {"$cond": {"if": expr, "then": expr, "else": expr}}
//!       | {"$eq": [expr, expr]}         equality of evaluated operands
//!       | any other JSON value          literal
//! ```

use super::path::get_path_or_null;
use super::value::{is_truthy, values_equal};
use crate::models::{Document, kind_of};
use crate::{Error, Result};
use serde_json::Value;

const ROOT: &str = "$$ROOT";

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `$$ROOT`
    Root,
    /// `"$path"`
    Field(String),
    /// A literal value.
    Literal(Value),
    /// `$cond`
    Cond {
        /// Condition, judged by truthiness.
        condition: Box<Expr>,
        /// Result when the condition holds.
        then: Box<Expr>,
        /// Result otherwise.
        otherwise: Box<Expr>,
    },
    /// `$eq`
    Eq(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Parses an expression.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `$cond` or `$eq` have the wrong
    /// shape or arity.
    pub fn parse(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) if s == ROOT => Ok(Self::Root),
            Value::String(s) if s.starts_with('$') => Ok(Self::Field(s[1..].to_string())),
            Value::Object(map) => {
                if let Some(args) = map.get("$cond") {
                    return Self::parse_cond(args);
                }
                if let Some(args) = map.get("$eq") {
                    let [lhs, rhs] = operands::<2>("$eq", args)?;
                    return Ok(Self::Eq(Box::new(lhs), Box::new(rhs)));
                }
                Ok(Self::Literal(value.clone()))
            },
            other => Ok(Self::Literal(other.clone())),
        }
    }

    fn parse_cond(args: &Value) -> Result<Self> {
        let [condition, then, otherwise] = match args {
            Value::Object(branches) => {
                let branch = |name: &str| {
                    branches.get(name).map_or_else(
                        || {
                            Err(Error::InvalidInput(format!(
                                "$cond object is missing '{name}'"
                            )))
                        },
                        Self::parse,
                    )
                };
                [branch("if")?, branch("then")?, branch("else")?]
            },
            other => operands::<3>("$cond", other)?,
        };
        Ok(Self::Cond {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    /// Evaluates the expression against a document.
    #[must_use]
    pub fn eval(&self, doc: &Document) -> Value {
        match self {
            Self::Root => Value::Object(doc.clone()),
            Self::Field(path) => get_path_or_null(doc, path).clone(),
            Self::Literal(value) => value.clone(),
            Self::Cond {
                condition,
                then,
                otherwise,
            } => {
                if is_truthy(&condition.eval(doc)) {
                    then.eval(doc)
                } else {
                    otherwise.eval(doc)
                }
            },
            Self::Eq(lhs, rhs) => Value::Bool(values_equal(&lhs.eval(doc), &rhs.eval(doc))),
        }
    }
}

fn operands<const N: usize>(op: &str, args: &Value) -> Result<[Expr; N]> {
    let Value::Array(items) = args else {
        return Err(Error::InvalidInput(format!(
            "{op} expects an array of {N} operands, got {}",
            kind_of(args)
        )));
    };
    let parsed = items.iter().map(Expr::parse).collect::<Result<Vec<_>>>()?;
    let count = parsed.len();
    parsed.try_into().map_err(|_| {
        Error::InvalidInput(format!("{op} expects {N} operands, got {count}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::into_document;
    use serde_json::json;

    fn message() -> Document {
        into_document(json!({
            "id": "m1",
            "sender_id": "a1",
            "receiver_id": "a2",
            "meta": {"read": false}
        }))
        .unwrap()
    }

    fn eval(expr: Value) -> Value {
        Expr::parse(&expr).unwrap().eval(&message())
    }

    #[test]
    fn test_field_references() {
        assert_eq!(eval(json!("$sender_id")), json!("a1"));
        assert_eq!(eval(json!("$meta.read")), json!(false));
        assert_eq!(eval(json!("$missing")), json!(null));
    }

    #[test]
    fn test_root_and_literals() {
        assert_eq!(eval(json!("$$ROOT")), Value::Object(message()));
        assert_eq!(eval(json!("plain")), json!("plain"));
        assert_eq!(eval(json!(5)), json!(5));
        assert_eq!(eval(json!({"a": "$sender_id"})), json!({"a": "$sender_id"}));
    }

    #[test]
    fn test_eq() {
        assert_eq!(eval(json!({"$eq": ["$sender_id", "a1"]})), json!(true));
        assert_eq!(eval(json!({"$eq": ["$sender_id", "$receiver_id"]})), json!(false));
    }

    #[test]
    fn test_cond_other_participant() {
        let expr = json!({"$cond": [{"$eq": ["$sender_id", "a1"]}, "$receiver_id", "$sender_id"]});
        assert_eq!(eval(expr), json!("a2"));

        let expr = json!({"$cond": [{"$eq": ["$sender_id", "a2"]}, "$receiver_id", "$sender_id"]});
        assert_eq!(eval(expr), json!("a1"));
    }

    #[test]
    fn test_cond_object_form_and_truthiness() {
        let expr = json!({"$cond": {"if": "$meta.read", "then": "seen", "else": "unseen"}});
        assert_eq!(eval(expr), json!("unseen"));
    }

    #[test]
    fn test_arity_errors() {
        assert!(matches!(
            Expr::parse(&json!({"$cond": [true, 1]})),
            Err(Error::InvalidInput(msg)) if msg.contains("3 operands")
        ));
        assert!(matches!(
            Expr::parse(&json!({"$eq": "x"})),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            Expr::parse(&json!({"$cond": {"if": true, "then": 1}})),
            Err(Error::InvalidInput(msg)) if msg.contains("else")
        ));
    }
}
