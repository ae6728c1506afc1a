//! Query matcher.
//!
//! A filter is a JSON object whose top-level keys are AND-ed together. Each
//! key is either `$or` (an array of sub-filters, any of which may match) or a
//! dotted field path mapped to an expected value or an operator object.
//!
//! | Form | Matches when |
//! |------|--------------|
//! | `{"f": v}` | `f == v`, or `f` is an array containing `v` |
//! | `{"f": {"$in": [..]}}` | `f` (or any element of array `f`) is in the list |
//! | `{"f": {"$regex": p, "$options": "i"}}` | `p` is found in the string form of `f` |
//! | `{"$or": [f1, f2]}` | any sub-filter matches |
//!
//! Operators other than `$in`, `$regex` and `$options` never match.

use super::path::{get_path_or_null, set_path};
use super::value::{contains_value, string_form, values_equal};
use crate::models::{Document, kind_of};
use crate::{Error, Result};
use regex::{Regex, RegexBuilder};
use serde_json::Value;

/// A parsed filter expression.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    clauses: Vec<Clause>,
}

#[derive(Debug, Clone)]
enum Clause {
    Or(Vec<Filter>),
    Field { path: String, condition: Condition },
}

#[derive(Debug, Clone)]
enum Condition {
    Equals(Value),
    Operators(Vec<FieldOperator>),
}

/// A single operator inside an operator object.
#[derive(Debug, Clone)]
enum FieldOperator {
    In(Vec<Value>),
    /// `None` when the pattern failed to compile; such a regex never matches.
    Regex(Option<Regex>),
    Unsupported(String),
}

impl Filter {
    /// A filter that matches every document.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            clauses: Vec::new(),
        }
    }

    /// Parses a filter expression.
    ///
    /// `null` parses to the match-everything filter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the filter is not an object or
    /// `$or` is not an array.
    pub fn parse(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::all()),
            Value::Object(map) => {
                let clauses = map
                    .iter()
                    .map(|(key, expected)| Clause::parse(key, expected))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Self { clauses })
            },
            other => Err(Error::InvalidInput(format!(
                "filter must be an object, got {}",
                kind_of(other)
            ))),
        }
    }

    /// Returns true if the filter has no criteria.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Evaluates the filter against a document.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses.iter().all(|clause| clause.matches(doc))
    }

    /// Builds the seed document for an upsert: every plain-equality field of
    /// the filter, written at its dotted path.
    ///
    /// `$or` branches, operator objects and `$`-prefixed keys contribute
    /// nothing.
    #[must_use]
    pub fn upsert_seed(&self) -> Document {
        let mut seed = Document::new();
        for clause in &self.clauses {
            if let Clause::Field {
                path,
                condition: Condition::Equals(value),
            } = clause
            {
                if !path.starts_with('$') {
                    set_path(&mut seed, path, value.clone());
                }
            }
        }
        seed
    }
}

impl Clause {
    fn parse(key: &str, expected: &Value) -> Result<Self> {
        if key == "$or" {
            let Value::Array(branches) = expected else {
                return Err(Error::InvalidInput(format!(
                    "$or expects an array of filters, got {}",
                    kind_of(expected)
                )));
            };
            let branches = branches
                .iter()
                .map(Filter::parse)
                .collect::<Result<Vec<_>>>()?;
            return Ok(Self::Or(branches));
        }

        let condition = match expected {
            Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => {
                Condition::Operators(parse_operators(ops))
            },
            other => Condition::Equals(other.clone()),
        };

        Ok(Self::Field {
            path: key.to_string(),
            condition,
        })
    }

    fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::Or(branches) => branches.iter().any(|branch| branch.matches(doc)),
            Self::Field { path, condition } => {
                let actual = get_path_or_null(doc, path);
                condition.matches(actual)
            },
        }
    }
}

impl Condition {
    fn matches(&self, actual: &Value) -> bool {
        match self {
            Self::Equals(expected) => match actual {
                Value::Array(items) => contains_value(items, expected),
                _ => values_equal(actual, expected),
            },
            Self::Operators(ops) => ops.iter().all(|op| op.matches(actual)),
        }
    }
}

impl FieldOperator {
    fn matches(&self, actual: &Value) -> bool {
        match self {
            Self::In(candidates) => match actual {
                Value::Array(items) => items.iter().any(|item| contains_value(candidates, item)),
                _ => contains_value(candidates, actual),
            },
            Self::Regex(Some(re)) => re.is_match(&string_form(actual)),
            Self::Regex(None) | Self::Unsupported(_) => false,
        }
    }
}

fn parse_operators(ops: &serde_json::Map<String, Value>) -> Vec<FieldOperator> {
    let case_insensitive = ops
        .get("$options")
        .is_some_and(|options| string_form(options).contains('i'));

    ops.iter()
        .filter(|(op, _)| op.as_str() != "$options")
        .map(|(op, value)| match (op.as_str(), value) {
            ("$in", Value::Array(candidates)) => FieldOperator::In(candidates.clone()),
            ("$regex", pattern) => FieldOperator::Regex(compile_regex(pattern, case_insensitive)),
            (other, _) => {
                tracing::debug!(operator = other, "unsupported filter operator never matches");
                FieldOperator::Unsupported(other.to_string())
            },
        })
        .collect()
}

fn compile_regex(pattern: &Value, case_insensitive: bool) -> Option<Regex> {
    let pattern = string_form(pattern);
    RegexBuilder::new(&pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| {
            tracing::debug!(pattern = %pattern, error = %e, "invalid $regex treated as no match");
        })
        .ok()
}

/// Parses `filter` and evaluates it against `doc`.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the filter is malformed.
pub fn matches(doc: &Document, filter: &Value) -> Result<bool> {
    Ok(Filter::parse(filter)?.matches(doc))
}
