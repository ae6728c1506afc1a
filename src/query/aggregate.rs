//! Aggregation engine.
//!
//! A pipeline is an ordered list of single-key stage documents:
//!
//! - `$match` filters the running sequence.
//! - `$sort` orders it (see [`SortSpec`]).
//! - `$group` buckets documents by the canonical JSON of an `_id` expression,
//!   keeping groups in first-seen order. Output fields with a `$first`
//!   accumulator take the value from the first document of their bucket.
//!
//! Unknown stages fail the whole pipeline with [`Error::UnsupportedStage`].

use super::expr::Expr;
use super::filter::Filter;
use super::sort::SortSpec;
use super::value::canonical_json;
use crate::models::{Document, kind_of};
use crate::{Error, Result};
use serde_json::Value;
use std::collections::HashSet;

/// Key under which `$group` stores the group key.
pub const GROUP_KEY_FIELD: &str = "_id";

/// A parsed pipeline.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

/// A single pipeline stage.
#[derive(Debug, Clone)]
pub enum Stage {
    /// `$match`
    Match(Filter),
    /// `$sort`
    Sort(SortSpec),
    /// `$group`
    Group(GroupSpec),
}

/// A `$group` stage: key expression plus `$first` accumulators.
#[derive(Debug, Clone)]
pub struct GroupSpec {
    key: Expr,
    firsts: Vec<(String, Expr)>,
}

impl Pipeline {
    /// Parses a pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedStage`] for an unknown stage name and
    /// [`Error::InvalidInput`] for malformed stages.
    pub fn parse(stages: &[Value]) -> Result<Self> {
        let stages = stages.iter().map(Stage::parse).collect::<Result<Vec<_>>>()?;
        Ok(Self { stages })
    }

    /// Returns the stages.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Runs every stage in order over `docs`.
    #[must_use]
    pub fn run(&self, docs: Vec<Document>) -> Vec<Document> {
        self.stages
            .iter()
            .fold(docs, |running, stage| stage.run(running))
    }
}

impl Stage {
    /// Parses a single-key stage document.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::parse`].
    pub fn parse(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(Error::InvalidInput(format!(
                "pipeline stage must be an object, got {}",
                kind_of(value)
            )));
        };
        let mut entries = map.iter();
        let (Some((name, spec)), None) = (entries.next(), entries.next()) else {
            let names: Vec<&str> = map.keys().map(String::as_str).collect();
            return Err(Error::InvalidInput(format!(
                "pipeline stage must have exactly one key, got [{}]",
                names.join(", ")
            )));
        };

        match name.as_str() {
            "$match" => Ok(Self::Match(Filter::parse(spec)?)),
            "$sort" => Ok(Self::Sort(SortSpec::parse(spec)?)),
            "$group" => Ok(Self::Group(GroupSpec::parse(spec)?)),
            other => Err(Error::UnsupportedStage(other.to_string())),
        }
    }

    fn run(&self, mut docs: Vec<Document>) -> Vec<Document> {
        match self {
            Self::Match(filter) => {
                docs.retain(|doc| filter.matches(doc));
                docs
            },
            Self::Sort(spec) => {
                spec.apply(&mut docs);
                docs
            },
            Self::Group(spec) => spec.run(&docs),
        }
    }
}

impl GroupSpec {
    /// Parses a `$group` specification.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the spec is not an object, lacks an
    /// `_id` expression, or contains malformed expressions.
    pub fn parse(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(Error::InvalidInput(format!(
                "$group expects an object, got {}",
                kind_of(value)
            )));
        };
        let key = map
            .get(GROUP_KEY_FIELD)
            .ok_or_else(|| Error::InvalidInput("$group requires an _id expression".to_string()))
            .and_then(Expr::parse)?;

        let mut firsts = Vec::new();
        for (field, accumulator) in map.iter().filter(|(f, _)| f.as_str() != GROUP_KEY_FIELD) {
            match accumulator.as_object().and_then(|acc| acc.get("$first")) {
                Some(expr) => firsts.push((field.clone(), Expr::parse(expr)?)),
                None => {
                    tracing::warn!(field = %field, "ignoring $group field without a $first accumulator");
                },
            }
        }

        Ok(Self { key, firsts })
    }

    fn run(&self, docs: &[Document]) -> Vec<Document> {
        let mut seen = HashSet::new();
        let mut groups = Vec::new();

        for doc in docs {
            let key = self.key.eval(doc);
            if !seen.insert(canonical_json(&key)) {
                continue;
            }

            let mut entry = Document::new();
            entry.insert(GROUP_KEY_FIELD.to_string(), key);
            for (field, expr) in &self.firsts {
                entry.insert(field.clone(), expr.eval(doc));
            }
            groups.push(entry);
        }

        groups
    }
}

/// Parses `pipeline` and runs it over `docs`.
///
/// # Errors
///
/// See [`Pipeline::parse`].
pub fn aggregate(docs: Vec<Document>, pipeline: &[Value]) -> Result<Vec<Document>> {
    Ok(Pipeline::parse(pipeline)?.run(docs))
}
