//! Projection engine.
//!
//! A projection maps dotted field paths to `1` (include) or `0` (exclude).
//! If any entry includes, only the included paths are returned; otherwise the
//! listed paths are removed from a copy of the document.
//!
//! The logical `id` survives every projection: inclusion always copies it and
//! exclusion never removes it. Entries for `_id` are ignored, since rows have
//! no native document-database identifier to hide.

use super::path::{get_path, remove_path, set_path};
use super::value::is_truthy;
use crate::models::{Document, ID_FIELD, kind_of};
use crate::{Error, Result};
use serde_json::Value;

/// Native document-database identifier that callers habitually exclude.
const NATIVE_ID_FIELD: &str = "_id";

/// A parsed projection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Projection {
    /// Return the whole document.
    #[default]
    All,
    /// Return only these paths (plus `id`).
    Include(Vec<String>),
    /// Return everything except these paths.
    Exclude(Vec<String>),
}

impl Projection {
    /// Parses a projection spec.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the spec is neither `null` nor an
    /// object.
    pub fn parse(value: &Value) -> Result<Self> {
        let map = match value {
            Value::Null => return Ok(Self::All),
            Value::Object(map) => map,
            other => {
                return Err(Error::InvalidInput(format!(
                    "projection must be an object, got {}",
                    kind_of(other)
                )));
            },
        };

        let entries: Vec<(&String, bool)> = map
            .iter()
            .filter(|(field, _)| field.as_str() != NATIVE_ID_FIELD)
            .map(|(field, flag)| (field, is_truthy(flag)))
            .collect();

        if entries.is_empty() {
            return Ok(Self::All);
        }

        let includes: Vec<String> = entries
            .iter()
            .filter(|(_, include)| *include)
            .map(|(field, _)| (*field).clone())
            .collect();
        if !includes.is_empty() {
            return Ok(Self::Include(includes));
        }

        Ok(Self::Exclude(
            entries
                .into_iter()
                .map(|(field, _)| field.clone())
                .collect(),
        ))
    }

    /// Parses an optional projection spec.
    ///
    /// # Errors
    ///
    /// Same as [`Projection::parse`].
    pub fn parse_opt(value: Option<&Value>) -> Result<Self> {
        value.map_or(Ok(Self::All), Self::parse)
    }

    /// Reshapes a document, always returning a fresh copy.
    #[must_use]
    pub fn apply(&self, doc: &Document) -> Document {
        match self {
            Self::All => doc.clone(),
            Self::Include(paths) => {
                let mut projected = Document::new();
                let id = std::iter::once(ID_FIELD).filter(|id| !paths.iter().any(|p| p == id));
                for path in id.chain(paths.iter().map(String::as_str)) {
                    if let Some(value) = get_path(doc, path).filter(|v| !v.is_null()) {
                        set_path(&mut projected, path, value.clone());
                    }
                }
                projected
            },
            Self::Exclude(paths) => {
                let mut projected = doc.clone();
                for path in paths.iter().filter(|p| p.as_str() != ID_FIELD) {
                    remove_path(&mut projected, path);
                }
                projected
            },
        }
    }
}

/// Parses `spec` and applies it to `doc`.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the spec is malformed.
pub fn project(doc: &Document, spec: Option<&Value>) -> Result<Document> {
    Ok(Projection::parse_opt(spec)?.apply(doc))
}
