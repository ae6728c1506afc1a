//! Validated collection names.

use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Identifier pattern for collection (and therefore table) names.
static NAME_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok());

/// Name of a collection, guaranteed to be a plain SQL identifier.
///
/// Table names are interpolated into generated DDL/DML, so anything outside
/// `[A-Za-z_][A-Za-z0-9_]*` is rejected before it can reach the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionName(String);

impl CollectionName {
    /// Validates and wraps a collection name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCollectionName`] if the name does not match the
    /// identifier pattern.
    pub fn parse(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if Self::is_valid(&name) {
            Ok(Self(name))
        } else {
            Err(Error::InvalidCollectionName(name))
        }
    }

    /// Returns whether `name` is an acceptable collection name.
    #[must_use]
    pub fn is_valid(name: &str) -> bool {
        NAME_PATTERN.as_ref().is_some_and(|re| re.is_match(name))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the name double-quoted for use as a SQL identifier.
    #[must_use]
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for CollectionName {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CollectionName {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for CollectionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
