//! Small result and option types shared across the crate.

use serde::{Deserialize, Serialize};

/// Direction of a sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Smallest first; nulls lead.
    #[default]
    Ascending,
    /// Largest first; nulls trail.
    Descending,
}

impl SortDirection {
    /// Interprets a numeric direction the way document databases do:
    /// negative means descending, anything else ascending.
    #[must_use]
    pub const fn from_sign(direction: i64) -> Self {
        if direction < 0 {
            Self::Descending
        } else {
            Self::Ascending
        }
    }

    /// Parses `asc`/`desc`/`1`/`-1` style text.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "asc" | "ascending" | "1" => Some(Self::Ascending),
            "desc" | "descending" | "-1" => Some(Self::Descending),
            _ => None,
        }
    }
}

impl From<i32> for SortDirection {
    fn from(direction: i32) -> Self {
        Self::from_sign(i64::from(direction))
    }
}

impl From<i64> for SortDirection {
    fn from(direction: i64) -> Self {
        Self::from_sign(direction)
    }
}

/// Outcome of an update call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct UpdateResult {
    /// Rows that matched the filter.
    pub matched: usize,
    /// Rows written back.
    pub modified: usize,
    /// Whether a new document was inserted by an upsert.
    pub upserted: bool,
}

impl UpdateResult {
    /// A call that matched nothing and inserted nothing.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            matched: 0,
            modified: 0,
            upserted: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(1, SortDirection::Ascending)]
    #[test_case(0, SortDirection::Ascending)]
    #[test_case(-1, SortDirection::Descending)]
    #[test_case(-5, SortDirection::Descending)]
    fn test_from_sign(direction: i32, expected: SortDirection) {
        assert_eq!(SortDirection::from(direction), expected);
    }

    #[test]
    fn test_parse() {
        assert_eq!(SortDirection::parse("DESC"), Some(SortDirection::Descending));
        assert_eq!(SortDirection::parse("asc"), Some(SortDirection::Ascending));
        assert_eq!(SortDirection::parse("-1"), Some(SortDirection::Descending));
        assert_eq!(SortDirection::parse("sideways"), None);
    }
}
