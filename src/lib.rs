//! # pgdoc
//!
//! A document-store adapter that lets application code issue NoSQL-style
//! queries, field updates and aggregation pipelines against collections whose
//! rows are persisted as JSON documents in PostgreSQL.
//!
//! Each collection maps to one table (`pk BIGSERIAL`, `doc JSONB`), created on
//! first use. Matching, projection, sorting, update operators and the
//! aggregation pipeline are all evaluated in application memory.
//!
//! ## Features
//!
//! - Filters with implicit AND, `$or`, `$in`, `$regex`/`$options`
//! - Updates with `$set`, `$inc`, `$push`, `$pull` on dotted paths
//! - Inclusion/exclusion projections and stable multi-key sorting
//! - `$match` / `$sort` / `$group` pipelines with a `$cond`/`$eq` expression language
//! - Pluggable backing store (`PostgresRowStore`, `MemoryRowStore`)
//!
//! ## Example
//!
//! ```rust,ignore
//! use pgdoc::{DocumentDb, PgdocConfig};
//! use serde_json::json;
//!
//! let db = DocumentDb::postgres(&PgdocConfig::load_default())?;
//! db.connect().await?;
//!
//! let posts = db.collection("posts")?;
//! posts.insert_one(json!({"id": "p1", "agent_id": "a1", "created_at": "2024-01-01"})).await?;
//! let recent = posts
//!     .find(&json!({"agent_id": "a1"}), None)?
//!     .sort("created_at", -1)
//!     .to_list(100)
//!     .await?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod collection;
pub mod config;
pub mod models;
pub mod observability;
pub mod query;
pub mod storage;

pub use collection::{AggregateCursor, Collection, DocumentDb, FindCursor};
pub use config::PgdocConfig;
pub use models::{CollectionName, Document, Row, RowKey, SortDirection, UpdateResult};
pub use query::{Filter, Pipeline, Projection, SortSpec, Update};
pub use storage::{MemoryRowStore, RowStore};

#[cfg(feature = "postgres")]
pub use storage::postgres::{PgConnectionManager, PostgresRowStore};

/// Error type for pgdoc operations.
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed filter, update, projection or pipeline shapes |
/// | `InvalidCollectionName` | Collection name is not a plain SQL identifier |
/// | `Configuration` | Connection string or config file is missing or malformed |
/// | `NotConnected` | The pool is used before `connect()` |
/// | `UnsupportedStage` | An aggregation stage other than `$match`/`$sort`/`$group` |
/// | `DuplicateId` | A second document with the same logical `id` is written |
/// | `WriteConflict` | A guarded update kept losing races |
/// | `OperationFailed` | Backing-store queries, pool checkout, file IO |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A filter, update or projection is not a JSON object
    /// - `$or` is not an array, or `$inc` has a non-numeric delta
    /// - `$cond`/`$eq` have the wrong number of operands
    /// - A pipeline stage does not have exactly one key
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The collection name would not be a safe table identifier.
    #[error("invalid collection name: {0:?}")]
    InvalidCollectionName(String),

    /// The connection string or configuration is unusable.
    ///
    /// Always raised before a pooled connection is attempted.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The connection pool has not been initialized.
    #[error("connection pool not initialized; call connect() first")]
    NotConnected,

    /// An aggregation stage is not supported.
    #[error("unsupported aggregation stage: {0}")]
    UnsupportedStage(String),

    /// The backing store rejected a duplicate logical id.
    #[error("duplicate id {id:?} in collection '{collection}'")]
    DuplicateId {
        /// Collection the write targeted.
        collection: String,
        /// The conflicting logical id.
        id: String,
    },

    /// A guarded update was overtaken by concurrent writers too many times.
    #[error("write conflict in collection '{collection}' after {attempts} attempts")]
    WriteConflict {
        /// Collection the write targeted.
        collection: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// An operation failed.
    ///
    /// Raised when:
    /// - Pool checkout or creation fails
    /// - A PostgreSQL statement fails
    /// - A stored document cannot be decoded
    /// - Config or log files cannot be read or opened
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Builds an [`Error::OperationFailed`] from an operation tag and a cause.
    pub fn operation(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for pgdoc operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::operation("test", "failed");
        assert_eq!(err.to_string(), "operation 'test' failed: failed");

        let err = Error::InvalidCollectionName("bad-name".to_string());
        assert_eq!(err.to_string(), "invalid collection name: \"bad-name\"");

        let err = Error::UnsupportedStage("$lookup".to_string());
        assert_eq!(err.to_string(), "unsupported aggregation stage: $lookup");

        let err = Error::DuplicateId {
            collection: "agents".to_string(),
            id: "a1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "duplicate id \"a1\" in collection 'agents'"
        );
    }

    #[test]
    fn test_not_connected_message_mentions_connect() {
        assert!(Error::NotConnected.to_string().contains("connect()"));
    }
}
