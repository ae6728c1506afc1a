//! Database handle: owns the row store and hands out collections.

use super::Collection;
use crate::Result;
use crate::models::CollectionName;
use crate::storage::{MemoryRowStore, RowStore};
use std::sync::Arc;

#[cfg(feature = "postgres")]
use crate::config::PgdocConfig;
#[cfg(feature = "postgres")]
use crate::storage::postgres::PostgresRowStore;

/// Lifecycle handle for a document database.
///
/// Every [`Collection`] obtained from the handle shares its row store, so
/// the connection pool and the provisioned-table memo are process-wide
/// without being global.
pub struct DocumentDb<S: RowStore> {
    store: Arc<S>,
    default_find_limit: usize,
}

impl<S: RowStore> Clone for DocumentDb<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            default_find_limit: self.default_find_limit,
        }
    }
}

impl<S: RowStore> DocumentDb<S> {
    /// Default limit for [`to_default_list`](super::FindCursor::to_default_list).
    pub const DEFAULT_FIND_LIMIT: usize = 100;

    /// Wraps a row store.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self::from_shared(Arc::new(store))
    }

    /// Wraps a row store that is already shared.
    #[must_use]
    pub const fn from_shared(store: Arc<S>) -> Self {
        Self {
            store,
            default_find_limit: Self::DEFAULT_FIND_LIMIT,
        }
    }

    /// Overrides the default cursor limit.
    #[must_use]
    pub fn with_default_find_limit(mut self, limit: usize) -> Self {
        self.default_find_limit = limit;
        self
    }

    /// Returns the default cursor limit.
    #[must_use]
    pub const fn default_find_limit(&self) -> usize {
        self.default_find_limit
    }

    /// Returns the underlying row store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns a handle to the named collection.
    ///
    /// Nothing touches the backing store until the first operation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCollectionName`](crate::Error::InvalidCollectionName)
    /// if the name is not a plain identifier.
    pub fn collection(&self, name: &str) -> Result<Collection<S>> {
        let name = CollectionName::parse(name)?;
        Ok(Collection::new(
            name,
            Arc::clone(&self.store),
            self.default_find_limit,
        ))
    }

    /// Releases connections and forgets provisioned tables.
    pub async fn close(&self) {
        self.store.close().await;
        tracing::debug!("Closed document database");
    }
}

impl DocumentDb<MemoryRowStore> {
    /// Creates a database backed by process memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryRowStore::new())
    }
}

#[cfg(feature = "postgres")]
impl DocumentDb<PostgresRowStore> {
    /// Creates a PostgreSQL-backed database from configuration.
    ///
    /// The connection string is validated here; no connection is made.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`](crate::Error::Configuration) if the
    /// database URL is missing or malformed.
    pub fn postgres(config: &PgdocConfig) -> Result<Self> {
        let store = PostgresRowStore::from_config(config)?;
        Ok(Self::new(store).with_default_find_limit(config.default_find_limit))
    }

    /// Creates the pool and proves the server is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`](crate::Error::OperationFailed) if
    /// no connection can be made.
    pub async fn connect(&self) -> Result<()> {
        self.store.connect().await
    }
}
