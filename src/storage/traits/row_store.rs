//! Row store trait.

use crate::Result;
use crate::models::{CollectionName, Document, Row, RowKey};
use std::future::Future;

/// Trait for the backing store behind collections.
///
/// A row store persists documents as opaque rows keyed by a physical
/// [`RowKey`]. It knows nothing about filters, updates or projections; every
/// query is evaluated by the caller over the rows returned from
/// [`fetch_rows`](Self::fetch_rows).
///
/// Implementations must:
/// - Reject a second row whose document carries an `id` already present in
///   the same table with [`Error::DuplicateId`](crate::Error::DuplicateId)
/// - Return rows from `fetch_rows` in ascending key order
/// - Make [`ensure_table`](Self::ensure_table) idempotent
pub trait RowStore: Send + Sync {
    /// Provisions the table for a collection if this store has not done so yet.
    fn ensure_table(&self, collection: &CollectionName) -> impl Future<Output = Result<()>> + Send;

    /// Loads every row of a collection.
    fn fetch_rows(&self, collection: &CollectionName)
    -> impl Future<Output = Result<Vec<Row>>> + Send;

    /// Appends a row and returns its new physical key.
    fn insert_row(
        &self,
        collection: &CollectionName,
        doc: &Document,
    ) -> impl Future<Output = Result<RowKey>> + Send;

    /// Overwrites the document stored under `key`.
    ///
    /// Returns `false` if no such row exists.
    fn update_row(
        &self,
        collection: &CollectionName,
        key: RowKey,
        doc: &Document,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Overwrites the document under `key` only if it still equals `expected`.
    ///
    /// Returns `false` if the row was modified or removed since it was read.
    fn replace_row_if_unchanged(
        &self,
        collection: &CollectionName,
        key: RowKey,
        expected: &Document,
        doc: &Document,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Removes the row stored under `key`.
    ///
    /// Returns `false` if no such row exists.
    fn delete_row(
        &self,
        collection: &CollectionName,
        key: RowKey,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Releases connections and forgets which tables were provisioned.
    fn close(&self) -> impl Future<Output = ()> + Send;
}
