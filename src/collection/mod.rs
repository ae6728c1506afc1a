//! Collections: the document-database surface over a [`RowStore`].
//!
//! Every operation provisions the collection's table if needed, loads all of
//! its rows and evaluates filters, updates and pipelines in memory. Writes
//! target rows by physical key.
//!
//! # Concurrency
//!
//! [`Collection::update_one`], [`Collection::update_many`] and upserts read,
//! compute and write in separate round trips. Two concurrent updates of the
//! same document can interleave so that the later write discards the
//! earlier one's effect (last writer wins). [`Collection::update_one_guarded`]
//! closes that gap with a compare-and-swap on the row and bounded retries.

mod cursor;
mod database;

pub use cursor::{AggregateCursor, FindCursor};
pub use database::DocumentDb;

use crate::models::{CollectionName, Document, Row, UpdateResult, into_document};
use crate::query::{Filter, Pipeline, Projection, Update};
use crate::storage::RowStore;
use crate::{Error, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

/// Attempts made by [`Collection::update_one_guarded`] before giving up.
pub const GUARDED_UPDATE_ATTEMPTS: u32 = 5;

fn record_operation(operation: &'static str) {
    metrics::counter!("pgdoc_operations_total", "operation" => operation).increment(1);
}

/// A named collection of documents.
///
/// Cheap to clone; clones share the row store.
pub struct Collection<S: RowStore> {
    name: CollectionName,
    store: Arc<S>,
    default_find_limit: usize,
}

impl<S: RowStore> Clone for Collection<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            store: Arc::clone(&self.store),
            default_find_limit: self.default_find_limit,
        }
    }
}

impl<S: RowStore> Collection<S> {
    pub(crate) const fn new(name: CollectionName, store: Arc<S>, default_find_limit: usize) -> Self {
        Self {
            name,
            store,
            default_find_limit,
        }
    }

    /// Returns the collection name.
    #[must_use]
    pub const fn name(&self) -> &CollectionName {
        &self.name
    }

    pub(crate) const fn default_find_limit(&self) -> usize {
        self.default_find_limit
    }

    /// Loads every row matching `filter`, in physical key order.
    async fn matching_rows(&self, filter: &Filter) -> Result<Vec<Row>> {
        self.store.ensure_table(&self.name).await?;
        let rows = self.store.fetch_rows(&self.name).await?;
        metrics::counter!("pgdoc_rows_scanned_total", "collection" => self.name.to_string())
            .increment(u64::try_from(rows.len()).unwrap_or(u64::MAX));
        Ok(rows
            .into_iter()
            .filter(|row| filter.matches(&row.doc))
            .collect())
    }

    /// Loads the documents matching `filter`.
    pub(crate) async fn find_docs(&self, filter: &Filter) -> Result<Vec<Document>> {
        Ok(self
            .matching_rows(filter)
            .await?
            .into_iter()
            .map(|row| row.doc)
            .collect())
    }

    /// Inserts a document.
    ///
    /// No id is generated; callers supply `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `doc` is not an object,
    /// [`Error::DuplicateId`] if its `id` is taken, or a backing-store error.
    #[instrument(skip_all, fields(collection = %self.name))]
    pub async fn insert_one(&self, doc: Value) -> Result<()> {
        let doc = into_document(doc)?;
        self.insert_document(&doc).await
    }

    /// Inserts an already-built document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateId`] if its `id` is taken, or a
    /// backing-store error.
    pub async fn insert_document(&self, doc: &Document) -> Result<()> {
        record_operation("insert_one");
        self.store.ensure_table(&self.name).await?;
        let key = self.store.insert_row(&self.name, doc).await?;
        tracing::debug!(collection = %self.name, key = %key, "Inserted document");
        Ok(())
    }

    /// Returns the first matching document, projected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a malformed filter or projection,
    /// or a backing-store error.
    #[instrument(skip_all, fields(collection = %self.name))]
    pub async fn find_one(
        &self,
        filter: &Value,
        projection: Option<&Value>,
    ) -> Result<Option<Document>> {
        let filter = Filter::parse(filter)?;
        let projection = Projection::parse_opt(projection)?;
        record_operation("find_one");

        let found = self.matching_rows(&filter).await?.into_iter().next();
        Ok(found.map(|row| projection.apply(&row.doc)))
    }

    /// Starts a lazy query.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a malformed filter or projection.
    pub fn find(&self, filter: &Value, projection: Option<&Value>) -> Result<FindCursor<S>> {
        let filter = Filter::parse(filter)?;
        let projection = Projection::parse_opt(projection)?;
        record_operation("find");
        Ok(FindCursor::new(self.clone(), filter, projection))
    }

    /// Updates the first matching document, or inserts one when `upsert` is
    /// set and nothing matches.
    ///
    /// The upserted document starts from the filter's plain equality fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a malformed filter or update,
    /// [`Error::DuplicateId`] if the write collides on `id`, or a
    /// backing-store error.
    #[instrument(skip_all, fields(collection = %self.name, upsert = upsert))]
    pub async fn update_one(
        &self,
        filter: &Value,
        update: &Value,
        upsert: bool,
    ) -> Result<UpdateResult> {
        let filter = Filter::parse(filter)?;
        let update = Update::parse(update)?;
        record_operation("update_one");

        let Some(row) = self.matching_rows(&filter).await?.into_iter().next() else {
            if !upsert {
                return Ok(UpdateResult::none());
            }
            let doc = update.apply(&filter.upsert_seed());
            self.store.insert_row(&self.name, &doc).await?;
            tracing::debug!(collection = %self.name, "Upserted document");
            return Ok(UpdateResult {
                matched: 0,
                modified: 0,
                upserted: true,
            });
        };

        let doc = update.apply(&row.doc);
        let written = self.store.update_row(&self.name, row.key, &doc).await?;
        Ok(UpdateResult {
            matched: 1,
            modified: usize::from(written),
            upserted: false,
        })
    }

    /// Updates the first matching document with a compare-and-swap write.
    ///
    /// If another writer changes the row between read and write, the row is
    /// re-read and the update recomputed, up to [`GUARDED_UPDATE_ATTEMPTS`]
    /// times.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WriteConflict`] when every attempt lost a race, or
    /// the errors of [`update_one`](Self::update_one).
    #[instrument(skip_all, fields(collection = %self.name))]
    pub async fn update_one_guarded(&self, filter: &Value, update: &Value) -> Result<UpdateResult> {
        let filter = Filter::parse(filter)?;
        let update = Update::parse(update)?;
        record_operation("update_one_guarded");

        for attempt in 1..=GUARDED_UPDATE_ATTEMPTS {
            let Some(row) = self.matching_rows(&filter).await?.into_iter().next() else {
                return Ok(UpdateResult::none());
            };
            let doc = update.apply(&row.doc);
            if self
                .store
                .replace_row_if_unchanged(&self.name, row.key, &row.doc, &doc)
                .await?
            {
                return Ok(UpdateResult {
                    matched: 1,
                    modified: 1,
                    upserted: false,
                });
            }
            tracing::debug!(collection = %self.name, key = %row.key, attempt, "Row changed underneath guarded update");
        }

        metrics::counter!("pgdoc_write_conflicts_total", "collection" => self.name.to_string())
            .increment(1);
        Err(Error::WriteConflict {
            collection: self.name.to_string(),
            attempts: GUARDED_UPDATE_ATTEMPTS,
        })
    }

    /// Applies the update to every matching document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a malformed filter or update, or
    /// a backing-store error. Rows written before a failure stay written.
    #[instrument(skip_all, fields(collection = %self.name))]
    pub async fn update_many(&self, filter: &Value, update: &Value) -> Result<UpdateResult> {
        let filter = Filter::parse(filter)?;
        let update = Update::parse(update)?;
        record_operation("update_many");

        let rows = self.matching_rows(&filter).await?;
        let mut result = UpdateResult {
            matched: rows.len(),
            ..UpdateResult::none()
        };
        for row in rows {
            let doc = update.apply(&row.doc);
            if self.store.update_row(&self.name, row.key, &doc).await? {
                result.modified += 1;
            }
        }
        tracing::debug!(
            collection = %self.name,
            matched = result.matched,
            modified = result.modified,
            "Updated documents"
        );
        Ok(result)
    }

    /// Deletes the first matching document.
    ///
    /// Returns whether a document was removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a malformed filter, or a
    /// backing-store error.
    #[instrument(skip_all, fields(collection = %self.name))]
    pub async fn delete_one(&self, filter: &Value) -> Result<bool> {
        let filter = Filter::parse(filter)?;
        record_operation("delete_one");

        match self.matching_rows(&filter).await?.into_iter().next() {
            Some(row) => self.store.delete_row(&self.name, row.key).await,
            None => Ok(false),
        }
    }

    /// Counts matching documents.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a malformed filter, or a
    /// backing-store error.
    #[instrument(skip_all, fields(collection = %self.name))]
    pub async fn count_documents(&self, filter: &Value) -> Result<usize> {
        let filter = Filter::parse(filter)?;
        record_operation("count_documents");
        Ok(self.matching_rows(&filter).await?.len())
    }

    /// Prepares an aggregation pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedStage`] for an unknown stage, or
    /// [`Error::InvalidInput`] for a malformed one.
    pub fn aggregate(&self, pipeline: &[Value]) -> Result<AggregateCursor<S>> {
        let pipeline = Pipeline::parse(pipeline)?;
        record_operation("aggregate");
        Ok(AggregateCursor::new(self.clone(), pipeline))
    }

    /// Provisions the collection's table without reading it.
    ///
    /// # Errors
    ///
    /// Returns a backing-store error.
    pub async fn provision(&self) -> Result<()> {
        self.store.ensure_table(&self.name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryRowStore;
    use serde_json::json;

    fn posts() -> Collection<MemoryRowStore> {
        DocumentDb::in_memory().collection("posts").unwrap()
    }

    #[tokio::test]
    async fn test_find_one_returns_first_inserted_match() {
        let posts = posts();
        posts.insert_one(json!({"id": "p1", "agent_id": "a"})).await.unwrap();
        posts.insert_one(json!({"id": "p2", "agent_id": "a"})).await.unwrap();

        let found = posts
            .find_one(&json!({"agent_id": "a"}), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.get("id"), Some(&json!("p1")));
    }

    #[tokio::test]
    async fn test_invalid_filter_never_reaches_store() {
        let posts = posts();
        let err = posts.count_documents(&json!({"$or": {"a": 1}})).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(posts.store.provision_count(posts.name()), 0);
    }

    #[tokio::test]
    async fn test_insert_rejects_non_objects() {
        let err = posts().insert_one(json!("nope")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_update_many_counts() {
        let posts = posts();
        for i in 0..3 {
            posts
                .insert_one(json!({"id": format!("p{i}"), "tag": "x", "n": i}))
                .await
                .unwrap();
        }
        let result = posts
            .update_many(&json!({"tag": "x"}), &json!({"$inc": {"n": 10}}))
            .await
            .unwrap();
        assert_eq!(result.matched, 3);
        assert_eq!(result.modified, 3);
        assert_eq!(posts.count_documents(&json!({"n": {"$in": [10, 11, 12]}})).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_guarded_update_without_match() {
        let result = posts()
            .update_one_guarded(&json!({"id": "none"}), &json!({"$set": {"a": 1}}))
            .await
            .unwrap();
        assert_eq!(result, UpdateResult::none());
    }

    #[tokio::test]
    async fn test_aggregate_rejects_unknown_stage_before_reading() {
        let posts = posts();
        let err = posts.aggregate(&[json!({"$lookup": {}})]).err();
        assert!(matches!(err, Some(Error::UnsupportedStage(_))));
        assert_eq!(posts.store.provision_count(posts.name()), 0);
    }
}
