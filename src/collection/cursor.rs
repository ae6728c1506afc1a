//! Lazy cursors returned by `find` and `aggregate`.

use super::Collection;
use crate::Result;
use crate::models::{Document, SortDirection};
use crate::query::{Filter, Pipeline, Projection, SortSpec};
use crate::storage::RowStore;

/// Cursor over the documents matching a filter.
///
/// Nothing is read until [`to_list`](Self::to_list). Sorting happens before
/// the limit is applied, and projection last.
#[must_use = "cursors do nothing until to_list is awaited"]
pub struct FindCursor<S: RowStore> {
    collection: Collection<S>,
    filter: Filter,
    projection: Projection,
    sort: SortSpec,
    limit: Option<usize>,
}

impl<S: RowStore> FindCursor<S> {
    pub(super) const fn new(collection: Collection<S>, filter: Filter, projection: Projection) -> Self {
        Self {
            collection,
            filter,
            projection,
            sort: SortSpec::new(),
            limit: None,
        }
    }

    /// Adds a sort key. Keys chained earlier take precedence.
    pub fn sort(mut self, path: impl Into<String>, direction: impl Into<SortDirection>) -> Self {
        self.sort.push(path, direction.into());
        self
    }

    /// Appends every key of a parsed sort spec.
    pub fn sort_by(mut self, spec: &SortSpec) -> Self {
        for (path, direction) in spec.keys() {
            self.sort.push(path.clone(), *direction);
        }
        self
    }

    /// Caps the number of results; overrides the limit passed to `to_list`.
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Runs the query and returns at most `limit` documents, unless an
    /// explicit [`limit`](Self::limit) was chained.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    pub async fn to_list(self, limit: usize) -> Result<Vec<Document>> {
        let mut docs = self.collection.find_docs(&self.filter).await?;
        self.sort.apply(&mut docs);
        docs.truncate(self.limit.unwrap_or(limit));
        Ok(docs.iter().map(|doc| self.projection.apply(doc)).collect())
    }

    /// Like [`to_list`](Self::to_list) with the database's default limit.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    pub async fn to_default_list(self) -> Result<Vec<Document>> {
        let limit = self.collection.default_find_limit();
        self.to_list(limit).await
    }
}

/// Cursor over the output of an aggregation pipeline.
#[must_use = "cursors do nothing until to_list is awaited"]
pub struct AggregateCursor<S: RowStore> {
    collection: Collection<S>,
    pipeline: Pipeline,
}

impl<S: RowStore> AggregateCursor<S> {
    pub(super) const fn new(collection: Collection<S>, pipeline: Pipeline) -> Self {
        Self {
            collection,
            pipeline,
        }
    }

    /// Runs the pipeline over the whole collection and keeps the first
    /// `limit` results.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    pub async fn to_list(self, limit: usize) -> Result<Vec<Document>> {
        let docs = self.collection.find_docs(&Filter::all()).await?;
        let mut docs = self.pipeline.run(docs);
        docs.truncate(limit);
        Ok(docs)
    }
}
