//! In-memory row store.
//!
//! Mirrors the PostgreSQL store's observable behaviour inside the process:
//! tables must be provisioned before use, rows get increasing physical keys,
//! and the logical `id` is unique per table. Useful for tests and for
//! embedding collections without a database.

use crate::models::{CollectionName, Document, ID_FIELD, Row, RowKey};
use crate::query::value::string_form;
use crate::storage::traits::RowStore;
use crate::{Error, Result};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// One provisioned table.
#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<RowKey, Document>,
    last_key: i64,
}

impl Table {
    /// Returns the row key already holding `doc`'s logical id, ignoring `except`.
    fn conflicting_key(&self, doc: &Document, except: Option<RowKey>) -> Option<String> {
        let id = unique_key(doc)?;
        self.rows
            .iter()
            .filter(|(key, _)| Some(**key) != except)
            .any(|(_, existing)| unique_key(existing).as_deref() == Some(id.as_str()))
            .then_some(id)
    }
}

/// Text form of the logical id, as the unique index sees it.
fn unique_key(doc: &Document) -> Option<String> {
    match doc.get(ID_FIELD) {
        None | Some(Value::Null) => None,
        Some(value) => Some(string_form(value)),
    }
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<CollectionName, Table>,
    ensured: HashSet<CollectionName>,
    provision_runs: HashMap<CollectionName, usize>,
}

impl State {
    fn table(&self, collection: &CollectionName, operation: &str) -> Result<&Table> {
        self.tables
            .get(collection)
            .ok_or_else(|| missing_table(collection, operation))
    }

    fn table_mut(&mut self, collection: &CollectionName, operation: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(collection)
            .ok_or_else(|| missing_table(collection, operation))
    }
}

fn missing_table(collection: &CollectionName, operation: &str) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: format!("relation \"{collection}\" does not exist"),
    }
}

fn duplicate(collection: &CollectionName, id: String) -> Error {
    Error::DuplicateId {
        collection: collection.to_string(),
        id,
    }
}

/// In-memory [`RowStore`].
#[derive(Debug, Default)]
pub struct MemoryRowStore {
    state: Mutex<State>,
}

impl MemoryRowStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self, operation: &str) -> Result<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| Error::OperationFailed {
            operation: operation.to_string(),
            cause: "Lock poisoned".to_string(),
        })
    }

    /// Returns how many times the table for `collection` was provisioned.
    ///
    /// Counts provisioning passes, not `ensure_table` calls: memoized calls
    /// do not increase it.
    #[must_use]
    pub fn provision_count(&self, collection: &CollectionName) -> usize {
        self.lock("memory_provision_count")
            .map(|state| state.provision_runs.get(collection).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Returns the number of rows stored for `collection`.
    #[must_use]
    pub fn row_count(&self, collection: &CollectionName) -> usize {
        self.lock("memory_row_count")
            .map(|state| state.tables.get(collection).map_or(0, |t| t.rows.len()))
            .unwrap_or(0)
    }
}

impl RowStore for MemoryRowStore {
    async fn ensure_table(&self, collection: &CollectionName) -> Result<()> {
        let mut state = self.lock("memory_ensure_table")?;
        if state.ensured.contains(collection) {
            return Ok(());
        }
        state.tables.entry(collection.clone()).or_default();
        *state.provision_runs.entry(collection.clone()).or_insert(0) += 1;
        state.ensured.insert(collection.clone());
        tracing::debug!(table = %collection, "Provisioned in-memory table");
        Ok(())
    }

    async fn fetch_rows(&self, collection: &CollectionName) -> Result<Vec<Row>> {
        let rows = {
            let state = self.lock("memory_fetch_rows")?;
            state
                .table(collection, "memory_fetch_rows")?
                .rows
                .iter()
                .map(|(key, doc)| Row::new(*key, doc.clone()))
                .collect::<Vec<_>>()
        };
        // Suspend like a network read would, so writers can interleave.
        tokio::task::yield_now().await;
        Ok(rows)
    }

    async fn insert_row(&self, collection: &CollectionName, doc: &Document) -> Result<RowKey> {
        let mut state = self.lock("memory_insert_row")?;
        let table = state.table_mut(collection, "memory_insert_row")?;
        if let Some(id) = table.conflicting_key(doc, None) {
            return Err(duplicate(collection, id));
        }
        table.last_key += 1;
        let key = RowKey::new(table.last_key);
        table.rows.insert(key, doc.clone());
        Ok(key)
    }

    async fn update_row(
        &self,
        collection: &CollectionName,
        key: RowKey,
        doc: &Document,
    ) -> Result<bool> {
        let mut state = self.lock("memory_update_row")?;
        let table = state.table_mut(collection, "memory_update_row")?;
        if !table.rows.contains_key(&key) {
            return Ok(false);
        }
        if let Some(id) = table.conflicting_key(doc, Some(key)) {
            return Err(duplicate(collection, id));
        }
        table.rows.insert(key, doc.clone());
        Ok(true)
    }

    async fn replace_row_if_unchanged(
        &self,
        collection: &CollectionName,
        key: RowKey,
        expected: &Document,
        doc: &Document,
    ) -> Result<bool> {
        let mut state = self.lock("memory_replace_row")?;
        let table = state.table_mut(collection, "memory_replace_row")?;
        if table.rows.get(&key) != Some(expected) {
            return Ok(false);
        }
        if let Some(id) = table.conflicting_key(doc, Some(key)) {
            return Err(duplicate(collection, id));
        }
        table.rows.insert(key, doc.clone());
        Ok(true)
    }

    async fn delete_row(&self, collection: &CollectionName, key: RowKey) -> Result<bool> {
        let mut state = self.lock("memory_delete_row")?;
        let table = state.table_mut(collection, "memory_delete_row")?;
        Ok(table.rows.remove(&key).is_some())
    }

    async fn close(&self) {
        if let Ok(mut state) = self.lock("memory_close") {
            state.ensured.clear();
        }
    }
}
