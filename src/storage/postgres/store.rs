//! PostgreSQL-backed row store.

use super::pool::PgConnectionManager;
use super::provisioner::TableProvisioner;
use crate::config::PgdocConfig;
use crate::models::{CollectionName, Document, ID_FIELD, Row, RowKey, into_document};
use crate::query::value::string_form;
use crate::storage::traits::RowStore;
use crate::{Error, Result};
use serde_json::Value;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::Json;

/// Helper to map query errors.
fn query_error(op: &str, e: impl std::fmt::Display) -> Error {
    Error::OperationFailed {
        operation: op.to_string(),
        cause: e.to_string(),
    }
}

/// Maps write errors, turning unique-index violations into [`Error::DuplicateId`].
fn write_error(
    op: &str,
    collection: &CollectionName,
    doc: &Document,
    e: &tokio_postgres::Error,
) -> Error {
    if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        return Error::DuplicateId {
            collection: collection.to_string(),
            id: doc.get(ID_FIELD).map(string_form).unwrap_or_default(),
        };
    }
    query_error(op, e)
}

/// Decodes the `doc` column, re-parsing documents stored as JSON text.
fn decode_doc(value: Value) -> Result<Document> {
    match value {
        Value::String(text) => {
            let parsed: Value =
                serde_json::from_str(&text).map_err(|e| query_error("postgres_decode_doc", e))?;
            into_document(parsed)
        },
        other => into_document(other),
    }
}

/// [`RowStore`] over a PostgreSQL connection pool.
///
/// Rows live in one table per collection (see
/// [`provisioner`](super::provisioner)); statements address them by the
/// `pk` column only.
#[derive(Debug)]
pub struct PostgresRowStore {
    manager: PgConnectionManager,
    provisioner: TableProvisioner,
}

impl PostgresRowStore {
    /// Wraps a connection manager.
    #[must_use]
    pub fn new(manager: PgConnectionManager) -> Self {
        Self {
            manager,
            provisioner: TableProvisioner::new(),
        }
    }

    /// Builds a store from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the database URL is missing or
    /// malformed.
    pub fn from_config(config: &PgdocConfig) -> Result<Self> {
        PgConnectionManager::from_config(config).map(Self::new)
    }

    /// Returns the connection manager.
    #[must_use]
    pub const fn manager(&self) -> &PgConnectionManager {
        &self.manager
    }

    /// Creates the pool and proves connectivity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if no connection can be made.
    pub async fn connect(&self) -> Result<()> {
        self.manager.connect().await
    }
}

impl RowStore for PostgresRowStore {
    async fn ensure_table(&self, collection: &CollectionName) -> Result<()> {
        self.provisioner.ensure(&self.manager, collection).await
    }

    async fn fetch_rows(&self, collection: &CollectionName) -> Result<Vec<Row>> {
        let client = self.manager.client().await?;
        let query = format!("SELECT pk, doc FROM {} ORDER BY pk", collection.quoted());

        let rows = client
            .query(&query, &[])
            .await
            .map_err(|e| query_error("postgres_fetch_rows", e))?;

        rows.iter()
            .map(|row| {
                let pk: i64 = row
                    .try_get("pk")
                    .map_err(|e| query_error("postgres_fetch_rows", e))?;
                let doc: Value = row
                    .try_get("doc")
                    .map_err(|e| query_error("postgres_fetch_rows", e))?;
                Ok(Row::new(RowKey::new(pk), decode_doc(doc)?))
            })
            .collect()
    }

    async fn insert_row(&self, collection: &CollectionName, doc: &Document) -> Result<RowKey> {
        let client = self.manager.client().await?;
        let statement = format!(
            "INSERT INTO {} (doc) VALUES ($1) RETURNING pk",
            collection.quoted()
        );

        let row = client
            .query_one(&statement, &[&Json(doc)])
            .await
            .map_err(|e| write_error("postgres_insert_row", collection, doc, &e))?;
        let pk: i64 = row
            .try_get("pk")
            .map_err(|e| query_error("postgres_insert_row", e))?;
        Ok(RowKey::new(pk))
    }

    async fn update_row(
        &self,
        collection: &CollectionName,
        key: RowKey,
        doc: &Document,
    ) -> Result<bool> {
        let client = self.manager.client().await?;
        let statement = format!("UPDATE {} SET doc = $1 WHERE pk = $2", collection.quoted());

        let updated = client
            .execute(&statement, &[&Json(doc), &key.get()])
            .await
            .map_err(|e| write_error("postgres_update_row", collection, doc, &e))?;
        Ok(updated > 0)
    }

    async fn replace_row_if_unchanged(
        &self,
        collection: &CollectionName,
        key: RowKey,
        expected: &Document,
        doc: &Document,
    ) -> Result<bool> {
        let client = self.manager.client().await?;
        let statement = format!(
            "UPDATE {} SET doc = $1 WHERE pk = $2 AND doc = $3",
            collection.quoted()
        );

        let updated = client
            .execute(&statement, &[&Json(doc), &key.get(), &Json(expected)])
            .await
            .map_err(|e| write_error("postgres_replace_row", collection, doc, &e))?;
        Ok(updated > 0)
    }

    async fn delete_row(&self, collection: &CollectionName, key: RowKey) -> Result<bool> {
        let client = self.manager.client().await?;
        let statement = format!("DELETE FROM {} WHERE pk = $1", collection.quoted());

        let deleted = client
            .execute(&statement, &[&key.get()])
            .await
            .map_err(|e| query_error("postgres_delete_row", e))?;
        Ok(deleted > 0)
    }

    async fn close(&self) {
        self.manager.close();
        self.provisioner.reset().await;
    }
}
