//! Table provisioning for collections.
//!
//! Each collection gets one table with an auto-incrementing physical key and
//! a JSONB document column, plus two expression indexes:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS "{table}" (pk BIGSERIAL PRIMARY KEY, doc JSONB NOT NULL);
//! CREATE UNIQUE INDEX IF NOT EXISTS "uq_{table}_id" ON "{table}" ((doc->>'id')) WHERE doc ? 'id';
//! CREATE INDEX IF NOT EXISTS "idx_{table}_created_at" ON "{table}" ((doc->>'created_at'));
//! ```
//!
//! Every statement is idempotent, so provisioning again after
//! [`TableProvisioner::reset`] is harmless.

use super::pool::PgConnectionManager;
use crate::models::CollectionName;
use crate::{Error, Result};
use std::collections::HashSet;
use tokio::sync::Mutex;

/// One DDL statement run when a table is provisioned.
#[derive(Debug, Clone, Copy)]
pub struct ProvisionStep {
    /// Human-readable description.
    pub description: &'static str,
    /// SQL to run. `{table}` is replaced by the table name.
    pub sql: &'static str,
}

/// Statements that bring a collection's table into existence.
pub const PROVISION_STEPS: &[ProvisionStep] = &[
    ProvisionStep {
        description: "Document table",
        sql: r#"CREATE TABLE IF NOT EXISTS "{table}" (
                pk BIGSERIAL PRIMARY KEY,
                doc JSONB NOT NULL
            )"#,
    },
    ProvisionStep {
        description: "Unique logical id index",
        sql: r#"CREATE UNIQUE INDEX IF NOT EXISTS "uq_{table}_id"
                ON "{table}" ((doc->>'id'))
                WHERE doc ? 'id'"#,
    },
    ProvisionStep {
        description: "created_at index",
        sql: r#"CREATE INDEX IF NOT EXISTS "idx_{table}_created_at"
                ON "{table}" ((doc->>'created_at'))"#,
    },
];

/// Renders the provisioning statements for one collection.
#[must_use]
pub fn provision_statements(collection: &CollectionName) -> Vec<String> {
    PROVISION_STEPS
        .iter()
        .map(|step| step.sql.replace("{table}", collection.as_str()))
        .collect()
}

/// Creates collection tables on first use and remembers which exist.
///
/// The memo is guarded by an async mutex held across the DDL round trips,
/// so concurrent first uses of a collection provision it once.
#[derive(Debug, Default)]
pub struct TableProvisioner {
    ensured: Mutex<HashSet<CollectionName>>,
}

impl TableProvisioner {
    /// Creates a provisioner with an empty memo.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Provisions the table for `collection` unless already done.
    ///
    /// All statements run in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if a connection cannot be checked
    /// out or a statement fails.
    pub async fn ensure(
        &self,
        manager: &PgConnectionManager,
        collection: &CollectionName,
    ) -> Result<()> {
        let mut ensured = self.ensured.lock().await;
        if ensured.contains(collection) {
            return Ok(());
        }

        let mut client = manager.client().await?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| Error::operation("provision_begin_tx", e))?;

        for (step, statement) in PROVISION_STEPS.iter().zip(provision_statements(collection)) {
            tx.execute(statement.as_str(), &[])
                .await
                .map_err(|e| Error::OperationFailed {
                    operation: format!("provision_{}: {}", collection, step.description),
                    cause: e.to_string(),
                })?;
        }

        tx.commit()
            .await
            .map_err(|e| Error::operation("provision_commit", e))?;

        ensured.insert(collection.clone());
        metrics::counter!("pgdoc_tables_provisioned_total").increment(1);
        tracing::info!(table = %collection, "Provisioned collection table");
        Ok(())
    }

    /// Returns whether `collection` has been provisioned since the last reset.
    pub async fn is_ensured(&self, collection: &CollectionName) -> bool {
        self.ensured.lock().await.contains(collection)
    }

    /// Forgets every provisioned table.
    pub async fn reset(&self) {
        self.ensured.lock().await.clear();
    }
}
