//! PostgreSQL backing store.
//!
//! - [`PgConnectionManager`]: pool lifecycle and connection-string handling
//! - [`TableProvisioner`]: per-collection DDL, memoized
//! - [`PostgresRowStore`]: the [`RowStore`](crate::storage::RowStore) implementation

mod pool;
pub mod provisioner;
mod store;

pub use pool::PgConnectionManager;
pub use provisioner::{PROVISION_STEPS, ProvisionStep, TableProvisioner, provision_statements};
pub use store::PostgresRowStore;
