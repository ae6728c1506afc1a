//! Storage layer.
//!
//! Collections persist documents through the [`RowStore`] trait:
//! - **PostgreSQL** ([`postgres`]): one JSONB table per collection, pooled connections
//! - **Memory** ([`memory`]): in-process tables with the same uniqueness and provisioning rules
//!
//! [`dsn`] validates and sanitises connection strings before they reach the pool.

// Guards and pooled connections live for a whole statement.
#![allow(clippy::significant_drop_tightening)]

pub mod dsn;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod traits;

pub use memory::MemoryRowStore;
pub use traits::RowStore;
