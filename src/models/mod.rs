//! Data models for pgdoc.
//!
//! Documents, rows and the small value types shared by the query engines and
//! the storage layer.

mod collection_name;
mod document;
mod results;

pub use collection_name::CollectionName;
pub use document::{Document, ID_FIELD, Row, RowKey, into_document, logical_id};
pub use results::{SortDirection, UpdateResult};
pub(crate) use document::kind_of;
