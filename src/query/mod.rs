//! In-memory query engines.
//!
//! The backing store only persists rows, so everything a document database
//! would evaluate server-side happens here, over deserialized documents:
//!
//! - [`filter`]: query matcher
//! - [`update`]: update applier
//! - [`projection`]: field inclusion/exclusion
//! - [`sort`]: stable multi-key ordering
//! - [`expr`] and [`aggregate`]: pipeline expressions and stages
//!
//! Every expression is parsed once into a closed enum before evaluation, so
//! unknown operators are handled at parse time according to each engine's
//! policy (filters fail closed, updates fail open, pipelines fail loudly).

pub mod aggregate;
pub mod expr;
pub mod filter;
pub mod path;
pub mod projection;
pub mod sort;
pub mod update;
pub mod value;

pub use aggregate::{GroupSpec, Pipeline, Stage, aggregate};
pub use expr::Expr;
pub use filter::{Filter, matches};
pub use path::{get_path, remove_path, set_path};
pub use projection::{Projection, project};
pub use sort::{SortSpec, compare_values};
pub use update::{Update, UpdateOp, apply};
