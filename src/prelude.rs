//! Convenient imports for common functionality.
//!
//! ```rust
//! use sql_fluent::prelude::*;
//! ```

pub use crate::backend::{ConnectionBackend, ExecOutcome, Executor, RowStream, TransactionBackend};
pub use crate::binder::{IntoAssignments, IntoParams};
pub use crate::config::{Config, Driver};
pub use crate::context::Context;
pub use crate::error::{Operation, ScanError, SqlFluentError};
pub use crate::query::QueryAndParams;
pub use crate::query_builder::{Aggregated, Conditioned, Tabled};
pub use crate::record::Record;
pub use crate::registry::{ProviderFactory, ProviderRegistry, open, register_provider};
pub use crate::results::{Cursor, CustomDbRow, ResultSet, Row, Shape};
pub use crate::session::{Db, Queryable, Tx};
pub use crate::translation::{PlaceholderStyle, translate_placeholders};
pub use crate::types::RowValues;

#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteDb, SqliteOptions};
