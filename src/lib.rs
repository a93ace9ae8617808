//! Fluent, tiered query builder over pluggable async database providers.
//!
//! A provider is registered once under a name, then sessions are opened through it:
//!
//! ```rust,no_run
//! use sql_fluent::prelude::*;
//!
//! # async fn demo() -> Result<(), SqlFluentError> {
//! let registry = ProviderRegistry::new();
//! sql_fluent::sqlite::register(&registry)?;
//! let db = registry.open("sqlite", "sqlite3", "/tmp/notes.db").await?;
//!
//! let cx = Context::background();
//! let titles: Vec<String> = db
//!     .table("notes")
//!     .where_in("id", (1, 2, 3))
//!     .fetch_column(&cx, "title")
//!     .await?
//!     .scan_all()
//!     .await?;
//! # let _ = titles;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod binder;
pub mod config;
pub mod context;
pub mod error;
pub mod prelude;
pub mod query;
pub mod query_builder;
pub mod record;
pub mod registry;
pub mod results;
pub mod session;
pub mod translation;
pub mod types;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "test-utils")]
pub mod conformance;

#[cfg(test)]
mod testing;

pub use binder::{IntoAssignments, IntoParams};
pub use config::{Config, Driver};
pub use context::Context;
pub use error::{Operation, ScanError, SqlFluentError};
pub use query::QueryAndParams;
pub use query_builder::{Aggregated, Conditioned, Tabled};
pub use record::Record;
pub use registry::{ProviderFactory, ProviderRegistry, open, register_provider};
pub use results::{Cursor, CustomDbRow, ResultSet, Row, Shape};
pub use session::{Db, Queryable, Tx};
pub use types::RowValues;
