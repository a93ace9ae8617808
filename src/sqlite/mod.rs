// SQLite provider: a rusqlite database pooled with bb8.
//
// - config: options, DSN parsing and the bb8 connection manager
// - params: parameter conversion to rusqlite values
// - query: blocking execution and result extraction
// - connection / transaction: the backend trait implementations

pub mod config;
pub mod connection;
pub mod params;
pub mod query;
pub mod transaction;

use std::sync::Arc;

use crate::backend::ConnectionBackend;
use crate::error::SqlFluentError;
use crate::registry::{self, ProviderRegistry};

pub use config::{SqliteManager, SqliteOptions};
pub use connection::SqliteDb;
pub use query::build_result_set;
pub use transaction::SqliteTx;

/// Provider name the adapter registers under.
pub const PROVIDER: &str = "sqlite";

/// Driver names this provider accepts.
pub const DRIVERS: [&str; 2] = ["sqlite3", "sqlite"];

/// Provider factory: open `dsn` with the named driver.
///
/// # Errors
///
/// Returns `ConfigError` for another driver or an empty DSN, otherwise connection errors.
pub async fn open_backend(
    driver: String,
    dsn: String,
) -> Result<Arc<dyn ConnectionBackend>, SqlFluentError> {
    if !DRIVERS.iter().any(|d| d.eq_ignore_ascii_case(driver.trim())) {
        return Err(SqlFluentError::ConfigError(format!(
            "provider `{PROVIDER}` does not support driver `{driver}`"
        )));
    }
    let options = SqliteOptions::from_dsn(&dsn)?;
    let db = SqliteDb::open(&driver, options).await?;
    Ok(Arc::new(db))
}

/// Register the provider in `registry`.
///
/// # Errors
///
/// Returns `ProviderAlreadyRegistered` if the name is taken.
pub fn register(registry: &ProviderRegistry) -> Result<(), SqlFluentError> {
    registry.register(PROVIDER, open_backend)
}

/// Register the provider in the process-wide registry.
///
/// # Errors
///
/// Returns `ProviderAlreadyRegistered` if the name is taken.
pub fn register_global() -> Result<(), SqlFluentError> {
    registry::register_provider(PROVIDER, open_backend)
}
