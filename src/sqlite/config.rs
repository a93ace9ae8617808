use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bb8::{ManageConnection, Pool};
use tokio::sync::Mutex;

use crate::context::Context;
use crate::error::SqlFluentError;

use super::query::run_blocking;

/// Pool size used when none has been requested.
pub const DEFAULT_MAX_OPEN: u32 = 8;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A rusqlite connection plus the handle used to interrupt it from another thread.
pub struct SqliteHandle {
    pub(crate) conn: Mutex<rusqlite::Connection>,
    pub(crate) interrupt: rusqlite::InterruptHandle,
}

impl fmt::Debug for SqliteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteHandle").finish_non_exhaustive()
    }
}

pub type SharedSqliteConnection = Arc<SqliteHandle>;

/// Options for opening a `SQLite` database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteOptions {
    pub db_path: String,
    pub busy_timeout: Duration,
    pub max_open: u32,
    pub max_idle: u32,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            max_open: DEFAULT_MAX_OPEN,
            max_idle: 0,
        }
    }

    /// Parse a DSN: a file path, optionally prefixed with `file:`, or `:memory:`.
    ///
    /// # Errors
    ///
    /// Returns `SqlFluentError::ConfigError` for an empty path.
    pub fn from_dsn(dsn: &str) -> Result<Self, SqlFluentError> {
        let path = dsn.trim();
        let path = path.strip_prefix("file:").unwrap_or(path);
        if path.is_empty() {
            return Err(SqlFluentError::ConfigError(
                "sqlite DSN must name a database file".into(),
            ));
        }
        Ok(Self::new(path))
    }

    #[must_use]
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Each connection to `:memory:` sees its own empty database.
    #[must_use]
    pub fn is_memory(&self) -> bool {
        self.db_path == ":memory:"
    }

    /// Pool size after applying the single-connection rule for `:memory:`.
    #[must_use]
    pub fn effective_max_open(&self) -> u32 {
        if self.is_memory() {
            1
        } else if self.max_open == 0 {
            DEFAULT_MAX_OPEN
        } else {
            self.max_open
        }
    }

    pub(crate) fn build_pool(&self) -> Pool<SqliteManager> {
        let max_open = self.effective_max_open();
        let min_idle = (self.max_idle > 0).then(|| self.max_idle.min(max_open));
        Pool::builder()
            .max_size(max_open)
            .min_idle(min_idle)
            .build_unchecked(SqliteManager::new(self))
    }
}

pub(crate) fn open_connection(
    path: &str,
    busy_timeout: Duration,
) -> Result<SharedSqliteConnection, SqlFluentError> {
    let conn = rusqlite::Connection::open(path)?;
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    let interrupt = conn.get_interrupt_handle();
    Ok(Arc::new(SqliteHandle {
        conn: Mutex::new(conn),
        interrupt,
    }))
}

/// bb8 manager for `SQLite` connections.
#[derive(Debug, Clone)]
pub struct SqliteManager {
    path: Arc<str>,
    busy_timeout: Duration,
}

impl SqliteManager {
    #[must_use]
    pub fn new(options: &SqliteOptions) -> Self {
        Self {
            path: Arc::from(options.db_path.as_str()),
            busy_timeout: options.busy_timeout,
        }
    }
}

impl ManageConnection for SqliteManager {
    type Connection = SharedSqliteConnection;
    type Error = SqlFluentError;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let path = Arc::clone(&self.path);
        let busy_timeout = self.busy_timeout;
        async move {
            tokio::task::spawn_blocking(move || open_connection(&path, busy_timeout))
                .await
                .map_err(|e| {
                    SqlFluentError::ConnectionError(format!("sqlite open join error: {e}"))
                })?
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let shared = Arc::clone(conn);
        async move {
            run_blocking(shared, &Context::background(), |conn| {
                conn.query_row("SELECT 1", [], |_| Ok(()))?;
                Ok(())
            })
            .await
        }
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dsn_accepts_file_prefix() {
        let opts = SqliteOptions::from_dsn("file:/tmp/notes.db").unwrap();
        assert_eq!(opts.db_path, "/tmp/notes.db");
        assert!(!opts.is_memory());
        assert_eq!(opts.effective_max_open(), DEFAULT_MAX_OPEN);
    }

    #[test]
    fn memory_databases_use_one_connection() {
        let mut opts = SqliteOptions::from_dsn(":memory:").unwrap();
        opts.max_open = 20;
        assert_eq!(opts.effective_max_open(), 1);
    }

    #[test]
    fn empty_dsn_is_rejected() {
        assert!(matches!(
            SqliteOptions::from_dsn("  "),
            Err(SqlFluentError::ConfigError(_))
        ));
    }
}
