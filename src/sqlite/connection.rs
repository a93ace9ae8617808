use std::fmt;
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use tracing::{debug, warn};

use crate::backend::{
    BufferedRows, ConnectionBackend, ExecOutcome, Executor, RowStream, TransactionBackend,
};
use crate::context::Context;
use crate::error::SqlFluentError;
use crate::translation::PlaceholderStyle;
use crate::types::RowValues;

use super::config::{SqliteManager, SqliteOptions};
use super::query::{execute_on, query_on, run_blocking};
use super::transaction::SqliteTx;

struct PoolState {
    options: SqliteOptions,
    /// `None` once the session is closed.
    pool: Option<Pool<SqliteManager>>,
}

/// A pooled `SQLite` database behind the connection backend traits.
pub struct SqliteDb {
    driver: String,
    state: RwLock<PoolState>,
}

impl fmt::Debug for SqliteDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("SqliteDb")
            .field("driver", &self.driver)
            .field("options", &state.options)
            .field("closed", &state.pool.is_none())
            .finish()
    }
}

impl SqliteDb {
    /// Open the database and check that a connection can be made.
    ///
    /// # Errors
    ///
    /// Returns `SqlFluentError` if the first connection cannot be opened.
    pub async fn open(driver: &str, options: SqliteOptions) -> Result<Self, SqlFluentError> {
        if options.is_memory() {
            warn!(
                "sqlite :memory: database is limited to one pooled connection; \
                 a transaction holds it until finished"
            );
        }
        let pool = options.build_pool();
        let db = Self {
            driver: driver.to_string(),
            state: RwLock::new(PoolState {
                options,
                pool: Some(pool),
            }),
        };
        db.ping(&Context::background()).await?;
        Ok(db)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, PoolState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, PoolState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn pool(&self) -> Result<Pool<SqliteManager>, SqlFluentError> {
        self.read()
            .pool
            .clone()
            .ok_or_else(|| SqlFluentError::ConnectionError("sqlite session is closed".into()))
    }

    pub(crate) async fn checkout(
        &self,
        cx: &Context,
    ) -> Result<PooledConnection<'static, SqliteManager>, SqlFluentError> {
        let pool = self.pool()?;
        cx.run(async move { pool.get_owned().await.map_err(SqlFluentError::from) })
            .await
    }

    /// Apply new pool limits by replacing the pool; connections in use finish on the old one.
    fn resize(&self, edit: impl FnOnce(&mut SqliteOptions)) {
        let mut state = self.write();
        edit(&mut state.options);
        if state.pool.is_none() {
            return;
        }
        if state.options.is_memory() {
            debug!("pool limits ignored for sqlite :memory: database");
            return;
        }
        state.pool = Some(state.options.build_pool());
        debug!(
            max_open = state.options.effective_max_open(),
            max_idle = state.options.max_idle,
            "rebuilt sqlite pool"
        );
    }

    #[must_use]
    pub fn options(&self) -> SqliteOptions {
        self.read().options.clone()
    }
}

#[async_trait]
impl Executor for SqliteDb {
    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Sqlite
    }

    async fn query(
        &self,
        cx: &Context,
        sql: &str,
        params: &[RowValues],
    ) -> Result<Box<dyn RowStream>, SqlFluentError> {
        let conn = self.checkout(cx).await?;
        let result_set = query_on(Arc::clone(&*conn), cx, sql, params).await?;
        Ok(Box::new(BufferedRows::new(result_set)))
    }

    async fn execute(
        &self,
        cx: &Context,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ExecOutcome, SqlFluentError> {
        let conn = self.checkout(cx).await?;
        execute_on(Arc::clone(&*conn), cx, sql, params).await
    }
}

#[async_trait]
impl ConnectionBackend for SqliteDb {
    fn as_executor(&self) -> &dyn Executor {
        self
    }

    fn driver_name(&self) -> &str {
        &self.driver
    }

    async fn begin(&self, cx: &Context) -> Result<Arc<dyn TransactionBackend>, SqlFluentError> {
        let conn = self.checkout(cx).await?;
        let tx = SqliteTx::begin(conn, cx).await?;
        Ok(Arc::new(tx))
    }

    async fn ping(&self, cx: &Context) -> Result<(), SqlFluentError> {
        let conn = self.checkout(cx).await?;
        run_blocking(Arc::clone(&*conn), cx, |conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<(), SqlFluentError> {
        let pool = self.write().pool.take();
        if pool.is_some() {
            debug!(path = %self.read().options.db_path, "closed sqlite pool");
        }
        Ok(())
    }

    fn set_max_open_conns(&self, max: usize) {
        let max = u32::try_from(max).unwrap_or(u32::MAX);
        self.resize(|options| options.max_open = max);
    }

    fn set_max_idle_conns(&self, max: usize) {
        let max = u32::try_from(max).unwrap_or(u32::MAX);
        self.resize(|options| options.max_idle = max);
    }
}
