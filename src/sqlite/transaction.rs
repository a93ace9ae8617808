use std::sync::Arc;

use async_trait::async_trait;
use bb8::PooledConnection;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::backend::{BufferedRows, ExecOutcome, Executor, RowStream, TransactionBackend};
use crate::context::Context;
use crate::error::SqlFluentError;
use crate::translation::PlaceholderStyle;
use crate::types::RowValues;

use super::config::{SharedSqliteConnection, SqliteManager};
use super::query::{batch_on, execute_on, query_on};

type Pooled = PooledConnection<'static, SqliteManager>;

/// Transaction that owns its pooled `SQLite` connection until commit or rollback.
///
/// Dropping it unfinished spawns a best-effort rollback on the current runtime before the
/// connection goes back to the pool.
pub struct SqliteTx {
    conn: SharedSqliteConnection,
    pooled: Mutex<Option<Pooled>>,
}

impl std::fmt::Debug for SqliteTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTx").finish_non_exhaustive()
    }
}

impl SqliteTx {
    /// Start an immediate transaction on `pooled`.
    ///
    /// # Errors
    ///
    /// Returns `SqlFluentError` if `BEGIN` fails; the connection is returned to the pool.
    pub(crate) async fn begin(pooled: Pooled, cx: &Context) -> Result<Self, SqlFluentError> {
        let conn = Arc::clone(&*pooled);
        batch_on(Arc::clone(&conn), cx, "BEGIN IMMEDIATE;").await?;
        debug!("sqlite transaction started");
        Ok(Self {
            conn,
            pooled: Mutex::new(Some(pooled)),
        })
    }

    async fn finish(&self, cx: &Context, sql: &'static str) -> Result<(), SqlFluentError> {
        let pooled = self.pooled.lock().await.take().ok_or_else(|| {
            SqlFluentError::TransactionStateError("sqlite transaction already completed".into())
        })?;
        let result = batch_on(Arc::clone(&self.conn), cx, sql).await;
        if result.is_err() && sql.starts_with("COMMIT") {
            // leave the connection clean before it returns to the pool
            if let Err(err) =
                batch_on(Arc::clone(&self.conn), &Context::background(), "ROLLBACK;").await
            {
                warn!(error = %err, "rollback after failed commit did not complete");
            }
        }
        drop(pooled);
        result
    }

    /// Hand `pooled` back after a rollback, on the current runtime when there is one.
    fn release_with_rollback(conn: SharedSqliteConnection, pooled: Pooled) {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(err) = batch_on(conn, &Context::background(), "ROLLBACK;").await {
                    warn!(error = %err, "rollback of abandoned sqlite transaction failed");
                }
                drop(pooled);
            });
        } else {
            if let Err(err) = conn.conn.blocking_lock().execute_batch("ROLLBACK;") {
                warn!(error = %err, "rollback of abandoned sqlite transaction failed");
            }
            drop(pooled);
        }
    }

    async fn ensure_open(&self) -> Result<(), SqlFluentError> {
        if self.pooled.lock().await.is_none() {
            return Err(SqlFluentError::TransactionStateError(
                "sqlite transaction already completed".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Executor for SqliteTx {
    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Sqlite
    }

    async fn query(
        &self,
        cx: &Context,
        sql: &str,
        params: &[RowValues],
    ) -> Result<Box<dyn RowStream>, SqlFluentError> {
        self.ensure_open().await?;
        let result_set = query_on(Arc::clone(&self.conn), cx, sql, params).await?;
        Ok(Box::new(BufferedRows::new(result_set)))
    }

    async fn execute(
        &self,
        cx: &Context,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ExecOutcome, SqlFluentError> {
        self.ensure_open().await?;
        execute_on(Arc::clone(&self.conn), cx, sql, params).await
    }
}

#[async_trait]
impl TransactionBackend for SqliteTx {
    fn as_executor(&self) -> &dyn Executor {
        self
    }

    async fn commit(&self, cx: &Context) -> Result<(), SqlFluentError> {
        self.finish(cx, "COMMIT;").await
    }

    async fn rollback(&self, cx: &Context) -> Result<(), SqlFluentError> {
        self.finish(cx, "ROLLBACK;").await
    }

    fn abandon(&self) {
        // a commit or rollback already holding the lock finishes the transaction itself
        let Ok(mut slot) = self.pooled.try_lock() else {
            return;
        };
        if let Some(pooled) = slot.take() {
            debug!("sqlite transaction abandoned; rolling back");
            Self::release_with_rollback(Arc::clone(&self.conn), pooled);
        }
    }
}

impl Drop for SqliteTx {
    fn drop(&mut self) {
        let Some(pooled) = self.pooled.get_mut().take() else {
            return;
        };
        warn!("sqlite transaction dropped while open; rolling back");
        Self::release_with_rollback(Arc::clone(&self.conn), pooled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::config::SqliteOptions;

    #[tokio::test]
    async fn failed_commit_leaves_the_connection_clean() {
        let dir = tempfile::tempdir().unwrap();
        let mut options =
            SqliteOptions::new(dir.path().join("fk.db").to_string_lossy().into_owned());
        options.max_open = 1;
        let pool = options.build_pool();
        let cx = Context::background();

        let pooled = pool.get_owned().await.unwrap();
        let conn = Arc::clone(&*pooled);
        batch_on(
            Arc::clone(&conn),
            &cx,
            "PRAGMA foreign_keys = ON;
             CREATE TABLE parent (id INTEGER PRIMARY KEY);
             CREATE TABLE child (pid INTEGER REFERENCES parent(id) DEFERRABLE INITIALLY DEFERRED);",
        )
        .await
        .unwrap();

        let tx = SqliteTx::begin(pooled, &cx).await.unwrap();
        tx.execute(&cx, "INSERT INTO child (pid) VALUES (?1)", &[RowValues::Int(99)])
            .await
            .unwrap();
        let err = tx.commit(&cx).await.unwrap_err();
        assert!(matches!(err, SqlFluentError::SqliteError(_)), "{err}");
        assert!(conn.conn.lock().await.is_autocommit());
        assert!(matches!(
            tx.rollback(&cx).await,
            Err(SqlFluentError::TransactionStateError(_))
        ));

        // the single pooled connection can start a fresh transaction
        let next = SqliteTx::begin(pool.get_owned().await.unwrap(), &cx).await.unwrap();
        next.rollback(&cx).await.unwrap();
    }
}
