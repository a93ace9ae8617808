use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use crate::backend::{ConnectionBackend, ExecOutcome, Executor, TransactionBackend};
use crate::binder::IntoParams;
use crate::context::Context;
use crate::error::{Operation, SqlFluentError};
use crate::query_builder::{Query, Tabled};
use crate::results::{Cursor, Shape};
use crate::translation::translate_placeholders;

const RAW_TARGET: &str = "raw sql";

/// Anything a query can be started from.
pub trait Queryable {
    /// Start a fresh query against `name`.
    fn table(&self, name: &str) -> Tabled;
}

/// Where a built query is dispatched.
#[derive(Clone)]
pub(crate) enum Handle {
    Connection(Arc<dyn ConnectionBackend>),
    Transaction(Arc<TxShared>),
}

impl Handle {
    /// The executor to dispatch to, refusing finalized transactions.
    pub(crate) fn executor(&self) -> Result<&dyn Executor, SqlFluentError> {
        match self {
            Handle::Connection(backend) => Ok(backend.as_executor()),
            Handle::Transaction(tx) => {
                tx.ensure_active()?;
                Ok(tx.backend.as_executor())
            }
        }
    }
}

async fn exec_raw(
    executor: &dyn Executor,
    cx: &Context,
    sql: &str,
    args: impl IntoParams,
) -> Result<ExecOutcome, SqlFluentError> {
    let params = args.into_params();
    let sql = translate_placeholders(sql, executor.placeholder_style());
    debug!(op = %Operation::Raw, sql = %sql, params = params.len(), "executing statement");
    executor
        .execute(cx, &sql, &params)
        .await
        .map_err(|e| e.in_operation(Operation::Raw, RAW_TARGET))
}

async fn query_raw(
    executor: &dyn Executor,
    cx: &Context,
    sql: &str,
    args: impl IntoParams,
) -> Result<Cursor, SqlFluentError> {
    let params = args.into_params();
    let sql = translate_placeholders(sql, executor.placeholder_style());
    debug!(op = %Operation::Raw, sql = %sql, params = params.len(), "running query");
    let stream = executor
        .query(cx, &sql, &params)
        .await
        .map_err(|e| e.in_operation(Operation::Raw, RAW_TARGET))?;
    Ok(Cursor::new(stream, cx.clone(), Shape::PositionalScan, RAW_TARGET))
}

/// A connection session returned by [`crate::registry::open`].
///
/// Cheap to clone; clones share the same backend connection pool.
#[derive(Clone)]
pub struct Db {
    provider: Arc<str>,
    backend: Arc<dyn ConnectionBackend>,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("provider", &self.provider)
            .field("driver", &self.backend.driver_name())
            .finish()
    }
}

impl Db {
    #[must_use]
    pub fn new(provider: &str, backend: Arc<dyn ConnectionBackend>) -> Self {
        Self {
            provider: Arc::from(provider),
            backend,
        }
    }

    /// Start a fresh query against `name`.
    pub fn table(&self, name: &str) -> Tabled {
        Tabled::new(Query::new(
            Handle::Connection(Arc::clone(&self.backend)),
            name,
        ))
    }

    /// Begin a transaction. Its writes stay invisible to other sessions until commit.
    ///
    /// # Errors
    ///
    /// Returns wrapped backend errors.
    pub async fn begin(&self, cx: &Context) -> Result<Tx, SqlFluentError> {
        debug!(provider = %self.provider, "beginning transaction");
        let backend = self
            .backend
            .begin(cx)
            .await
            .map_err(|e| e.in_operation(Operation::Begin, RAW_TARGET))?;
        Ok(Tx {
            shared: Arc::new(TxShared {
                backend,
                finished: AtomicBool::new(false),
            }),
        })
    }

    /// Execute a statement that returns no rows.
    ///
    /// # Errors
    ///
    /// Returns wrapped backend errors.
    pub async fn exec(
        &self,
        cx: &Context,
        sql: &str,
        args: impl IntoParams,
    ) -> Result<ExecOutcome, SqlFluentError> {
        exec_raw(self.backend.as_executor(), cx, sql, args).await
    }

    /// Run a statement and return a positional cursor over its rows.
    ///
    /// # Errors
    ///
    /// Returns wrapped backend errors.
    pub async fn query(
        &self,
        cx: &Context,
        sql: &str,
        args: impl IntoParams,
    ) -> Result<Cursor, SqlFluentError> {
        query_raw(self.backend.as_executor(), cx, sql, args).await
    }

    /// # Errors
    ///
    /// Returns `ConnectionError` if the database is unreachable or the session is closed.
    pub async fn ping(&self, cx: &Context) -> Result<(), SqlFluentError> {
        self.backend.ping(cx).await
    }

    /// Close the session; later calls fail with `ConnectionError`.
    ///
    /// # Errors
    ///
    /// Returns the backend's error from shutting down.
    pub async fn close(&self) -> Result<(), SqlFluentError> {
        debug!(provider = %self.provider, "closing session");
        self.backend.close().await
    }

    pub fn set_max_open_conns(&self, max: usize) {
        self.backend.set_max_open_conns(max);
    }

    pub fn set_max_idle_conns(&self, max: usize) {
        self.backend.set_max_idle_conns(max);
    }

    #[must_use]
    pub fn driver_name(&self) -> &str {
        self.backend.driver_name()
    }

    #[must_use]
    pub fn provider_name(&self) -> &str {
        &self.provider
    }

    /// The backend handle, for adapter-specific calls.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn ConnectionBackend> {
        &self.backend
    }
}

impl Queryable for Db {
    fn table(&self, name: &str) -> Tabled {
        Db::table(self, name)
    }
}

pub(crate) struct TxShared {
    backend: Arc<dyn TransactionBackend>,
    finished: AtomicBool,
}

impl TxShared {
    fn ensure_active(&self) -> Result<(), SqlFluentError> {
        if self.finished.load(Ordering::Acquire) {
            return Err(SqlFluentError::TransactionStateError(
                "transaction already committed or rolled back".into(),
            ));
        }
        Ok(())
    }

    /// Mark finished; only the first caller wins.
    fn finish(&self) -> Result<(), SqlFluentError> {
        if self.finished.swap(true, Ordering::AcqRel) {
            return Err(SqlFluentError::TransactionStateError(
                "transaction already committed or rolled back".into(),
            ));
        }
        Ok(())
    }
}

/// A transaction session.
///
/// Queries built from a `Tx` keep a handle to it; once [`Tx::commit`] or [`Tx::rollback`] has
/// been called, every further use fails with `TransactionStateError`. Dropping an unfinished
/// `Tx` rolls it back and finalizes those queries too.
pub struct Tx {
    shared: Arc<TxShared>,
}

impl std::fmt::Debug for Tx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tx")
            .field("finished", &self.is_finalized())
            .finish()
    }
}

impl Tx {
    /// Start a fresh query against `name` inside this transaction.
    pub fn table(&self, name: &str) -> Tabled {
        Tabled::new(Query::new(
            Handle::Transaction(Arc::clone(&self.shared)),
            name,
        ))
    }

    /// # Errors
    ///
    /// Returns `TransactionStateError` once finalized, otherwise wrapped backend errors.
    pub async fn exec(
        &self,
        cx: &Context,
        sql: &str,
        args: impl IntoParams,
    ) -> Result<ExecOutcome, SqlFluentError> {
        self.shared.ensure_active()?;
        exec_raw(self.shared.backend.as_executor(), cx, sql, args).await
    }

    /// # Errors
    ///
    /// Returns `TransactionStateError` once finalized, otherwise wrapped backend errors.
    pub async fn query(
        &self,
        cx: &Context,
        sql: &str,
        args: impl IntoParams,
    ) -> Result<Cursor, SqlFluentError> {
        self.shared.ensure_active()?;
        query_raw(self.shared.backend.as_executor(), cx, sql, args).await
    }

    /// Make the transaction's writes visible.
    ///
    /// # Errors
    ///
    /// Returns `TransactionStateError` if already finalized, otherwise wrapped backend errors.
    /// The transaction counts as finalized even when the commit itself fails.
    pub async fn commit(&self, cx: &Context) -> Result<(), SqlFluentError> {
        self.shared.finish()?;
        debug!("committing transaction");
        self.shared
            .backend
            .commit(cx)
            .await
            .map_err(|e| e.in_operation(Operation::Commit, RAW_TARGET))
    }

    /// Discard the transaction's writes.
    ///
    /// # Errors
    ///
    /// Returns `TransactionStateError` if already finalized, otherwise wrapped backend errors.
    pub async fn rollback(&self, cx: &Context) -> Result<(), SqlFluentError> {
        self.shared.finish()?;
        debug!("rolling back transaction");
        self.shared
            .backend
            .rollback(cx)
            .await
            .map_err(|e| e.in_operation(Operation::Rollback, RAW_TARGET))
    }

    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.shared.finished.load(Ordering::Acquire)
    }
}

impl Drop for Tx {
    fn drop(&mut self) {
        if self.shared.finish().is_ok() {
            warn!("transaction dropped without commit or rollback; rolling back");
            self.shared.backend.abandon();
        }
    }
}

impl Queryable for Tx {
    fn table(&self, name: &str) -> Tabled {
        Tx::table(self, name)
    }
}
