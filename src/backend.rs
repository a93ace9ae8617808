//! Capability traits a database adapter implements to sit behind the builder.
//!
//! The core only ever talks to `dyn ConnectionBackend` / `dyn TransactionBackend`; concrete
//! adapters (see `crate::sqlite`) are plugged in through the provider registry.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::SqlFluentError;
use crate::query::render;
use crate::query_builder::QueryState;
use crate::results::{CustomDbRow, ResultSet};
use crate::translation::PlaceholderStyle;
use crate::types::RowValues;

/// A pull-based stream of rows owned by a cursor.
#[async_trait]
pub trait RowStream: Send {
    fn columns(&self) -> Arc<Vec<String>>;

    /// Next row, or `None` once the result is exhausted.
    async fn next_row(&mut self, cx: &Context) -> Result<Option<CustomDbRow>, SqlFluentError>;

    /// Release the underlying result. Must be safe to call more than once.
    async fn close(&mut self) -> Result<(), SqlFluentError>;
}

/// `RowStream` over an already materialized `ResultSet`.
#[derive(Debug)]
pub struct BufferedRows {
    columns: Arc<Vec<String>>,
    rows: std::vec::IntoIter<CustomDbRow>,
}

impl BufferedRows {
    #[must_use]
    pub fn new(result_set: ResultSet) -> Self {
        let columns = result_set
            .get_column_names()
            .cloned()
            .unwrap_or_default();
        Self {
            columns,
            rows: result_set.results.into_iter(),
        }
    }
}

#[async_trait]
impl RowStream for BufferedRows {
    fn columns(&self) -> Arc<Vec<String>> {
        Arc::clone(&self.columns)
    }

    async fn next_row(&mut self, cx: &Context) -> Result<Option<CustomDbRow>, SqlFluentError> {
        cx.check()?;
        Ok(self.rows.next())
    }

    async fn close(&mut self) -> Result<(), SqlFluentError> {
        self.rows = Vec::new().into_iter();
        Ok(())
    }
}

/// Result of a statement that does not return rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub rows_affected: usize,
    /// Row id generated by an insert, when the backend reports one.
    pub last_insert_id: Option<i64>,
}

/// Statement execution shared by connections and transactions.
///
/// Adapters implement the two raw methods; the structured operations render a
/// [`QueryState`] for the adapter's placeholder style and delegate to them. Adapters with a
/// native builder can override the structured operations instead.
#[async_trait]
pub trait Executor: Send + Sync {
    fn placeholder_style(&self) -> PlaceholderStyle;

    async fn query(
        &self,
        cx: &Context,
        sql: &str,
        params: &[RowValues],
    ) -> Result<Box<dyn RowStream>, SqlFluentError>;

    async fn execute(
        &self,
        cx: &Context,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ExecOutcome, SqlFluentError>;

    async fn select(
        &self,
        cx: &Context,
        state: &QueryState,
    ) -> Result<Box<dyn RowStream>, SqlFluentError> {
        let stmt = render::select(state, self.placeholder_style())?;
        self.query(cx, &stmt.query, &stmt.params).await
    }

    async fn count(&self, cx: &Context, state: &QueryState) -> Result<i64, SqlFluentError> {
        let stmt = render::count(state, self.placeholder_style())?;
        let mut rows = self.query(cx, &stmt.query, &stmt.params).await?;
        let first = rows.next_row(cx).await;
        rows.close().await?;
        let value = first?
            .and_then(|row| row.get_by_index(0).cloned())
            .unwrap_or(RowValues::Int(0));
        match value {
            RowValues::Int(n) => Ok(n),
            other => Err(SqlFluentError::ExecutionError(format!(
                "COUNT(*) returned {} instead of an integer",
                other.kind()
            ))),
        }
    }

    async fn insert(
        &self,
        cx: &Context,
        table: &str,
        values: &[(String, RowValues)],
    ) -> Result<ExecOutcome, SqlFluentError> {
        let stmt = render::insert(table, values, self.placeholder_style())?;
        self.execute(cx, &stmt.query, &stmt.params).await
    }

    async fn update(
        &self,
        cx: &Context,
        state: &QueryState,
        assignments: &[(String, RowValues)],
    ) -> Result<usize, SqlFluentError> {
        let stmt = render::update(state, assignments, self.placeholder_style())?;
        Ok(self.execute(cx, &stmt.query, &stmt.params).await?.rows_affected)
    }

    async fn delete(&self, cx: &Context, state: &QueryState) -> Result<usize, SqlFluentError> {
        let stmt = render::delete(state, self.placeholder_style())?;
        Ok(self.execute(cx, &stmt.query, &stmt.params).await?.rows_affected)
    }
}

/// An open connection (or pool of connections) to one database.
#[async_trait]
pub trait ConnectionBackend: Executor {
    fn as_executor(&self) -> &dyn Executor;

    /// Driver identifier the session was opened with.
    fn driver_name(&self) -> &str;

    /// Start a transaction with a lifetime independent from this connection.
    async fn begin(&self, cx: &Context) -> Result<Arc<dyn TransactionBackend>, SqlFluentError>;

    async fn ping(&self, cx: &Context) -> Result<(), SqlFluentError>;

    async fn close(&self) -> Result<(), SqlFluentError>;

    /// `0` restores the adapter default.
    fn set_max_open_conns(&self, max: usize);

    fn set_max_idle_conns(&self, max: usize);
}

/// An in-flight transaction.
#[async_trait]
pub trait TransactionBackend: Executor {
    fn as_executor(&self) -> &dyn Executor;

    async fn commit(&self, cx: &Context) -> Result<(), SqlFluentError>;

    async fn rollback(&self, cx: &Context) -> Result<(), SqlFluentError>;

    /// Roll back without waiting; called when the owning session is dropped unfinished.
    ///
    /// Later calls on the backend must fail with `TransactionStateError`.
    fn abandon(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffered_rows_drain_in_order() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let mut rs = ResultSet::with_capacity(2);
            rs.set_column_names(Arc::new(vec!["id".into()]));
            rs.add_row_values(vec![RowValues::Int(1)]);
            rs.add_row_values(vec![RowValues::Int(2)]);
            let mut rows = BufferedRows::new(rs);
            let cx = Context::background();
            assert_eq!(rows.columns().as_slice(), ["id".to_string()]);
            let first = rows.next_row(&cx).await.unwrap().unwrap();
            assert_eq!(first.get("id"), Some(&RowValues::Int(1)));
            rows.close().await.unwrap();
            assert!(rows.next_row(&cx).await.unwrap().is_none());
            rows.close().await.unwrap();
        });
    }
}
