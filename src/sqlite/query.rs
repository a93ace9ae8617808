use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rusqlite::types::Value;
use rusqlite::{Statement, ToSql};

use crate::backend::ExecOutcome;
use crate::context::Context;
use crate::error::SqlFluentError;
use crate::results::ResultSet;
use crate::types::RowValues;

use super::config::SharedSqliteConnection;
use super::params::Params;

/// Run `func` against the connection on the blocking pool.
///
/// When `cx` ends first the running statement is interrupted, and work that has not started
/// yet is skipped.
pub(crate) async fn run_blocking<F, R>(
    conn: SharedSqliteConnection,
    cx: &Context,
    func: F,
) -> Result<R, SqlFluentError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, SqlFluentError> + Send + 'static,
    R: Send + 'static,
{
    cx.check()?;
    let abandoned = Arc::new(AtomicBool::new(false));
    let skip = Arc::clone(&abandoned);
    let handle = Arc::clone(&conn);
    let task = tokio::task::spawn_blocking(move || {
        let mut guard = conn.conn.blocking_lock();
        if skip.load(Ordering::Acquire) {
            return Err(SqlFluentError::Cancelled);
        }
        func(&mut guard)
    });
    cx.run_or_abort(
        async move {
            task.await.map_err(|e| {
                SqlFluentError::ExecutionError(format!("sqlite spawn_blocking join error: {e}"))
            })?
        },
        || {
            abandoned.store(true, Ordering::Release);
            handle.interrupt.interrupt();
        },
    )
    .await
}

/// Extract a `RowValues` from a `SQLite` row.
///
/// # Errors
///
/// Returns `SqlFluentError` if the value cannot be read.
pub fn sqlite_extract_value_sync(
    row: &rusqlite::Row,
    idx: usize,
) -> Result<RowValues, SqlFluentError> {
    let value: Value = row.get(idx)?;
    Ok(match value {
        Value::Null => RowValues::Null,
        Value::Integer(i) => RowValues::Int(i),
        Value::Real(f) => RowValues::Float(f),
        Value::Text(s) => RowValues::Text(s),
        Value::Blob(b) => RowValues::Blob(b),
    })
}

/// Run a prepared statement and buffer every row.
///
/// # Errors
///
/// Returns `SqlFluentError` if execution or value extraction fails.
pub fn build_result_set(
    stmt: &mut Statement,
    params: &[Value],
) -> Result<ResultSet, SqlFluentError> {
    let param_refs: Vec<&dyn ToSql> = params.iter().map(|v| v as &dyn ToSql).collect();
    let column_names: Arc<Vec<String>> = Arc::new(
        stmt.column_names()
            .iter()
            .map(std::string::ToString::to_string)
            .collect(),
    );
    let col_count = column_names.len();

    let mut rows_iter = stmt.query(&param_refs[..])?;
    let mut result_set = ResultSet::with_capacity(10);
    result_set.set_column_names(column_names);

    while let Some(row) = rows_iter.next()? {
        let mut row_values = Vec::with_capacity(col_count);
        for i in 0..col_count {
            row_values.push(sqlite_extract_value_sync(row, i)?);
        }
        result_set.add_row_values(row_values);
    }

    Ok(result_set)
}

/// Statements whose rowid is worth reporting back.
fn reports_rowid(sql: &str) -> bool {
    let head = sql.trim_start();
    let keyword = head.get(..7).unwrap_or(head);
    keyword.eq_ignore_ascii_case("insert ") || keyword.eq_ignore_ascii_case("replace")
}

pub(crate) async fn query_on(
    conn: SharedSqliteConnection,
    cx: &Context,
    sql: &str,
    params: &[RowValues],
) -> Result<ResultSet, SqlFluentError> {
    let values = Params::convert(params)?;
    let sql = sql.to_owned();
    run_blocking(conn, cx, move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        build_result_set(&mut stmt, values.as_values())
    })
    .await
}

pub(crate) async fn execute_on(
    conn: SharedSqliteConnection,
    cx: &Context,
    sql: &str,
    params: &[RowValues],
) -> Result<ExecOutcome, SqlFluentError> {
    let values = Params::convert(params)?;
    let sql = sql.to_owned();
    run_blocking(conn, cx, move |conn| {
        let param_refs: Vec<&dyn ToSql> =
            values.as_values().iter().map(|v| v as &dyn ToSql).collect();
        let rows_affected = conn.execute(&sql, &param_refs[..])?;
        let last_insert_id = reports_rowid(&sql).then(|| conn.last_insert_rowid());
        Ok(ExecOutcome {
            rows_affected,
            last_insert_id,
        })
    })
    .await
}

pub(crate) async fn batch_on(
    conn: SharedSqliteConnection,
    cx: &Context,
    sql: &'static str,
) -> Result<(), SqlFluentError> {
    run_blocking(conn, cx, move |conn| {
        conn.execute_batch(sql)?;
        Ok(())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::config::open_connection;
    use std::time::Duration;

    #[test]
    fn rowid_reporting_is_limited_to_inserts() {
        assert!(reports_rowid("  INSERT INTO t DEFAULT VALUES"));
        assert!(reports_rowid("replace into t (id) values (?1)"));
        assert!(!reports_rowid("UPDATE t SET a = 1"));
        assert!(!reports_rowid("ins"));
    }

    #[test]
    fn executes_and_buffers_rows() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let conn = open_connection(":memory:", Duration::from_secs(1)).unwrap();
            let cx = Context::background();
            batch_on(
                Arc::clone(&conn),
                &cx,
                "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT);",
            )
            .await
            .unwrap();
            let outcome = execute_on(
                Arc::clone(&conn),
                &cx,
                "INSERT INTO t (name) VALUES (?1)",
                &[RowValues::Text("a".into())],
            )
            .await
            .unwrap();
            assert_eq!(outcome.rows_affected, 1);
            assert_eq!(outcome.last_insert_id, Some(1));

            let rs = query_on(conn, &cx, "SELECT id, name FROM t", &[]).await.unwrap();
            assert_eq!(rs.results.len(), 1);
            assert_eq!(rs.results[0].get("name"), Some(&RowValues::Text("a".into())));
        });
    }

    #[test]
    fn cancelled_context_skips_the_statement() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let conn = open_connection(":memory:", Duration::from_secs(1)).unwrap();
            let cx = Context::background();
            cx.cancel();
            let err = batch_on(conn, &cx, "SELECT 1;").await.unwrap_err();
            assert!(matches!(err, SqlFluentError::Cancelled));
        });
    }
}
