use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::materialize::{self, Shape};
use super::row::CustomDbRow;
use crate::backend::RowStream;
use crate::context::Context;
use crate::error::{ScanError, SqlFluentError};

/// Pull-based cursor over a query result.
///
/// Call [`Cursor::next`] before each scan. The cursor closes itself once the rows are
/// exhausted; [`Cursor::close`] releases it early and may be called any number of times.
pub struct Cursor {
    stream: Option<Box<dyn RowStream>>,
    cx: Context,
    shape: Shape,
    table: String,
    columns: Arc<Vec<String>>,
    current: Option<CustomDbRow>,
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("table", &self.table)
            .field("shape", &self.shape)
            .field("columns", &self.columns)
            .field("closed", &self.stream.is_none())
            .finish_non_exhaustive()
    }
}

impl Cursor {
    pub(crate) fn new(stream: Box<dyn RowStream>, cx: Context, shape: Shape, table: &str) -> Self {
        let columns = stream.columns();
        Self {
            stream: Some(stream),
            cx,
            shape,
            table: table.to_string(),
            columns,
            current: None,
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub(crate) fn column_names(&self) -> Arc<Vec<String>> {
        Arc::clone(&self.columns)
    }

    /// True for cursors returned by `fetch_column`.
    #[must_use]
    pub fn is_pluck(&self) -> bool {
        self.shape == Shape::ScalarSequence
    }

    #[must_use]
    pub fn shape(&self) -> Shape {
        self.shape
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Advance to the next row. Returns `false` once the result is exhausted or closed.
    ///
    /// # Errors
    ///
    /// Returns backend errors, `Cancelled` or `DeadlineExceeded`.
    pub async fn next(&mut self) -> Result<bool, SqlFluentError> {
        self.current = None;
        let Some(stream) = self.stream.as_mut() else {
            return Ok(false);
        };
        match stream.next_row(&self.cx).await? {
            Some(row) => {
                self.current = Some(row);
                Ok(true)
            }
            None => {
                self.close().await?;
                Ok(false)
            }
        }
    }

    #[must_use]
    pub fn current_row(&self) -> Option<&CustomDbRow> {
        self.current.as_ref()
    }

    pub(crate) fn take_current(&mut self) -> Option<CustomDbRow> {
        self.current.take()
    }

    fn current_or_err(&self) -> Result<&CustomDbRow, SqlFluentError> {
        self.current.as_ref().ok_or_else(|| {
            ScanError::message("scan called without a current row; call next() first").into()
        })
    }

    /// Scan the current row positionally into `T` (a scalar, tuple, or sequence).
    ///
    /// # Errors
    ///
    /// Returns `ScanError` on arity or type mismatch, or when there is no current row.
    pub fn scan<T: DeserializeOwned>(&self) -> Result<T, SqlFluentError> {
        Ok(Shape::PositionalScan.decode(self.current_or_err()?)?)
    }

    /// Scan the current row into a record, matching columns to fields by name.
    ///
    /// # Errors
    ///
    /// Returns `ScanError` on type mismatch, or when there is no current row.
    pub fn scan_record<T: DeserializeOwned>(&self) -> Result<T, SqlFluentError> {
        Ok(Shape::RecordSequence.decode(self.current_or_err()?)?)
    }

    /// Drain the remaining rows into a `Vec`, using the cursor's shape.
    ///
    /// # Errors
    ///
    /// See [`Cursor::scan_all_into`].
    pub async fn scan_all<T: DeserializeOwned>(&mut self) -> Result<Vec<T>, SqlFluentError> {
        let mut out = Vec::new();
        self.scan_all_into(&mut out).await?;
        Ok(out)
    }

    /// Append every remaining row to `out` and close the cursor; returns how many were added.
    ///
    /// Record cursors match by name, pluck cursors take the only column, raw cursors scan by
    /// position. A single-record cursor yields at most one element.
    ///
    /// # Errors
    ///
    /// Returns the first scan or backend error. Elements appended before the failure stay in
    /// `out`; the cursor is closed either way.
    pub async fn scan_all_into<T: DeserializeOwned>(
        &mut self,
        out: &mut Vec<T>,
    ) -> Result<usize, SqlFluentError> {
        let result = self.drain_into(out).await;
        self.close().await?;
        result
    }

    async fn drain_into<T: DeserializeOwned>(
        &mut self,
        out: &mut Vec<T>,
    ) -> Result<usize, SqlFluentError> {
        let mut added = 0;
        let shape = self.shape;
        while self.next().await? {
            let value = materialize::single(self.current.as_ref(), shape, &self.table)?;
            out.push(value);
            added += 1;
            if shape == Shape::SingleRecord {
                break;
            }
        }
        Ok(added)
    }

    /// Release the underlying result. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns the backend's error from releasing the result.
    pub async fn close(&mut self) -> Result<(), SqlFluentError> {
        self.current = None;
        match self.stream.take() {
            Some(mut stream) => stream.close().await,
            None => Ok(()),
        }
    }
}

/// The outcome of `single()`: at most one eagerly fetched row.
#[derive(Debug, Clone)]
pub struct Row {
    row: Option<CustomDbRow>,
    columns: Arc<Vec<String>>,
    table: String,
}

impl Row {
    pub(crate) fn new(row: Option<CustomDbRow>, columns: Arc<Vec<String>>, table: &str) -> Self {
        Self {
            row,
            columns,
            table: table.to_string(),
        }
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.row.is_some()
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Hydrate a record from the row.
    ///
    /// # Errors
    ///
    /// Returns `SqlFluentError::NotFound` when the query matched nothing, or a scan error.
    pub fn scan_record<T: DeserializeOwned>(&self) -> Result<T, SqlFluentError> {
        materialize::single(self.row.as_ref(), Shape::SingleRecord, &self.table)
    }

    /// Scan the row positionally.
    ///
    /// # Errors
    ///
    /// Returns `SqlFluentError::NotFound` when the query matched nothing, or a scan error.
    pub fn scan<T: DeserializeOwned>(&self) -> Result<T, SqlFluentError> {
        materialize::single(self.row.as_ref(), Shape::PositionalScan, &self.table)
    }

    #[must_use]
    pub fn into_inner(self) -> Option<CustomDbRow> {
        self.row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BufferedRows;
    use crate::results::ResultSet;
    use crate::types::RowValues;

    fn cursor(shape: Shape, ids: &[i64]) -> Cursor {
        let mut rs = ResultSet::with_capacity(ids.len());
        rs.set_column_names(Arc::new(vec!["id".into(), "data".into()]));
        for id in ids {
            rs.add_row_values(vec![RowValues::Int(*id), RowValues::Text(format!("n{id}"))]);
        }
        Cursor::new(
            Box::new(BufferedRows::new(rs)),
            Context::background(),
            shape,
            "notes",
        )
    }

    #[tokio::test]
    async fn positional_iteration_scans_each_row_once() {
        let mut c = cursor(Shape::PositionalScan, &[3, 2, 1]);
        assert_eq!(c.columns(), ["id", "data"]);
        let mut seen = Vec::new();
        while c.next().await.unwrap() {
            let (id, data): (i64, String) = c.scan().unwrap();
            seen.push((id, data));
        }
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], (3, "n3".to_string()));
        assert!(c.is_closed());
        c.close().await.unwrap();
        assert!(!c.next().await.unwrap());
    }

    #[tokio::test]
    async fn scan_before_next_is_an_error() {
        let c = cursor(Shape::RecordSequence, &[1]);
        let err = c.scan::<(i64, String)>().unwrap_err();
        assert!(matches!(err, SqlFluentError::ScanError(_)));
    }

    #[tokio::test]
    async fn scan_all_keeps_residue_on_failure() {
        let mut rs = ResultSet::with_capacity(2);
        rs.set_column_names(Arc::new(vec!["n".into()]));
        rs.add_row_values(vec![RowValues::Int(1)]);
        rs.add_row_values(vec![RowValues::Text("x".into())]);
        let mut c = Cursor::new(
            Box::new(BufferedRows::new(rs)),
            Context::background(),
            Shape::ScalarSequence,
            "t",
        );
        assert!(c.is_pluck());
        let mut out: Vec<i64> = Vec::new();
        let err = c.scan_all_into(&mut out).await.unwrap_err();
        assert!(matches!(err, SqlFluentError::ScanError(_)));
        assert_eq!(out, vec![1]);
        assert!(c.is_closed());
    }

    #[tokio::test]
    async fn missing_single_row_is_not_found() {
        let row = Row::new(None, Arc::new(vec!["id".into()]), "notes");
        assert!(!row.exists());
        let err = row.scan_record::<std::collections::HashMap<String, i64>>().unwrap_err();
        assert!(matches!(err, SqlFluentError::NotFound { .. }));
    }
}
