use tracing::debug;

use super::Query;
use crate::binder::Predicate;
use crate::context::Context;
use crate::error::{Operation, SqlFluentError};
use crate::query::{QueryAndParams, render};
use crate::record::{Record, record_columns};
use crate::results::{Cursor, Row, Shape};
use crate::translation::count_placeholders;
use crate::types::RowValues;

/// A pluck target is any single select expression, bound to no parameters.
fn pluck_expression(column: &str) -> Result<String, SqlFluentError> {
    let column = column.trim();
    if column.is_empty() {
        return Err(SqlFluentError::InvalidQuery(
            "fetch_column needs a column or expression".into(),
        ));
    }
    if count_placeholders(column)? > 0 {
        return Err(SqlFluentError::BindingError(format!(
            "`{column}` cannot take parameters when plucked"
        )));
    }
    Ok(column.to_string())
}

impl Query {
    fn dispatching(&self, operation: Operation) {
        debug!(
            op = %operation,
            table = %self.state.table,
            predicates = self.state.predicates.len(),
            params = self.state.param_count(),
            "dispatching query"
        );
    }

    fn wrap(&self, operation: Operation) -> impl FnOnce(SqlFluentError) -> SqlFluentError + '_ {
        move |err| err.in_operation(operation, &self.state.table)
    }

    /// Writes must be narrowed by at least one predicate.
    fn ensure_narrowed(&self, operation: Operation) -> Result<(), SqlFluentError> {
        if self.state.predicates.is_empty() {
            return Err(SqlFluentError::InvalidQuery(format!(
                "{operation} on `{}` without a predicate; add where_(\"1 = 1\", ()) to affect every row",
                self.state.table
            )));
        }
        Ok(())
    }

    pub(crate) fn statement(&self) -> Result<QueryAndParams, SqlFluentError> {
        self.ready()?;
        let executor = self.handle.executor()?;
        render::select(&self.state, executor.placeholder_style())
    }

    pub(crate) async fn all(&self, cx: &Context) -> Result<Cursor, SqlFluentError> {
        self.ready()?;
        let executor = self.handle.executor()?;
        self.dispatching(Operation::Select);
        let stream = executor
            .select(cx, &self.state)
            .await
            .map_err(self.wrap(Operation::Select))?;
        Ok(Cursor::new(
            stream,
            cx.clone(),
            Shape::RecordSequence,
            &self.state.table,
        ))
    }

    pub(crate) async fn single(&self, cx: &Context) -> Result<Row, SqlFluentError> {
        self.ready()?;
        let executor = self.handle.executor()?;
        let limited = self.with(|state| state.limit = Some(1));
        limited.dispatching(Operation::Select);
        let stream = executor
            .select(cx, &limited.state)
            .await
            .map_err(self.wrap(Operation::Select))?;
        let mut cursor = Cursor::new(
            stream,
            cx.clone(),
            Shape::SingleRecord,
            &self.state.table,
        );
        let first = cursor.next().await.map_err(self.wrap(Operation::Select));
        cursor.close().await?;
        let row = if first? { cursor.take_current() } else { None };
        Ok(Row::new(row, cursor.column_names(), &self.state.table))
    }

    pub(crate) async fn fetch_column(
        &self,
        cx: &Context,
        column: &str,
    ) -> Result<Cursor, SqlFluentError> {
        self.ready()?;
        let column = pluck_expression(column)?;
        let executor = self.handle.executor()?;
        let plucked = self.with(|state| state.columns = vec![column]);
        plucked.dispatching(Operation::Select);
        let stream = executor
            .select(cx, &plucked.state)
            .await
            .map_err(self.wrap(Operation::Select))?;
        Ok(Cursor::new(
            stream,
            cx.clone(),
            Shape::ScalarSequence,
            &self.state.table,
        ))
    }

    pub(crate) async fn count(&self, cx: &Context) -> Result<i64, SqlFluentError> {
        self.ready()?;
        let executor = self.handle.executor()?;
        self.dispatching(Operation::Count);
        executor
            .count(cx, &self.state)
            .await
            .map_err(self.wrap(Operation::Count))
    }

    pub(crate) async fn create<T: Record>(
        &self,
        cx: &Context,
        records: &mut [T],
    ) -> Result<usize, SqlFluentError> {
        self.ready()?;
        let executor = self.handle.executor()?;
        let mut inserted = 0;
        for record in records.iter_mut() {
            let mut columns = record_columns(record)?;
            let key_position = columns.iter().position(|(c, _)| c == T::PRIMARY_KEY);
            let generated_key = match key_position {
                Some(pos) if columns[pos].1.is_blank_key() => {
                    columns.remove(pos);
                    true
                }
                Some(_) => false,
                None => true,
            };
            self.dispatching(Operation::Insert);
            let outcome = executor
                .insert(cx, &self.state.table, &columns)
                .await
                .map_err(self.wrap(Operation::Insert))?;
            if generated_key && let Some(id) = outcome.last_insert_id {
                record.set_primary_key(id);
            }
            inserted += 1;
        }
        Ok(inserted)
    }

    pub(crate) async fn update(
        &self,
        cx: &Context,
        assignments: Vec<(String, RowValues)>,
    ) -> Result<usize, SqlFluentError> {
        self.ready()?;
        self.ensure_narrowed(Operation::Update)?;
        let executor = self.handle.executor()?;
        self.dispatching(Operation::Update);
        executor
            .update(cx, &self.state, &assignments)
            .await
            .map_err(self.wrap(Operation::Update))
    }

    /// Split a record into its key predicate (when set) and the remaining columns.
    fn keyed<T: Record>(
        &self,
        record: &T,
        operation: Operation,
    ) -> Result<(Query, Vec<(String, RowValues)>), SqlFluentError> {
        let mut columns = record_columns(record)?;
        let mut narrowed = self.clone();
        if let Some(pos) = columns.iter().position(|(c, _)| c == T::PRIMARY_KEY) {
            let (key, value) = columns.remove(pos);
            if !value.is_blank_key() {
                let predicate = Predicate::eq(&key, value)?;
                narrowed = narrowed.with(|state| state.predicates.push(predicate));
            }
        }
        narrowed.ensure_narrowed(operation)?;
        Ok((narrowed, columns))
    }

    pub(crate) async fn update_record<T: Record>(
        &self,
        cx: &Context,
        record: &T,
    ) -> Result<usize, SqlFluentError> {
        self.ready()?;
        let (narrowed, columns) = self.keyed(record, Operation::Update)?;
        let executor = self.handle.executor()?;
        narrowed.dispatching(Operation::Update);
        executor
            .update(cx, &narrowed.state, &columns)
            .await
            .map_err(self.wrap(Operation::Update))
    }

    pub(crate) async fn delete(&self, cx: &Context) -> Result<usize, SqlFluentError> {
        self.ready()?;
        self.ensure_narrowed(Operation::Delete)?;
        let executor = self.handle.executor()?;
        self.dispatching(Operation::Delete);
        executor
            .delete(cx, &self.state)
            .await
            .map_err(self.wrap(Operation::Delete))
    }

    pub(crate) async fn delete_record<T: Record>(
        &self,
        cx: &Context,
        record: &T,
    ) -> Result<usize, SqlFluentError> {
        self.ready()?;
        let (narrowed, _) = self.keyed(record, Operation::Delete)?;
        let executor = self.handle.executor()?;
        narrowed.dispatching(Operation::Delete);
        executor
            .delete(cx, &narrowed.state)
            .await
            .map_err(self.wrap(Operation::Delete))
    }
}
