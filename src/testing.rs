//! In-memory backend that records every statement it receives.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::backend::{
    BufferedRows, ConnectionBackend, ExecOutcome, Executor, RowStream, TransactionBackend,
};
use crate::context::Context;
use crate::error::SqlFluentError;
use crate::query::QueryAndParams;
use crate::results::ResultSet;
use crate::translation::PlaceholderStyle;
use crate::types::RowValues;

#[derive(Default)]
pub(crate) struct Journal {
    pub statements: Mutex<Vec<QueryAndParams>>,
    pub results: Mutex<VecDeque<ResultSet>>,
    pub commits: Mutex<usize>,
    pub rollbacks: Mutex<usize>,
}

impl Journal {
    fn record(&self, sql: &str, params: &[RowValues]) {
        if let Ok(mut statements) = self.statements.lock() {
            statements.push(QueryAndParams::new(sql, params.to_vec()));
        }
    }

    fn next_result(&self) -> ResultSet {
        self.results
            .lock()
            .ok()
            .and_then(|mut r| r.pop_front())
            .unwrap_or_default()
    }
}

pub(crate) struct RecordingBackend {
    driver: String,
    pub journal: Arc<Journal>,
}

impl RecordingBackend {
    pub(crate) fn new(driver: &str) -> Self {
        Self {
            driver: driver.to_string(),
            journal: Arc::new(Journal::default()),
        }
    }

    pub(crate) fn push_result(&self, columns: &[&str], rows: Vec<Vec<RowValues>>) {
        let mut rs = ResultSet::with_capacity(rows.len());
        rs.set_column_names(Arc::new(columns.iter().map(|c| (*c).to_string()).collect()));
        for row in rows {
            rs.add_row_values(row);
        }
        if let Ok(mut results) = self.journal.results.lock() {
            results.push_back(rs);
        }
    }

    pub(crate) fn statements(&self) -> Vec<QueryAndParams> {
        self.journal
            .statements
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

async fn record_query(
    journal: &Journal,
    cx: &Context,
    sql: &str,
    params: &[RowValues],
) -> Result<Box<dyn RowStream>, SqlFluentError> {
    cx.check()?;
    journal.record(sql, params);
    Ok(Box::new(BufferedRows::new(journal.next_result())))
}

async fn record_execute(
    journal: &Journal,
    cx: &Context,
    sql: &str,
    params: &[RowValues],
) -> Result<ExecOutcome, SqlFluentError> {
    cx.check()?;
    journal.record(sql, params);
    Ok(ExecOutcome {
        rows_affected: 1,
        last_insert_id: Some(42),
    })
}

#[async_trait]
impl Executor for RecordingBackend {
    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Sqlite
    }

    async fn query(
        &self,
        cx: &Context,
        sql: &str,
        params: &[RowValues],
    ) -> Result<Box<dyn RowStream>, SqlFluentError> {
        record_query(&self.journal, cx, sql, params).await
    }

    async fn execute(
        &self,
        cx: &Context,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ExecOutcome, SqlFluentError> {
        record_execute(&self.journal, cx, sql, params).await
    }
}

#[async_trait]
impl ConnectionBackend for RecordingBackend {
    fn as_executor(&self) -> &dyn Executor {
        self
    }

    fn driver_name(&self) -> &str {
        &self.driver
    }

    async fn begin(&self, cx: &Context) -> Result<Arc<dyn TransactionBackend>, SqlFluentError> {
        cx.check()?;
        Ok(Arc::new(RecordingTx {
            journal: Arc::clone(&self.journal),
        }))
    }

    async fn ping(&self, cx: &Context) -> Result<(), SqlFluentError> {
        cx.check()
    }

    async fn close(&self) -> Result<(), SqlFluentError> {
        Ok(())
    }

    fn set_max_open_conns(&self, _max: usize) {}

    fn set_max_idle_conns(&self, _max: usize) {}
}

pub(crate) struct RecordingTx {
    journal: Arc<Journal>,
}

#[async_trait]
impl Executor for RecordingTx {
    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Sqlite
    }

    async fn query(
        &self,
        cx: &Context,
        sql: &str,
        params: &[RowValues],
    ) -> Result<Box<dyn RowStream>, SqlFluentError> {
        record_query(&self.journal, cx, sql, params).await
    }

    async fn execute(
        &self,
        cx: &Context,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ExecOutcome, SqlFluentError> {
        record_execute(&self.journal, cx, sql, params).await
    }
}

#[async_trait]
impl TransactionBackend for RecordingTx {
    fn as_executor(&self) -> &dyn Executor {
        self
    }

    async fn commit(&self, _cx: &Context) -> Result<(), SqlFluentError> {
        if let Ok(mut commits) = self.journal.commits.lock() {
            *commits += 1;
        }
        Ok(())
    }

    fn abandon(&self) {
        if let Ok(mut rollbacks) = self.journal.rollbacks.lock() {
            *rollbacks += 1;
        }
    }

    async fn rollback(&self, _cx: &Context) -> Result<(), SqlFluentError> {
        if let Ok(mut rollbacks) = self.journal.rollbacks.lock() {
            *rollbacks += 1;
        }
        Ok(())
    }
}
