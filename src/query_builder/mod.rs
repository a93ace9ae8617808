//! Immutable, tiered query builder.
//!
//! `table(name)` on a session yields a [`Tabled`] value. Chaining narrows it to
//! [`Conditioned`] (after a where-family call) and [`Aggregated`] (after grouping, ordering or
//! limits); each tier only offers the calls that are still legal, and every call returns a
//! new value, so one base query can be reused for several derived queries:
//!
//! ```rust,no_run
//! # use sql_fluent::prelude::*;
//! # async fn demo(db: &Db) -> Result<(), SqlFluentError> {
//! let cx = Context::background();
//! let notes = db.table("notes");
//! let recent = notes
//!     .select(["id", "data"])
//!     .where_("id > ?", 10)
//!     .order_by(["id DESC"])
//!     .limit_offset(5, 0);
//! let total = notes.count(&cx).await?;
//! let rows: Vec<(i64, String)> = recent.all(&cx).await?.scan_all().await?;
//! # let _ = (total, rows);
//! # Ok(())
//! # }
//! ```
//!
//! Clause policy: `select`, `group_by`, `order_by`, `having` and `limit_offset` replace any
//! earlier value; joins and where-family calls accumulate, and predicates are combined with
//! `AND` in call order.

mod run;
mod tiers;

pub use tiers::{Aggregated, Conditioned, Tabled};

use crate::binder::Predicate;
use crate::error::SqlFluentError;
use crate::session::Handle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    pub kind: JoinKind,
    pub table: String,
    /// Join condition, without the `ON` keyword.
    pub on: String,
}

/// Everything accumulated for one query against one table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryState {
    pub table: String,
    pub joins: Vec<JoinSpec>,
    /// Projection; empty selects every column.
    pub columns: Vec<String>,
    pub predicates: Vec<Predicate>,
    pub group_by: Vec<String>,
    pub order_by: Vec<String>,
    pub having: Option<Predicate>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl QueryState {
    #[must_use]
    pub fn new(table: &str) -> Self {
        Self {
            table: table.trim().to_string(),
            ..Self::default()
        }
    }

    /// Number of bound parameters across predicates and `HAVING`.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.predicates.iter().map(|p| p.params.len()).sum::<usize>()
            + self.having.as_ref().map_or(0, |h| h.params.len())
    }
}

/// First builder misuse, reported by the terminal call.
#[derive(Debug, Clone)]
enum Deferred {
    Binding(String),
    Invalid(String),
}

impl From<SqlFluentError> for Deferred {
    fn from(err: SqlFluentError) -> Self {
        match err {
            SqlFluentError::BindingError(msg) => Deferred::Binding(msg),
            SqlFluentError::InvalidQuery(msg) => Deferred::Invalid(msg),
            other => Deferred::Invalid(other.to_string()),
        }
    }
}

impl From<Deferred> for SqlFluentError {
    fn from(deferred: Deferred) -> Self {
        match deferred {
            Deferred::Binding(msg) => SqlFluentError::BindingError(msg),
            Deferred::Invalid(msg) => SqlFluentError::InvalidQuery(msg),
        }
    }
}

/// Session target plus accumulated state, shared by all tiers.
#[derive(Clone)]
pub(crate) struct Query {
    handle: Handle,
    state: QueryState,
    deferred: Option<Deferred>,
}

impl Query {
    pub(crate) fn new(handle: Handle, table: &str) -> Self {
        let deferred = table
            .trim()
            .is_empty()
            .then(|| Deferred::Invalid("table name is empty".into()));
        Self {
            handle,
            state: QueryState::new(table),
            deferred,
        }
    }

    pub(crate) fn state(&self) -> &QueryState {
        &self.state
    }

    /// Copy of this query with `edit` applied to the state.
    fn with(&self, edit: impl FnOnce(&mut QueryState)) -> Self {
        let mut next = self.clone();
        edit(&mut next.state);
        next
    }

    /// Copy of this query with `edit` applied, or with the error recorded.
    fn try_with<T>(
        &self,
        value: Result<T, SqlFluentError>,
        edit: impl FnOnce(&mut QueryState, T),
    ) -> Self {
        let mut next = self.clone();
        match value {
            Ok(value) => edit(&mut next.state, value),
            Err(err) => {
                if next.deferred.is_none() {
                    next.deferred = Some(err.into());
                }
            }
        }
        next
    }

    fn ready(&self) -> Result<(), SqlFluentError> {
        match &self.deferred {
            Some(deferred) => Err(deferred.clone().into()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde::{Deserialize, Serialize};

    use crate::backend::ConnectionBackend;
    use crate::context::Context;
    use crate::error::SqlFluentError;
    use crate::record::Record;
    use crate::session::Db;
    use crate::testing::RecordingBackend;
    use crate::types::RowValues;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Note {
        id: i64,
        data: String,
    }

    impl Record for Note {
        fn set_primary_key(&mut self, id: i64) {
            self.id = id;
        }
    }

    fn session() -> (Db, Arc<RecordingBackend>) {
        let backend = Arc::new(RecordingBackend::new("recording"));
        let shared: Arc<dyn ConnectionBackend> = backend.clone();
        let db = Db::new("recording", shared);
        (db, backend)
    }

    #[test]
    fn derived_queries_leave_the_base_untouched() {
        let (db, _) = session();
        let base = db.table("notes");
        let narrowed = base.where_eq("id", 1).order_by(["id DESC"]);
        assert!(base.query_state().predicates.is_empty());
        assert_eq!(narrowed.query_state().predicates.len(), 1);
        assert_eq!(narrowed.query_state().order_by, vec!["id DESC".to_string()]);
    }

    #[test]
    fn repeated_clauses_replace_or_accumulate() {
        let (db, _) = session();
        let q = db
            .table("notes")
            .select(["id"])
            .select(["data"])
            .where_("id > ?", 1)
            .where_like("data", "n%")
            .limit_offset(10, 5)
            .limit_offset(2, 0);
        let stmt = q.statement().unwrap();
        assert_eq!(
            stmt.query,
            "SELECT data FROM notes WHERE (id > ?1) AND (data LIKE ?2) LIMIT 2"
        );
        assert_eq!(stmt.params, vec![RowValues::Int(1), RowValues::Text("n%".into())]);
    }

    #[test]
    fn in_list_accepts_tuples_and_sequences_alike() {
        let (db, _) = session();
        let a = db.table("notes").where_in("id", (1, 2, 3)).statement().unwrap();
        let b = db.table("notes").where_in("id", vec![1, 2, 3]).statement().unwrap();
        let c = db.table("notes").where_("id IN (?, ?, ?)", [1, 2, 3]).statement().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.params, c.params);
        assert_eq!(a.query, "SELECT * FROM notes WHERE (id IN (?1, ?2, ?3))");
    }

    #[test]
    fn first_builder_error_is_reported_before_dispatch() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (db, backend) = session();
            let cx = Context::background();
            let err = db
                .table("notes")
                .where_("id = ?", (1, 2))
                .where_in("id", Vec::<i64>::new())
                .all(&cx)
                .await
                .unwrap_err();
            assert!(matches!(err, SqlFluentError::BindingError(ref m) if m.contains("2 parameter")));

            let err = db.table("  ").count(&cx).await.unwrap_err();
            assert!(matches!(err, SqlFluentError::InvalidQuery(_)));

            let err = db.table("notes").where_eq("bad column", 1).count(&cx).await.unwrap_err();
            assert!(matches!(err, SqlFluentError::InvalidQuery(_)));

            assert!(backend.statements().is_empty());
        });
    }

    #[test]
    fn unnarrowed_writes_are_refused() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (db, backend) = session();
            let cx = Context::background();
            let err = db.table("notes").delete(&cx).await.unwrap_err();
            assert!(matches!(err, SqlFluentError::InvalidQuery(_)));
            let err = db
                .table("notes")
                .update(&cx, vec![("data", "x")])
                .await
                .unwrap_err();
            assert!(matches!(err, SqlFluentError::InvalidQuery(_)));
            assert!(backend.statements().is_empty());

            let affected = db.table("notes").where_("1 = 1", ()).delete(&cx).await.unwrap();
            assert_eq!(affected, 1);
            assert_eq!(backend.statements()[0].query, "DELETE FROM notes WHERE (1 = 1)");
        });
    }

    #[test]
    fn create_omits_blank_key_and_adopts_generated_one() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (db, backend) = session();
            let cx = Context::background();
            let mut note = Note {
                id: 0,
                data: "first".into(),
            };
            db.table("notes").create_one(&cx, &mut note).await.unwrap();
            assert_eq!(note.id, 42);
            let stmt = &backend.statements()[0];
            assert_eq!(stmt.query, "INSERT INTO notes (data) VALUES (?1)");

            db.table("notes").update_record(&cx, &note).await.unwrap();
            let stmt = &backend.statements()[1];
            assert_eq!(stmt.query, "UPDATE notes SET data = ?1 WHERE (id = ?2)");
            assert_eq!(stmt.params, vec![RowValues::Text("first".into()), RowValues::Int(42)]);
        });
    }

    #[test]
    fn single_with_no_rows_is_not_found_on_scan() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (db, backend) = session();
            let cx = Context::background();
            backend.push_result(&["id", "data"], Vec::new());
            let row = db.table("notes").where_eq("id", 7).single(&cx).await.unwrap();
            assert!(!row.exists());
            let err = row.scan_record::<Note>().unwrap_err();
            assert!(err.is_not_found());
            assert_eq!(
                backend.statements()[0].query,
                "SELECT * FROM notes WHERE (id = ?1) LIMIT 1"
            );
        });
    }

    #[test]
    fn finalized_transaction_refuses_further_use() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (db, backend) = session();
            let cx = Context::background();
            let tx = db.begin(&cx).await.unwrap();
            let pending = tx.table("notes").where_eq("id", 1);
            tx.commit(&cx).await.unwrap();
            assert!(tx.is_finalized());

            let err = pending.count(&cx).await.unwrap_err();
            assert!(matches!(err, SqlFluentError::TransactionStateError(_)));
            let err = tx.rollback(&cx).await.unwrap_err();
            assert!(matches!(err, SqlFluentError::TransactionStateError(_)));
            let err = tx.exec(&cx, "DELETE FROM notes", ()).await.unwrap_err();
            assert!(matches!(err, SqlFluentError::TransactionStateError(_)));
            assert_eq!(backend.journal.commits.lock().map(|c| *c).unwrap(), 1);
            assert_eq!(backend.journal.rollbacks.lock().map(|c| *c).unwrap(), 0);
        });
    }

    #[test]
    fn dropped_transaction_finalizes_derived_queries() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (db, backend) = session();
            let cx = Context::background();
            let tx = db.begin(&cx).await.unwrap();
            let pending = tx.table("notes");
            drop(tx);

            let err = pending.where_("1 = 1", ()).delete(&cx).await.unwrap_err();
            assert!(matches!(err, SqlFluentError::TransactionStateError(_)));
            assert!(backend.statements().is_empty());
            assert_eq!(backend.journal.rollbacks.lock().map(|c| *c).unwrap(), 1);
            assert_eq!(backend.journal.commits.lock().map(|c| *c).unwrap(), 0);
        });
    }

    #[test]
    fn fetch_column_takes_computed_expressions() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (db, backend) = session();
            let cx = Context::background();
            backend.push_result(&["MAX(id)"], vec![vec![RowValues::Int(9)]]);
            let max: Vec<i64> = db
                .table("notes")
                .fetch_column(&cx, "MAX(id)")
                .await
                .unwrap()
                .scan_all()
                .await
                .unwrap();
            assert_eq!(max, vec![9]);
            db.table("notes").fetch_column(&cx, "id AS n").await.unwrap();
            let queries: Vec<String> =
                backend.statements().into_iter().map(|s| s.query).collect();
            assert_eq!(
                queries,
                ["SELECT MAX(id) FROM notes", "SELECT id AS n FROM notes"]
            );

            let err = db.table("notes").fetch_column(&cx, "  ").await.unwrap_err();
            assert!(matches!(err, SqlFluentError::InvalidQuery(_)));
            let err = db
                .table("notes")
                .fetch_column(&cx, "id + ?")
                .await
                .unwrap_err();
            assert!(matches!(err, SqlFluentError::BindingError(_)));
            assert_eq!(backend.statements().len(), 2);
        });
    }
}
