use crate::binder::{IntoAssignments, IntoParams, Predicate};
use crate::context::Context;
use crate::error::SqlFluentError;
use crate::query::QueryAndParams;
use crate::record::Record;
use crate::results::{Cursor, Row};
use crate::types::RowValues;

use super::{JoinKind, JoinSpec, Query, QueryState};

/// Tier 1: a table has been chosen. Joins, projection and inserts live here.
#[derive(Clone)]
#[must_use]
pub struct Tabled {
    pub(crate) query: Query,
}

/// Tier 2: at least one predicate has been added.
#[derive(Clone)]
#[must_use]
pub struct Conditioned {
    pub(crate) query: Query,
}

/// Tier 3: grouping, ordering or limits have been set.
#[derive(Clone)]
#[must_use]
pub struct Aggregated {
    pub(crate) query: Query,
}

fn owned_list<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items
        .into_iter()
        .map(Into::into)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Tabled {
    pub(crate) fn new(query: Query) -> Self {
        Self { query }
    }

    fn join_kind(&self, kind: JoinKind, table: &str, on: &str) -> Tabled {
        let table = table.trim();
        let checked = if table.is_empty() {
            Err(SqlFluentError::InvalidQuery("join without a table".into()))
        } else {
            // join conditions take no parameters
            Predicate::raw(on, ())
        };
        let query = self.query.try_with(checked, |state, on| {
            state.joins.push(JoinSpec {
                kind,
                table: table.to_string(),
                on: on.fragment,
            });
        });
        Tabled { query }
    }

    /// `INNER JOIN table ON on`.
    pub fn join(&self, table: &str, on: &str) -> Tabled {
        self.join_kind(JoinKind::Inner, table, on)
    }

    /// `LEFT JOIN table ON on`.
    pub fn left_join(&self, table: &str, on: &str) -> Tabled {
        self.join_kind(JoinKind::Left, table, on)
    }

    /// `RIGHT JOIN table ON on`. Not every backend supports right joins.
    pub fn right_join(&self, table: &str, on: &str) -> Tabled {
        self.join_kind(JoinKind::Right, table, on)
    }

    /// Replace the projection. An empty list restores the default (`*`).
    pub fn select<I, S>(&self, columns: I) -> Tabled
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = owned_list(columns);
        Tabled {
            query: self.query.with(|state| state.columns = columns),
        }
    }

    /// Insert each record with its own statement, in order.
    ///
    /// Records with a blank primary key (null, `0`, `""`) leave the column out and receive the
    /// generated key through [`Record::set_primary_key`].
    ///
    /// # Errors
    ///
    /// Stops at the first failing insert; earlier records stay inserted unless the call runs
    /// inside a transaction that is rolled back.
    pub async fn create<T: Record>(
        &self,
        cx: &Context,
        records: &mut [T],
    ) -> Result<usize, SqlFluentError> {
        self.query.create(cx, records).await
    }

    /// Insert a single record.
    ///
    /// # Errors
    ///
    /// Returns `SqlFluentError` if serializing the record or the insert fails.
    pub async fn create_one<T: Record>(
        &self,
        cx: &Context,
        record: &mut T,
    ) -> Result<(), SqlFluentError> {
        self.query.create(cx, std::slice::from_mut(record)).await.map(|_| ())
    }
}

macro_rules! condition_methods {
    ($tier:ty) => {
        impl $tier {
            /// Add a raw predicate fragment with anonymous `?` placeholders.
            ///
            /// `args` follows the binding rule in [`crate::binder`]: a scalar is one
            /// parameter, a sequence or tuple is one parameter per element.
            pub fn where_(&self, fragment: &str, args: impl IntoParams) -> Conditioned {
                self.push_predicate(Predicate::raw(fragment, args))
            }

            /// `column = value`, or `column IS NULL` when `value` is null.
            pub fn where_eq(&self, column: &str, value: impl Into<RowValues>) -> Conditioned {
                self.push_predicate(Predicate::eq(column, value))
            }

            /// `column IN (...)`; the list must not be empty.
            pub fn where_in(&self, column: &str, values: impl IntoParams) -> Conditioned {
                self.push_predicate(Predicate::in_list(column, values))
            }

            /// `column BETWEEN low AND high`, inclusive.
            pub fn where_between(
                &self,
                column: &str,
                low: impl Into<RowValues>,
                high: impl Into<RowValues>,
            ) -> Conditioned {
                self.push_predicate(Predicate::between(column, low, high))
            }

            /// `column LIKE pattern`; `%` and `_` are not escaped.
            pub fn where_like(&self, column: &str, pattern: impl Into<RowValues>) -> Conditioned {
                self.push_predicate(Predicate::like(column, pattern))
            }

            fn push_predicate(&self, predicate: Result<Predicate, SqlFluentError>) -> Conditioned {
                Conditioned {
                    query: self
                        .query
                        .try_with(predicate, |state, p| state.predicates.push(p)),
                }
            }
        }
    };
}

macro_rules! aggregate_methods {
    ($tier:ty) => {
        impl $tier {
            pub fn group_by<I, S>(&self, columns: I) -> Aggregated
            where
                I: IntoIterator<Item = S>,
                S: Into<String>,
            {
                let columns = owned_list(columns);
                Aggregated {
                    query: self.query.with(|state| state.group_by = columns),
                }
            }

            /// Ordering terms such as `"id DESC"`.
            pub fn order_by<I, S>(&self, terms: I) -> Aggregated
            where
                I: IntoIterator<Item = S>,
                S: Into<String>,
            {
                let terms = owned_list(terms);
                Aggregated {
                    query: self.query.with(|state| state.order_by = terms),
                }
            }

            pub fn having(&self, fragment: &str, args: impl IntoParams) -> Aggregated {
                Aggregated {
                    query: self
                        .query
                        .try_with(Predicate::raw(fragment, args), |state, p| {
                            state.having = Some(p);
                        }),
                }
            }

            /// `LIMIT limit OFFSET offset`; an offset of zero is omitted.
            pub fn limit_offset(&self, limit: u64, offset: u64) -> Aggregated {
                Aggregated {
                    query: self.query.with(|state| {
                        state.limit = Some(limit);
                        state.offset = Some(offset);
                    }),
                }
            }
        }
    };
}

macro_rules! terminal_methods {
    ($tier:ty) => {
        impl $tier {
            /// Accumulated state, as a backend receives it.
            #[must_use]
            pub fn query_state(&self) -> &QueryState {
                self.query.state()
            }

            /// Render the `SELECT` this query would run, numbered for the session's backend.
            ///
            /// # Errors
            ///
            /// Returns the first recorded builder error, or `InvalidQuery` for an unusable
            /// state.
            pub fn statement(&self) -> Result<QueryAndParams, SqlFluentError> {
                self.query.statement()
            }

            /// Run the query and return a cursor over every matching row.
            ///
            /// # Errors
            ///
            /// Returns builder, session or wrapped backend errors.
            pub async fn all(&self, cx: &Context) -> Result<Cursor, SqlFluentError> {
                self.query.all(cx).await
            }

            /// Fetch at most one row (`LIMIT 1`).
            ///
            /// Zero rows is not an error here; scanning the returned [`Row`] is.
            ///
            /// # Errors
            ///
            /// Returns builder, session or wrapped backend errors.
            pub async fn single(&self, cx: &Context) -> Result<Row, SqlFluentError> {
                self.query.single(cx).await
            }

            /// Project a single column or computed expression (`MAX(id)`, `id AS n`) and return a
            /// pluck cursor over it.
            ///
            /// # Errors
            ///
            /// Returns `InvalidQuery` for a blank column and `BindingError` for one holding
            /// placeholders, otherwise as [`Self::all`].
            pub async fn fetch_column(
                &self,
                cx: &Context,
                column: &str,
            ) -> Result<Cursor, SqlFluentError> {
                self.query.fetch_column(cx, column).await
            }

            /// Number of rows the query matches.
            ///
            /// # Errors
            ///
            /// Returns builder, session or wrapped backend errors.
            pub async fn count(&self, cx: &Context) -> Result<i64, SqlFluentError> {
                self.query.count(cx).await
            }

            /// Set columns on every matching row; returns the affected row count.
            ///
            /// # Errors
            ///
            /// Returns `InvalidQuery` without predicates or with read-only clauses.
            pub async fn update(
                &self,
                cx: &Context,
                changes: impl IntoAssignments,
            ) -> Result<usize, SqlFluentError> {
                self.query.update(cx, changes.into_assignments()).await
            }

            /// Write every non-key column of `record`, matched by its primary key and any
            /// predicates already on the query.
            ///
            /// # Errors
            ///
            /// Returns `InvalidQuery` when the key is blank and no predicate narrows the update.
            pub async fn update_record<T: Record>(
                &self,
                cx: &Context,
                record: &T,
            ) -> Result<usize, SqlFluentError> {
                self.query.update_record(cx, record).await
            }

            /// Delete matching rows; returns the affected row count.
            ///
            /// # Errors
            ///
            /// Returns `InvalidQuery` without predicates or with read-only clauses.
            pub async fn delete(&self, cx: &Context) -> Result<usize, SqlFluentError> {
                self.query.delete(cx).await
            }

            /// Delete the row identified by `record`'s primary key.
            ///
            /// # Errors
            ///
            /// Returns `InvalidQuery` when the key is blank and no predicate narrows the delete.
            pub async fn delete_record<T: Record>(
                &self,
                cx: &Context,
                record: &T,
            ) -> Result<usize, SqlFluentError> {
                self.query.delete_record(cx, record).await
            }
        }
    };
}

condition_methods!(Tabled);
condition_methods!(Conditioned);

aggregate_methods!(Tabled);
aggregate_methods!(Conditioned);
aggregate_methods!(Aggregated);

terminal_methods!(Tabled);
terminal_methods!(Conditioned);
terminal_methods!(Aggregated);
