pub mod render;

use crate::translation::{PlaceholderStyle, number_placeholders};
use crate::types::RowValues;

/// A SQL string paired with the parameters its placeholders consume, in order.
///
/// Built queries render to this before they reach a backend, and
/// [`statement`](crate::query_builder::Tabled::statement) exposes it for inspection:
/// ```rust
/// use sql_fluent::prelude::*;
///
/// let qp = QueryAndParams::new(
///     "INSERT INTO t (id, name) VALUES (?, ?)",
///     vec![RowValues::Int(1), RowValues::Text("alice".into())],
/// );
/// assert_eq!(qp.numbered(PlaceholderStyle::Postgres).query, "INSERT INTO t (id, name) VALUES ($1, $2)");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAndParams {
    /// The SQL query string
    pub query: String,
    /// The parameters to be bound to the query
    pub params: Vec<RowValues>,
}

impl QueryAndParams {
    pub fn new(query: impl Into<String>, params: Vec<RowValues>) -> Self {
        Self {
            query: query.into(),
            params,
        }
    }

    pub fn new_without_params(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            params: Vec::new(),
        }
    }

    /// Rewrite anonymous `?` placeholders in the target style.
    #[must_use]
    pub fn numbered(self, style: PlaceholderStyle) -> Self {
        let query = number_placeholders(&self.query, style).into_owned();
        Self {
            query,
            params: self.params,
        }
    }
}
