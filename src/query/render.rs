//! SQL text generation for built queries.
//!
//! Fragments are assembled with anonymous `?` placeholders and numbered once, over the whole
//! statement, for the target backend.

use super::QueryAndParams;
use crate::binder::{Predicate, validate_column};
use crate::error::SqlFluentError;
use crate::query_builder::{JoinKind, QueryState};
use crate::translation::PlaceholderStyle;
use crate::types::RowValues;

fn ensure_table(state: &QueryState) -> Result<(), SqlFluentError> {
    if state.table.trim().is_empty() {
        return Err(SqlFluentError::InvalidQuery(
            "no table selected; call table(name) first".into(),
        ));
    }
    Ok(())
}

fn projection(state: &QueryState) -> String {
    if !state.columns.is_empty() {
        state.columns.join(", ")
    } else if state.joins.is_empty() {
        "*".to_string()
    } else {
        format!("{}.*", state.table)
    }
}

fn push_joins(sql: &mut String, state: &QueryState) {
    for join in &state.joins {
        let keyword = match join.kind {
            JoinKind::Inner => " INNER JOIN ",
            JoinKind::Left => " LEFT JOIN ",
            JoinKind::Right => " RIGHT JOIN ",
        };
        sql.push_str(keyword);
        sql.push_str(&join.table);
        sql.push_str(" ON ");
        sql.push_str(&join.on);
    }
}

fn push_where(sql: &mut String, params: &mut Vec<RowValues>, predicates: &[Predicate]) {
    for (i, predicate) in predicates.iter().enumerate() {
        sql.push_str(if i == 0 { " WHERE (" } else { " AND (" });
        sql.push_str(&predicate.fragment);
        sql.push(')');
        params.extend(predicate.params.iter().cloned());
    }
}

fn select_body(state: &QueryState) -> Result<(String, Vec<RowValues>), SqlFluentError> {
    ensure_table(state)?;
    let mut sql = String::with_capacity(64);
    let mut params = Vec::new();

    sql.push_str("SELECT ");
    sql.push_str(&projection(state));
    sql.push_str(" FROM ");
    sql.push_str(&state.table);
    push_joins(&mut sql, state);
    push_where(&mut sql, &mut params, &state.predicates);
    if !state.group_by.is_empty() {
        sql.push_str(" GROUP BY ");
        sql.push_str(&state.group_by.join(", "));
    }
    if let Some(having) = &state.having {
        sql.push_str(" HAVING ");
        sql.push_str(&having.fragment);
        params.extend(having.params.iter().cloned());
    }
    if !state.order_by.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&state.order_by.join(", "));
    }
    if let Some(limit) = state.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
        if let Some(offset) = state.offset.filter(|o| *o > 0) {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
    }
    Ok((sql, params))
}

/// `SELECT` for `all`, `single` and `fetch_column`.
///
/// # Errors
///
/// Returns `SqlFluentError::InvalidQuery` when no table is set.
pub fn select(state: &QueryState, style: PlaceholderStyle) -> Result<QueryAndParams, SqlFluentError> {
    let (sql, params) = select_body(state)?;
    Ok(QueryAndParams::new(sql, params).numbered(style))
}

/// `SELECT COUNT(*)`, wrapping the select when grouping or limits change the row count.
///
/// # Errors
///
/// Returns `SqlFluentError::InvalidQuery` when no table is set.
pub fn count(state: &QueryState, style: PlaceholderStyle) -> Result<QueryAndParams, SqlFluentError> {
    ensure_table(state)?;
    let wraps = !state.group_by.is_empty() || state.having.is_some() || state.limit.is_some();
    if wraps {
        let (inner, params) = select_body(state)?;
        let sql = format!("SELECT COUNT(*) FROM ({inner}) AS counted");
        return Ok(QueryAndParams::new(sql, params).numbered(style));
    }

    let mut sql = format!("SELECT COUNT(*) FROM {}", state.table);
    let mut params = Vec::new();
    push_joins(&mut sql, state);
    push_where(&mut sql, &mut params, &state.predicates);
    Ok(QueryAndParams::new(sql, params).numbered(style))
}

/// Single-row `INSERT`; no columns renders `DEFAULT VALUES`.
///
/// # Errors
///
/// Returns `SqlFluentError::InvalidQuery` for an empty table or invalid column name.
pub fn insert(
    table: &str,
    values: &[(String, RowValues)],
    style: PlaceholderStyle,
) -> Result<QueryAndParams, SqlFluentError> {
    if table.trim().is_empty() {
        return Err(SqlFluentError::InvalidQuery("insert without a table".into()));
    }
    if values.is_empty() {
        return Ok(QueryAndParams::new_without_params(format!(
            "INSERT INTO {table} DEFAULT VALUES"
        )));
    }
    let mut columns = Vec::with_capacity(values.len());
    for (column, _) in values {
        validate_column(column)?;
        columns.push(column.as_str());
    }
    let placeholders = vec!["?"; values.len()].join(", ");
    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders})",
        columns.join(", ")
    );
    let params = values.iter().map(|(_, v)| v.clone()).collect();
    Ok(QueryAndParams::new(sql, params).numbered(style))
}

/// Clauses that have no meaning for a single-table write.
fn reject_read_clauses(state: &QueryState, operation: &str) -> Result<(), SqlFluentError> {
    let offending = if !state.joins.is_empty() {
        Some("joins")
    } else if !state.group_by.is_empty() || state.having.is_some() {
        Some("grouping")
    } else if !state.order_by.is_empty() {
        Some("ordering")
    } else if state.limit.is_some() {
        Some("limits")
    } else {
        None
    };
    match offending {
        Some(clause) => Err(SqlFluentError::InvalidQuery(format!(
            "{operation} on `{}` does not support {clause}",
            state.table
        ))),
        None => Ok(()),
    }
}

/// `UPDATE ... SET`; assignment parameters precede predicate parameters.
///
/// # Errors
///
/// Returns `SqlFluentError::InvalidQuery` for missing assignments, invalid columns, or read-only
/// clauses on the query.
pub fn update(
    state: &QueryState,
    assignments: &[(String, RowValues)],
    style: PlaceholderStyle,
) -> Result<QueryAndParams, SqlFluentError> {
    ensure_table(state)?;
    reject_read_clauses(state, "update")?;
    if assignments.is_empty() {
        return Err(SqlFluentError::InvalidQuery(format!(
            "update on `{}` has no columns to set",
            state.table
        )));
    }
    let mut sets = Vec::with_capacity(assignments.len());
    let mut params = Vec::with_capacity(assignments.len());
    for (column, value) in assignments {
        validate_column(column)?;
        sets.push(format!("{column} = ?"));
        params.push(value.clone());
    }
    let mut sql = format!("UPDATE {} SET {}", state.table, sets.join(", "));
    push_where(&mut sql, &mut params, &state.predicates);
    Ok(QueryAndParams::new(sql, params).numbered(style))
}

/// `DELETE FROM`.
///
/// # Errors
///
/// Returns `SqlFluentError::InvalidQuery` for read-only clauses on the query.
pub fn delete(state: &QueryState, style: PlaceholderStyle) -> Result<QueryAndParams, SqlFluentError> {
    ensure_table(state)?;
    reject_read_clauses(state, "delete")?;
    let mut sql = format!("DELETE FROM {}", state.table);
    let mut params = Vec::new();
    push_where(&mut sql, &mut params, &state.predicates);
    Ok(QueryAndParams::new(sql, params).numbered(style))
}
