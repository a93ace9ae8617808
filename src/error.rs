use std::fmt;

use thiserror::Error;

#[cfg(feature = "sqlite")]
use rusqlite;

/// The operation a backend failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Select,
    Count,
    Insert,
    Update,
    Delete,
    /// Caller-supplied SQL run through `exec`/`query`.
    Raw,
    Begin,
    Commit,
    Rollback,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Select => "select",
            Operation::Count => "count",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Raw => "raw",
            Operation::Begin => "begin",
            Operation::Commit => "commit",
            Operation::Rollback => "rollback",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum SqlFluentError {
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Provider already registered: {0}")]
    ProviderAlreadyRegistered(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Parameter binding error: {0}")]
    BindingError(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("No rows found in table `{table}`")]
    NotFound { table: String },

    #[error(transparent)]
    ScanError(#[from] ScanError),

    #[error("Transaction state error: {0}")]
    TransactionStateError(String),

    #[error("Backend error during {operation} on `{table}`: {source}")]
    BackendError {
        operation: Operation,
        table: String,
        #[source]
        source: Box<SqlFluentError>,
    },

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),
}

impl SqlFluentError {
    /// Attach the operation and table to an error raised by a live backend.
    ///
    /// Errors that already belong to this crate's taxonomy pass through untouched.
    #[must_use]
    pub fn in_operation(self, operation: Operation, table: &str) -> Self {
        match self {
            #[cfg(feature = "sqlite")]
            err @ SqlFluentError::SqliteError(_) => SqlFluentError::BackendError {
                operation,
                table: table.to_string(),
                source: Box::new(err),
            },
            err @ SqlFluentError::ExecutionError(_) => SqlFluentError::BackendError {
                operation,
                table: table.to_string(),
                source: Box::new(err),
            },
            other => other,
        }
    }

    /// True for `NotFound`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, SqlFluentError::NotFound { .. })
    }
}

#[cfg(feature = "sqlite")]
impl From<bb8::RunError<SqlFluentError>> for SqlFluentError {
    fn from(err: bb8::RunError<SqlFluentError>) -> Self {
        match err {
            bb8::RunError::User(inner) => inner,
            bb8::RunError::TimedOut => {
                SqlFluentError::ConnectionError("SQLite pool checkout timed out".into())
            }
        }
    }
}

/// A failure to move a column value into a destination.
///
/// `index` and `column` locate the offending column when known; scans of a whole row (arity
/// mismatches) leave them empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanError {
    pub index: Option<usize>,
    pub column: Option<String>,
    pub expected: String,
    pub actual: String,
    pub detail: Option<String>,
}

impl ScanError {
    #[must_use]
    pub fn new(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
            actual: actual.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn at(mut self, index: usize, column: &str) -> Self {
        if self.index.is_none() {
            self.index = Some(index);
            self.column = Some(column.to_string());
        }
        self
    }

    pub(crate) fn message(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
            ..Self::default()
        }
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Scan error")?;
        if let Some(index) = self.index {
            write!(f, " at column {index}")?;
            if let Some(column) = &self.column {
                write!(f, " (`{column}`)")?;
            }
        }
        if !self.expected.is_empty() || !self.actual.is_empty() {
            write!(f, ": expected {}, found {}", self.expected, self.actual)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ScanError {}

impl serde::de::Error for ScanError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        ScanError::message(msg.to_string())
    }

    fn invalid_type(unexp: serde::de::Unexpected<'_>, exp: &dyn serde::de::Expected) -> Self {
        ScanError::new(exp.to_string(), unexp.to_string())
    }

    fn invalid_value(unexp: serde::de::Unexpected<'_>, exp: &dyn serde::de::Expected) -> Self {
        ScanError::new(exp.to_string(), unexp.to_string())
    }

    fn invalid_length(len: usize, exp: &dyn serde::de::Expected) -> Self {
        ScanError::new(exp.to_string(), format!("{len} columns"))
    }

    fn missing_field(field: &'static str) -> Self {
        ScanError {
            column: Some(field.to_string()),
            expected: format!("a column named `{field}`"),
            actual: "no such column".into(),
            ..ScanError::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_are_wrapped_with_operation() {
        let err = SqlFluentError::ExecutionError("boom".into()).in_operation(Operation::Update, "users");
        match err {
            SqlFluentError::BackendError {
                operation, table, ..
            } => {
                assert_eq!(operation, Operation::Update);
                assert_eq!(table, "users");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn taxonomy_errors_pass_through() {
        let err = SqlFluentError::BindingError("x".into()).in_operation(Operation::Select, "t");
        assert!(matches!(err, SqlFluentError::BindingError(_)));
        let err = SqlFluentError::NotFound { table: "t".into() }.in_operation(Operation::Select, "t");
        assert!(err.is_not_found());
    }

    #[test]
    fn scan_error_display_locates_column() {
        let err = ScanError::new("i64", "string \"x\"").at(2, "age");
        assert_eq!(
            err.to_string(),
            "Scan error at column 2 (`age`): expected i64, found string \"x\""
        );
    }
}
