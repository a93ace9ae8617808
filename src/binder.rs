//! Normalization of predicate arguments into flat, positional parameter lists.
//!
//! Every argument position in the builder takes one `impl IntoParams` value:
//!
//! - a scalar (`i64`, `&str`, `bool`, `NaiveDateTime`, `RowValues`, `Option<T>`, ...) binds
//!   exactly one parameter;
//! - a sequence (`Vec<T>`, `&[T]`, `[T; N]`, `&Vec<T>`) or a tuple binds one parameter per
//!   element, in order;
//! - `()` binds nothing.
//!
//! So `where_("data = ?", x)` and `where_("data = ?", vec![x])` bind the same single
//! parameter, and `where_in("id", (1, 2, 3))` equals `where_in("id", [1, 2, 3])`. A value that
//! is itself a sequence but must travel as one parameter is wrapped in a `RowValues` variant
//! (`Blob` for bytes, `JSON` for structured data).

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde_json::Value as JsonValue;

use crate::error::SqlFluentError;
use crate::translation::count_placeholders;
use crate::types::RowValues;

static IDENTIFIER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").ok()
});

/// Arguments that normalize into an ordered parameter list.
pub trait IntoParams {
    fn into_params(self) -> Vec<RowValues>;
}

macro_rules! scalar_params {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoParams for $ty {
                fn into_params(self) -> Vec<RowValues> {
                    vec![RowValues::from(self)]
                }
            }
        )*
    };
}

scalar_params!(
    i8,
    i16,
    i32,
    i64,
    u16,
    u32,
    f32,
    f64,
    bool,
    String,
    &str,
    &String,
    NaiveDateTime,
    JsonValue,
    RowValues,
    &RowValues,
);

impl<T: Into<RowValues>> IntoParams for Option<T> {
    fn into_params(self) -> Vec<RowValues> {
        vec![RowValues::from(self)]
    }
}

impl IntoParams for () {
    fn into_params(self) -> Vec<RowValues> {
        Vec::new()
    }
}

impl<T: Into<RowValues>> IntoParams for Vec<T> {
    fn into_params(self) -> Vec<RowValues> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<RowValues> + Clone> IntoParams for &Vec<T> {
    fn into_params(self) -> Vec<RowValues> {
        self.iter().cloned().map(Into::into).collect()
    }
}

impl<T: Into<RowValues> + Clone> IntoParams for &[T] {
    fn into_params(self) -> Vec<RowValues> {
        self.iter().cloned().map(Into::into).collect()
    }
}

impl<T: Into<RowValues>, const N: usize> IntoParams for [T; N] {
    fn into_params(self) -> Vec<RowValues> {
        self.into_iter().map(Into::into).collect()
    }
}

macro_rules! tuple_params {
    ($($name:ident),+) => {
        impl<$($name: Into<RowValues>),+> IntoParams for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_params(self) -> Vec<RowValues> {
                let ($($name,)+) = self;
                vec![$($name.into()),+]
            }
        }
    };
}

tuple_params!(A);
tuple_params!(A, B);
tuple_params!(A, B, C);
tuple_params!(A, B, C, D);
tuple_params!(A, B, C, D, E);
tuple_params!(A, B, C, D, E, F);
tuple_params!(A, B, C, D, E, F, G);
tuple_params!(A, B, C, D, E, F, G, H);

/// Column/value pairs for an `update`.
pub trait IntoAssignments {
    fn into_assignments(self) -> Vec<(String, RowValues)>;
}

impl<K: Into<String>, V: Into<RowValues>> IntoAssignments for Vec<(K, V)> {
    fn into_assignments(self) -> Vec<(String, RowValues)> {
        self.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
    }
}

impl<K: Into<String>, V: Into<RowValues>, const N: usize> IntoAssignments for [(K, V); N] {
    fn into_assignments(self) -> Vec<(String, RowValues)> {
        self.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
    }
}

impl<K: Into<String>, V: Into<RowValues>> IntoAssignments for BTreeMap<K, V> {
    fn into_assignments(self) -> Vec<(String, RowValues)> {
        self.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
    }
}

/// Hash maps are sorted by column so the rendered statement is stable.
impl<K: Into<String>, V: Into<RowValues>, S> IntoAssignments for HashMap<K, V, S> {
    fn into_assignments(self) -> Vec<(String, RowValues)> {
        let mut pairs: Vec<(String, RowValues)> =
            self.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs
    }
}

/// One predicate fragment with the parameters its placeholders consume.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub fragment: String,
    pub params: Vec<RowValues>,
}

impl Predicate {
    /// Pair a caller fragment with its arguments.
    ///
    /// # Errors
    ///
    /// Returns `SqlFluentError::BindingError` when the fragment is empty, uses numbered
    /// placeholders, or the argument count differs from the placeholder count.
    pub fn raw(fragment: &str, args: impl IntoParams) -> Result<Self, SqlFluentError> {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return Err(SqlFluentError::BindingError("empty predicate fragment".into()));
        }
        let params = args.into_params();
        let expected = count_placeholders(fragment)?;
        if expected != params.len() {
            return Err(SqlFluentError::BindingError(format!(
                "`{fragment}` has {expected} placeholder(s) but {} parameter(s) were bound",
                params.len()
            )));
        }
        Ok(Self {
            fragment: fragment.to_string(),
            params,
        })
    }

    /// `col = ?`, or `col IS NULL` for the null sentinel.
    ///
    /// # Errors
    ///
    /// Returns `SqlFluentError::InvalidQuery` for an invalid column name.
    pub fn eq(column: &str, value: impl Into<RowValues>) -> Result<Self, SqlFluentError> {
        validate_column(column)?;
        let value = value.into();
        if value.is_null() {
            return Ok(Self {
                fragment: format!("{column} IS NULL"),
                params: Vec::new(),
            });
        }
        Ok(Self {
            fragment: format!("{column} = ?"),
            params: vec![value],
        })
    }

    /// `col IN (?, ?, ...)`.
    ///
    /// # Errors
    ///
    /// Returns `SqlFluentError::BindingError` for an empty list and
    /// `SqlFluentError::InvalidQuery` for an invalid column name.
    pub fn in_list(column: &str, values: impl IntoParams) -> Result<Self, SqlFluentError> {
        validate_column(column)?;
        let params = values.into_params();
        if params.is_empty() {
            return Err(SqlFluentError::BindingError(format!(
                "IN list for `{column}` is empty"
            )));
        }
        let placeholders = vec!["?"; params.len()].join(", ");
        Ok(Self {
            fragment: format!("{column} IN ({placeholders})"),
            params,
        })
    }

    /// `col BETWEEN ? AND ?`, inclusive on both ends.
    ///
    /// # Errors
    ///
    /// Returns `SqlFluentError::InvalidQuery` for an invalid column name.
    pub fn between(
        column: &str,
        low: impl Into<RowValues>,
        high: impl Into<RowValues>,
    ) -> Result<Self, SqlFluentError> {
        validate_column(column)?;
        Ok(Self {
            fragment: format!("{column} BETWEEN ? AND ?"),
            params: vec![low.into(), high.into()],
        })
    }

    /// `col LIKE ?`. Wildcards in the pattern are passed through as written.
    ///
    /// # Errors
    ///
    /// Returns `SqlFluentError::InvalidQuery` for an invalid column name.
    pub fn like(column: &str, pattern: impl Into<RowValues>) -> Result<Self, SqlFluentError> {
        validate_column(column)?;
        Ok(Self {
            fragment: format!("{column} LIKE ?"),
            params: vec![pattern.into()],
        })
    }
}

/// Check that `column` is a plain or table-qualified identifier.
///
/// # Errors
///
/// Returns `SqlFluentError::InvalidQuery` otherwise.
pub fn validate_column(column: &str) -> Result<(), SqlFluentError> {
    let valid = IDENTIFIER
        .as_ref()
        .is_some_and(|re| re.is_match(column));
    if valid {
        Ok(())
    } else {
        Err(SqlFluentError::InvalidQuery(format!(
            "`{column}` is not a valid column identifier"
        )))
    }
}
