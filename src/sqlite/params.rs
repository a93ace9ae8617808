use rusqlite::types::Value;

use crate::error::SqlFluentError;
use crate::types::{ParamConverter, RowValues};

/// Timestamps are stored as text in chrono's own layout, so stored values deserialize straight
/// back into `NaiveDateTime` fields; `RowValues::as_timestamp` reads it too.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Convert a single `RowValues` to a rusqlite `Value`.
#[must_use]
pub fn row_value_to_sqlite_value(value: &RowValues) -> Value {
    match value {
        RowValues::Int(i) => Value::Integer(*i),
        RowValues::Float(f) => Value::Real(*f),
        RowValues::Text(s) => Value::Text(s.clone()),
        RowValues::Bool(b) => Value::Integer(i64::from(*b)),
        RowValues::Timestamp(dt) => Value::Text(dt.format(TIMESTAMP_FORMAT).to_string()),
        RowValues::Null => Value::Null,
        RowValues::JSON(json) => Value::Text(json.to_string()),
        RowValues::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

/// Owned `SQLite` parameters, ready to move onto a blocking thread.
#[derive(Debug, Clone, Default)]
pub struct Params(pub Vec<Value>);

impl Params {
    /// Convert row values into `SQLite` values.
    ///
    /// # Errors
    ///
    /// Never fails today; kept fallible to match [`ParamConverter`].
    pub fn convert(params: &[RowValues]) -> Result<Self, SqlFluentError> {
        Ok(Params(params.iter().map(row_value_to_sqlite_value).collect()))
    }

    #[must_use]
    pub fn as_values(&self) -> &[Value] {
        &self.0
    }
}

impl ParamConverter<'_> for Params {
    type Converted = Params;

    fn convert_sql_params(params: &[RowValues]) -> Result<Self::Converted, SqlFluentError> {
        Self::convert(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn converts_each_variant() {
        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_milli_opt(12, 30, 0, 250)
            .unwrap();
        let params = <Params as ParamConverter>::convert_sql_params(&[
            RowValues::Bool(true),
            RowValues::Timestamp(ts),
            RowValues::JSON(serde_json::json!({"a": 1})),
            RowValues::Null,
        ])
        .unwrap();
        assert_eq!(
            params.as_values(),
            &[
                Value::Integer(1),
                Value::Text("2024-05-01T12:30:00.250".into()),
                Value::Text(r#"{"a":1}"#.into()),
                Value::Null,
            ]
        );
        assert_eq!(RowValues::Text("2024-05-01T12:30:00.250".into()).as_timestamp(), Some(ts));
        assert_eq!(RowValues::Text("2024-05-01 12:30:00.250".into()).as_timestamp(), Some(ts));
    }
}
