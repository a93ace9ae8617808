use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::SqlFluentError;
use crate::types::RowValues;

/// A struct that maps onto one table row.
///
/// Columns come from the struct's `Serialize` impl (so `#[serde(rename)]` and
/// `#[serde(skip_serializing)]` apply). Implement [`Record::set_primary_key`] to receive keys
/// generated on insert:
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use sql_fluent::prelude::*;
///
/// #[derive(Debug, Default, Serialize, Deserialize)]
/// struct Note {
///     id: i64,
///     data: String,
///     person_id: Option<i64>,
/// }
///
/// impl Record for Note {
///     fn set_primary_key(&mut self, id: i64) {
///         self.id = id;
///     }
/// }
/// ```
pub trait Record: Serialize {
    /// Column holding the primary key.
    const PRIMARY_KEY: &'static str = "id";

    fn set_primary_key(&mut self, _id: i64) {}
}

/// Layout chrono's `Serialize` impl writes a `NaiveDateTime` in.
const SERDE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Timestamp fields arrive as text after serialization; turn them back into timestamps so a
/// record column binds exactly like a directly bound `NaiveDateTime`.
fn column_value(value: JsonValue) -> RowValues {
    match value {
        JsonValue::String(text) => match NaiveDateTime::parse_from_str(&text, SERDE_TIMESTAMP_FORMAT)
        {
            Ok(at) => RowValues::Timestamp(at),
            Err(_) => RowValues::Text(text),
        },
        other => RowValues::from_json(other),
    }
}

/// Serialize a record into ordered column/value pairs.
///
/// Text in chrono's `NaiveDateTime` layout (`2016-01-02T16:40:50`) is bound as a timestamp.
///
/// # Errors
///
/// Returns `SqlFluentError::InvalidQuery` if the value does not serialize to a map of columns.
pub fn record_columns<T: Serialize + ?Sized>(
    record: &T,
) -> Result<Vec<(String, RowValues)>, SqlFluentError> {
    let value = serde_json::to_value(record).map_err(|e| {
        SqlFluentError::InvalidQuery(format!("record could not be serialized: {e}"))
    })?;
    match value {
        JsonValue::Object(map) => Ok(map
            .into_iter()
            .map(|(column, value)| (column, column_value(value)))
            .collect()),
        other => Err(SqlFluentError::InvalidQuery(format!(
            "records must serialize to a struct or map, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use serde::Serialize;

    use super::*;

    #[derive(Serialize)]
    struct Person {
        id: i64,
        name: String,
        #[serde(rename = "nick")]
        nickname: Option<String>,
        #[serde(skip_serializing)]
        #[allow(dead_code)]
        cached: u32,
        tags: Vec<String>,
    }

    impl Record for Person {}

    #[test]
    fn columns_follow_field_order_and_renames() {
        let p = Person {
            id: 0,
            name: "Ann".into(),
            nickname: None,
            cached: 3,
            tags: vec!["a".into()],
        };
        let cols = record_columns(&p).unwrap();
        let names: Vec<&str> = cols.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(names, ["id", "name", "nick", "tags"]);
        assert_eq!(cols[2].1, RowValues::Null);
        assert!(matches!(cols[3].1, RowValues::JSON(_)));
        assert!(cols[0].1.is_blank_key());
    }

    #[derive(Serialize)]
    struct Event {
        id: i64,
        label: String,
        at: NaiveDateTime,
    }

    impl Record for Event {}

    #[test]
    fn timestamp_fields_bind_as_timestamps() {
        let at = chrono::NaiveDate::from_ymd_opt(2016, 1, 2)
            .unwrap()
            .and_hms_milli_opt(16, 40, 50, 250)
            .unwrap();
        let event = Event {
            id: 1,
            label: "2016-01-02".into(),
            at,
        };
        let cols = record_columns(&event).unwrap();
        assert_eq!(cols[1].1, RowValues::Text("2016-01-02".into()));
        assert_eq!(cols[2].1, RowValues::Timestamp(at));
        assert_eq!(cols[2].1, RowValues::from(at));
    }

    #[test]
    fn scalars_are_not_records() {
        let err = record_columns(&5).unwrap_err();
        assert!(matches!(err, SqlFluentError::InvalidQuery(_)));
    }
}
