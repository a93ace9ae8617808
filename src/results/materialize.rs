use serde::de::DeserializeOwned;

use super::de::RowDeserializer;
use super::row::CustomDbRow;
use crate::error::{ScanError, SqlFluentError};

/// How a destination is populated from rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// First row only, columns matched to fields by name; no row is `NotFound`.
    SingleRecord,
    /// Every remaining row, columns matched to fields by name.
    RecordSequence,
    /// Every remaining row's only column.
    ScalarSequence,
    /// Columns matched to destination slots by position, with exact arity.
    PositionalScan,
}

impl Shape {
    /// Hydrate `T` from one row according to this shape.
    ///
    /// # Errors
    ///
    /// Returns `ScanError` on arity or type mismatches.
    pub fn decode<T: DeserializeOwned>(self, row: &CustomDbRow) -> Result<T, ScanError> {
        match self {
            Shape::SingleRecord | Shape::RecordSequence => {
                T::deserialize(RowDeserializer::by_name(row))
            }
            Shape::ScalarSequence => {
                if row.len() != 1 {
                    return Err(ScanError::new(
                        "exactly 1 column",
                        format!("{} columns", row.len()),
                    ));
                }
                T::deserialize(RowDeserializer::positional(row))
            }
            Shape::PositionalScan => T::deserialize(RowDeserializer::positional(row)),
        }
    }
}

/// The single-record rule: hydrate from the row if there is one.
///
/// # Errors
///
/// Returns `SqlFluentError::NotFound` when `row` is `None`, or a scan error.
pub(crate) fn single<T: DeserializeOwned>(
    row: Option<&CustomDbRow>,
    shape: Shape,
    table: &str,
) -> Result<T, SqlFluentError> {
    match row {
        Some(row) => Ok(shape.decode(row)?),
        None => Err(SqlFluentError::NotFound {
            table: table.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde::Deserialize;

    use super::*;
    use crate::types::RowValues;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Note {
        id: i64,
        data: String,
    }

    fn note_row() -> CustomDbRow {
        CustomDbRow::new(
            Arc::new(vec!["data".into(), "id".into()]),
            vec![RowValues::Text("foo".into()), RowValues::Int(1)],
        )
    }

    #[test]
    fn record_shapes_match_by_name() {
        let note: Note = Shape::RecordSequence.decode(&note_row()).unwrap();
        assert_eq!(
            note,
            Note {
                id: 1,
                data: "foo".into()
            }
        );
    }

    #[test]
    fn positional_shape_matches_by_order() {
        let (data, id): (String, i64) = Shape::PositionalScan.decode(&note_row()).unwrap();
        assert_eq!((data.as_str(), id), ("foo", 1));
    }

    #[test]
    fn scalar_shape_needs_one_column() {
        let err = Shape::ScalarSequence
            .decode::<Vec<String>>(&note_row())
            .unwrap_err();
        assert_eq!(err.expected, "exactly 1 column");
    }

    #[test]
    fn missing_single_row_is_not_found() {
        let err = single::<Note>(None, Shape::SingleRecord, "notes").unwrap_err();
        assert!(err.is_not_found());
    }
}
