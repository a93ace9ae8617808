//! serde glue that hydrates destinations from a `CustomDbRow`.
//!
//! `RowDeserializer` reads a whole row either by name (record scans) or by position
//! (positional and pluck scans). `ValueDeserializer` reads one column value.

use serde::de::value::{SeqDeserializer, StrDeserializer};
use serde::de::{self, DeserializeSeed, Deserializer, Error as _, IntoDeserializer, Visitor};
use serde::forward_to_deserialize_any;
use serde_json::Value as JsonValue;

use super::row::CustomDbRow;
use crate::error::ScanError;
use crate::types::RowValues;

const TIMESTAMP_WIRE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

pub(crate) struct RowDeserializer<'a> {
    row: &'a CustomDbRow,
    by_name: bool,
}

impl<'a> RowDeserializer<'a> {
    pub(crate) fn by_name(row: &'a CustomDbRow) -> Self {
        Self { row, by_name: true }
    }

    pub(crate) fn positional(row: &'a CustomDbRow) -> Self {
        Self {
            row,
            by_name: false,
        }
    }

    fn single(&self) -> Result<&'a RowValues, ScanError> {
        match self.row.rows.as_slice() {
            [only] => Ok(only),
            values => Err(arity("exactly 1 column", values.len())),
        }
    }

    fn expect_arity(&self, len: usize) -> Result<(), ScanError> {
        if self.row.len() == len {
            Ok(())
        } else {
            Err(arity(&format!("{len} columns"), self.row.len()))
        }
    }

    fn columns(&self) -> ColumnSeq<'a> {
        ColumnSeq {
            row: self.row,
            next: 0,
        }
    }
}

fn arity(expected: &str, actual: usize) -> ScanError {
    ScanError::new(expected, format!("{actual} columns"))
}

macro_rules! forward_to_single_column {
    ($($method:ident)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ScanError> {
                let value = self.single()?;
                ValueDeserializer::new(value)
                    .$method(visitor)
                    .map_err(|e| e.at(0, self.row.column_name(0)))
            }
        )*
    };
}

impl<'de, 'a> Deserializer<'de> for RowDeserializer<'a> {
    type Error = ScanError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ScanError> {
        if self.by_name {
            self.deserialize_map(visitor)
        } else if self.row.len() == 1 {
            let value = self.single()?;
            ValueDeserializer::new(value)
                .deserialize_any(visitor)
                .map_err(|e| e.at(0, self.row.column_name(0)))
        } else {
            visitor.visit_seq(self.columns())
        }
    }

    forward_to_single_column! {
        deserialize_bool deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64
        deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64 deserialize_f32
        deserialize_f64 deserialize_char deserialize_str deserialize_string
        deserialize_bytes deserialize_byte_buf
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ScanError> {
        if !self.by_name && self.row.len() == 1 {
            let value = self.single()?;
            return ValueDeserializer::new(value)
                .deserialize_option(visitor)
                .map_err(|e| e.at(0, self.row.column_name(0)));
        }
        visitor.visit_some(self)
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ScanError> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, ScanError> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, ScanError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ScanError> {
        visitor.visit_seq(self.columns())
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        len: usize,
        visitor: V,
    ) -> Result<V::Value, ScanError> {
        self.expect_arity(len)?;
        visitor.visit_seq(self.columns())
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value, ScanError> {
        self.deserialize_tuple(len, visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ScanError> {
        let row = self.row;
        let entries = (0..row.len()).map(|i| (i, row.column_name(i))).collect();
        visitor.visit_map(ColumnMap {
            row,
            entries,
            next: 0,
        })
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, ScanError> {
        if !self.by_name {
            self.expect_arity(fields.len())?;
            return visitor.visit_seq(self.columns());
        }
        // First column matching each field wins; columns without a field are skipped.
        let row = self.row;
        let entries = fields
            .iter()
            .filter_map(|field| row.find_column(field).map(|i| (i, *field)))
            .collect();
        visitor.visit_map(ColumnMap {
            row,
            entries,
            next: 0,
        })
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, ScanError> {
        let value = self.single()?;
        ValueDeserializer::new(value)
            .deserialize_enum(name, variants, visitor)
            .map_err(|e| e.at(0, self.row.column_name(0)))
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ScanError> {
        self.deserialize_str(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ScanError> {
        visitor.visit_unit()
    }
}

struct ColumnSeq<'a> {
    row: &'a CustomDbRow,
    next: usize,
}

impl<'de, 'a> de::SeqAccess<'de> for ColumnSeq<'a> {
    type Error = ScanError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, ScanError> {
        let Some(value) = self.row.rows.get(self.next) else {
            return Ok(None);
        };
        let index = self.next;
        self.next += 1;
        seed.deserialize(ValueDeserializer::new(value))
            .map(Some)
            .map_err(|e| e.at(index, self.row.column_name(index)))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.row.len().saturating_sub(self.next))
    }
}

struct ColumnMap<'a> {
    row: &'a CustomDbRow,
    /// (column index, key handed to the visitor)
    entries: Vec<(usize, &'a str)>,
    next: usize,
}

impl<'de, 'a> de::MapAccess<'de> for ColumnMap<'a> {
    type Error = ScanError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, ScanError> {
        match self.entries.get(self.next) {
            Some((_, key)) => seed.deserialize(StrDeserializer::<ScanError>::new(key)).map(Some),
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, ScanError> {
        let Some(&(index, _)) = self.entries.get(self.next) else {
            return Err(ScanError::message("value requested before key"));
        };
        self.next += 1;
        let value = self.row.get_by_index(index).unwrap_or(&RowValues::Null);
        seed.deserialize(ValueDeserializer::new(value))
            .map_err(|e| e.at(index, self.row.column_name(index)))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.entries.len().saturating_sub(self.next))
    }
}

/// Reads one column value.
pub(crate) struct ValueDeserializer<'a> {
    value: &'a RowValues,
}

impl<'a> ValueDeserializer<'a> {
    pub(crate) fn new(value: &'a RowValues) -> Self {
        Self { value }
    }

    fn mismatch(&self, expected: &str) -> ScanError {
        ScanError::new(expected, self.value.kind())
    }

    /// JSON stored in a text column comes back as text.
    fn structured(&self) -> Result<Option<JsonValue>, ScanError> {
        match self.value {
            RowValues::JSON(json) => Ok(Some(json.clone())),
            RowValues::Text(text) => serde_json::from_str(text)
                .map(Some)
                .map_err(|e| ScanError::new("JSON text", "text").with_detail(e.to_string())),
            _ => Ok(None),
        }
    }
}

impl ScanError {
    fn with_detail(mut self, detail: String) -> Self {
        self.detail = Some(detail);
        self
    }
}

fn from_json<'de, V: Visitor<'de>>(
    json: JsonValue,
    forward: impl FnOnce(JsonValue, V) -> Result<V::Value, serde_json::Error>,
    visitor: V,
) -> Result<V::Value, ScanError> {
    forward(json, visitor).map_err(ScanError::custom)
}

impl<'de, 'a> Deserializer<'de> for ValueDeserializer<'a> {
    type Error = ScanError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ScanError> {
        match self.value {
            RowValues::Int(i) => visitor.visit_i64(*i),
            RowValues::Float(f) => visitor.visit_f64(*f),
            RowValues::Text(s) => visitor.visit_str(s),
            RowValues::Bool(b) => visitor.visit_bool(*b),
            RowValues::Timestamp(ts) => {
                visitor.visit_string(ts.format(TIMESTAMP_WIRE_FORMAT).to_string())
            }
            RowValues::Null => visitor.visit_unit(),
            RowValues::JSON(json) => {
                from_json(json.clone(), |j, v| j.deserialize_any(v), visitor)
            }
            RowValues::Blob(bytes) => visitor.visit_bytes(bytes),
        }
    }

    forward_to_deserialize_any! {
        i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char identifier ignored_any
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ScanError> {
        match self.value {
            RowValues::Bool(b) => visitor.visit_bool(*b),
            RowValues::Int(0) => visitor.visit_bool(false),
            RowValues::Int(1) => visitor.visit_bool(true),
            _ => Err(self.mismatch("bool")),
        }
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ScanError> {
        match self.value {
            RowValues::Int(i) => visitor.visit_string(i.to_string()),
            RowValues::Float(f) => visitor.visit_string(f.to_string()),
            RowValues::Null => Err(self.mismatch("string")),
            _ => self.deserialize_any(visitor),
        }
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ScanError> {
        self.deserialize_str(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ScanError> {
        match self.value {
            RowValues::Blob(bytes) => visitor.visit_bytes(bytes),
            RowValues::Text(s) => visitor.visit_bytes(s.as_bytes()),
            _ => Err(self.mismatch("bytes")),
        }
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ScanError> {
        self.deserialize_bytes(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ScanError> {
        if self.value.is_null() {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ScanError> {
        if self.value.is_null() {
            visitor.visit_unit()
        } else {
            Err(self.mismatch("null"))
        }
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, ScanError> {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, ScanError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ScanError> {
        if let RowValues::Blob(bytes) = self.value {
            let mut seq = SeqDeserializer::<_, ScanError>::new(bytes.iter().copied());
            let value = visitor.visit_seq(&mut seq)?;
            seq.end()?;
            return Ok(value);
        }
        match self.structured()? {
            Some(json) => from_json(json, |j, v| j.deserialize_seq(v), visitor),
            None => Err(self.mismatch("sequence")),
        }
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        len: usize,
        visitor: V,
    ) -> Result<V::Value, ScanError> {
        match self.structured()? {
            Some(json) => from_json(json, |j, v| j.deserialize_tuple(len, v), visitor),
            None => Err(self.mismatch("tuple")),
        }
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value, ScanError> {
        self.deserialize_tuple(len, visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, ScanError> {
        match self.structured()? {
            Some(json) => from_json(json, |j, v| j.deserialize_map(v), visitor),
            None => Err(self.mismatch("map")),
        }
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, ScanError> {
        match self.structured()? {
            Some(json) => from_json(json, |j, v| j.deserialize_struct(name, fields, v), visitor),
            None => Err(self.mismatch("struct")),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, ScanError> {
        match self.value {
            RowValues::Text(s) => {
                let variant: StrDeserializer<'_, ScanError> = s.as_str().into_deserializer();
                visitor.visit_enum(variant)
            }
            RowValues::JSON(json) => from_json(
                json.clone(),
                |j, v| j.deserialize_enum(name, variants, v),
                visitor,
            ),
            _ => Err(self.mismatch("enum variant name")),
        }
    }
}
