//! Result rows with named, type-decoded columns.

use crate::error::DbError;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::ValueRef;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::ops::Index;
use std::sync::Arc;

const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Name and declared type of a result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ColumnInfo {
    pub(crate) name: String,
    pub(crate) decl_type: Option<String>,
}

/// A decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    /// A `DATE` column.
    Date(NaiveDate),
    /// A `TIMESTAMP` column.
    Timestamp(NaiveDateTime),
}

impl Value {
    /// True for SQL `NULL`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The integer value, if this is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// The numeric value. Integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// The text value, if this is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    /// The raw bytes, if this is a blob.
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(v) => Some(v),
            _ => None,
        }
    }

    /// The decoded date of a `DATE` column.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(v) => Some(*v),
            _ => None,
        }
    }

    /// The decoded value of a `TIMESTAMP` column.
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    /// Decodes a raw SQLite value using the column's declared type.
    ///
    /// Only the type name leading the declaration is considered, up to the
    /// first whitespace or `(`, compared case-insensitively. `TIMESTAMP` and `DATE` text is parsed; everything
    /// else keeps its storage class.
    pub(crate) fn decode(raw: ValueRef<'_>, column: &ColumnInfo) -> Result<Self, DbError> {
        let declared = column
            .decl_type
            .as_deref()
            .and_then(|decl| decl.split(|c: char| c.is_whitespace() || c == '(').next())
            .filter(|name| !name.is_empty())
            .map(str::to_ascii_uppercase);

        let text = match raw {
            ValueRef::Null => return Ok(Value::Null),
            ValueRef::Integer(v) => return Ok(Value::Integer(v)),
            ValueRef::Real(v) => return Ok(Value::Real(v)),
            ValueRef::Blob(bytes) if declared.is_none() => return Ok(Value::Blob(bytes.to_vec())),
            ValueRef::Blob(bytes) | ValueRef::Text(bytes) => bytes,
        };

        let conversion_error = |declared: &str| DbError::Conversion {
            column: column.name.clone(),
            declared: declared.to_string(),
            value: String::from_utf8_lossy(text).into_owned(),
        };

        match declared.as_deref() {
            Some("TIMESTAMP") => {
                let s = std::str::from_utf8(text).map_err(|_| conversion_error("TIMESTAMP"))?;
                TIMESTAMP_FORMATS
                    .iter()
                    .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                    .map(Value::Timestamp)
                    .ok_or_else(|| conversion_error("TIMESTAMP"))
            }
            Some("DATE") => {
                let s = std::str::from_utf8(text).map_err(|_| conversion_error("DATE"))?;
                NaiveDate::parse_from_str(s, DATE_FORMAT)
                    .map(Value::Date)
                    .map_err(|_| conversion_error("DATE"))
            }
            _ if matches!(raw, ValueRef::Blob(_)) => Ok(Value::Blob(text.to_vec())),
            other => std::str::from_utf8(text)
                .map(|s| Value::Text(s.to_string()))
                .map_err(|_| conversion_error(other.unwrap_or("TEXT"))),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Integer(v) => serializer.serialize_i64(*v),
            Value::Real(v) => serializer.serialize_f64(*v),
            Value::Text(v) => serializer.serialize_str(v),
            Value::Blob(v) => serializer.serialize_bytes(v),
            Value::Date(v) => v.serialize(serializer),
            Value::Timestamp(v) => v.serialize(serializer),
        }
    }
}

/// One result row.
///
/// Columns can be read by declared name (case-insensitive, like SQLite
/// identifiers) or by position. Indexing with a missing name or position
/// panics; use [`Record::get`] or [`Record::get_at`] when a column may be
/// absent.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<[ColumnInfo]>,
    values: Vec<Value>,
}

impl Record {
    pub(crate) fn from_row(
        row: &rusqlite::Row<'_>,
        columns: &Arc<[ColumnInfo]>,
    ) -> Result<Self, DbError> {
        let mut values = Vec::with_capacity(columns.len());
        for (idx, column) in columns.iter().enumerate() {
            values.push(Value::decode(row.get_ref(idx)?, column)?);
        }
        Ok(Self {
            columns: Arc::clone(columns),
            values,
        })
    }

    /// Value of the column called `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.position(name).map(|idx| &self.values[idx])
    }

    /// Value at position `idx`.
    pub fn get_at(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Column names in result order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }
}

impl Index<&str> for Record {
    type Output = Value;

    fn index(&self, name: &str) -> &Value {
        match self.get(name) {
            Some(value) => value,
            None => panic!("no column named '{name}' in record"),
        }
    }
}

impl Index<usize> for Record {
    type Output = Value;

    fn index(&self, idx: usize) -> &Value {
        &self.values[idx]
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.columns.iter().zip(&self.values) {
            map.serialize_entry(&column.name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, decl_type: Option<&str>) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            decl_type: decl_type.map(str::to_string),
        }
    }

    #[test]
    fn decodes_timestamp_text() {
        let col = column("created", Some("TIMESTAMP"));
        let value = Value::decode(ValueRef::Text(b"2024-03-01 12:30:45"), &col).unwrap();

        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 30, 45)
            .unwrap();
        assert_eq!(value.as_timestamp(), Some(expected));
    }

    #[test]
    fn decodes_timestamp_with_fraction_and_t_separator() {
        let col = column("created", Some("timestamp"));
        let value = Value::decode(ValueRef::Text(b"2024-03-01T12:30:45.250"), &col).unwrap();

        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_milli_opt(12, 30, 45, 250)
            .unwrap();
        assert_eq!(value, Value::Timestamp(expected));
    }

    #[test]
    fn decodes_date_text() {
        let col = column("born", Some("DATE"));
        let value = Value::decode(ValueRef::Text(b"1999-12-31"), &col).unwrap();

        assert_eq!(value.as_date(), NaiveDate::from_ymd_opt(1999, 12, 31));
    }

    #[test]
    fn declared_type_ends_at_parenthesis() {
        let col = column("created", Some("TIMESTAMP(6)"));
        let value = Value::decode(ValueRef::Text(b"2024-03-01 12:30:45"), &col).unwrap();
        assert!(value.as_timestamp().is_some(), "got {value:?}");

        let col = column("born", Some("date(10) NOT NULL"));
        let value = Value::decode(ValueRef::Text(b"1999-12-31"), &col).unwrap();
        assert_eq!(value.as_date(), NaiveDate::from_ymd_opt(1999, 12, 31));
    }

    #[test]
    fn malformed_timestamp_is_conversion_error() {
        let col = column("created", Some("TIMESTAMP"));
        let err = Value::decode(ValueRef::Text(b"yesterday"), &col).unwrap_err();

        match err {
            DbError::Conversion {
                column,
                declared,
                value,
            } => {
                assert_eq!(column, "created");
                assert_eq!(declared, "TIMESTAMP");
                assert_eq!(value, "yesterday");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn undeclared_values_keep_storage_class() {
        let col = column("expr", None);

        assert_eq!(Value::decode(ValueRef::Null, &col).unwrap(), Value::Null);
        assert_eq!(Value::decode(ValueRef::Integer(3), &col).unwrap(), Value::Integer(3));
        assert_eq!(Value::decode(ValueRef::Real(1.5), &col).unwrap(), Value::Real(1.5));
        assert_eq!(
            Value::decode(ValueRef::Text(b"2024-03-01"), &col).unwrap(),
            Value::Text("2024-03-01".to_string())
        );
        assert_eq!(
            Value::decode(ValueRef::Blob(&[1, 2]), &col).unwrap(),
            Value::Blob(vec![1, 2])
        );
    }

    #[test]
    fn timestamp_column_passes_integers_through() {
        let col = column("created", Some("TIMESTAMP"));
        assert_eq!(
            Value::decode(ValueRef::Integer(1_700_000_000), &col).unwrap(),
            Value::Integer(1_700_000_000)
        );
    }

    #[test]
    fn record_lookup_by_name_and_position() {
        let columns: Arc<[ColumnInfo]> =
            vec![column("id", Some("INTEGER")), column("Username", Some("TEXT"))].into();
        let record = Record {
            columns,
            values: vec![Value::Integer(1), Value::Text("ada".to_string())],
        };

        assert_eq!(record["username"].as_str(), Some("ada"));
        assert_eq!(record[0].as_i64(), Some(1));
        assert_eq!(record.get("missing"), None);
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["id", "Username"]);
    }

    #[test]
    fn record_serializes_as_object() {
        let columns: Arc<[ColumnInfo]> = vec![column("id", None), column("title", None)].into();
        let record = Record {
            columns,
            values: vec![Value::Integer(7), Value::Null],
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, serde_json::json!({ "id": 7, "title": null }));
    }
}
