//! Parameter and result values exchanged with an adaptor.

use std::fmt;

use chrono::NaiveDateTime;
use score_sync_core::ColumnType;

use crate::error::{Result, SyncError};

/// Text form used for date-time values that travel as strings.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
    Boolean(bool),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Converts a value read from the database to the representation of
    /// `column_type`.
    ///
    /// Engines with a loose type system hand back booleans as integers and
    /// timestamps as text; this restores the model type.
    ///
    /// ```
    /// use score_sync_core::ColumnType;
    /// use score_sync_db::Value;
    ///
    /// assert_eq!(Value::Integer(1).coerce(ColumnType::Boolean).unwrap(), Value::Boolean(true));
    /// assert!(Value::Text("x".into()).coerce(ColumnType::Integer).is_err());
    /// ```
    pub fn coerce(self, column_type: ColumnType) -> Result<Value> {
        let mismatch = |value: &Value| {
            SyncError::Conversion(format!("cannot convert {value} to {column_type}"))
        };

        match (column_type, self) {
            (_, Value::Null) => Ok(Value::Null),
            (ColumnType::Integer, Value::Integer(i)) => Ok(Value::Integer(i)),
            (ColumnType::Integer, Value::Boolean(b)) => Ok(Value::Integer(i64::from(b))),
            (ColumnType::Integer, Value::Text(s)) => s
                .trim()
                .parse()
                .map(Value::Integer)
                .map_err(|_| mismatch(&Value::Text(s))),
            (ColumnType::Floating, Value::Float(f)) => Ok(Value::Float(f)),
            (ColumnType::Floating, Value::Integer(i)) => Ok(Value::Float(i as f64)),
            (ColumnType::String, Value::Text(s)) => Ok(Value::Text(s)),
            (ColumnType::String, Value::Integer(i)) => Ok(Value::Text(i.to_string())),
            (ColumnType::Binary, Value::Blob(b)) => Ok(Value::Blob(b)),
            (ColumnType::Binary, Value::Text(s)) => Ok(Value::Blob(s.into_bytes())),
            (ColumnType::Boolean, Value::Boolean(b)) => Ok(Value::Boolean(b)),
            (ColumnType::Boolean, Value::Integer(i)) => Ok(Value::Boolean(i != 0)),
            (ColumnType::DateTime, Value::DateTime(d)) => Ok(Value::DateTime(d)),
            (ColumnType::DateTime, Value::Text(s)) => parse_date_time(&s)
                .map(Value::DateTime)
                .ok_or_else(|| mismatch(&Value::Text(s))),
            (_, other) => Err(mismatch(&other)),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date_time(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(d) => Some(*d),
            _ => None,
        }
    }
}

/// Parses `YYYY-MM-DD HH:MM:SS[.fff]`, also accepting a `T` separator.
pub fn parse_date_time(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "'{s}'"),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::DateTime(d) => write!(f, "{}", d.format(DATE_TIME_FORMAT)),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
