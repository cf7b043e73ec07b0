//! Mapping between [`Value`] and SQLite storage values.
//!
//! SQLite has no boolean or timestamp storage class: booleans travel as
//! integers and timestamps as `YYYY-MM-DD HH:MM:SS` text. Cursors coerce
//! them back to the model type on read.

use rusqlite::types::{Value as SqlValue, ValueRef};
use score_sync_db::{DATE_TIME_FORMAT, Value};

/// Converts a parameter to an owned SQLite value.
pub(crate) fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Blob(b) => SqlValue::Blob(b.clone()),
        Value::Boolean(b) => SqlValue::Integer(i64::from(*b)),
        Value::DateTime(d) => SqlValue::Text(d.format(DATE_TIME_FORMAT).to_string()),
    }
}

/// Converts a column of a result row.
pub(crate) fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}
