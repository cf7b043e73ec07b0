//! Score validation.
//!
//! Validates structural invariants of a score before the engine touches a
//! database: identifier syntax, name uniqueness, primary-key and identity
//! rules, and index column references. All problems are collected; validation
//! never stops at the first one.
//!
//! # Examples
//!
//! ```
//! use score_sync_core::*;
//!
//! let table = Table::new("person")
//!     .with_column(Column::integer("id").identity())
//!     .with_primary_key(&["id"]);
//! let grain = Grain::new("app", "1.0".parse().unwrap(), 1, vec![table]);
//! assert!(validate_grain(&grain).is_empty());
//!
//! // Invalid: the index references a column the table does not have
//! let bad = Table::new("person")
//!     .with_column(Column::integer("id").not_null())
//!     .with_primary_key(&["id"])
//!     .with_index(Index::new("idx_person_name", &["name"]));
//! let grain = Grain::new("app", "1.0".parse().unwrap(), 1, vec![bad]);
//! assert!(!validate_grain(&grain).is_empty());
//! ```

use std::collections::HashSet;

use thiserror::Error;

use crate::{ColumnKind, Grain, Score, StringLength, Table};

/// Score validation errors.
///
/// Each variant describes one structural problem. Table-level variants carry
/// the qualified `grain.table` name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A name is empty or not of the form `[A-Za-z_][A-Za-z0-9_]*`.
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("duplicate grain: {0}")]
    DuplicateGrain(String),
    #[error("duplicate table in grain: {0}")]
    DuplicateTable(String),
    #[error("duplicate column in table {table}: {column}")]
    DuplicateColumn { table: String, column: String },
    /// Index names are unique per grain, not per table.
    #[error("duplicate index in grain {grain}: {index}")]
    DuplicateIndex { grain: String, index: String },
    #[error("table {0} has no columns")]
    NoColumns(String),
    #[error("table {0} has no primary key")]
    MissingPrimaryKey(String),
    #[error("primary key of {table} references unknown column {column}")]
    UnknownPrimaryKeyColumn { table: String, column: String },
    #[error("primary key column {table}.{column} must not be nullable")]
    NullablePrimaryKey { table: String, column: String },
    /// Identity requires an integer column that is the whole primary key.
    #[error("identity column {table}.{column} must be the single integer primary key")]
    InvalidIdentity { table: String, column: String },
    #[error("index {0} has no columns")]
    EmptyIndex(String),
    #[error("index {index} references unknown column {column}")]
    UnknownIndexColumn { index: String, column: String },
    #[error("string column {table}.{column} has zero length")]
    ZeroStringLength { table: String, column: String },
    /// NaN and infinities have no SQL literal.
    #[error("floating column {table}.{column} has a non-finite default")]
    NonFiniteDefault { table: String, column: String },
}

/// Returns `true` for `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validates every grain of a score and the uniqueness of grain names.
pub fn validate_score(score: &Score) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for grain in &score.grains {
        if !seen.insert(grain.name.as_str()) {
            errors.push(ValidationError::DuplicateGrain(grain.name.clone()));
        }
        errors.extend(validate_grain(grain));
    }

    errors
}

/// Validates a single grain.
pub fn validate_grain(grain: &Grain) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if !is_identifier(&grain.name) {
        errors.push(ValidationError::InvalidIdentifier(grain.name.clone()));
    }

    let mut tables: HashSet<&str> = HashSet::new();
    for table in &grain.tables {
        let qualified = format!("{}.{}", grain.name, table.name);
        if !tables.insert(table.name.as_str()) {
            errors.push(ValidationError::DuplicateTable(qualified.clone()));
        }
        validate_table(table, &qualified, &mut errors);
    }

    let mut indices: HashSet<&str> = HashSet::new();
    for (_, index) in grain.indices() {
        if !indices.insert(index.name.as_str()) {
            errors.push(ValidationError::DuplicateIndex {
                grain: grain.name.clone(),
                index: index.name.clone(),
            });
        }
    }

    errors
}

fn validate_table(table: &Table, qualified: &str, errors: &mut Vec<ValidationError>) {
    if !is_identifier(&table.name) {
        errors.push(ValidationError::InvalidIdentifier(table.name.clone()));
    }
    if table.columns.is_empty() {
        errors.push(ValidationError::NoColumns(qualified.to_string()));
    }

    let mut columns: HashSet<&str> = HashSet::new();
    for column in &table.columns {
        if !is_identifier(&column.name) {
            errors.push(ValidationError::InvalidIdentifier(column.name.clone()));
        }
        if !columns.insert(column.name.as_str()) {
            errors.push(ValidationError::DuplicateColumn {
                table: qualified.to_string(),
                column: column.name.clone(),
            });
        }
        if column.string_length() == Some(StringLength::Bounded(0)) {
            errors.push(ValidationError::ZeroStringLength {
                table: qualified.to_string(),
                column: column.name.clone(),
            });
        }
        if matches!(column.kind, ColumnKind::Floating { default: Some(v) } if !v.is_finite()) {
            errors.push(ValidationError::NonFiniteDefault {
                table: qualified.to_string(),
                column: column.name.clone(),
            });
        }
        if column.is_identity() && table.primary_key != [column.name.as_str()] {
            errors.push(ValidationError::InvalidIdentity {
                table: qualified.to_string(),
                column: column.name.clone(),
            });
        }
    }

    if table.primary_key.is_empty() {
        errors.push(ValidationError::MissingPrimaryKey(qualified.to_string()));
    }
    for key in &table.primary_key {
        match table.column(key) {
            None => errors.push(ValidationError::UnknownPrimaryKeyColumn {
                table: qualified.to_string(),
                column: key.clone(),
            }),
            Some(column) if column.nullable => errors.push(ValidationError::NullablePrimaryKey {
                table: qualified.to_string(),
                column: key.clone(),
            }),
            Some(_) => {}
        }
    }

    for index in &table.indices {
        if !is_identifier(&index.name) {
            errors.push(ValidationError::InvalidIdentifier(index.name.clone()));
        }
        if index.columns.is_empty() {
            errors.push(ValidationError::EmptyIndex(index.name.clone()));
        }
        for column in &index.columns {
            if table.column(column).is_none() {
                errors.push(ValidationError::UnknownIndexColumn {
                    index: index.name.clone(),
                    column: column.clone(),
                });
            }
        }
    }
}
