//! Snapshots of the structure that actually exists in the database.
//!
//! Adaptors read these from the engine's own catalog on every reconciliation
//! call; they are never persisted. The engine diffs them against the model to
//! decide which DDL to emit.

use std::collections::BTreeMap;

use score_sync_core::{Column, ColumnType, Grain, Index, StringLength, Table};

/// Attributes of one live column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveColumnInfo {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    /// Default expression as the engine reports it; empty when there is none.
    pub default_value: String,
    /// Declared length, for string columns.
    pub length: Option<StringLength>,
    pub identity: bool,
}

impl LiveColumnInfo {
    /// Structural equality against a model column.
    ///
    /// `expected_default` is the model default rendered by the same dialect
    /// that created the column (empty when the column has no default).
    /// Type, nullability, default literal, string length and identity must
    /// all agree.
    pub fn reflects(&self, column: &Column, expected_default: &str) -> bool {
        if self.column_type != column.column_type()
            || self.nullable != column.nullable
            || self.identity != column.is_identity()
        {
            return false;
        }
        if column.column_type() == ColumnType::String && self.length != column.string_length() {
            return false;
        }
        normalize_default(&self.default_value) == normalize_default(expected_default)
    }
}

/// Strips whitespace and redundant enclosing parentheses, which some engines
/// add around stored default expressions.
pub fn normalize_default(raw: &str) -> &str {
    let mut s = raw.trim();
    while s.len() >= 2 && s.starts_with('(') && s.ends_with(')') && balanced(&s[1..s.len() - 1]) {
        s = s[1..s.len() - 1].trim();
    }
    s
}

fn balanced(s: &str) -> bool {
    let mut depth = 0i32;
    for c in s.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// The live primary key of a table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LivePkInfo {
    /// Constraint name, when the engine names primary keys.
    pub name: Option<String>,
    /// Key columns in key order.
    pub columns: Vec<String>,
}

impl LivePkInfo {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns `true` when the live key has exactly the model's key columns,
    /// in the same order.
    pub fn reflects(&self, table: &Table) -> bool {
        self.columns == table.primary_key
    }
}

/// A live foreign key of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveFkInfo {
    pub columns: Vec<String>,
    /// Physical name of the referenced table.
    pub ref_table: String,
    pub ref_columns: Vec<String>,
}

/// Identity of a live index: owning table, index name as the model would
/// call it, and the name the engine stores it under.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LiveIndexInfo {
    pub table_name: String,
    pub index_name: String,
    pub physical_name: String,
}

impl LiveIndexInfo {
    /// An index stored under its model name.
    pub fn new(table_name: &str, index_name: &str) -> Self {
        Self::physical(table_name, index_name, index_name)
    }

    pub fn physical(table_name: &str, index_name: &str, physical_name: &str) -> Self {
        Self {
            table_name: table_name.to_string(),
            index_name: index_name.to_string(),
            physical_name: physical_name.to_string(),
        }
    }

    /// Whether this is the live counterpart of `index` on `table`.
    pub fn is_for(&self, table: &Table, index: &Index) -> bool {
        self.table_name == table.name && self.index_name == index.name
    }
}

/// Live indices of a grain with their ordered column lists.
pub type LiveIndices = BTreeMap<LiveIndexInfo, Vec<String>>;

/// Two indices are equal iff they have the same number of columns and the
/// same column name at every position.
pub fn index_columns_match(live: &[String], model: &Index) -> bool {
    live.len() == model.columns.len() && live.iter().zip(&model.columns).all(|(a, b)| a == b)
}

/// Live indices that must be dropped: those the model does not declare on
/// the same table, and those whose column sequence differs from the model.
pub fn stale_indices(grain: &Grain, live: &LiveIndices) -> Vec<LiveIndexInfo> {
    live.iter()
        .filter(|(info, columns)| match grain.index(&info.index_name) {
            Some((table, index)) => {
                table.name != info.table_name || !index_columns_match(columns, index)
            }
            None => true,
        })
        .map(|(info, _)| info.clone())
        .collect()
}

/// Model indices with no identical live counterpart (same table, name and
/// column sequence).
pub fn missing_indices<'g>(grain: &'g Grain, live: &LiveIndices) -> Vec<(&'g Table, &'g Index)> {
    grain
        .indices()
        .filter(|(table, index)| {
            !live
                .iter()
                .any(|(info, columns)| info.is_for(table, index) && index_columns_match(columns, index))
        })
        .collect()
}
