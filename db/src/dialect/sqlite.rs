use score_sync_core::{Column, ColumnKind, DateTimeDefault, StringLength};

use super::{SqlDialect, hex, quote_string};
use crate::config::EngineKind;
use crate::live::LiveIndexInfo;

/// SQLite has no schemas: a grain's objects live in the main database under
/// the physical name `"<grain>.<object>"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Physical (unquoted) name of a grain object.
    pub fn physical_name(grain: &str, object: &str) -> String {
        format!("{grain}.{object}")
    }

    /// Splits a physical name into `(grain, object)`.
    pub fn split_physical_name(name: &str) -> Option<(&str, &str)> {
        name.split_once('.')
    }
}

impl SqlDialect for SqliteDialect {
    fn kind(&self) -> EngineKind {
        EngineKind::Sqlite
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("?{index}")
    }

    fn field_type(&self, column: &Column) -> String {
        match &column.kind {
            ColumnKind::Integer { .. } => "INTEGER".to_string(),
            ColumnKind::Floating { .. } => "REAL".to_string(),
            ColumnKind::String {
                length: StringLength::Bounded(n),
                ..
            } => format!("VARCHAR({n})"),
            ColumnKind::String {
                length: StringLength::Max,
                ..
            } => "TEXT".to_string(),
            ColumnKind::Binary { .. } => "BLOB".to_string(),
            ColumnKind::DateTime { .. } => "TIMESTAMP".to_string(),
            ColumnKind::Boolean { .. } => "BOOLEAN".to_string(),
        }
    }

    fn default_literal(&self, column: &Column) -> Option<String> {
        match &column.kind {
            ColumnKind::Integer { default, .. } => default.map(|v| v.to_string()),
            ColumnKind::Floating { default } => default.map(|v| v.to_string()),
            ColumnKind::String { default, .. } => default.as_deref().map(quote_string),
            ColumnKind::Binary { default } => default.as_deref().map(|b| format!("X'{}'", hex(b))),
            ColumnKind::DateTime { default } => default.map(|d| match d {
                DateTimeDefault::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
                DateTimeDefault::At(at) => quote_string(&at.format("%Y-%m-%d %H:%M:%S").to_string()),
            }),
            ColumnKind::Boolean { default } => default.map(|b| if b { "1" } else { "0" }.to_string()),
        }
    }

    fn identity_clause(&self) -> Option<&'static str> {
        None
    }

    fn inline_identity_key(&self) -> bool {
        true
    }

    fn table_name(&self, grain: &str, table: &str) -> String {
        self.quote_ident(&Self::physical_name(grain, table))
    }

    fn index_name(&self, grain: &str, index: &str) -> String {
        self.quote_ident(&Self::physical_name(grain, index))
    }

    fn create_schema_sql(&self, _grain: &str) -> Option<String> {
        None
    }

    fn drop_index_sql(&self, _grain: &str, index: &LiveIndexInfo) -> String {
        format!("DROP INDEX {}", self.quote_ident(&index.physical_name))
    }
}
