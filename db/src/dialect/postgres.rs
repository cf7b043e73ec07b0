use score_sync_core::{Column, ColumnKind, DateTimeDefault, StringLength};

use super::{SqlDialect, hex, quote_string};
use crate::config::EngineKind;

/// PostgreSQL: one schema per grain, `$n` placeholders.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn kind(&self) -> EngineKind {
        EngineKind::Postgres
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn field_type(&self, column: &Column) -> String {
        match &column.kind {
            ColumnKind::Integer { .. } => "integer".to_string(),
            ColumnKind::Floating { .. } => "double precision".to_string(),
            ColumnKind::String {
                length: StringLength::Bounded(n),
                ..
            } => format!("varchar({n})"),
            ColumnKind::String {
                length: StringLength::Max,
                ..
            } => "text".to_string(),
            ColumnKind::Binary { .. } => "bytea".to_string(),
            ColumnKind::DateTime { .. } => "timestamp".to_string(),
            ColumnKind::Boolean { .. } => "bool".to_string(),
        }
    }

    fn default_literal(&self, column: &Column) -> Option<String> {
        match &column.kind {
            ColumnKind::Integer { default, .. } => default.map(|v| v.to_string()),
            ColumnKind::Floating { default } => default.map(|v| v.to_string()),
            ColumnKind::String { default, .. } => default.as_deref().map(quote_string),
            ColumnKind::Binary { default } => default
                .as_deref()
                .map(|b| format!("'\\x{}'::bytea", hex(b).to_ascii_lowercase())),
            ColumnKind::DateTime { default } => default.map(|d| match d {
                DateTimeDefault::CurrentTimestamp => "now()".to_string(),
                DateTimeDefault::At(at) => format!(
                    "{}::timestamp",
                    quote_string(&at.format("%Y-%m-%d %H:%M:%S").to_string())
                ),
            }),
            ColumnKind::Boolean { default } => default.map(|b| b.to_string()),
        }
    }

    fn identity_clause(&self) -> Option<&'static str> {
        Some("GENERATED BY DEFAULT AS IDENTITY")
    }

    fn create_schema_sql(&self, grain: &str) -> Option<String> {
        Some(format!("CREATE SCHEMA IF NOT EXISTS {}", self.quote_ident(grain)))
    }
}
