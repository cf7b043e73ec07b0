use score_sync_core::{Column, ColumnKind, DateTimeDefault, StringLength, Table};

use super::{SqlDialect, hex, quote_string};
use crate::config::EngineKind;
use crate::live::LiveIndexInfo;

/// Microsoft SQL Server: bracket quoting, `@Pn` placeholders, `TOP 1`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlDialect;

impl SqlDialect for MssqlDialect {
    fn kind(&self) -> EngineKind {
        EngineKind::Mssql
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("@P{index}")
    }

    fn field_type(&self, column: &Column) -> String {
        match &column.kind {
            ColumnKind::Integer { .. } => "int".to_string(),
            ColumnKind::Floating { .. } => "real".to_string(),
            ColumnKind::String {
                length: StringLength::Bounded(n),
                ..
            } => format!("nvarchar({n})"),
            ColumnKind::String {
                length: StringLength::Max,
                ..
            } => "nvarchar(max)".to_string(),
            ColumnKind::Binary { .. } => "varbinary(max)".to_string(),
            ColumnKind::DateTime { .. } => "datetime".to_string(),
            ColumnKind::Boolean { .. } => "bit".to_string(),
        }
    }

    fn default_literal(&self, column: &Column) -> Option<String> {
        match &column.kind {
            ColumnKind::Integer { default, .. } => default.map(|v| v.to_string()),
            ColumnKind::Floating { default } => default.map(|v| v.to_string()),
            ColumnKind::String { default, .. } => {
                default.as_deref().map(|s| format!("N{}", quote_string(s)))
            }
            ColumnKind::Binary { default } => default.as_deref().map(|b| format!("0x{}", hex(b))),
            ColumnKind::DateTime { default } => default.map(|d| match d {
                DateTimeDefault::CurrentTimestamp => "getdate()".to_string(),
                DateTimeDefault::At(at) => quote_string(&at.format("%Y%m%d %H:%M:%S").to_string()),
            }),
            ColumnKind::Boolean { default } => default.map(|b| if b { "1" } else { "0" }.to_string()),
        }
    }

    fn identity_clause(&self) -> Option<&'static str> {
        Some("IDENTITY")
    }

    fn add_column_sql(&self, grain: &str, table: &Table, column: &Column) -> String {
        format!(
            "ALTER TABLE {} ADD {}",
            self.table_name(grain, &table.name),
            self.column_def(column)
        )
    }

    fn drop_index_sql(&self, grain: &str, index: &LiveIndexInfo) -> String {
        format!(
            "DROP INDEX {} ON {}",
            self.quote_ident(&index.physical_name),
            self.table_name(grain, &index.table_name)
        )
    }

    fn select_one(&self, columns: &str, from: &str, condition: &str) -> String {
        format!("SELECT TOP 1 {columns} FROM {from} WHERE {condition}")
    }
}
