//! The table-rebuild procedure.
//!
//! SQLite cannot change a column definition or a primary key in place, and
//! `ADD COLUMN` refuses key columns, non-constant defaults and `NOT NULL`
//! without a default. Those changes are made by creating the new shape under
//! a temporary name, copying the live columns across, dropping the old table
//! and renaming the new one. Columns and foreign keys that only exist in the
//! live table are carried over unchanged. Indices of the old table are
//! dropped with it.

use rusqlite::Connection;
use score_sync_core::{Column, Table};
use score_sync_db::{Result, SqlDialect, SqliteDialect, SyncError};

use crate::schema::{self, PragmaColumn};

/// The change a rebuild applies on top of the live table.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Change<'m> {
    AddColumn(&'m Column),
    AlterColumn(&'m Column),
    PrimaryKey,
}

fn live_def(dialect: &SqliteDialect, column: &PragmaColumn, identity: bool) -> String {
    let mut def = format!("{} {}", dialect.quote_ident(&column.name), column.declared_type);
    def.push_str(if column.not_null { " NOT NULL" } else { " NULL" });
    if let Some(default) = &column.default_value {
        def.push_str(" DEFAULT ");
        def.push_str(default);
    }
    if identity {
        def.push_str(" PRIMARY KEY AUTOINCREMENT");
    }
    def
}

/// Statements that rebuild `table` of `grain` with `change` applied.
///
/// The key is the live one unless the change sets the key itself: a key
/// change, or a new or altered identity column, which is the whole model key.
/// A single-column key is written inline on an identity column and as a
/// table constraint otherwise.
pub(crate) fn plan(conn: &Connection, grain: &str, table: &Table, change: Change<'_>) -> Result<Vec<String>> {
    let dialect = SqliteDialect;
    let physical = SqliteDialect::physical_name(grain, &table.name);
    let target = dialect.table_name(grain, &table.name);
    let scratch = SqliteDialect::physical_name(grain, &format!("{}__rebuild", table.name));

    let table_sql = schema::table_sql(conn, &physical)?.ok_or_else(|| {
        SyncError::structural(format!("Cannot rebuild table {physical}"), "no such table")
    })?;
    let columns = schema::table_columns(conn, &physical)?;

    let key: Vec<String> = match change {
        Change::PrimaryKey => table.primary_key.clone(),
        Change::AddColumn(model) | Change::AlterColumn(model) if model.is_identity() => {
            table.primary_key.clone()
        }
        _ => schema::primary_key(conn, &physical)?.columns,
    };
    let is_sole_key = |name: &str| key.len() == 1 && key[0] == name;

    let mut defs = Vec::new();
    let mut copied = Vec::new();
    let mut key_is_inline = false;
    for column in &columns {
        copied.push(dialect.quote_ident(&column.name));
        match change {
            Change::AlterColumn(model) if model.name == column.name => {
                key_is_inline |= model.is_identity();
                defs.push(dialect.column_def(model));
            }
            _ => {
                let live = schema::live_column(&table_sql, &columns, column)?;
                let inline = live.identity && is_sole_key(&column.name);
                key_is_inline |= inline;
                defs.push(live_def(&dialect, column, inline));
            }
        }
    }
    if let Change::AddColumn(model) = change {
        key_is_inline |= model.is_identity();
        defs.push(dialect.column_def(model));
    }

    if !key.is_empty() && !key_is_inline {
        defs.push(format!(
            "CONSTRAINT {} PRIMARY KEY ({})",
            dialect.quote_ident(&dialect.pk_constraint_name(&table.name)),
            dialect.column_list(&key)
        ));
    }

    for fk in schema::foreign_keys(conn, &physical)? {
        let mut clause = format!(
            "FOREIGN KEY ({}) REFERENCES {}",
            dialect.column_list(&fk.columns),
            dialect.quote_ident(&fk.ref_table)
        );
        if !fk.ref_columns.is_empty() {
            clause.push_str(&format!(" ({})", dialect.column_list(&fk.ref_columns)));
        }
        defs.push(clause);
    }

    let scratch_quoted = dialect.quote_ident(&scratch);
    let copied = copied.join(", ");
    Ok(vec![
        format!("CREATE TABLE {scratch_quoted} (\n  {}\n)", defs.join(",\n  ")),
        format!("INSERT INTO {scratch_quoted} ({copied}) SELECT {copied} FROM {target}"),
        format!("DROP TABLE {target}"),
        format!("ALTER TABLE {scratch_quoted} RENAME TO {target}"),
    ])
}
