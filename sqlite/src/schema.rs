//! Live structure readers over the SQLite catalog.
//!
//! Tables and indices are found in `sqlite_master`; columns, keys and index
//! columns come from the `pragma_table_info`, `pragma_foreign_key_list` and
//! `pragma_index_info` table-valued functions. All names here are physical
//! names (`"<grain>.<object>"`).

use rusqlite::{Connection, OptionalExtension, params};
use score_sync_core::{ColumnType, StringLength};
use score_sync_db::{
    LiveColumnInfo, LiveFkInfo, LiveIndexInfo, LiveIndices, LivePkInfo, Result, SqliteDialect,
    SyncError,
};

use crate::error::StructuralExt;

/// One row of `pragma_table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PragmaColumn {
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    /// 1-based position in the primary key; 0 when not a key column.
    pub pk: i64,
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![table],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .structural(|| format!("Cannot check existence of table {table}"))
}

/// Whether any table other than SQLite's internal ones exists.
pub(crate) fn user_tables_exist(conn: &Connection) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\'",
            [],
            |row| row.get(0),
        )
        .structural(|| "Cannot list tables".to_string())?;
    Ok(count > 0)
}

/// The `CREATE TABLE` text SQLite keeps for a table.
pub(crate) fn table_sql(conn: &Connection, table: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![table],
        |row| row.get::<_, Option<String>>(0),
    )
    .optional()
    .map(Option::flatten)
    .structural(|| format!("Cannot read definition of table {table}"))
}

pub(crate) fn table_columns(conn: &Connection, table: &str) -> Result<Vec<PragmaColumn>> {
    let context = || format!("Cannot read columns of table {table}");
    let mut stmt = conn
        .prepare(r#"SELECT name, type, "notnull", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid"#)
        .structural(context)?;
    let rows = stmt
        .query_map(params![table], |row| {
            Ok(PragmaColumn {
                name: row.get(0)?,
                declared_type: row.get(1)?,
                not_null: row.get::<_, i64>(2)? != 0,
                default_value: row.get(3)?,
                pk: row.get(4)?,
            })
        })
        .structural(context)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().structural(context)
}

/// Maps a declared type back to the model type and string length.
///
/// ```text
/// VARCHAR(60) -> (String, Bounded(60))
/// TEXT        -> (String, Max)
/// ```
pub(crate) fn parse_declared_type(declared: &str) -> Option<(ColumnType, Option<StringLength>)> {
    let declared = declared.trim().to_ascii_uppercase();
    let parsed = match declared.as_str() {
        "INTEGER" | "INT" | "BIGINT" => (ColumnType::Integer, None),
        "REAL" | "DOUBLE" | "FLOAT" => (ColumnType::Floating, None),
        "TEXT" => (ColumnType::String, Some(StringLength::Max)),
        "BLOB" => (ColumnType::Binary, None),
        "TIMESTAMP" | "DATETIME" => (ColumnType::DateTime, None),
        "BOOLEAN" | "BOOL" => (ColumnType::Boolean, None),
        other => {
            let length = other
                .strip_prefix("VARCHAR(")
                .and_then(|rest| rest.strip_suffix(')'))
                .and_then(|n| n.trim().parse::<u32>().ok())?;
            (ColumnType::String, Some(StringLength::Bounded(length)))
        }
    };
    Some(parsed)
}

/// Whether the table's integer key is an `AUTOINCREMENT` column.
pub(crate) fn has_autoincrement(sql: &str) -> bool {
    sql.to_ascii_uppercase().contains("AUTOINCREMENT")
}

/// Builds the live description of one column from its pragma row.
pub(crate) fn live_column(table_sql: &str, columns: &[PragmaColumn], column: &PragmaColumn) -> Result<LiveColumnInfo> {
    let (column_type, length) = parse_declared_type(&column.declared_type).ok_or_else(|| {
        SyncError::Conversion(format!(
            "unsupported declared type '{}' of column {}",
            column.declared_type, column.name
        ))
    })?;
    let key_columns = columns.iter().filter(|c| c.pk > 0).count();
    let identity = column.pk == 1
        && key_columns == 1
        && column_type == ColumnType::Integer
        && has_autoincrement(table_sql);

    Ok(LiveColumnInfo {
        name: column.name.clone(),
        column_type,
        nullable: !column.not_null,
        default_value: column.default_value.clone().unwrap_or_default(),
        length,
        identity,
    })
}

pub(crate) fn column_info(conn: &Connection, table: &str, column: &str) -> Result<LiveColumnInfo> {
    let columns = table_columns(conn, table)?;
    let found = columns.iter().find(|c| c.name == column).ok_or_else(|| {
        SyncError::structural(
            format!("Cannot read column {column} of table {table}"),
            "no such column",
        )
    })?;
    let sql = table_sql(conn, table)?.unwrap_or_default();
    live_column(&sql, &columns, found)
}

/// Key columns in key order. SQLite does not report constraint names.
pub(crate) fn primary_key(conn: &Connection, table: &str) -> Result<LivePkInfo> {
    let mut columns: Vec<PragmaColumn> = table_columns(conn, table)?
        .into_iter()
        .filter(|c| c.pk > 0)
        .collect();
    columns.sort_by_key(|c| c.pk);
    Ok(LivePkInfo {
        name: None,
        columns: columns.into_iter().map(|c| c.name).collect(),
    })
}

pub(crate) fn foreign_keys(conn: &Connection, table: &str) -> Result<Vec<LiveFkInfo>> {
    let context = || format!("Cannot read foreign keys of table {table}");
    let mut stmt = conn
        .prepare(r#"SELECT id, "table", "from", "to" FROM pragma_foreign_key_list(?1) ORDER BY id, seq"#)
        .structural(context)?;
    let rows = stmt
        .query_map(params![table], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })
        .structural(context)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .structural(context)?;

    let mut keys: Vec<(i64, LiveFkInfo)> = Vec::new();
    for (id, ref_table, from, to) in rows {
        let position = match keys.iter().position(|(k, _)| *k == id) {
            Some(position) => position,
            None => {
                keys.push((
                    id,
                    LiveFkInfo {
                        columns: Vec::new(),
                        ref_table,
                        ref_columns: Vec::new(),
                    },
                ));
                keys.len() - 1
            }
        };
        let fk = &mut keys[position].1;
        fk.columns.push(from);
        if let Some(to) = to {
            fk.ref_columns.push(to);
        }
    }
    Ok(keys.into_iter().map(|(_, fk)| fk).collect())
}

/// Ordered columns of an index.
pub(crate) fn index_columns(conn: &Connection, index: &str) -> Result<Vec<String>> {
    let context = || format!("Cannot read columns of index {index}");
    let mut stmt = conn
        .prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")
        .structural(context)?;
    let rows = stmt
        .query_map(params![index], |row| row.get::<_, String>(0))
        .structural(context)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().structural(context)
}

/// Explicitly created indices on a grain's tables, whatever their names.
/// Automatic indices backing key constraints have no `sql` and are left out.
///
/// An index stored as `"<grain>.<name>"` is reported under `<name>`; any
/// other index is reported under its physical name.
pub(crate) fn grain_indices(conn: &Connection, grain: &str) -> Result<LiveIndices> {
    let context = || format!("Cannot read indices of grain {grain}");
    let mut stmt = conn
        .prepare("SELECT name, tbl_name FROM sqlite_master WHERE type = 'index' AND sql IS NOT NULL ORDER BY name")
        .structural(context)?;
    let names = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .structural(context)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .structural(context)?;

    let mut indices = LiveIndices::new();
    for (physical, table_name) in names {
        let Some((table_grain, table)) = SqliteDialect::split_physical_name(&table_name) else {
            continue;
        };
        if table_grain != grain {
            continue;
        }
        let name = match SqliteDialect::split_physical_name(&physical) {
            Some((index_grain, name)) if index_grain == grain => name,
            _ => physical.as_str(),
        };
        let columns = index_columns(conn, &physical)?;
        indices.insert(LiveIndexInfo::physical(table, name, &physical), columns);
    }
    Ok(indices)
}
