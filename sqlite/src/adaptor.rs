//! The SQLite runtime adaptor.

use std::collections::BTreeSet;
use std::path::Path;

use rusqlite::Connection;
use score_sync_core::{Column, ColumnKind, DateTimeDefault, Index, Table};
use score_sync_db::{
    DbAdaptor, LiveColumnInfo, LiveFkInfo, LiveIndexInfo, LiveIndices, LivePkInfo,
    PreparedStatement, Result, SqlDialect, SqliteDialect, SyncError,
};
use tracing::debug;

use crate::error::StructuralExt;
use crate::rebuild::{self, Change};
use crate::schema;
use crate::statement::{SqliteStatement, begin};

/// A [`DbAdaptor`] over one SQLite connection.
///
/// A transaction is opened before the first write and stays open until
/// [`commit`](DbAdaptor::commit) or [`rollback`](DbAdaptor::rollback).
///
/// # Examples
///
/// ```
/// use score_sync_core::Score;
/// use score_sync_db::{DbAdaptor, synchronize};
/// use score_sync_sqlite::SqliteAdaptor;
///
/// let adaptor = SqliteAdaptor::open_in_memory().unwrap();
/// let report = synchronize(&adaptor, &Score::with_system(Vec::new())).unwrap();
/// assert!(report.is_success());
/// assert!(adaptor.table_exists("celesta", "grains").unwrap());
/// ```
pub struct SqliteAdaptor {
    conn: Connection,
    dialect: SqliteDialect,
}

impl SqliteAdaptor {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            dialect: SqliteDialect,
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .structural(|| format!("Cannot open database {}", path.display()))?;
        Ok(Self::new(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .structural(|| "Cannot open in-memory database".to_string())?;
        Ok(Self::new(conn))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn physical(grain: &str, table: &str) -> String {
        SqliteDialect::physical_name(grain, table)
    }

    fn execute_ddl<F>(&self, sql: &str, context: F) -> Result<()>
    where
        F: FnOnce() -> String,
    {
        begin(&self.conn)?;
        debug!(sql, "ddl");
        self.conn.execute_batch(sql).structural(context)
    }

    fn rebuild(&self, grain: &str, table: &Table, change: Change<'_>) -> Result<()> {
        let statements = rebuild::plan(&self.conn, grain, table, change)?;
        for sql in &statements {
            self.execute_ddl(sql, || format!("Cannot rebuild table {grain}.{}", table.name))?;
        }
        Ok(())
    }
}

/// Whether `ALTER TABLE ... ADD COLUMN` accepts the column as defined.
fn addable_in_place(table: &Table, column: &Column) -> bool {
    let current_timestamp = matches!(
        column.kind,
        ColumnKind::DateTime {
            default: Some(DateTimeDefault::CurrentTimestamp)
        }
    );
    !column.is_identity()
        && !table.is_primary_key(&column.name)
        && !current_timestamp
        && (column.nullable || column.kind.has_default())
}

impl DbAdaptor for SqliteAdaptor {
    fn dialect(&self) -> &dyn SqlDialect {
        &self.dialect
    }

    /// Grains have no schema object in SQLite; the namespace always exists.
    fn schema_exists(&self, _grain: &str) -> Result<bool> {
        Ok(true)
    }

    fn create_schema_if_absent(&self, grain: &str) -> Result<()> {
        match self.dialect.create_schema_sql(grain) {
            Some(sql) => self.execute_ddl(&sql, || format!("Cannot create schema {grain}")),
            None => Ok(()),
        }
    }

    fn table_exists(&self, grain: &str, table: &str) -> Result<bool> {
        schema::table_exists(&self.conn, &Self::physical(grain, table))
    }

    fn user_tables_exist(&self) -> Result<bool> {
        schema::user_tables_exist(&self.conn)
    }

    fn create_table(&self, grain: &str, table: &Table) -> Result<()> {
        let sql = self.dialect.create_table_sql(grain, table);
        self.execute_ddl(&sql, || format!("Cannot create table {grain}.{}", table.name))
    }

    fn read_live_columns(&self, grain: &str, table: &Table) -> Result<BTreeSet<String>> {
        let columns = schema::table_columns(&self.conn, &Self::physical(grain, &table.name))?;
        Ok(columns.into_iter().map(|c| c.name).collect())
    }

    fn read_live_column_info(&self, grain: &str, table: &Table, column: &Column) -> Result<LiveColumnInfo> {
        schema::column_info(&self.conn, &Self::physical(grain, &table.name), &column.name)
    }

    fn create_column(&self, grain: &str, table: &Table, column: &Column) -> Result<()> {
        if addable_in_place(table, column) {
            let sql = self.dialect.add_column_sql(grain, table, column);
            self.execute_ddl(&sql, || {
                format!("Cannot create column {} in table {grain}.{}", column.name, table.name)
            })
        } else {
            self.rebuild(grain, table, Change::AddColumn(column))
        }
    }

    fn alter_column(&self, grain: &str, table: &Table, column: &Column, live: &LiveColumnInfo) -> Result<()> {
        if self.column_reflects(column, live) {
            return Err(SyncError::usage(format!(
                "Column {} of table {grain}.{} already matches its definition.",
                column.name, table.name
            )));
        }
        self.rebuild(grain, table, Change::AlterColumn(column))
    }

    fn read_live_pk(&self, grain: &str, table: &Table) -> Result<LivePkInfo> {
        schema::primary_key(&self.conn, &Self::physical(grain, &table.name))
    }

    fn recreate_primary_key(&self, grain: &str, table: &Table, live: &LivePkInfo) -> Result<()> {
        debug!(grain, table = %table.name, from = ?live.columns, to = ?table.primary_key, "recreating primary key");
        self.rebuild(grain, table, Change::PrimaryKey)
    }

    fn read_live_foreign_keys(&self, grain: &str, table: &Table) -> Result<Vec<LiveFkInfo>> {
        schema::foreign_keys(&self.conn, &Self::physical(grain, &table.name))
    }

    fn read_live_indices(&self, grain: &str) -> Result<LiveIndices> {
        schema::grain_indices(&self.conn, grain)
    }

    fn create_index(&self, grain: &str, table: &Table, index: &Index) -> Result<()> {
        let sql = self.dialect.create_index_sql(grain, table, index);
        self.execute_ddl(&sql, || format!("Cannot create index {grain}.{}", index.name))
    }

    fn drop_index(&self, grain: &str, index: &LiveIndexInfo) -> Result<()> {
        let sql = self.dialect.drop_index_sql(grain, index);
        self.execute_ddl(&sql, || format!("Cannot drop index {} of grain {grain}", index.physical_name))
    }

    fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement + '_>> {
        Ok(Box::new(SqliteStatement::prepare(&self.conn, sql)?))
    }

    fn commit(&self) -> Result<()> {
        if !self.conn.is_autocommit() {
            debug!("commit");
            self.conn
                .execute_batch("COMMIT")
                .structural(|| "Cannot commit transaction".to_string())?;
        }
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        if !self.conn.is_autocommit() {
            debug!("rollback");
            self.conn
                .execute_batch("ROLLBACK")
                .structural(|| "Cannot roll back transaction".to_string())?;
        }
        Ok(())
    }
}
