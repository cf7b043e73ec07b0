//! Prepared statements bound to the adaptor's connection.

use rusqlite::{Connection, Statement, params_from_iter};
use score_sync_db::{PreparedStatement, Result, Value};
use tracing::debug;

use crate::convert::{from_sql, to_sql};
use crate::error::StructuralExt;

/// Opens a transaction unless one is already open.
pub(crate) fn begin(conn: &Connection) -> Result<()> {
    if conn.is_autocommit() {
        conn.execute_batch("BEGIN")
            .structural(|| "Cannot begin transaction".to_string())?;
    }
    Ok(())
}

pub(crate) struct SqliteStatement<'c> {
    conn: &'c Connection,
    stmt: Statement<'c>,
    sql: String,
}

impl<'c> SqliteStatement<'c> {
    pub(crate) fn prepare(conn: &'c Connection, sql: &str) -> Result<Self> {
        let stmt = conn
            .prepare(sql)
            .structural(|| format!("Cannot prepare statement {sql}"))?;
        Ok(Self {
            conn,
            stmt,
            sql: sql.to_string(),
        })
    }
}

impl PreparedStatement for SqliteStatement<'_> {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn execute(&mut self, params: &[Value]) -> Result<usize> {
        begin(self.conn)?;
        debug!(sql = %self.sql, params = params.len(), "execute");
        let sql = &self.sql;
        self.stmt
            .execute(params_from_iter(params.iter().map(to_sql)))
            .structural(|| format!("Cannot execute {sql}"))
    }

    fn query(&mut self, params: &[Value]) -> Result<Vec<Vec<Value>>> {
        let sql = &self.sql;
        let context = || format!("Cannot query {sql}");
        let width = self.stmt.column_count();
        let mut rows = self
            .stmt
            .query(params_from_iter(params.iter().map(to_sql)))
            .structural(context)?;

        let mut result = Vec::new();
        while let Some(row) = rows.next().structural(context)? {
            let mut record = Vec::with_capacity(width);
            for i in 0..width {
                record.push(from_sql(row.get_ref(i).structural(context)?));
            }
            result.push(record);
        }
        Ok(result)
    }
}
