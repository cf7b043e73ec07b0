//! Record access to one table through an adaptor.
//!
//! A [`Cursor`] owns one [`PreparedStmtHolder`] per operation, so repeated
//! calls with the same shape re-use the compiled statement. Records are
//! `Vec<Value>` in table column order.
//!
//! ```no_run
//! # use score_sync_db::{Cursor, DbAdaptor, Value};
//! # use score_sync_core::Table;
//! # fn demo(adaptor: &dyn DbAdaptor, table: &Table) -> score_sync_db::Result<()> {
//! let mut cursor = Cursor::new(adaptor, "app", table);
//! if let Some(record) = cursor.get(&[Value::Integer(42)])? {
//!     println!("{record:?}");
//! }
//! # Ok(())
//! # }
//! ```

use score_sync_core::Table;
use tracing::debug;

use crate::adaptor::DbAdaptor;
use crate::dialect::updated_columns;
use crate::error::{Result, SyncError};
use crate::filter::{FilterMap, filter_params};
use crate::stmt::{PreparedStmtHolder, StatementShape};
use crate::value::Value;

pub struct Cursor<'a> {
    adaptor: &'a dyn DbAdaptor,
    grain: String,
    table: Table,
    get: PreparedStmtHolder<'a>,
    select: PreparedStmtHolder<'a>,
    insert: PreparedStmtHolder<'a>,
    update: PreparedStmtHolder<'a>,
    delete: PreparedStmtHolder<'a>,
    delete_set: PreparedStmtHolder<'a>,
}

impl<'a> Cursor<'a> {
    pub fn new(adaptor: &'a dyn DbAdaptor, grain: &str, table: &Table) -> Self {
        Self {
            adaptor,
            grain: grain.to_string(),
            table: table.clone(),
            get: PreparedStmtHolder::new(),
            select: PreparedStmtHolder::new(),
            insert: PreparedStmtHolder::new(),
            update: PreparedStmtHolder::new(),
            delete: PreparedStmtHolder::new(),
            delete_set: PreparedStmtHolder::new(),
        }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Position of a column in the record layout.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.table.columns.iter().position(|c| c.name == name)
    }

    /// Total number of statement (re)builds across all operations.
    pub fn statement_builds(&self) -> usize {
        [
            &self.get,
            &self.select,
            &self.insert,
            &self.update,
            &self.delete,
            &self.delete_set,
        ]
        .iter()
        .map(|h| h.builds())
        .sum()
    }

    /// Key values of a full record, in primary-key order.
    pub fn key_of(&self, record: &[Value]) -> Result<Vec<Value>> {
        self.check_record(record)?;
        Ok(self
            .table
            .primary_key
            .iter()
            .filter_map(|name| self.column_index(name))
            .map(|i| record[i].clone())
            .collect())
    }

    /// Fetches one record by primary key.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Usage`] immediately when the number of key values
    /// differs from the number of primary-key columns.
    pub fn get(&mut self, key: &[Value]) -> Result<Option<Vec<Value>>> {
        self.check_key("get", key)?;
        let (adaptor, grain, table) = (self.adaptor, &self.grain, &self.table);
        let stmt = self.get.get_or_build(StatementShape::params(key.len()), || {
            adaptor.prepare(&adaptor.dialect().one_record_sql(grain, table))
        })?;
        let rows = stmt.query(key)?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(self.coerce_row(row)?)),
            None => Ok(None),
        }
    }

    /// Fetches the records matching `filters`, ordered by primary key.
    pub fn select(&mut self, filters: &FilterMap) -> Result<Vec<Vec<Value>>> {
        let (adaptor, grain, table) = (self.adaptor, &self.grain, &self.table);
        let stmt = self.select.get_or_build(StatementShape::filtered(filters), || {
            adaptor.prepare(&adaptor.dialect().record_set_sql(grain, table, filters)?)
        })?;
        let rows = stmt.query(&filter_params(filters))?;
        rows.into_iter().map(|row| self.coerce_row(row)).collect()
    }

    /// Inserts a record. `Null` values are left out of the statement so the
    /// database applies defaults and identity values.
    pub fn insert(&mut self, record: &[Value]) -> Result<()> {
        self.check_record(record)?;
        let null_mask: Vec<bool> = record.iter().map(Value::is_null).collect();
        let params: Vec<Value> = record.iter().filter(|v| !v.is_null()).cloned().collect();

        let (adaptor, grain, table) = (self.adaptor, &self.grain, &self.table);
        let stmt = self
            .insert
            .get_or_build(StatementShape::masked(&null_mask, params.len()), || {
                adaptor.prepare(&adaptor.dialect().insert_sql(grain, table, &null_mask)?)
            })?;
        debug!(table = %self.table.name, sql = stmt.sql(), "insert");
        stmt.execute(&params)?;
        Ok(())
    }

    /// Inserts a record unless one with the same key exists. Returns whether
    /// a row was inserted.
    pub fn try_insert(&mut self, record: &[Value]) -> Result<bool> {
        let key = self.key_of(record)?;
        if self.get(&key)?.is_some() {
            return Ok(false);
        }
        self.insert(record)?;
        Ok(true)
    }

    /// Updates a record by primary key.
    ///
    /// When `original` is given, columns whose value did not change are left
    /// out of the `SET` clause. Returns whether a row matched the key.
    pub fn update(&mut self, record: &[Value], original: Option<&[Value]>) -> Result<bool> {
        self.check_record(record)?;
        let equals_mask: Vec<bool> = match original {
            Some(original) => {
                self.check_record(original)?;
                record.iter().zip(original).map(|(a, b)| a == b).collect()
            }
            None => vec![false; record.len()],
        };

        let mut params: Vec<Value> = Vec::new();
        for column in updated_columns(&self.table, &equals_mask) {
            if let Some(i) = self.column_index(&column.name) {
                params.push(record[i].clone());
            }
        }
        if params.is_empty() {
            let key = self.key_of(record)?;
            return Ok(self.get(&key)?.is_some());
        }
        params.extend(self.key_of(record)?);

        let (adaptor, grain, table) = (self.adaptor, &self.grain, &self.table);
        let stmt = self
            .update
            .get_or_build(StatementShape::masked(&equals_mask, params.len()), || {
                let sql = adaptor
                    .dialect()
                    .update_sql(grain, table, &equals_mask)?
                    .ok_or_else(|| {
                        SyncError::usage(format!("Nothing to update in '{grain}.{}'.", table.name))
                    })?;
                adaptor.prepare(&sql)
            })?;
        debug!(table = %self.table.name, sql = stmt.sql(), "update");
        Ok(stmt.execute(&params)? > 0)
    }

    /// Deletes a record by primary key. Returns whether a row was deleted.
    pub fn delete(&mut self, key: &[Value]) -> Result<bool> {
        self.check_key("delete", key)?;
        let (adaptor, grain, table) = (self.adaptor, &self.grain, &self.table);
        let stmt = self.delete.get_or_build(StatementShape::params(key.len()), || {
            adaptor.prepare(&adaptor.dialect().delete_sql(grain, table))
        })?;
        Ok(stmt.execute(key)? > 0)
    }

    /// Deletes every record matching `filters` and returns the count.
    pub fn delete_set(&mut self, filters: &FilterMap) -> Result<usize> {
        let (adaptor, grain, table) = (self.adaptor, &self.grain, &self.table);
        let stmt = self.delete_set.get_or_build(StatementShape::filtered(filters), || {
            adaptor.prepare(&adaptor.dialect().delete_set_sql(grain, table, filters)?)
        })?;
        stmt.execute(&filter_params(filters))
    }

    fn check_key(&self, operation: &str, key: &[Value]) -> Result<()> {
        let expected = self.table.primary_key.len();
        if key.len() != expected {
            return Err(SyncError::usage(format!(
                "Invalid number of '{operation}' arguments for '{}.{}': expected {expected}, provided {}.",
                self.grain,
                self.table.name,
                key.len()
            )));
        }
        Ok(())
    }

    fn check_record(&self, record: &[Value]) -> Result<()> {
        if record.len() != self.table.columns.len() {
            return Err(SyncError::usage(format!(
                "Invalid record for '{}.{}': expected {} values, provided {}.",
                self.grain,
                self.table.name,
                self.table.columns.len(),
                record.len()
            )));
        }
        Ok(())
    }

    fn coerce_row(&self, row: Vec<Value>) -> Result<Vec<Value>> {
        self.table
            .columns
            .iter()
            .zip(row)
            .map(|(column, value)| value.coerce(column.column_type()))
            .collect()
    }
}
