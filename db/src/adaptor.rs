//! The runtime adaptor contract.
//!
//! A [`DbAdaptor`] wraps one database connection and performs everything the
//! engine and the cursors need from a concrete engine: existence checks, DDL
//! execution, live-metadata reads, prepared statements and explicit
//! transaction control. SQL text comes from the adaptor's [`SqlDialect`].
//!
//! Every method takes `&self` so that cursors can keep prepared statements
//! borrowed from the adaptor while the engine keeps issuing DDL through it.
//! Failures of the native driver surface as [`SyncError::Structural`] with
//! grain/table/column context; they are never swallowed.
//!
//! [`SyncError::Structural`]: crate::SyncError::Structural

use std::collections::BTreeSet;

use score_sync_core::{Column, Index, Table};

use crate::dialect::SqlDialect;
use crate::error::Result;
use crate::live::{LiveColumnInfo, LiveFkInfo, LiveIndexInfo, LiveIndices, LivePkInfo};
use crate::value::Value;

/// A compiled statement bound to the adaptor's connection.
pub trait PreparedStatement {
    /// The SQL text the statement was compiled from.
    fn sql(&self) -> &str;

    /// Executes a data-modifying statement and returns the affected row
    /// count.
    fn execute(&mut self, params: &[Value]) -> Result<usize>;

    /// Executes a query and returns all rows.
    fn query(&mut self, params: &[Value]) -> Result<Vec<Vec<Value>>>;
}

/// Per-engine database access used by the synchronization engine.
pub trait DbAdaptor {
    fn dialect(&self) -> &dyn SqlDialect;

    fn schema_exists(&self, grain: &str) -> Result<bool>;

    /// Creates the grain's schema. Idempotent: an existing schema is not an
    /// error.
    fn create_schema_if_absent(&self, grain: &str) -> Result<()>;

    fn table_exists(&self, grain: &str, table: &str) -> Result<bool>;

    /// Whether the database contains any user table at all.
    fn user_tables_exist(&self) -> Result<bool>;

    /// Creates a table. Fails with a structural error if it already exists.
    fn create_table(&self, grain: &str, table: &Table) -> Result<()>;

    /// Names of the columns the live table has.
    fn read_live_columns(&self, grain: &str, table: &Table) -> Result<BTreeSet<String>>;

    fn read_live_column_info(&self, grain: &str, table: &Table, column: &Column) -> Result<LiveColumnInfo>;

    fn create_column(&self, grain: &str, table: &Table, column: &Column) -> Result<()>;

    /// Alters one column to match the model. Callers must have established
    /// a structural mismatch against `live` first.
    fn alter_column(&self, grain: &str, table: &Table, column: &Column, live: &LiveColumnInfo) -> Result<()>;

    fn read_live_pk(&self, grain: &str, table: &Table) -> Result<LivePkInfo>;

    /// Replaces the live primary key with the model's key.
    fn recreate_primary_key(&self, grain: &str, table: &Table, live: &LivePkInfo) -> Result<()>;

    fn read_live_foreign_keys(&self, grain: &str, table: &Table) -> Result<Vec<LiveFkInfo>>;

    /// Live indices of all tables of a grain, with ordered column lists.
    fn read_live_indices(&self, grain: &str) -> Result<LiveIndices>;

    fn create_index(&self, grain: &str, table: &Table, index: &Index) -> Result<()>;

    fn drop_index(&self, grain: &str, index: &LiveIndexInfo) -> Result<()>;

    /// Compiles a statement on the adaptor's connection.
    fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement + '_>>;

    /// Commits the current transaction, if one is open.
    fn commit(&self) -> Result<()>;

    /// Rolls back the current transaction, if one is open.
    fn rollback(&self) -> Result<()>;

    /// Structural equality of a live column against the model, with the
    /// model default rendered by this adaptor's dialect.
    fn column_reflects(&self, column: &Column, live: &LiveColumnInfo) -> bool {
        let expected = self.dialect().default_literal(column).unwrap_or_default();
        live.reflects(column, &expected)
    }
}
