//! SQL text generation per database engine.
//!
//! [`SqlDialect`] turns the abstract model into native DDL and builds the
//! parameterized CRUD statements used by cursors. Each dialect maps column
//! kinds to native types with one exhaustive `match`; the statement shapes are
//! shared provided methods that dialects override only where the syntax
//! differs (placeholders, row limiting, identity, index naming).
//!
//! # Example
//!
//! ```
//! use score_sync_core::{Column, StringLength, Table};
//! use score_sync_db::{EngineKind, dialect_for};
//!
//! let table = Table::new("person")
//!     .with_column(Column::integer("id").identity())
//!     .with_column(Column::string("name", StringLength::Bounded(60)))
//!     .with_primary_key(&["id"]);
//!
//! let pg = dialect_for(EngineKind::Postgres);
//! let sql = pg.insert_sql("app", &table, &[true, false]).unwrap();
//! assert_eq!(sql, r#"INSERT INTO "app"."person" ("name") VALUES ($1)"#);
//! ```

mod mssql;
mod postgres;
mod sqlite;

pub use mssql::MssqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use score_sync_core::{Column, Index, Table};

use crate::config::EngineKind;
use crate::error::{Result, SyncError};
use crate::filter::{Filter, FilterMap};
use crate::live::LiveIndexInfo;

/// Returns the text dialect for an engine kind.
pub fn dialect_for(kind: EngineKind) -> Box<dyn SqlDialect> {
    match kind {
        EngineKind::Sqlite => Box::new(SqliteDialect),
        EngineKind::Postgres => Box::new(PostgresDialect),
        EngineKind::Mssql => Box::new(MssqlDialect),
    }
}

/// Quotes a string literal, doubling embedded single quotes.
pub fn quote_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Renders bytes as upper-case hex digits.
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

/// Per-engine SQL text generation.
pub trait SqlDialect: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// Quotes an identifier (`"name"` or `[name]`).
    fn quote_ident(&self, name: &str) -> String;

    /// Placeholder for the 1-based parameter `index`.
    fn placeholder(&self, index: usize) -> String;

    /// Native type of a column.
    fn field_type(&self, column: &Column) -> String;

    /// Native literal of the column default, if one is declared.
    fn default_literal(&self, column: &Column) -> Option<String>;

    /// Clause placed after the type of an identity column.
    fn identity_clause(&self) -> Option<&'static str>;

    /// Whether the identity column carries the primary key inline instead of
    /// a table-level constraint.
    fn inline_identity_key(&self) -> bool {
        false
    }

    /// Quoted reference to a grain's table.
    fn table_name(&self, grain: &str, table: &str) -> String {
        format!("{}.{}", self.quote_ident(grain), self.quote_ident(table))
    }

    /// Quoted name an index is created under.
    fn index_name(&self, _grain: &str, index: &str) -> String {
        self.quote_ident(index)
    }

    /// Name of the primary-key constraint of a table.
    fn pk_constraint_name(&self, table: &str) -> String {
        format!("pk_{table}")
    }

    /// Statement creating a grain's schema, or `None` when the engine has
    /// no schemas.
    fn create_schema_sql(&self, grain: &str) -> Option<String> {
        Some(format!("CREATE SCHEMA {}", self.quote_ident(grain)))
    }

    /// Column definition as used in `CREATE TABLE` and `ADD COLUMN`.
    fn column_def(&self, column: &Column) -> String {
        let mut def = format!("{} {}", self.quote_ident(&column.name), self.field_type(column));
        if column.is_identity() {
            if let Some(clause) = self.identity_clause() {
                def.push(' ');
                def.push_str(clause);
            }
        }
        def.push_str(if column.nullable { " NULL" } else { " NOT NULL" });
        if let Some(default) = self.default_literal(column) {
            def.push_str(" DEFAULT ");
            def.push_str(&default);
        }
        if column.is_identity() && self.inline_identity_key() {
            def.push_str(" PRIMARY KEY AUTOINCREMENT");
        }
        def
    }

    fn create_table_sql(&self, grain: &str, table: &Table) -> String {
        let mut parts: Vec<String> = table.columns.iter().map(|c| self.column_def(c)).collect();
        let inline_key = self.inline_identity_key() && table.columns.iter().any(Column::is_identity);
        if !inline_key && !table.primary_key.is_empty() {
            parts.push(format!(
                "CONSTRAINT {} PRIMARY KEY ({})",
                self.quote_ident(&self.pk_constraint_name(&table.name)),
                self.column_list(&table.primary_key)
            ));
        }
        format!(
            "CREATE TABLE {} (\n  {}\n)",
            self.table_name(grain, &table.name),
            parts.join(",\n  ")
        )
    }

    fn add_column_sql(&self, grain: &str, table: &Table, column: &Column) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.table_name(grain, &table.name),
            self.column_def(column)
        )
    }

    fn create_index_sql(&self, grain: &str, table: &Table, index: &Index) -> String {
        format!(
            "CREATE INDEX {} ON {} ({})",
            self.index_name(grain, &index.name),
            self.table_name(grain, &table.name),
            self.column_list(&index.columns)
        )
    }

    fn drop_index_sql(&self, grain: &str, index: &LiveIndexInfo) -> String {
        format!(
            "DROP INDEX {}.{}",
            self.quote_ident(grain),
            self.quote_ident(&index.physical_name)
        )
    }

    /// Wraps a select so that it returns at most one row.
    fn select_one(&self, columns: &str, from: &str, condition: &str) -> String {
        format!("SELECT {columns} FROM {from} WHERE {condition} LIMIT 1")
    }

    /// Quoted, comma-separated column names.
    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `pk1 = ?, pk2 = ?` joined with `AND`, numbering from `first`.
    fn pk_condition(&self, table: &Table, first: usize) -> String {
        table
            .primary_key
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = {}", self.quote_ident(c), self.placeholder(first + i)))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// `WHERE` clause for a filter map, numbering from `first`. Empty when
    /// there are no filters.
    fn filter_clause(&self, table: &Table, filters: &FilterMap, first: usize) -> Result<String> {
        let mut next = first;
        let mut terms = Vec::with_capacity(filters.len());
        for (name, filter) in filters {
            if table.column(name).is_none() {
                return Err(SyncError::usage(format!(
                    "Unknown filter column '{name}' for table '{}'.",
                    table.name
                )));
            }
            let column = self.quote_ident(name);
            let term = match filter {
                Filter::Equals(_) => format!("({column} = {})", self.placeholder(next)),
                Filter::Range { .. } => format!(
                    "({column} BETWEEN {} AND {})",
                    self.placeholder(next),
                    self.placeholder(next + 1)
                ),
            };
            next += filter.param_count();
            terms.push(term);
        }
        if terms.is_empty() {
            return Ok(String::new());
        }
        Ok(format!(" WHERE {}", terms.join(" AND ")))
    }

    /// Selects one record by primary key.
    fn one_record_sql(&self, grain: &str, table: &Table) -> String {
        let columns: Vec<String> = table.columns.iter().map(|c| c.name.clone()).collect();
        self.select_one(
            &self.column_list(&columns),
            &self.table_name(grain, &table.name),
            &self.pk_condition(table, 1),
        )
    }

    /// Selects the records matching `filters`, ordered by primary key.
    fn record_set_sql(&self, grain: &str, table: &Table, filters: &FilterMap) -> Result<String> {
        let columns: Vec<String> = table.columns.iter().map(|c| c.name.clone()).collect();
        let mut sql = format!(
            "SELECT {} FROM {}{}",
            self.column_list(&columns),
            self.table_name(grain, &table.name),
            self.filter_clause(table, filters, 1)?
        );
        if !table.primary_key.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.column_list(&table.primary_key));
        }
        Ok(sql)
    }

    /// Inserts a record, omitting the columns flagged in `null_mask` from
    /// both the column list and the parameter list.
    fn insert_sql(&self, grain: &str, table: &Table, null_mask: &[bool]) -> Result<String> {
        check_mask(table, null_mask, "null")?;
        let columns: Vec<String> = table
            .columns
            .iter()
            .zip(null_mask)
            .filter(|(_, masked)| !**masked)
            .map(|(c, _)| c.name.clone())
            .collect();

        let target = self.table_name(grain, &table.name);
        if columns.is_empty() {
            return Ok(format!("INSERT INTO {target} DEFAULT VALUES"));
        }
        let params: Vec<String> = (1..=columns.len()).map(|i| self.placeholder(i)).collect();
        Ok(format!(
            "INSERT INTO {target} ({}) VALUES ({})",
            self.column_list(&columns),
            params.join(", ")
        ))
    }

    /// Updates a record by primary key. Key columns and the columns flagged
    /// in `equals_mask` are left out of the `SET` clause. Returns `None` when
    /// nothing is left to set.
    fn update_sql(&self, grain: &str, table: &Table, equals_mask: &[bool]) -> Result<Option<String>> {
        check_mask(table, equals_mask, "equals")?;
        let assignments: Vec<String> = updated_columns(table, equals_mask)
            .enumerate()
            .map(|(i, c)| format!("{} = {}", self.quote_ident(&c.name), self.placeholder(i + 1)))
            .collect();
        if assignments.is_empty() {
            return Ok(None);
        }
        Ok(Some(format!(
            "UPDATE {} SET {} WHERE {}",
            self.table_name(grain, &table.name),
            assignments.join(", "),
            self.pk_condition(table, assignments.len() + 1)
        )))
    }

    fn delete_sql(&self, grain: &str, table: &Table) -> String {
        format!(
            "DELETE FROM {} WHERE {}",
            self.table_name(grain, &table.name),
            self.pk_condition(table, 1)
        )
    }

    fn delete_set_sql(&self, grain: &str, table: &Table, filters: &FilterMap) -> Result<String> {
        Ok(format!(
            "DELETE FROM {}{}",
            self.table_name(grain, &table.name),
            self.filter_clause(table, filters, 1)?
        ))
    }
}

fn check_mask(table: &Table, mask: &[bool], what: &str) -> Result<()> {
    if mask.len() != table.columns.len() {
        return Err(SyncError::usage(format!(
            "Invalid {what} mask for '{}': expected {} entries, provided {}.",
            table.name,
            table.columns.len(),
            mask.len()
        )));
    }
    Ok(())
}

/// Columns an update with `equals_mask` assigns, in column order.
pub fn updated_columns<'t>(table: &'t Table, equals_mask: &'t [bool]) -> impl Iterator<Item = &'t Column> {
    table
        .columns
        .iter()
        .zip(equals_mask)
        .filter(move |(c, unchanged)| !**unchanged && !table.is_primary_key(&c.name))
        .map(|(c, _)| c)
}
