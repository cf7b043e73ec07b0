//! Dialect layer, statement cache and schema synchronization engine.
//!
//! This crate turns a [`Score`](score_sync_core::Score) into database
//! structure and keeps the two in step across model versions. It provides:
//!
//! - [`SqlDialect`]: native SQL text for SQLite, PostgreSQL and MSSQL
//! - [`DbAdaptor`]: the contract a runtime database connection implements
//! - [`PreparedStmtHolder`] and [`Cursor`]: cached parameterized statements
//!   and per-table record access
//! - [`SchemaSync`]: the per-grain upgrade state machine, with its outcome
//!   recorded in the bookkeeping tables ([`GrainsTable`], [`TablesTable`])
//!
//! # Quick start
//!
//! ```no_run
//! use score_sync_db::{DbAdaptor, EngineConfig, load_score, synchronize};
//!
//! # fn connect(_: &EngineConfig) -> score_sync_db::Result<Box<dyn DbAdaptor>> { unimplemented!() }
//! # fn main() -> score_sync_db::Result<()> {
//! let config = EngineConfig::load("score-sync.yml")?;
//! let score = load_score("score.yml")?;
//! let adaptor = connect(&config)?;
//! let report = synchronize(adaptor.as_ref(), &score)?;
//! println!("{} grain(s) upgraded", report.upgraded().count());
//! # Ok(())
//! # }
//! ```

mod adaptor;
mod bookkeeping;
mod config;
mod cursor;
mod dialect;
mod error;
mod filter;
mod live;
mod loader;
mod stmt;
mod updater;
mod value;

pub use adaptor::{DbAdaptor, PreparedStatement};
pub use bookkeeping::{GrainRecord, GrainStatus, GrainsTable, TableRecord, TablesTable};
pub use config::{EngineConfig, EngineKind};
pub use cursor::Cursor;
pub use dialect::{
    MssqlDialect, PostgresDialect, SqlDialect, SqliteDialect, dialect_for, hex, quote_string,
    updated_columns,
};
pub use error::{NativeError, Result, SyncError};
pub use filter::{Filter, FilterMap, filter_params};
pub use live::{
    LiveColumnInfo, LiveFkInfo, LiveIndexInfo, LiveIndices, LivePkInfo, index_columns_match,
    missing_indices, normalize_default, stale_indices,
};
pub use loader::{load_score, parse_score_json, parse_score_yaml};
pub use stmt::{PreparedStmtHolder, StatementShape};
pub use updater::{Decision, GrainOutcome, GrainResult, SchemaSync, SyncReport, decide, synchronize};
pub use value::{DATE_TIME_FORMAT, Value, parse_date_time};
