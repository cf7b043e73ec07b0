//! SQLite runtime adaptor for grain-based schema synchronization.
//!
//! This crate implements [`DbAdaptor`](score_sync_db::DbAdaptor) over a
//! `rusqlite` connection. SQLite has no schemas, so every grain object is
//! stored under the physical name `"<grain>.<object>"`. Column and primary
//! key changes that SQLite cannot make in place go through a table rebuild.
//!
//! # Quick start
//!
//! ```no_run
//! use score_sync_db::{EngineConfig, load_score, synchronize};
//!
//! let config = EngineConfig::load("score-sync.yml").unwrap();
//! let score = load_score("score.yml").unwrap();
//! let adaptor = score_sync_sqlite::connect(&config).unwrap();
//!
//! let report = synchronize(&adaptor, &score).unwrap();
//! for result in &report.results {
//!     println!("{}: {}", result.grain, result.outcome);
//! }
//! ```
//!
//! # Modules
//!
//! - **`schema`**: live structure readers over `sqlite_master` and pragmas
//! - **`rebuild`**: the create-copy-drop-rename table rebuild
//! - **`statement`**: prepared statements and the lazy transaction
//! - **`convert`**: [`Value`](score_sync_db::Value) to SQLite storage mapping

mod adaptor;
mod convert;
mod error;
mod rebuild;
mod schema;
mod statement;

pub use adaptor::SqliteAdaptor;

use score_sync_db::{EngineConfig, EngineKind, Result, SyncError};
use tracing::info;

/// Connection target that opens a private in-memory database.
pub const MEMORY_DATABASE: &str = ":memory:";

/// Opens the runtime adaptor for a configuration.
///
/// # Errors
///
/// Returns [`SyncError::UnsupportedEngine`] for engine kinds without a
/// runtime adaptor in this crate, and [`SyncError::Structural`] when the
/// database cannot be opened.
pub fn connect(config: &EngineConfig) -> Result<SqliteAdaptor> {
    match config.engine {
        EngineKind::Sqlite => {
            info!(database = %config.database, "opening SQLite database");
            if config.database == MEMORY_DATABASE {
                SqliteAdaptor::open_in_memory()
            } else {
                SqliteAdaptor::open(&config.database)
            }
        }
        other => Err(SyncError::UnsupportedEngine(other.to_string())),
    }
}
