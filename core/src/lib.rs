//! Core score model for grain-based schema synchronization.
//!
//! This crate defines the desired-state model the synchronization engine
//! converges a database to:
//!
//! - [`Score`]: the full model, a list of [`Grain`]s.
//! - [`Grain`]: an independently versioned schema module with a content
//!   fingerprint (`checksum`, `length`) and a dependency order.
//! - [`Table`], [`Column`], [`ColumnKind`], [`Index`]: structural
//!   definitions.
//! - [`VersionString`]: comparable tagged versions with a four-way
//!   [`VersionOrdering`].
//!
//! The built-in system grain ([`system_grain`]) describes the bookkeeping
//! tables the engine keeps inside the managed database. Validation
//! ([`validate_score`]) catches structural errors such as duplicate names,
//! bad primary keys and dangling index columns before any DDL is emitted.
//!
//! # Example
//!
//! ```
//! use score_sync_core::*;
//!
//! let person = Table::new("person")
//!     .with_column(Column::integer("id").identity())
//!     .with_column(Column::string("name", StringLength::Bounded(60)).not_null())
//!     .with_primary_key(&["id"])
//!     .with_index(Index::new("idx_person_name", &["name"]));
//! let app = Grain::new("app", "1.0".parse().unwrap(), 1, vec![person]);
//!
//! let score = Score::with_system(vec![app]);
//! assert!(validate_score(&score).is_empty());
//! assert_eq!(score.ordered_grains()[0].name, SYSTEM_GRAIN);
//! ```

mod system;
mod types;
mod validate;
mod version;

pub use system::{GRAINS_TABLE, SYSTEM_GRAIN, SYSTEM_GRAIN_VERSION, TABLES_TABLE, system_grain};
pub use types::*;
pub use validate::{ValidationError, is_identifier, validate_grain, validate_score};
pub use version::{VersionOrdering, VersionParseError, VersionString};
