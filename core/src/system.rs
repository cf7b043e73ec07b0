//! The built-in system grain.
//!
//! The engine keeps its own bookkeeping inside the managed database, in the
//! tables of a grain it defines itself. The system grain is synchronized like
//! any other grain, always first (dependency order 0).

use crate::types::{Column, ColumnKind, DateTimeDefault, Grain, StringLength, Table};
use crate::version::VersionString;

/// Name of the system grain.
pub const SYSTEM_GRAIN: &str = "celesta";

/// Version of the system grain definition.
pub const SYSTEM_GRAIN_VERSION: &str = "1.0";

/// Bookkeeping table with one row per grain.
pub const GRAINS_TABLE: &str = "grains";

/// Bookkeeping table with one row per known table.
pub const TABLES_TABLE: &str = "tables";

/// Builds the system grain definition.
pub fn system_grain() -> Grain {
    let grains = Table::new(GRAINS_TABLE)
        .with_column(Column::string("id", StringLength::Bounded(30)).not_null())
        .with_column(Column::string("version", StringLength::Bounded(2000)).not_null())
        .with_column(Column::integer("length").not_null())
        .with_column(Column::string("checksum", StringLength::Bounded(8)).not_null())
        .with_column(
            Column::integer("state")
                .not_null()
                .with_kind(ColumnKind::Integer {
                    identity: false,
                    default: Some(3),
                }),
        )
        .with_column(
            Column::date_time("lastmodified")
                .not_null()
                .with_kind(ColumnKind::DateTime {
                    default: Some(DateTimeDefault::CurrentTimestamp),
                }),
        )
        .with_column(
            Column::string("message", StringLength::Max)
                .not_null()
                .with_kind(ColumnKind::String {
                    length: StringLength::Max,
                    default: Some(String::new()),
                }),
        )
        .with_primary_key(&["id"]);

    let tables = Table::new(TABLES_TABLE)
        .with_column(Column::string("grainid", StringLength::Bounded(30)).not_null())
        .with_column(Column::string("tablename", StringLength::Bounded(100)).not_null())
        .with_column(
            Column::boolean("orphaned")
                .not_null()
                .with_kind(ColumnKind::Boolean {
                    default: Some(false),
                }),
        )
        .with_primary_key(&["grainid", "tablename"]);

    Grain::new(
        SYSTEM_GRAIN,
        VersionString::untagged(&[1, 0]),
        0,
        vec![grains, tables],
    )
}
