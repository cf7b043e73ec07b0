//! Accessors for the engine's bookkeeping tables.
//!
//! The `grains` table holds one row per grain: the version, length and
//! checksum last applied, the status, and a diagnostic message. The `tables`
//! table records every table the engine has created and whether the model
//! still declares it. Both live inside the managed database and are accessed
//! through ordinary [`Cursor`]s.

use std::fmt;

use chrono::{NaiveDateTime, Timelike, Utc};
use score_sync_core::{GRAINS_TABLE, Grain, SYSTEM_GRAIN, TABLES_TABLE, Table, VersionString};

use crate::adaptor::DbAdaptor;
use crate::cursor::Cursor;
use crate::error::{Result, SyncError};
use crate::filter::{Filter, FilterMap};
use crate::value::Value;

/// Status of a grain row.
///
/// ```
/// use score_sync_db::GrainStatus;
///
/// assert_eq!(GrainStatus::from_code(3), Some(GrainStatus::Recover));
/// assert_eq!(GrainStatus::Recover.code(), 3);
/// assert_eq!(GrainStatus::from_code(9), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrainStatus {
    Ready,
    Upgrading,
    Error,
    Recover,
    Lock,
}

impl GrainStatus {
    /// The integer stored in the `state` column.
    pub fn code(self) -> i64 {
        match self {
            GrainStatus::Ready => 0,
            GrainStatus::Upgrading => 1,
            GrainStatus::Error => 2,
            GrainStatus::Recover => 3,
            GrainStatus::Lock => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(GrainStatus::Ready),
            1 => Some(GrainStatus::Upgrading),
            2 => Some(GrainStatus::Error),
            3 => Some(GrainStatus::Recover),
            4 => Some(GrainStatus::Lock),
            _ => None,
        }
    }

    /// Whether a run may start while a grain is in this status.
    pub fn allows_run(self) -> bool {
        matches!(self, GrainStatus::Ready | GrainStatus::Recover | GrainStatus::Lock)
    }
}

impl fmt::Display for GrainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GrainStatus::Ready => "ready",
            GrainStatus::Upgrading => "upgrading",
            GrainStatus::Error => "error",
            GrainStatus::Recover => "recover",
            GrainStatus::Lock => "lock",
        };
        f.write_str(name)
    }
}

/// One row of the `grains` table.
#[derive(Debug, Clone, PartialEq)]
pub struct GrainRecord {
    pub id: String,
    pub version: VersionString,
    pub length: u32,
    pub checksum: u32,
    pub status: GrainStatus,
    pub last_modified: NaiveDateTime,
    pub message: String,
}

impl GrainRecord {
    /// A fresh row for a grain seen for the first time.
    pub fn recover(grain: &Grain) -> Self {
        Self {
            id: grain.name.clone(),
            version: grain.version.clone(),
            length: grain.length,
            checksum: grain.checksum,
            status: GrainStatus::Recover,
            last_modified: now(),
            message: String::new(),
        }
    }

    /// Checksum in its stored form: eight upper-case hex digits.
    pub fn checksum_hex(&self) -> String {
        format!("{:08X}", self.checksum)
    }
}

/// Current time, truncated to whole seconds.
pub fn now() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}

fn system_table<'g>(system: &'g Grain, name: &str) -> Result<&'g Table> {
    system
        .table(name)
        .ok_or_else(|| SyncError::MissingSystemGrain(format!("{SYSTEM_GRAIN}.{name}")))
}

fn column(cursor: &Cursor<'_>, name: &str) -> Result<usize> {
    cursor.column_index(name).ok_or_else(|| {
        SyncError::Bookkeeping(format!("column '{name}' missing from '{}'", cursor.table().name))
    })
}

/// Column positions of the `grains` table.
struct GrainsLayout {
    id: usize,
    version: usize,
    length: usize,
    checksum: usize,
    state: usize,
    last_modified: usize,
    message: usize,
    width: usize,
}

/// Access to the `grains` table.
pub struct GrainsTable<'a> {
    cursor: Cursor<'a>,
    layout: GrainsLayout,
}

impl<'a> GrainsTable<'a> {
    pub fn new(adaptor: &'a dyn DbAdaptor, system: &Grain) -> Result<Self> {
        let cursor = Cursor::new(adaptor, SYSTEM_GRAIN, system_table(system, GRAINS_TABLE)?);
        let layout = GrainsLayout {
            id: column(&cursor, "id")?,
            version: column(&cursor, "version")?,
            length: column(&cursor, "length")?,
            checksum: column(&cursor, "checksum")?,
            state: column(&cursor, "state")?,
            last_modified: column(&cursor, "lastmodified")?,
            message: column(&cursor, "message")?,
            width: cursor.table().columns.len(),
        };
        Ok(Self { cursor, layout })
    }

    /// Reads every row, ordered by grain id.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnexpectedStatus`] for a state code outside the
    /// known statuses and [`SyncError::Bookkeeping`] for a row whose version
    /// or checksum cannot be parsed.
    pub fn load_all(&mut self) -> Result<Vec<GrainRecord>> {
        let rows = self.cursor.select(&FilterMap::new())?;
        rows.iter().map(|row| self.decode(row)).collect()
    }

    pub fn get(&mut self, id: &str) -> Result<Option<GrainRecord>> {
        match self.cursor.get(&[Value::from(id)])? {
            Some(row) => self.decode(&row).map(Some),
            None => Ok(None),
        }
    }

    pub fn insert(&mut self, record: &GrainRecord) -> Result<()> {
        let row = self.encode(record);
        self.cursor.insert(&row)
    }

    /// Writes every field of `record` to its existing row.
    pub fn update(&mut self, record: &GrainRecord) -> Result<()> {
        let row = self.encode(record);
        if !self.cursor.update(&row, None)? {
            return Err(SyncError::Bookkeeping(format!(
                "no row for grain '{}'",
                record.id
            )));
        }
        Ok(())
    }

    fn encode(&self, record: &GrainRecord) -> Vec<Value> {
        let l = &self.layout;
        let mut row = vec![Value::Null; l.width];
        row[l.id] = Value::from(record.id.as_str());
        row[l.version] = Value::from(record.version.to_string());
        row[l.length] = Value::Integer(i64::from(record.length));
        row[l.checksum] = Value::from(record.checksum_hex());
        row[l.state] = Value::Integer(record.status.code());
        row[l.last_modified] = Value::DateTime(record.last_modified);
        row[l.message] = Value::from(record.message.as_str());
        row
    }

    fn decode(&self, row: &[Value]) -> Result<GrainRecord> {
        let l = &self.layout;
        let id = row[l.id].as_str().unwrap_or_default().to_string();
        let malformed = |what: &str| SyncError::Bookkeeping(format!("grain '{id}': invalid {what}"));

        let code = row[l.state].as_i64().ok_or_else(|| malformed("state"))?;
        let status = GrainStatus::from_code(code).ok_or_else(|| SyncError::UnexpectedStatus {
            grain: id.clone(),
            status: code.to_string(),
        })?;
        let version = row[l.version]
            .as_str()
            .ok_or_else(|| malformed("version"))?
            .parse::<VersionString>()
            .map_err(|e| SyncError::Bookkeeping(format!("grain '{id}': {e}")))?;
        let checksum = row[l.checksum]
            .as_str()
            .and_then(|s| u32::from_str_radix(s.trim(), 16).ok())
            .ok_or_else(|| malformed("checksum"))?;
        let length = row[l.length]
            .as_i64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| malformed("length"))?;

        Ok(GrainRecord {
            version,
            length,
            checksum,
            status,
            last_modified: row[l.last_modified].as_date_time().unwrap_or_default(),
            message: row[l.message].as_str().unwrap_or_default().to_string(),
            id,
        })
    }
}

/// One row of the `tables` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRecord {
    pub grain: String,
    pub table: String,
    pub orphaned: bool,
}

/// Access to the `tables` table.
pub struct TablesTable<'a> {
    cursor: Cursor<'a>,
    grain_col: usize,
    table_col: usize,
    orphaned_col: usize,
}

impl<'a> TablesTable<'a> {
    pub fn new(adaptor: &'a dyn DbAdaptor, system: &Grain) -> Result<Self> {
        let cursor = Cursor::new(adaptor, SYSTEM_GRAIN, system_table(system, TABLES_TABLE)?);
        Ok(Self {
            grain_col: column(&cursor, "grainid")?,
            table_col: column(&cursor, "tablename")?,
            orphaned_col: column(&cursor, "orphaned")?,
            cursor,
        })
    }

    /// Rows of one grain, ordered by table name.
    pub fn list(&mut self, grain: &str) -> Result<Vec<TableRecord>> {
        let mut filters = FilterMap::new();
        filters.insert("grainid".to_string(), Filter::equals(grain));
        let rows = self.cursor.select(&filters)?;
        Ok(rows.iter().map(|row| self.decode(row)).collect())
    }

    /// Flags every recorded table of `grain` the model no longer declares as
    /// orphaned, and clears the flag on the ones it does. The tables
    /// themselves are left in place.
    pub fn mark_orphans(&mut self, grain: &Grain) -> Result<()> {
        for record in self.list(&grain.name)? {
            let orphaned = grain.table(&record.table).is_none();
            if orphaned != record.orphaned {
                let original = self.encode(&record);
                let updated = self.encode(&TableRecord { orphaned, ..record });
                self.cursor.update(&updated, Some(&original))?;
            }
        }
        Ok(())
    }

    /// Makes sure a non-orphaned row exists for the table.
    pub fn ensure_present(&mut self, grain: &str, table: &str) -> Result<()> {
        let record = TableRecord {
            grain: grain.to_string(),
            table: table.to_string(),
            orphaned: false,
        };
        let row = self.encode(&record);
        if !self.cursor.try_insert(&row)? {
            let key = self.cursor.key_of(&row)?;
            if let Some(existing) = self.cursor.get(&key)? {
                if existing != row {
                    self.cursor.update(&row, Some(&existing))?;
                }
            }
        }
        Ok(())
    }

    fn encode(&self, record: &TableRecord) -> Vec<Value> {
        let mut row = vec![Value::Null; self.cursor.table().columns.len()];
        row[self.grain_col] = Value::from(record.grain.as_str());
        row[self.table_col] = Value::from(record.table.as_str());
        row[self.orphaned_col] = Value::Boolean(record.orphaned);
        row
    }

    fn decode(&self, row: &[Value]) -> TableRecord {
        TableRecord {
            grain: row[self.grain_col].as_str().unwrap_or_default().to_string(),
            table: row[self.table_col].as_str().unwrap_or_default().to_string(),
            orphaned: row[self.orphaned_col].as_bool().unwrap_or(false),
        }
    }
}
