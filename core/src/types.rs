//! Score model: grains, tables, columns and indices.
//!
//! The model is the desired state of the managed database. It is produced once
//! (by an external parser or by deserializing a score file) and is read-only
//! for the rest of a synchronization run. Every type here round-trips through
//! serde so scores can be stored as YAML or JSON.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::system::{SYSTEM_GRAIN, system_grain};
use crate::version::VersionString;

/// The simple type tag of a column, without its attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Floating,
    String,
    Binary,
    DateTime,
    Boolean,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Integer => "integer",
            ColumnType::Floating => "floating",
            ColumnType::String => "string",
            ColumnType::Binary => "binary",
            ColumnType::DateTime => "date_time",
            ColumnType::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

/// Declared length of a string column.
///
/// Serialized as a number, or as the literal `"max"` for unbounded text.
///
/// # Examples
///
/// ```
/// use score_sync_core::StringLength;
///
/// let bounded: StringLength = serde_json::from_str("30").unwrap();
/// assert_eq!(bounded, StringLength::Bounded(30));
/// let max: StringLength = serde_json::from_str("\"max\"").unwrap();
/// assert_eq!(max, StringLength::Max);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StringLength {
    Bounded(u32),
    #[default]
    Max,
}

impl Serialize for StringLength {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StringLength::Bounded(n) => serializer.serialize_u32(*n),
            StringLength::Max => serializer.serialize_str("max"),
        }
    }
}

impl<'de> Deserialize<'de> for StringLength {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u32),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(StringLength::Bounded(n)),
            Raw::Text(s) if s.eq_ignore_ascii_case("max") => Ok(StringLength::Max),
            Raw::Text(s) => Err(serde::de::Error::custom(format!(
                "invalid string length '{s}': expected a number or \"max\""
            ))),
        }
    }
}

/// Default value of a date-time column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DateTimeDefault {
    /// The current time at insert (`now` / `getdate`).
    CurrentTimestamp,
    /// A fixed point in time.
    At(NaiveDateTime),
}

impl TryFrom<String> for DateTimeDefault {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("now") || trimmed.eq_ignore_ascii_case("getdate") {
            return Ok(DateTimeDefault::CurrentTimestamp);
        }
        if let Ok(at) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
            return Ok(DateTimeDefault::At(at));
        }
        NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(DateTimeDefault::At)
            .ok_or_else(|| format!("invalid date-time default '{value}'"))
    }
}

impl From<DateTimeDefault> for String {
    fn from(value: DateTimeDefault) -> Self {
        match value {
            DateTimeDefault::CurrentTimestamp => "now".to_string(),
            DateTimeDefault::At(at) => at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

mod hex_default {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => {
                let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
                serializer.serialize_str(&format!("0x{hex}"))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        let digits = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .unwrap_or(&raw);
        if digits.len() % 2 != 0 || !digits.is_ascii() {
            return Err(serde::de::Error::custom(format!("invalid hex literal '{raw}'")));
        }
        (0..digits.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&digits[i..i + 2], 16))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid hex literal '{raw}'")))
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn default_true() -> bool {
    true
}

/// Column type together with its type-specific attributes and default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColumnKind {
    Integer {
        /// Identity/autoincrement. Only legal on a single-column primary key.
        #[serde(default, skip_serializing_if = "is_false")]
        identity: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<i64>,
    },
    Floating {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<f64>,
    },
    String {
        #[serde(default)]
        length: StringLength,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<String>,
    },
    Binary {
        #[serde(default, skip_serializing_if = "Option::is_none", with = "hex_default")]
        default: Option<Vec<u8>>,
    },
    DateTime {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<DateTimeDefault>,
    },
    Boolean {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<bool>,
    },
}

impl ColumnKind {
    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnKind::Integer { .. } => ColumnType::Integer,
            ColumnKind::Floating { .. } => ColumnType::Floating,
            ColumnKind::String { .. } => ColumnType::String,
            ColumnKind::Binary { .. } => ColumnType::Binary,
            ColumnKind::DateTime { .. } => ColumnType::DateTime,
            ColumnKind::Boolean { .. } => ColumnType::Boolean,
        }
    }

    /// Returns `true` when a default value is declared.
    pub fn has_default(&self) -> bool {
        match self {
            ColumnKind::Integer { default, .. } => default.is_some(),
            ColumnKind::Floating { default } => default.is_some(),
            ColumnKind::String { default, .. } => default.is_some(),
            ColumnKind::Binary { default } => default.is_some(),
            ColumnKind::DateTime { default } => default.is_some(),
            ColumnKind::Boolean { default } => default.is_some(),
        }
    }
}

/// A typed attribute of a [`Table`].
///
/// # Examples
///
/// ```
/// use score_sync_core::{Column, ColumnType, StringLength};
///
/// let id = Column::integer("id").identity();
/// assert!(id.is_identity());
/// assert!(!id.nullable);
///
/// let name = Column::string("name", StringLength::Bounded(50)).not_null();
/// assert_eq!(name.column_type(), ColumnType::String);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(flatten)]
    pub kind: ColumnKind,
}

impl Column {
    /// Creates a nullable column of the given kind.
    pub fn new(name: &str, kind: ColumnKind) -> Self {
        Self {
            name: name.to_string(),
            nullable: true,
            kind,
        }
    }

    pub fn integer(name: &str) -> Self {
        Self::new(
            name,
            ColumnKind::Integer {
                identity: false,
                default: None,
            },
        )
    }

    pub fn floating(name: &str) -> Self {
        Self::new(name, ColumnKind::Floating { default: None })
    }

    pub fn string(name: &str, length: StringLength) -> Self {
        Self::new(
            name,
            ColumnKind::String {
                length,
                default: None,
            },
        )
    }

    pub fn binary(name: &str) -> Self {
        Self::new(name, ColumnKind::Binary { default: None })
    }

    pub fn date_time(name: &str) -> Self {
        Self::new(name, ColumnKind::DateTime { default: None })
    }

    pub fn boolean(name: &str) -> Self {
        Self::new(name, ColumnKind::Boolean { default: None })
    }

    /// Marks the column `NOT NULL`.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Marks an integer column as identity (and therefore `NOT NULL`).
    /// Has no effect on other column types.
    pub fn identity(mut self) -> Self {
        if let ColumnKind::Integer { identity, .. } = &mut self.kind {
            *identity = true;
            self.nullable = false;
        }
        self
    }

    /// Replaces the column kind, keeping name and nullability.
    pub fn with_kind(mut self, kind: ColumnKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn column_type(&self) -> ColumnType {
        self.kind.column_type()
    }

    pub fn is_identity(&self) -> bool {
        matches!(self.kind, ColumnKind::Integer { identity: true, .. })
    }

    /// Returns the declared string length, if this is a string column.
    pub fn string_length(&self) -> Option<StringLength> {
        match self.kind {
            ColumnKind::String { length, .. } => Some(length),
            _ => None,
        }
    }
}

/// A named, ordered column list over one table.
///
/// Column order is significant: `(a, b)` and `(b, a)` are different indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
}

impl Index {
    pub fn new(name: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// A table of a grain.
///
/// # Examples
///
/// ```
/// use score_sync_core::{Column, Index, StringLength, Table};
///
/// let table = Table::new("person")
///     .with_column(Column::integer("id").identity())
///     .with_column(Column::string("surname", StringLength::Bounded(60)))
///     .with_primary_key(&["id"])
///     .with_index(Index::new("idx_person_surname", &["surname"]));
///
/// assert!(table.is_primary_key("id"));
/// assert_eq!(table.column("surname").unwrap().name, "surname");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indices: Vec<Index>,
}

impl Table {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            indices: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_index(mut self, index: Index) -> Self {
        self.indices.push(index);
        self
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn is_primary_key(&self, column: &str) -> bool {
        self.primary_key.iter().any(|c| c == column)
    }

    /// Primary-key columns in key order. Unknown names are skipped.
    pub fn primary_key_columns(&self) -> impl Iterator<Item = &Column> {
        self.primary_key.iter().filter_map(|name| self.column(name))
    }
}

/// A named, independently versioned schema module.
///
/// `checksum` and `length` fingerprint the grain content. They are computed
/// from the tables by [`Grain::new`] and when a score file omits them; an
/// external parser may supply its own values through
/// [`Grain::with_fingerprint`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "GrainDef", into = "GrainDef")]
pub struct Grain {
    pub name: String,
    pub version: VersionString,
    pub dependency_order: i32,
    pub tables: Vec<Table>,
    pub checksum: u32,
    pub length: u32,
}

#[derive(Serialize, Deserialize)]
struct GrainDef {
    name: String,
    version: VersionString,
    #[serde(default)]
    dependency_order: i32,
    #[serde(default)]
    tables: Vec<Table>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    length: Option<u32>,
}

impl From<GrainDef> for Grain {
    fn from(def: GrainDef) -> Self {
        let mut grain = Grain::new(&def.name, def.version, def.dependency_order, def.tables);
        if let Some(checksum) = def.checksum {
            grain.checksum = checksum;
        }
        if let Some(length) = def.length {
            grain.length = length;
        }
        grain
    }
}

impl From<Grain> for GrainDef {
    fn from(grain: Grain) -> Self {
        GrainDef {
            name: grain.name,
            version: grain.version,
            dependency_order: grain.dependency_order,
            tables: grain.tables,
            checksum: Some(grain.checksum),
            length: Some(grain.length),
        }
    }
}

#[derive(Serialize)]
struct FingerprintSource<'a> {
    name: &'a str,
    tables: &'a [Table],
}

/// Computes `(checksum, length)` over a grain's name and tables.
///
/// The checksum is the first four bytes (big-endian) of the SHA-256 digest of
/// the canonical JSON rendering; the length is the byte length of that JSON.
pub fn fingerprint(name: &str, tables: &[Table]) -> (u32, u32) {
    let canonical = serde_json::to_vec(&FingerprintSource { name, tables }).unwrap_or_default();
    let digest = Sha256::digest(&canonical);
    let checksum = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    let length = u32::try_from(canonical.len()).unwrap_or(u32::MAX);
    (checksum, length)
}

impl Grain {
    /// Creates a grain and computes its fingerprint from `tables`.
    pub fn new(name: &str, version: VersionString, dependency_order: i32, tables: Vec<Table>) -> Self {
        let (checksum, length) = fingerprint(name, &tables);
        Self {
            name: name.to_string(),
            version,
            dependency_order,
            tables,
            checksum,
            length,
        }
    }

    /// Overrides the computed fingerprint.
    pub fn with_fingerprint(mut self, checksum: u32, length: u32) -> Self {
        self.checksum = checksum;
        self.length = length;
        self
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Every index of the grain with its owning table.
    pub fn indices(&self) -> impl Iterator<Item = (&Table, &Index)> {
        self.tables
            .iter()
            .flat_map(|table| table.indices.iter().map(move |index| (table, index)))
    }

    pub fn index(&self, name: &str) -> Option<(&Table, &Index)> {
        self.indices().find(|(_, index)| index.name == name)
    }

    pub fn is_system(&self) -> bool {
        self.name == SYSTEM_GRAIN
    }
}

/// The full schema model across all grains.
///
/// # Examples
///
/// ```
/// use score_sync_core::{Grain, Score};
///
/// let app = Grain::new("app", "1.0".parse().unwrap(), 10, vec![]);
/// let score = Score::with_system(vec![app]);
///
/// let order: Vec<&str> = score.ordered_grains().iter().map(|g| g.name.as_str()).collect();
/// assert_eq!(order, vec!["celesta", "app"]);
/// assert!(score.system_grain().is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Score {
    pub grains: Vec<Grain>,
}

impl Score {
    /// Creates a score from exactly the given grains.
    pub fn new(grains: Vec<Grain>) -> Self {
        Self { grains }
    }

    /// Creates a score containing the built-in system grain followed by
    /// `grains`. A grain already named like the system grain is kept as is.
    pub fn with_system(grains: Vec<Grain>) -> Self {
        let mut score = Self::new(grains);
        score.ensure_system();
        score
    }

    /// Inserts the built-in system grain when the score has none.
    pub fn ensure_system(&mut self) {
        if self.system_grain().is_none() {
            self.grains.insert(0, system_grain());
        }
    }

    pub fn grain(&self, name: &str) -> Option<&Grain> {
        self.grains.iter().find(|g| g.name == name)
    }

    pub fn system_grain(&self) -> Option<&Grain> {
        self.grain(SYSTEM_GRAIN)
    }

    /// Grains sorted by ascending dependency order. Ties keep declaration
    /// order.
    pub fn ordered_grains(&self) -> Vec<&Grain> {
        let mut grains: Vec<&Grain> = self.grains.iter().collect();
        grains.sort_by_key(|g| g.dependency_order);
        grains
    }
}
