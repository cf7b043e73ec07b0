//! Engine configuration.
//!
//! Selects the database engine and the connection target. Loaded from YAML;
//! an unknown engine name fails while the configuration is parsed, before any
//! connection is attempted.
//!
//! # Example YAML
//!
//! ```yaml
//! engine: sqlite
//! database: app.db
//! score: score.yml
//! ```

use std::fmt;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Supported database engines.
///
/// Every kind has a SQL text dialect; only some have a runtime adaptor.
///
/// # Examples
///
/// ```
/// use score_sync_db::EngineKind;
///
/// let kind: EngineKind = "PostgreSQL".parse().unwrap();
/// assert_eq!(kind, EngineKind::Postgres);
/// assert!("oracle".parse::<EngineKind>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EngineKind {
    Sqlite,
    Postgres,
    Mssql,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Sqlite => "sqlite",
            EngineKind::Postgres => "postgres",
            EngineKind::Mssql => "mssql",
        }
    }
}

impl FromStr for EngineKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(EngineKind::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(EngineKind::Postgres),
            "mssql" | "sqlserver" => Ok(EngineKind::Mssql),
            _ => Err(SyncError::UnsupportedEngine(s.to_string())),
        }
    }
}

impl TryFrom<String> for EngineKind {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<EngineKind> for String {
    fn from(kind: EngineKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection and input settings for a synchronization run.
///
/// # Examples
///
/// ```no_run
/// use score_sync_db::EngineConfig;
///
/// let config = EngineConfig::load("score-sync.yml").unwrap();
/// println!("{} at {}", config.engine, config.database);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Database engine.
    pub engine: EngineKind,
    /// Connection target. For SQLite a file path or `:memory:`.
    pub database: String,
    /// Score file to synchronize against. Relative paths resolve against
    /// the configuration file's directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<PathBuf>,
}

impl EngineConfig {
    pub fn new(engine: EngineKind, database: impl Into<String>) -> Self {
        Self {
            engine,
            database: database.into(),
            score: None,
        }
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](SyncError::IoError) if the file cannot be read, or
    /// [`YamlError`](SyncError::YamlError) if parsing fails (including an
    /// unknown engine name).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let mut config: EngineConfig = serde_yaml::from_reader(reader)?;

        if config.database.trim().is_empty() {
            return Err(SyncError::Config("database must not be empty".into()));
        }
        if let (Some(score), Some(dir)) = (&config.score, path.parent()) {
            if score.is_relative() {
                config.score = Some(dir.join(score));
            }
        }
        Ok(config)
    }

    /// Saves the configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }
}
