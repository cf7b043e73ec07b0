//! Error types for schema synchronization.
//!
//! Errors fall into two tiers. Critical errors are unrecoverable
//! preconditions that abort the whole run. Recoverable errors come from a
//! single grain's reconciliation: the engine records them in that grain's
//! bookkeeping row and moves on to the next grain.

use score_sync_core::{GRAINS_TABLE, SYSTEM_GRAIN, ValidationError};
use thiserror::Error;

use crate::updater::SyncReport;

/// Boxed native driver error carried by [`SyncError::Structural`].
pub type NativeError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while synchronizing a database with a score.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The configured engine kind has no runtime adaptor.
    #[error("unsupported database engine: {0}")]
    UnsupportedEngine(String),

    /// The bookkeeping table is missing but the database is not empty.
    #[error("No {schema}.{table} table found in non-empty database.")]
    ForeignDatabase { schema: String, table: String },

    /// The score lacks the built-in system grain.
    #[error("No '{0}' grain definition found.")]
    MissingSystemGrain(String),

    /// A bookkeeping row is in a state other than ready, recover or lock.
    #[error(
        "Cannot proceed with database upgrade: grain '{grain}' is in state {status}, \
         expected ready, recover or lock."
    )]
    UnexpectedStatus { grain: String, status: String },

    #[error(
        "Grain '{grain}' version '{model}' is lower than database grain version '{stored}'. \
         Will not proceed with auto-upgrade."
    )]
    VersionLower {
        grain: String,
        model: String,
        stored: String,
    },

    #[error(
        "Grain '{grain}' version '{model}' is inconsistent with database grain version \
         '{stored}'. Will not proceed with auto-upgrade."
    )]
    VersionInconsistent {
        grain: String,
        model: String,
        stored: String,
    },

    /// The bookkeeping rows could not be read or written.
    #[error("Error while scanning bookkeeping table: {0}")]
    Bookkeeping(String),

    /// The score failed validation.
    #[error("invalid score: {}", join_errors(.0))]
    InvalidScore(Vec<ValidationError>),

    /// A native database failure, with the object it happened on.
    #[error("{context}: {source}")]
    Structural {
        context: String,
        #[source]
        source: NativeError,
    },

    /// The caller misused the API (wrong argument count, mask length, ...).
    #[error("{0}")]
    Usage(String),

    /// A stored value could not be converted to the column type.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// One or more grains failed to upgrade.
    #[error(
        "Not all grains were updated successfully, see {}.{} table data for details.",
        SYSTEM_GRAIN,
        GRAINS_TABLE
    )]
    RunFailed(SyncReport),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl SyncError {
    /// Wraps a native error with the object it concerns.
    pub fn structural(context: impl Into<String>, source: impl Into<NativeError>) -> Self {
        SyncError::Structural {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        SyncError::Usage(message.into())
    }

    /// Returns `true` for errors that abort a whole run.
    ///
    /// ```
    /// use score_sync_db::SyncError;
    ///
    /// assert!(SyncError::UnsupportedEngine("oracle".into()).is_critical());
    /// assert!(!SyncError::usage("bad mask").is_critical());
    /// ```
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            SyncError::UnsupportedEngine(_)
                | SyncError::ForeignDatabase { .. }
                | SyncError::MissingSystemGrain(_)
                | SyncError::UnexpectedStatus { .. }
                | SyncError::VersionLower { .. }
                | SyncError::VersionInconsistent { .. }
                | SyncError::Bookkeeping(_)
                | SyncError::InvalidScore(_)
        )
    }
}

/// Convenience alias for results with [`SyncError`].
pub type Result<T> = std::result::Result<T, SyncError>;
