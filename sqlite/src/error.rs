//! Conversion of native SQLite failures into [`SyncError`].
//!
//! Every `rusqlite::Error` leaves this crate as [`SyncError::Structural`],
//! carrying the object the failing call was about.

use score_sync_db::{Result, SyncError};

/// Attaches context to a `rusqlite` result.
pub(crate) trait StructuralExt<T> {
    fn structural<F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> StructuralExt<T> for rusqlite::Result<T> {
    fn structural<F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|err| SyncError::structural(context(), err))
    }
}
