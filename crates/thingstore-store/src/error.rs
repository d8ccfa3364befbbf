//! Error types for thingstore-store.

use std::path::PathBuf;

/// Result type for thingstore-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A lock guarding backend state was poisoned by a panicking thread.
    #[error("Backend lock poisoned")]
    LockPoisoned,

    /// The database was written by a newer version of this crate.
    #[error("Database schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema { found: i64, supported: i64 },

    /// The backend selector does not name a known backend.
    #[error("Unknown backend: {0}")]
    UnknownBackend(String),
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Error::LockPoisoned
    }
}
