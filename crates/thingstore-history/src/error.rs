//! Error types for thingstore-history.

use crate::validate::ValidationError;

/// Result type for thingstore-history operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the history engine.
///
/// From a remote caller's point of view [`Error::CursorNotFound`] and
/// [`Error::NotAuthorized`] must look the same; see [`Error::is_unknown_cursor`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The value was rejected before anything was written.
    #[error("Invalid value: {0}")]
    Validation(#[from] ValidationError),

    /// The cursor key is unknown or its cursor has expired.
    #[error("Cursor not found: {0}")]
    CursorNotFound(String),

    /// The cursor exists but belongs to another client.
    #[error("Cursor {0} is not owned by the caller")]
    NotAuthorized(String),

    /// A storage key carries an affordance tag other than `p`, `e` or `a`.
    #[error("Unknown affordance tag in key {0}")]
    UnknownAffordanceTag(String),

    /// A stored payload could not be deserialized.
    #[error("Failed to decode payload of {key}: {source}")]
    Decode {
        key: String,
        source: serde_json::Error,
    },

    /// A payload could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A lock guarding engine state was poisoned by a panicking thread.
    #[error("History lock poisoned")]
    LockPoisoned,

    /// Error from the storage backend.
    #[error("Storage error: {0}")]
    Store(#[from] thingstore_store::Error),
}

impl Error {
    /// Whether the error means "this cursor key cannot be used by the caller".
    ///
    /// Transport layers should report both cases identically so a client can
    /// not probe for other clients' cursors.
    pub fn is_unknown_cursor(&self) -> bool {
        matches!(self, Error::CursorNotFound(_) | Error::NotAuthorized(_))
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Error::LockPoisoned
    }
}
