//! Ordered bucket storage backends for thingstore history.
//!
//! This crate defines the minimal contract the history engine consumes from
//! a sorted key-value store ([`Backend`], [`Bucket`], [`BucketCursor`]) and
//! ships two implementations:
//!
//! - [`MemoryBackend`]: `BTreeMap` per bucket, nothing persisted
//! - [`SqliteBackend`]: one SQLite table ordered by `(bucket, key)`
//!
//! Hosting code selects a backend by its string identifier with
//! [`open_backend`]; the engine itself never names a concrete backend.
//!
//! # Example
//!
//! ```
//! use thingstore_store::{Backend, MemoryBackend};
//!
//! let backend = MemoryBackend::new();
//! let mut bucket = backend.open_bucket("thing-1")?;
//! bucket.set(b"key", b"value")?;
//!
//! let mut cursor = bucket.cursor()?;
//! let (key, _) = cursor.first()?.unwrap();
//! assert_eq!(key, b"key");
//! # Ok::<(), thingstore_store::Error>(())
//! ```

mod backend;
mod error;
mod memory;
mod schema;
mod sqlite;

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

pub use backend::{Backend, Bucket, BucketCursor, KeyValue};
pub use error::{Error, Result};
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

/// Known backend identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// [`MemoryBackend`].
    Memory,
    /// [`SqliteBackend`].
    Sqlite,
}

impl BackendKind {
    /// The identifier used in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Sqlite => "sqlite",
        }
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "memory" => Ok(BackendKind::Memory),
            "sqlite" => Ok(BackendKind::Sqlite),
            other => Err(Error::UnknownBackend(other.to_string())),
        }
    }
}

/// Open the backend named by `kind`.
///
/// `path` is the database file for persistent backends and ignored otherwise.
pub fn open_backend(kind: &str, path: &Path) -> Result<Arc<dyn Backend>> {
    match kind.parse()? {
        BackendKind::Memory => Ok(Arc::new(MemoryBackend::new())),
        BackendKind::Sqlite => Ok(Arc::new(SqliteBackend::open(path)?)),
    }
}

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/thingstore/history.db`
/// - macOS: `~/Library/Application Support/thingstore/history.db`
/// - Windows: `C:\Users\<user>\AppData\Local\thingstore\history.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("thingstore")
        .join("history.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert_eq!("sqlite".parse::<BackendKind>().unwrap(), BackendKind::Sqlite);
        assert!(matches!(
            "bbolt".parse::<BackendKind>(),
            Err(Error::UnknownBackend(name)) if name == "bbolt"
        ));
        assert_eq!(BackendKind::Sqlite.as_str(), "sqlite");
    }

    #[test]
    fn test_open_backend_by_name() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("history.db");

        let memory = open_backend("memory", &path).unwrap();
        assert_eq!(memory.kind(), "memory");
        assert!(!path.exists());

        let sqlite = open_backend("sqlite", &path).unwrap();
        assert_eq!(sqlite.kind(), "sqlite");
        assert!(path.exists());

        assert!(open_backend("pebble", &path).is_err());
    }

    #[test]
    fn test_default_db_path() {
        assert!(default_db_path().ends_with("thingstore/history.db"));
    }
}
