//! SQLite-backed ordered backend.
//!
//! All buckets share one `entries` table keyed by `(bucket, key)`. Cursor steps
//! are single-row range queries against the primary key, so a cursor holds no
//! statement open between calls.

use std::ops::Bound;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::backend::{Backend, Bucket, BucketCursor, KeyValue, OrderedScan, Positioned};
use crate::error::{Error, Result};
use crate::schema;

type SharedConnection = Arc<Mutex<Connection>>;

/// Backend storing every bucket in a single SQLite database.
pub struct SqliteBackend {
    conn: SharedConnection,
}

impl SqliteBackend {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening history database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl Backend for SqliteBackend {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    fn open_bucket(&self, bucket_id: &str) -> Result<Box<dyn Bucket>> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();

        let created = self.conn.lock()?.execute(
            "INSERT OR IGNORE INTO buckets (id, created_at) VALUES (?1, ?2)",
            rusqlite::params![bucket_id, now],
        )?;
        if created > 0 {
            debug!("Created sqlite bucket {}", bucket_id);
        }

        Ok(Box::new(SqliteBucket {
            id: bucket_id.to_string(),
            conn: Arc::clone(&self.conn),
        }))
    }
}

struct SqliteBucket {
    id: String,
    conn: SharedConnection,
}

impl Bucket for SqliteBucket {
    fn id(&self) -> &str {
        &self.id
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM entries WHERE bucket = ?1 AND key = ?2",
                rusqlite::params![self.id, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.conn.lock()?.execute(
            "INSERT OR REPLACE INTO entries (bucket, key, value) VALUES (?1, ?2, ?3)",
            rusqlite::params![self.id, key, value],
        )?;
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.conn.lock()?.execute(
            "DELETE FROM entries WHERE bucket = ?1 AND key = ?2",
            rusqlite::params![self.id, key],
        )?;
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        let count: i64 = self.conn.lock()?.query_row(
            "SELECT COUNT(*) FROM entries WHERE bucket = ?1",
            [&self.id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn cursor(&self) -> Result<Box<dyn BucketCursor>> {
        Ok(Box::new(Positioned::new(SqliteScan {
            id: self.id.clone(),
            conn: Arc::clone(&self.conn),
        })))
    }

    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

struct SqliteScan {
    id: String,
    conn: SharedConnection,
}

impl SqliteScan {
    fn query_one(&self, sql: &str, key: Option<&[u8]>) -> Result<Option<KeyValue>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare_cached(sql)?;
        let found = match key {
            Some(key) => stmt
                .query_row(rusqlite::params![self.id, key], row_to_entry)
                .optional()?,
            None => stmt.query_row([&self.id], row_to_entry).optional()?,
        };
        Ok(found)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<KeyValue> {
    Ok((row.get(0)?, row.get(1)?))
}

impl OrderedScan for SqliteScan {
    fn bucket_id(&self) -> &str {
        &self.id
    }

    fn ceiling(&self, lower: Bound<&[u8]>) -> Result<Option<KeyValue>> {
        match lower {
            Bound::Unbounded => self.query_one(
                "SELECT key, value FROM entries WHERE bucket = ?1 ORDER BY key ASC LIMIT 1",
                None,
            ),
            Bound::Included(key) => self.query_one(
                "SELECT key, value FROM entries WHERE bucket = ?1 AND key >= ?2
                 ORDER BY key ASC LIMIT 1",
                Some(key),
            ),
            Bound::Excluded(key) => self.query_one(
                "SELECT key, value FROM entries WHERE bucket = ?1 AND key > ?2
                 ORDER BY key ASC LIMIT 1",
                Some(key),
            ),
        }
    }

    fn floor(&self, upper: Bound<&[u8]>) -> Result<Option<KeyValue>> {
        match upper {
            Bound::Unbounded => self.query_one(
                "SELECT key, value FROM entries WHERE bucket = ?1 ORDER BY key DESC LIMIT 1",
                None,
            ),
            Bound::Included(key) => self.query_one(
                "SELECT key, value FROM entries WHERE bucket = ?1 AND key <= ?2
                 ORDER BY key DESC LIMIT 1",
                Some(key),
            ),
            Bound::Excluded(key) => self.query_one(
                "SELECT key, value FROM entries WHERE bucket = ?1 AND key < ?2
                 ORDER BY key DESC LIMIT 1",
                Some(key),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::conformance;

    #[test]
    fn test_sqlite_backend_conformance() {
        conformance::run_all(|| Box::new(SqliteBackend::open_in_memory().unwrap()));
    }

    #[test]
    fn test_data_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("history.db");

        {
            let backend = SqliteBackend::open(&path).unwrap();
            let mut bucket = backend.open_bucket("thing-1").unwrap();
            bucket.set(b"0001/temp/p/agent", b"21.5").unwrap();
            bucket.close().unwrap();
        }

        let backend = SqliteBackend::open(&path).unwrap();
        let bucket = backend.open_bucket("thing-1").unwrap();
        assert_eq!(
            bucket.get(b"0001/temp/p/agent").unwrap(),
            Some(b"21.5".to_vec())
        );
        assert_eq!(backend.kind(), "sqlite");
    }

    #[test]
    fn test_keys_order_bytewise() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let mut bucket = backend.open_bucket("thing-1").unwrap();
        // "B" (0x42) sorts before "a" (0x61) under memcmp, unlike NOCASE collation
        bucket.set(b"a", b"1").unwrap();
        bucket.set(b"B", b"2").unwrap();

        let mut cursor = bucket.cursor().unwrap();
        assert_eq!(cursor.first().unwrap().unwrap().0, b"B".to_vec());
    }
}
