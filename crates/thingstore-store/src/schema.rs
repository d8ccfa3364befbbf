//! Versioned table layout of the SQLite backend.
//!
//! The version lives in SQLite's `user_version` header field. Each entry of
//! [`MIGRATIONS`] moves the layout up one version and runs in its own
//! transaction, so an interrupted upgrade leaves the previous version intact.

use rusqlite::Connection;
use tracing::info;

use crate::error::{Error, Result};

/// Layout changes, applied in order. Entry `n` upgrades version `n` to `n + 1`.
///
/// Keys are BLOBs so SQLite compares them with `memcmp`, the same byte-wise
/// order the in-memory backend uses.
const MIGRATIONS: &[&str] = &[r#"
    CREATE TABLE buckets (
        id TEXT PRIMARY KEY,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE entries (
        bucket TEXT NOT NULL REFERENCES buckets(id),
        key BLOB NOT NULL,
        value BLOB NOT NULL,
        PRIMARY KEY (bucket, key)
    ) WITHOUT ROWID;
"#];

/// Version a fully migrated database reports.
pub const SCHEMA_VERSION: i64 = MIGRATIONS.len() as i64;

/// Bring the database layout up to [`SCHEMA_VERSION`].
pub fn initialize(conn: &Connection) -> Result<()> {
    let found = user_version(conn)?;
    if found > SCHEMA_VERSION {
        return Err(Error::UnsupportedSchema {
            found,
            supported: SCHEMA_VERSION,
        });
    }

    for (version, migration) in MIGRATIONS.iter().enumerate().skip(found as usize) {
        let target = version as i64 + 1;
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration)?;
        tx.pragma_update(None, "user_version", target)?;
        tx.commit()?;
        info!("Migrated history database to schema version {}", target);
    }

    Ok(())
}

fn user_version(conn: &Connection) -> Result<i64> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_fresh_database_gets_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        assert_eq!(table_names(&conn), vec!["buckets", "entries"]);
        assert_eq!(user_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(user_version(&conn).unwrap(), 0);

        initialize(&conn).unwrap();
        initialize(&conn).unwrap();
        assert_eq!(user_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_newer_database_is_refused() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .unwrap();

        let err = initialize(&conn).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedSchema { found, .. } if found == SCHEMA_VERSION + 1
        ));
    }
}
