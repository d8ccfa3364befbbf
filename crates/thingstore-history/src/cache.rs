//! Registry of server-side cursors for remote, stateless callers.
//!
//! Remote clients cannot hold a [`HistoryCursor`] themselves, so the engine
//! keeps it here under an opaque key. Every access checks that the caller is
//! the client that created the cursor and pushes its expiry forward; cursors
//! nobody touches for their lifespan are discarded, either lazily on the next
//! access or by [`CursorCache::sweep_expired`].
//!
//! A client issuing overlapping calls on one key is serialized by the
//! per-cursor mutex but gets no ordering guarantee between those calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cursor::HistoryCursor;
use crate::error::{Error, Result};

/// Default cursor lifespan without activity.
pub const DEFAULT_CURSOR_LIFESPAN: Duration = Duration::from_secs(60);

/// Shared handle to a cached cursor.
pub type SharedCursor = Arc<Mutex<HistoryCursor>>;

struct CursorEntry {
    owner: String,
    bucket_id: String,
    lifespan: Duration,
    expires_at: Instant,
    cursor: SharedCursor,
}

impl CursorEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Public view of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorInfo {
    /// The opaque cursor key.
    pub key: String,
    /// Thing whose history the cursor walks.
    pub bucket_id: String,
    /// When the cursor expires unless used again.
    pub expires_at: Instant,
}

/// Process-wide map from cursor key to cursor, owner and expiry.
#[derive(Default)]
pub struct CursorCache {
    entries: Mutex<HashMap<String, CursorEntry>>,
}

impl CursorCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cursor owned by `owner` and return its key.
    pub fn add(&self, owner: &str, cursor: HistoryCursor, lifespan: Duration) -> Result<String> {
        let key = Uuid::new_v4().simple().to_string();
        let bucket_id = cursor.bucket_id().to_string();

        let entry = CursorEntry {
            owner: owner.to_string(),
            bucket_id: bucket_id.clone(),
            lifespan,
            expires_at: Instant::now() + lifespan,
            cursor: Arc::new(Mutex::new(cursor)),
        };
        self.entries.lock()?.insert(key.clone(), entry);

        info!(
            "Created cursor {} on {} for {} (lifespan {:?})",
            key, bucket_id, owner, lifespan
        );
        Ok(key)
    }

    /// Look up a cursor for `owner`.
    ///
    /// With `refresh` set, a successful lookup restarts the cursor's lifespan.
    pub fn get(&self, owner: &str, key: &str, refresh: bool) -> Result<(SharedCursor, CursorInfo)> {
        let now = Instant::now();
        let mut entries = self.entries.lock()?;

        let expired = match entries.get(key) {
            None => return Err(Error::CursorNotFound(key.to_string())),
            Some(entry) => entry.is_expired(now),
        };
        if expired {
            if let Some(entry) = entries.remove(key) {
                drop(entries);
                debug!("Cursor {} expired", key);
                release_entry(key, entry);
            }
            return Err(Error::CursorNotFound(key.to_string()));
        }

        let Some(entry) = entries.get_mut(key) else {
            return Err(Error::CursorNotFound(key.to_string()));
        };
        if entry.owner != owner {
            warn!("Client {} tried to use cursor {} of another client", owner, key);
            return Err(Error::NotAuthorized(key.to_string()));
        }
        if refresh {
            entry.expires_at = now + entry.lifespan;
        }

        Ok((
            Arc::clone(&entry.cursor),
            CursorInfo {
                key: key.to_string(),
                bucket_id: entry.bucket_id.clone(),
                expires_at: entry.expires_at,
            },
        ))
    }

    /// Release a cursor owned by `owner`.
    ///
    /// Releasing an unknown or already expired key succeeds.
    pub fn release(&self, owner: &str, key: &str) -> Result<()> {
        let mut entries = self.entries.lock()?;
        match entries.get(key) {
            None => {
                debug!("Release of unknown cursor {}", key);
                return Ok(());
            }
            Some(entry) if entry.owner != owner => {
                warn!(
                    "Client {} tried to release cursor {} of another client",
                    owner, key
                );
                return Err(Error::NotAuthorized(key.to_string()));
            }
            Some(_) => {}
        }

        if let Some(entry) = entries.remove(key) {
            drop(entries);
            info!("Released cursor {} on {}", key, entry.bucket_id);
            release_entry(key, entry);
        }
        Ok(())
    }

    /// Discard every expired cursor and return how many were removed.
    pub fn sweep_expired(&self) -> Result<usize> {
        let now = Instant::now();
        let expired: Vec<(String, CursorEntry)> = {
            let mut entries = self.entries.lock()?;
            let keys: Vec<String> = entries
                .iter()
                .filter(|(_, entry)| entry.is_expired(now))
                .map(|(key, _)| key.clone())
                .collect();
            keys.into_iter()
                .filter_map(|key| entries.remove(&key).map(|entry| (key, entry)))
                .collect()
        };

        let count = expired.len();
        for (key, entry) in expired {
            release_entry(&key, entry);
        }
        if count > 0 {
            info!("Swept {} expired cursor(s)", count);
        }
        Ok(count)
    }

    /// Number of cursors held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or_default()
    }

    /// Whether the cache holds no cursors.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Return backend resources of a removed entry.
///
/// If a call is still using the cursor, its resources go when that call drops
/// the last handle.
fn release_entry(key: &str, entry: CursorEntry) {
    match Arc::try_unwrap(entry.cursor) {
        Ok(cursor) => {
            let result = cursor
                .into_inner()
                .map_err(Error::from)
                .and_then(HistoryCursor::release);
            if let Err(e) = result {
                warn!("Failed to release cursor {}: {}", key, e);
            }
        }
        Err(_) => debug!("Cursor {} still in use, dropping on last handle", key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thingstore_store::{Backend, MemoryBackend};

    fn cursor(backend: &MemoryBackend) -> HistoryCursor {
        HistoryCursor::open(backend.open_bucket("thing-1").unwrap(), None).unwrap()
    }

    #[test]
    fn test_add_and_get() {
        let backend = MemoryBackend::new();
        let cache = CursorCache::new();
        let key = cache.add("client-1", cursor(&backend), DEFAULT_CURSOR_LIFESPAN).unwrap();

        let (shared, info) = cache.get("client-1", &key, false).unwrap();
        assert_eq!(info.key, key);
        assert_eq!(info.bucket_id, "thing-1");
        assert_eq!(shared.lock().unwrap().bucket_id(), "thing-1");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_keys_are_unique() {
        let backend = MemoryBackend::new();
        let cache = CursorCache::new();
        let a = cache.add("c", cursor(&backend), DEFAULT_CURSOR_LIFESPAN).unwrap();
        let b = cache.add("c", cursor(&backend), DEFAULT_CURSOR_LIFESPAN).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_unknown_key() {
        let cache = CursorCache::new();
        assert!(matches!(
            cache.get("client-1", "nope", true),
            Err(Error::CursorNotFound(_))
        ));
    }

    #[test]
    fn test_other_owner_rejected() {
        let backend = MemoryBackend::new();
        let cache = CursorCache::new();
        let key = cache.add("client-1", cursor(&backend), DEFAULT_CURSOR_LIFESPAN).unwrap();

        let err = cache.get("client-2", &key, true).unwrap_err();
        assert!(matches!(err, Error::NotAuthorized(_)));
        assert!(err.is_unknown_cursor());

        assert!(matches!(
            cache.release("client-2", &key),
            Err(Error::NotAuthorized(_))
        ));
        // Still usable by its owner
        assert!(cache.get("client-1", &key, true).is_ok());
    }

    #[test]
    fn test_expiry_without_activity() {
        let backend = MemoryBackend::new();
        let cache = CursorCache::new();
        let key = cache
            .add("client-1", cursor(&backend), Duration::from_millis(20))
            .unwrap();

        std::thread::sleep(Duration::from_millis(40));
        assert!(matches!(
            cache.get("client-1", &key, true),
            Err(Error::CursorNotFound(_))
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_refresh_extends_lifespan() {
        let backend = MemoryBackend::new();
        let cache = CursorCache::new();
        let key = cache
            .add("client-1", cursor(&backend), Duration::from_millis(200))
            .unwrap();

        let (_, before) = cache.get("client-1", &key, false).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let (_, after) = cache.get("client-1", &key, true).unwrap();
        assert!(after.expires_at > before.expires_at);

        let (_, unchanged) = cache.get("client-1", &key, false).unwrap();
        assert_eq!(unchanged.expires_at, after.expires_at);
    }

    #[test]
    fn test_release_is_idempotent() {
        let backend = MemoryBackend::new();
        let cache = CursorCache::new();
        let key = cache.add("client-1", cursor(&backend), DEFAULT_CURSOR_LIFESPAN).unwrap();

        cache.release("client-1", &key).unwrap();
        cache.release("client-1", &key).unwrap();
        assert!(cache.get("client-1", &key, true).is_err());
    }

    #[test]
    fn test_release_while_in_use() {
        let backend = MemoryBackend::new();
        let cache = CursorCache::new();
        let key = cache.add("client-1", cursor(&backend), DEFAULT_CURSOR_LIFESPAN).unwrap();

        let (held, _) = cache.get("client-1", &key, true).unwrap();
        cache.release("client-1", &key).unwrap();
        assert!(cache.is_empty());
        // The in-flight handle stays valid until dropped
        assert_eq!(held.lock().unwrap().bucket_id(), "thing-1");
    }

    #[test]
    fn test_sweep_expired() {
        let backend = MemoryBackend::new();
        let cache = CursorCache::new();
        cache
            .add("client-1", cursor(&backend), Duration::from_millis(10))
            .unwrap();
        let keep = cache.add("client-1", cursor(&backend), DEFAULT_CURSOR_LIFESPAN).unwrap();

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.sweep_expired().unwrap(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("client-1", &keep, false).is_ok());
        assert_eq!(cache.sweep_expired().unwrap(), 0);
    }
}
