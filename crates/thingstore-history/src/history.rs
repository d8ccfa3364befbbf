//! The history engine.
//!
//! [`History`] stores validated values into one bucket per Thing and serves
//! reads either through cached cursors addressed by an opaque key, or as
//! one-shot range reads that open and release their own cursor.

use std::sync::Arc;
use std::time::Duration;

use thingstore_store::Backend;
use thingstore_types::ThingValue;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::cache::{CursorCache, DEFAULT_CURSOR_LIFESPAN};
use crate::codec;
use crate::cursor::HistoryCursor;
use crate::error::Result;
use crate::scan::{DEFAULT_LIMIT, HistoryPage, effective_limit};
use crate::validate::validate;

/// Value history of all Things on top of an injected storage backend.
pub struct History {
    backend: Arc<dyn Backend>,
    cursors: CursorCache,
    cursor_lifespan: Duration,
    default_limit: usize,
}

impl History {
    /// Create an engine over `backend` with default settings.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            cursors: CursorCache::new(),
            cursor_lifespan: DEFAULT_CURSOR_LIFESPAN,
            default_limit: DEFAULT_LIMIT,
        }
    }

    /// Set how long an unused cursor survives.
    #[must_use]
    pub fn with_cursor_lifespan(mut self, lifespan: Duration) -> Self {
        self.cursor_lifespan = lifespan;
        self
    }

    /// Set the batch size used when callers pass `limit <= 0`.
    #[must_use]
    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit.max(1);
        self
    }

    /// The cursor registry, for sweeping and diagnostics.
    pub fn cursors(&self) -> &CursorCache {
        &self.cursors
    }

    /// The storage backend identifier.
    pub fn backend_kind(&self) -> &'static str {
        self.backend.kind()
    }

    // --- Write path ---

    /// Validate, encode and store a value in its Thing's bucket.
    ///
    /// Nothing is written when validation fails.
    pub fn add_value(&self, mut value: ThingValue) -> Result<()> {
        validate(&mut value)?;
        let (key, payload) = codec::encode(&value)?;

        let mut bucket = self.backend.open_bucket(&value.thing_id)?;
        let stored = bucket.set(key.as_bytes(), &payload);
        let closed = bucket.close();
        stored?;
        closed?;

        debug!("Stored {} in {}", key, value.thing_id);
        Ok(())
    }

    /// Number of stored entries for a Thing.
    pub fn count_values(&self, thing_id: &str) -> Result<u64> {
        let bucket = self.backend.open_bucket(thing_id)?;
        let count = bucket.len()?;
        bucket.close()?;
        Ok(count)
    }

    // --- Cursor lifecycle ---

    /// Open a cursor on a Thing's history, owned by `client_id`.
    ///
    /// With a non-empty `affordance_name` the cursor only returns values of
    /// that affordance.
    pub fn create_cursor(
        &self,
        client_id: &str,
        thing_id: &str,
        affordance_name: Option<&str>,
    ) -> Result<String> {
        let bucket = self.backend.open_bucket(thing_id)?;
        let cursor = HistoryCursor::open(bucket, affordance_name)?;
        self.cursors.add(client_id, cursor, self.cursor_lifespan)
    }

    /// Release a cursor. Unknown keys are ignored.
    pub fn release_cursor(&self, client_id: &str, cursor_key: &str) -> Result<()> {
        self.cursors.release(client_id, cursor_key)
    }

    fn with_cursor<T>(
        &self,
        client_id: &str,
        cursor_key: &str,
        op: impl FnOnce(&mut HistoryCursor) -> Result<T>,
    ) -> Result<T> {
        let (shared, _) = self.cursors.get(client_id, cursor_key, true)?;
        let mut cursor = shared.lock()?;
        op(&mut *cursor)
    }

    // --- Cursor reads ---

    /// Oldest matching value.
    pub fn first(&self, client_id: &str, cursor_key: &str) -> Result<Option<ThingValue>> {
        self.with_cursor(client_id, cursor_key, HistoryCursor::first)
    }

    /// Newest matching value.
    pub fn last(&self, client_id: &str, cursor_key: &str) -> Result<Option<ThingValue>> {
        self.with_cursor(client_id, cursor_key, HistoryCursor::last)
    }

    /// Next matching value after the cursor position.
    pub fn next(&self, client_id: &str, cursor_key: &str) -> Result<Option<ThingValue>> {
        self.with_cursor(client_id, cursor_key, HistoryCursor::next)
    }

    /// Previous matching value before the cursor position.
    pub fn prev(&self, client_id: &str, cursor_key: &str) -> Result<Option<ThingValue>> {
        self.with_cursor(client_id, cursor_key, HistoryCursor::prev)
    }

    /// First matching value at or after `timestamp`.
    pub fn seek(
        &self,
        client_id: &str,
        cursor_key: &str,
        timestamp: OffsetDateTime,
    ) -> Result<Option<ThingValue>> {
        self.with_cursor(client_id, cursor_key, |cursor| cursor.seek(timestamp))
    }

    /// Up to `limit` matching values forward, none later than `until`.
    pub fn next_n(
        &self,
        client_id: &str,
        cursor_key: &str,
        until: OffsetDateTime,
        limit: i64,
    ) -> Result<HistoryPage> {
        let limit = effective_limit(limit, self.default_limit);
        self.with_cursor(client_id, cursor_key, |cursor| cursor.next_n(until, limit))
    }

    /// Up to `limit` matching values backward, none earlier than `until`.
    pub fn prev_n(
        &self,
        client_id: &str,
        cursor_key: &str,
        until: OffsetDateTime,
        limit: i64,
    ) -> Result<HistoryPage> {
        let limit = effective_limit(limit, self.default_limit);
        self.with_cursor(client_id, cursor_key, |cursor| cursor.prev_n(until, limit))
    }

    // --- One-shot reads ---

    /// Read a time range without going through the cursor cache.
    ///
    /// Seeks to `timestamp` and includes the value found there, even when it
    /// lies beyond the window. Then reads up to `limit` further values forward
    /// when `duration_secs > 0` or backward otherwise, bounded by
    /// `timestamp + duration_secs`.
    pub fn read_history(
        &self,
        thing_id: &str,
        affordance_name: Option<&str>,
        timestamp: OffsetDateTime,
        duration_secs: i64,
        limit: i64,
    ) -> Result<HistoryPage> {
        let limit = effective_limit(limit, self.default_limit);
        let until = timestamp.saturating_add(time::Duration::seconds(duration_secs));

        let bucket = self.backend.open_bucket(thing_id)?;
        let mut cursor = HistoryCursor::open(bucket, affordance_name)?;

        let page = read_range(&mut cursor, timestamp, until, duration_secs > 0, limit);
        let released = cursor.release();
        let page = page?;
        released?;

        info!(
            "Read {} value(s) of {} from {} over {}s",
            page.values.len(),
            thing_id,
            timestamp,
            duration_secs
        );
        Ok(page)
    }
}

fn read_range(
    cursor: &mut HistoryCursor,
    timestamp: OffsetDateTime,
    until: OffsetDateTime,
    forward: bool,
    limit: usize,
) -> Result<HistoryPage> {
    let first = cursor.seek(timestamp)?;
    let mut page = if forward {
        cursor.next_n(until, limit)?
    } else {
        cursor.prev_n(until, limit)?
    };
    if let Some(value) = first {
        page.values.insert(0, value);
    }
    Ok(page)
}
