//! Filtered, time-bounded scanning over a [`HistoryCursor`].
//!
//! Single steps skip entries whose key is malformed, whose payload fails to
//! decode, or whose affordance name does not match the cursor's filter. A step
//! that lands beyond the time boundary is undone before reporting "not found",
//! so the next window still sees that entry.

use serde::{Deserialize, Serialize};
use thingstore_types::ThingValue;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::codec::{self, KeyParts};
use crate::cursor::{Direction, HistoryCursor};
use crate::error::Result;

/// Batch size used when a caller asks for `limit <= 0`.
pub const DEFAULT_LIMIT: usize = 1000;

/// Values returned by a batch read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryPage {
    /// Values in scan order.
    pub values: Vec<ThingValue>,
    /// Whether more matching values lie within the time bound.
    pub items_remaining: bool,
}

/// Resolve a caller-supplied limit.
pub fn effective_limit(limit: i64, default_limit: usize) -> usize {
    if limit <= 0 {
        default_limit
    } else {
        usize::try_from(limit).unwrap_or(usize::MAX)
    }
}

impl HistoryCursor {
    /// Move to the oldest value that passes the filter.
    pub fn first(&mut self) -> Result<Option<ThingValue>> {
        let found = self.first_raw()?;
        self.settle(found, Direction::Forward, OffsetDateTime::now_utc())
    }

    /// Move to the newest value that passes the filter.
    pub fn last(&mut self) -> Result<Option<ThingValue>> {
        let found = self.last_raw()?;
        self.settle(found, Direction::Backward, OffsetDateTime::UNIX_EPOCH)
    }

    /// Move to the first value recorded at or after `timestamp` that passes
    /// the filter.
    pub fn seek(&mut self, timestamp: OffsetDateTime) -> Result<Option<ThingValue>> {
        let key = codec::timestamp_key(timestamp);
        let found = self.seek_raw(key.as_bytes())?;
        self.settle(found, Direction::Forward, OffsetDateTime::now_utc())
    }

    /// Next matching value, not later than now.
    pub fn next(&mut self) -> Result<Option<ThingValue>> {
        self.scan(Direction::Forward, OffsetDateTime::now_utc())
    }

    /// Previous matching value.
    pub fn prev(&mut self) -> Result<Option<ThingValue>> {
        self.scan(Direction::Backward, OffsetDateTime::UNIX_EPOCH)
    }

    /// Read up to `limit` values forward, none later than `until`.
    ///
    /// A `limit` of zero reads up to [`DEFAULT_LIMIT`] values. A page that
    /// drains the bucket leaves the cursor past the last entry, so a following
    /// [`prev`](Self::prev) returns the page's final value again.
    pub fn next_n(&mut self, until: OffsetDateTime, limit: usize) -> Result<HistoryPage> {
        self.read_n(Direction::Forward, until, limit)
    }

    /// Read up to `limit` values backward, none earlier than `until`.
    ///
    /// A `limit` of zero reads up to [`DEFAULT_LIMIT`] values. A page that
    /// drains the bucket leaves the cursor before the first entry, so a
    /// following [`next`](Self::next) returns the page's final value again.
    pub fn prev_n(&mut self, until: OffsetDateTime, limit: usize) -> Result<HistoryPage> {
        self.read_n(Direction::Backward, until, limit)
    }

    /// Accept the entry a positioning call landed on, or keep scanning.
    fn settle(
        &mut self,
        found: Option<(Vec<u8>, Vec<u8>)>,
        direction: Direction,
        until: OffsetDateTime,
    ) -> Result<Option<ThingValue>> {
        let Some((key, payload)) = found else {
            return Ok(None);
        };
        if let Some(value) = self.accept(&key, &payload) {
            return Ok(Some(value));
        }
        self.scan(direction, until)
    }

    /// Step in `direction` until a matching value, exhaustion or the boundary.
    pub(crate) fn scan(
        &mut self,
        direction: Direction,
        until: OffsetDateTime,
    ) -> Result<Option<ThingValue>> {
        let until = codec::unix_millis(until);

        loop {
            let Some((key, payload)) = self.step(direction)? else {
                return Ok(None);
            };

            let Some(parts) = KeyParts::parse(&key) else {
                warn!(
                    "Skipping malformed key {:?} in {}",
                    String::from_utf8_lossy(&key),
                    self.bucket_id()
                );
                continue;
            };

            let crossed = match direction {
                Direction::Forward => parts.millis > until,
                Direction::Backward => parts.millis < until,
            };
            if crossed {
                debug!(
                    "Scan of {} crossed boundary at {}, stepping back",
                    self.bucket_id(),
                    parts.millis
                );
                self.unstep(direction)?;
                return Ok(None);
            }

            if !self.matches(parts.name) {
                continue;
            }
            if let Some(value) = self.accept(&key, &payload) {
                return Ok(Some(value));
            }
        }
    }

    fn read_n(
        &mut self,
        direction: Direction,
        until: OffsetDateTime,
        limit: usize,
    ) -> Result<HistoryPage> {
        let limit = if limit == 0 { DEFAULT_LIMIT } else { limit };
        let mut values = Vec::new();

        while values.len() < limit {
            match self.scan(direction, until)? {
                Some(value) => values.push(value),
                None => {
                    return Ok(HistoryPage {
                        values,
                        items_remaining: false,
                    });
                }
            }
        }

        // Limit reached: look one value ahead so an exactly drained window
        // reports no remaining items, then put the look-ahead back.
        let items_remaining = self.scan(direction, until)?.is_some();
        if items_remaining {
            self.unstep(direction)?;
        }

        Ok(HistoryPage {
            values,
            items_remaining,
        })
    }
}
