//! Decode-aware cursor over one Thing's bucket.

use thingstore_store::{Bucket, BucketCursor, KeyValue};
use thingstore_types::ThingValue;
use tracing::{debug, warn};

use crate::codec::{self, KeyParts};
use crate::error::Result;

/// Iteration direction of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards newer entries.
    Forward,
    /// Towards older entries.
    Backward,
}

/// An ordered position in a Thing's history.
///
/// Wraps a backend cursor and keeps the bucket handle open for as long as the
/// cursor lives. An optional affordance-name filter restricts which entries
/// the filtered operations return.
pub struct HistoryCursor {
    bucket_id: String,
    filter: Option<String>,
    inner: Box<dyn BucketCursor>,
    bucket: Option<Box<dyn Bucket>>,
}

impl std::fmt::Debug for HistoryCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryCursor")
            .field("bucket_id", &self.bucket_id)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

impl HistoryCursor {
    /// Open a cursor on `bucket`, taking ownership of the handle.
    ///
    /// An empty filter name matches every affordance.
    pub fn open(bucket: Box<dyn Bucket>, filter: Option<&str>) -> Result<Self> {
        let inner = bucket.cursor()?;
        Ok(Self {
            bucket_id: bucket.id().to_string(),
            filter: filter.filter(|name| !name.is_empty()).map(str::to_string),
            inner,
            bucket: Some(bucket),
        })
    }

    /// ID of the Thing whose history this cursor walks.
    pub fn bucket_id(&self) -> &str {
        &self.bucket_id
    }

    /// The affordance-name filter, if any.
    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    // --- Raw positioning ---

    /// Move to the oldest entry.
    pub fn first_raw(&mut self) -> Result<Option<KeyValue>> {
        Ok(self.inner.first()?)
    }

    /// Move to the newest entry.
    pub fn last_raw(&mut self) -> Result<Option<KeyValue>> {
        Ok(self.inner.last()?)
    }

    /// Step one entry towards newer values.
    pub fn next_raw(&mut self) -> Result<Option<KeyValue>> {
        Ok(self.inner.next()?)
    }

    /// Step one entry towards older values.
    pub fn prev_raw(&mut self) -> Result<Option<KeyValue>> {
        Ok(self.inner.prev()?)
    }

    /// Move to the first entry whose key is at or after `key`.
    pub fn seek_raw(&mut self, key: &[u8]) -> Result<Option<KeyValue>> {
        Ok(self.inner.seek(key)?)
    }

    pub(crate) fn step(&mut self, direction: Direction) -> Result<Option<KeyValue>> {
        match direction {
            Direction::Forward => self.next_raw(),
            Direction::Backward => self.prev_raw(),
        }
    }

    /// Step back against `direction`, undoing one step.
    pub(crate) fn unstep(&mut self, direction: Direction) -> Result<()> {
        match direction {
            Direction::Forward => self.prev_raw()?,
            Direction::Backward => self.next_raw()?,
        };
        Ok(())
    }

    // --- Decoding ---

    /// Decode an entry if it is well-formed and passes the filter.
    ///
    /// Corrupt entries are logged and yield `None`; they never fail the scan.
    pub(crate) fn accept(&self, key: &[u8], payload: &[u8]) -> Option<ThingValue> {
        let Some(parts) = KeyParts::parse(key) else {
            warn!(
                "Skipping malformed key {:?} in {}",
                String::from_utf8_lossy(key),
                self.bucket_id
            );
            return None;
        };
        if !self.matches(parts.name) {
            return None;
        }
        match codec::decode(&self.bucket_id, key, payload) {
            Ok(Some(value)) => Some(value),
            Ok(None) => {
                warn!(
                    "Skipping undecodable key {:?} in {}",
                    String::from_utf8_lossy(key),
                    self.bucket_id
                );
                None
            }
            Err(e) => {
                warn!("Skipping corrupt entry in {}: {}", self.bucket_id, e);
                None
            }
        }
    }

    pub(crate) fn matches(&self, name: &str) -> bool {
        self.filter.as_deref().is_none_or(|filter| filter == name)
    }

    /// Release the backend cursor and close the bucket.
    pub fn release(self) -> Result<()> {
        let Self {
            bucket_id,
            inner,
            bucket,
            ..
        } = self;
        debug!("Releasing cursor on {}", bucket_id);
        inner.release();
        if let Some(bucket) = bucket {
            bucket.close()?;
        }
        Ok(())
    }
}
