//! The bucket backend contract.
//!
//! A [`Backend`] is an ordered byte-key to byte-value store partitioned into
//! named buckets. The history engine only ever talks to these traits; concrete
//! backends are chosen by the hosting module and injected.
//!
//! Cursors are positional: after a step returns nothing the cursor sits
//! before the first or after the last entry, so stepping the other way returns
//! the boundary entry again. A cursor that was never positioned behaves as if
//! it sat before the first entry for [`BucketCursor::next`] and after the last
//! entry for [`BucketCursor::prev`].

use std::ops::Bound;

use crate::error::Result;

/// A key and its stored value.
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// Ordered storage partitioned into buckets.
pub trait Backend: Send + Sync {
    /// Identifier of this backend kind (e.g. `"memory"`, `"sqlite"`).
    fn kind(&self) -> &'static str;

    /// Open a bucket, creating it if it does not exist yet.
    fn open_bucket(&self, bucket_id: &str) -> Result<Box<dyn Bucket>>;
}

/// A handle to one bucket's ordered keyspace.
pub trait Bucket: Send {
    /// The bucket identifier.
    fn id(&self) -> &str;

    /// Read the value stored at `key`.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Store `value` at `key`, replacing any existing value.
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove `key`. Removing a missing key is not an error.
    fn delete(&mut self, key: &[u8]) -> Result<()>;

    /// Number of entries in the bucket.
    fn len(&self) -> Result<u64>;

    /// Whether the bucket holds no entries.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Create an unpositioned cursor over this bucket.
    ///
    /// The cursor keeps its own handle on the bucket and stays usable after
    /// this bucket handle is closed.
    fn cursor(&self) -> Result<Box<dyn BucketCursor>>;

    /// Close the bucket handle.
    fn close(self: Box<Self>) -> Result<()>;
}

/// An ordered position within a bucket.
///
/// Every positioning call returns `Ok(None)` when no entry qualifies;
/// running off either end is not an error.
pub trait BucketCursor: Send {
    /// The bucket this cursor iterates.
    fn bucket_id(&self) -> &str;

    /// Move to the smallest key.
    fn first(&mut self) -> Result<Option<KeyValue>>;

    /// Move to the largest key.
    fn last(&mut self) -> Result<Option<KeyValue>>;

    /// Step forward one entry.
    fn next(&mut self) -> Result<Option<KeyValue>>;

    /// Step backward one entry.
    fn prev(&mut self) -> Result<Option<KeyValue>>;

    /// Move to the first key that is greater than or equal to `key`.
    fn seek(&mut self, key: &[u8]) -> Result<Option<KeyValue>>;

    /// Return backend resources held by the cursor.
    fn release(self: Box<Self>);
}

/// Where a [`Positioned`] cursor currently sits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) enum Position {
    #[default]
    Unpositioned,
    BeforeFirst,
    At(Vec<u8>),
    AfterLast,
}

/// Point lookups a backend provides so [`Positioned`] can implement a cursor.
pub(crate) trait OrderedScan: Send {
    fn bucket_id(&self) -> &str;

    /// Smallest entry whose key lies above the lower bound.
    fn ceiling(&self, lower: Bound<&[u8]>) -> Result<Option<KeyValue>>;

    /// Largest entry whose key lies below the upper bound.
    fn floor(&self, upper: Bound<&[u8]>) -> Result<Option<KeyValue>>;
}

/// A [`BucketCursor`] built from ceiling/floor lookups.
///
/// The position is remembered as the current key, so concurrent writes to the
/// bucket never invalidate the cursor.
pub(crate) struct Positioned<S> {
    scan: S,
    position: Position,
}

impl<S: OrderedScan> Positioned<S> {
    pub(crate) fn new(scan: S) -> Self {
        Self {
            scan,
            position: Position::Unpositioned,
        }
    }

    fn land(&mut self, found: Option<KeyValue>, empty: Position) -> Option<KeyValue> {
        self.position = match &found {
            Some((key, _)) => Position::At(key.clone()),
            None => empty,
        };
        found
    }
}

impl<S: OrderedScan + 'static> BucketCursor for Positioned<S> {
    fn bucket_id(&self) -> &str {
        self.scan.bucket_id()
    }

    fn first(&mut self) -> Result<Option<KeyValue>> {
        let found = self.scan.ceiling(Bound::Unbounded)?;
        Ok(self.land(found, Position::AfterLast))
    }

    fn last(&mut self) -> Result<Option<KeyValue>> {
        let found = self.scan.floor(Bound::Unbounded)?;
        Ok(self.land(found, Position::BeforeFirst))
    }

    fn next(&mut self) -> Result<Option<KeyValue>> {
        let found = match &self.position {
            Position::Unpositioned | Position::BeforeFirst => self.scan.ceiling(Bound::Unbounded)?,
            Position::At(key) => self.scan.ceiling(Bound::Excluded(key.as_slice()))?,
            Position::AfterLast => None,
        };
        Ok(self.land(found, Position::AfterLast))
    }

    fn prev(&mut self) -> Result<Option<KeyValue>> {
        let found = match &self.position {
            Position::Unpositioned | Position::AfterLast => self.scan.floor(Bound::Unbounded)?,
            Position::At(key) => self.scan.floor(Bound::Excluded(key.as_slice()))?,
            Position::BeforeFirst => None,
        };
        Ok(self.land(found, Position::BeforeFirst))
    }

    fn seek(&mut self, key: &[u8]) -> Result<Option<KeyValue>> {
        let found = self.scan.ceiling(Bound::Included(key))?;
        Ok(self.land(found, Position::AfterLast))
    }

    fn release(self: Box<Self>) {}
}
