//! In-memory ordered backend.
//!
//! Each bucket is a `BTreeMap` shared between the bucket handle and any open
//! cursors. Nothing is persisted; intended for tests and ephemeral hubs.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;

use crate::backend::{Backend, Bucket, BucketCursor, KeyValue, OrderedScan, Positioned};
use crate::error::Result;

type Tree = Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>;

/// Backend that keeps every bucket in process memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    buckets: Mutex<HashMap<String, Tree>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for MemoryBackend {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn open_bucket(&self, bucket_id: &str) -> Result<Box<dyn Bucket>> {
        let mut buckets = self.buckets.lock()?;
        let tree = buckets
            .entry(bucket_id.to_string())
            .or_insert_with(|| {
                debug!("Creating memory bucket {}", bucket_id);
                Tree::default()
            })
            .clone();

        Ok(Box::new(MemoryBucket {
            id: bucket_id.to_string(),
            tree,
        }))
    }
}

struct MemoryBucket {
    id: String,
    tree: Tree,
}

impl Bucket for MemoryBucket {
    fn id(&self) -> &str {
        &self.id
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.tree.read()?.get(key).cloned())
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.tree.write()?.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.tree.write()?.remove(key);
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.tree.read()?.len() as u64)
    }

    fn cursor(&self) -> Result<Box<dyn BucketCursor>> {
        Ok(Box::new(Positioned::new(MemoryScan {
            id: self.id.clone(),
            tree: Arc::clone(&self.tree),
        })))
    }

    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

struct MemoryScan {
    id: String,
    tree: Tree,
}

impl OrderedScan for MemoryScan {
    fn bucket_id(&self) -> &str {
        &self.id
    }

    fn ceiling(&self, lower: Bound<&[u8]>) -> Result<Option<KeyValue>> {
        let tree = self.tree.read()?;
        Ok(tree
            .range::<[u8], _>((lower, Bound::Unbounded))
            .next()
            .map(|(k, v)| (k.clone(), v.clone())))
    }

    fn floor(&self, upper: Bound<&[u8]>) -> Result<Option<KeyValue>> {
        let tree = self.tree.read()?;
        Ok(tree
            .range::<[u8], _>((Bound::Unbounded, upper))
            .next_back()
            .map(|(k, v)| (k.clone(), v.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::conformance;

    #[test]
    fn test_memory_backend_conformance() {
        conformance::run_all(|| Box::new(MemoryBackend::new()));
    }

    #[test]
    fn test_reopen_bucket_keeps_data() {
        let backend = MemoryBackend::new();
        let mut bucket = backend.open_bucket("thing-1").unwrap();
        bucket.set(b"key", b"value").unwrap();
        bucket.close().unwrap();

        let bucket = backend.open_bucket("thing-1").unwrap();
        assert_eq!(bucket.get(b"key").unwrap(), Some(b"value".to_vec()));
        assert_eq!(backend.kind(), "memory");
    }
}
