// SPDX-License-Identifier: PMPL-1.0-or-later
//
// In-memory key-value engine.
//
// A `BTreeMap` behind a tokio `RwLock`. Ordered keys make prefix scans a
// simple range walk. Used by tests and by stores that do not need to
// outlive the process.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::backend::KvBackend;
use crate::error::KvError;

/// An in-memory engine backed by a sorted map.
///
/// Cloning is cheap and every clone sees the same data.
///
/// # Example
///
/// ```rust
/// use nutrilog_kv::backend::KvBackend;
/// use nutrilog_kv::memory::InMemoryBackend;
///
/// # tokio_test::block_on(async {
/// let store = InMemoryBackend::new();
/// store.put(b"foodEntries:te1", b"{}").await.unwrap();
/// assert_eq!(store.get(b"foodEntries:te1").await.unwrap(), Some(b"{}".to_vec()));
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    data: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl InMemoryBackend {
    /// Create a new, empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    /// True if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

#[async_trait]
impl KvBackend for InMemoryBackend {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        self.data.write().await.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<bool, KvError> {
        Ok(self.data.write().await.remove(key).is_some())
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError> {
        let map = self.data.read().await;
        let results = map
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(results)
    }

    async fn batch_put(&self, entries: &[(&[u8], &[u8])]) -> Result<(), KvError> {
        // One write guard for the whole batch keeps it atomic for readers.
        let mut map = self.data.write().await;
        for (key, value) in entries {
            map.insert(key.to_vec(), value.to_vec());
        }
        Ok(())
    }

    async fn batch_delete(&self, keys: &[&[u8]]) -> Result<u64, KvError> {
        let mut map = self.data.write().await;
        let removed = keys.iter().filter(|key| map.remove(**key).is_some()).count();
        Ok(removed as u64)
    }

    async fn flush(&self) -> Result<(), KvError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}
