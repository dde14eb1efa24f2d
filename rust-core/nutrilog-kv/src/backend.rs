// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Core key-value trait.
//
// Engines only have to offer point reads and writes, an ordered prefix scan
// and atomic batches. Everything relational (filters, ordering, key
// allocation) is rebuilt above this line by the document backend.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::KvError;

/// A pluggable key-value engine.
///
/// Keys and values are opaque byte slices. Implementations must be safe to
/// share across threads and tokio tasks.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Retrieve the value stored under `key`, or `Ok(None)` if absent.
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError>;

    /// Store a value, overwriting any previous value for `key`.
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KvError>;

    /// Remove `key`. Returns `Ok(true)` if it existed.
    async fn delete(&self, key: &[u8]) -> Result<bool, KvError>;

    /// Every (key, value) pair whose key starts with `prefix`, in
    /// lexicographic key order.
    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError>;

    /// Write several pairs atomically: all land or none do.
    async fn batch_put(&self, entries: &[(&[u8], &[u8])]) -> Result<(), KvError>;

    /// Remove several keys atomically. Returns how many existed.
    async fn batch_delete(&self, keys: &[&[u8]]) -> Result<u64, KvError>;

    /// Make previously acknowledged writes durable.
    async fn flush(&self) -> Result<(), KvError>;

    /// A short engine name for logs.
    fn name(&self) -> &str;
}

#[async_trait]
impl<B: KvBackend + ?Sized> KvBackend for Arc<B> {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        (**self).get(key).await
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        (**self).put(key, value).await
    }

    async fn delete(&self, key: &[u8]) -> Result<bool, KvError> {
        (**self).delete(key).await
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError> {
        (**self).scan_prefix(prefix).await
    }

    async fn batch_put(&self, entries: &[(&[u8], &[u8])]) -> Result<(), KvError> {
        (**self).batch_put(entries).await
    }

    async fn batch_delete(&self, keys: &[&[u8]]) -> Result<u64, KvError> {
        (**self).batch_delete(keys).await
    }

    async fn flush(&self) -> Result<(), KvError> {
        (**self).flush().await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
