// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Namespaced, serde-typed view over a `KvBackend`.
//
// One keyspace per table: every logical key is stored as `"{namespace}:{key}"`
// and every value as JSON. Tables therefore share one physical engine
// without colliding, and a table can be enumerated with a single prefix scan.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::backend::KvBackend;
use crate::error::KvError;

/// A typed, namespace-prefixed view of a [`KvBackend`].
///
/// # Example
///
/// ```rust
/// use nutrilog_kv::keyspace::Keyspace;
/// use nutrilog_kv::memory::InMemoryBackend;
///
/// # tokio_test::block_on(async {
/// let entries = Keyspace::new(InMemoryBackend::new(), "foodEntries");
/// entries.put("te1", &450i64).await.unwrap();
/// assert_eq!(entries.get::<i64>("te1").await.unwrap(), Some(450));
/// assert_eq!(entries.keys().await.unwrap(), vec!["te1".to_string()]);
/// # });
/// ```
pub struct Keyspace<B: KvBackend> {
    backend: B,
    namespace: String,
}

impl<B: KvBackend> Keyspace<B> {
    /// Create a keyspace over `backend`. Keys become `"{namespace}:{key}"`.
    pub fn new(backend: B, namespace: &str) -> Self {
        Self {
            backend,
            namespace: namespace.to_string(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn full_key(&self, key: &str) -> Vec<u8> {
        format!("{}:{}", self.namespace, key).into_bytes()
    }

    fn prefix(&self) -> Vec<u8> {
        format!("{}:", self.namespace).into_bytes()
    }

    /// Recover the logical key from a stored key.
    fn logical_key(&self, raw: &[u8]) -> Result<String, KvError> {
        let prefix_len = self.namespace.len() + 1;
        let suffix = raw.get(prefix_len..).unwrap_or_default();
        String::from_utf8(suffix.to_vec()).map_err(|e| {
            KvError::CorruptedData(format!("non-UTF-8 key in '{}': {}", self.namespace, e))
        })
    }

    fn decode<T: DeserializeOwned>(&self, key: &str, bytes: &[u8]) -> Result<T, KvError> {
        serde_json::from_slice(bytes).map_err(|err| {
            KvError::SerializationError(format!(
                "failed to deserialize '{}:{}': {}",
                self.namespace, key, err
            ))
        })
    }

    fn encode<T: Serialize>(&self, key: &str, value: &T) -> Result<Vec<u8>, KvError> {
        serde_json::to_vec(value).map_err(|err| {
            KvError::SerializationError(format!(
                "failed to serialize '{}:{}': {}",
                self.namespace, key, err
            ))
        })
    }

    /// Fetch and decode one value, `Ok(None)` if absent.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, KvError> {
        match self.backend.get(&self.full_key(key)).await? {
            Some(bytes) => Ok(Some(self.decode(key, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Encode and store one value.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), KvError> {
        let bytes = self.encode(key, value)?;
        self.backend.put(&self.full_key(key), &bytes).await
    }

    /// True if `key` holds a value. Nothing is decoded.
    pub async fn contains(&self, key: &str) -> Result<bool, KvError> {
        Ok(self.backend.get(&self.full_key(key)).await?.is_some())
    }

    /// Remove one key. Returns `Ok(true)` if it existed.
    pub async fn delete(&self, key: &str) -> Result<bool, KvError> {
        self.backend.delete(&self.full_key(key)).await
    }

    /// Every (logical key, value) pair in the namespace.
    pub async fn scan<T: DeserializeOwned>(&self) -> Result<Vec<(String, T)>, KvError> {
        let raw = self.backend.scan_prefix(&self.prefix()).await?;
        let mut results = Vec::with_capacity(raw.len());
        for (raw_key, raw_value) in raw {
            let key = self.logical_key(&raw_key)?;
            let value = self.decode(&key, &raw_value)?;
            results.push((key, value));
        }
        Ok(results)
    }

    /// Every logical key in the namespace, without decoding values.
    pub async fn keys(&self) -> Result<Vec<String>, KvError> {
        let raw = self.backend.scan_prefix(&self.prefix()).await?;
        raw.iter().map(|(k, _)| self.logical_key(k)).collect()
    }

    /// Encode and store several values in one atomic batch.
    pub async fn put_many<T: Serialize>(&self, entries: &[(String, T)]) -> Result<(), KvError> {
        let mut encoded = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            encoded.push((self.full_key(key), self.encode(key, value)?));
        }
        let borrowed: Vec<(&[u8], &[u8])> = encoded
            .iter()
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
            .collect();
        self.backend.batch_put(&borrowed).await
    }

    /// Remove several keys in one atomic batch. Returns how many existed.
    pub async fn delete_many(&self, keys: &[String]) -> Result<u64, KvError> {
        let full: Vec<Vec<u8>> = keys.iter().map(|k| self.full_key(k)).collect();
        let borrowed: Vec<&[u8]> = full.iter().map(|k| k.as_slice()).collect();
        self.backend.batch_delete(&borrowed).await
    }
}
