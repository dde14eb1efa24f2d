// SPDX-License-Identifier: PMPL-1.0-or-later
//
// redb-backed persistent key-value engine.
//
// Uses redb (pure Rust, B-tree, ACID, single-file database). Every table of
// the document store shares the single `documents` redb table; separation
// comes from key prefixes applied by `Keyspace`.
//
// - Read transactions for reads and scans.
// - One write transaction per put/delete/batch, so a batch commits or
//   rolls back as a unit.
// - redb work is blocking and runs on `spawn_blocking`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, TableError};
use tracing::debug;

use crate::backend::KvBackend;
use crate::error::KvError;

/// The single redb table holding every document.
const DOCUMENTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("documents");

/// A persistent engine powered by redb.
///
/// # Example
///
/// ```rust,no_run
/// use nutrilog_kv::backend::KvBackend;
/// use nutrilog_kv::redb_backend::RedbBackend;
///
/// # tokio_test::block_on(async {
/// let store = RedbBackend::open("/tmp/nutrilog.redb").unwrap();
/// store.put(b"users:tu1", b"{}").await.unwrap();
/// # });
/// ```
pub struct RedbBackend {
    db: Arc<Database>,
    path: PathBuf,
}

impl RedbBackend {
    /// Open or create a database file, creating parent directories as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KvError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(&path).map_err(|e| {
            KvError::BackendUnavailable(format!("failed to open redb at {}: {}", path.display(), e))
        })?;

        debug!(path = %path.display(), "opened redb backend");

        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    /// Filesystem path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run blocking redb work off the async executor.
    async fn blocking<T, F>(&self, work: F) -> Result<T, KvError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, KvError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || work(db.as_ref()))
            .await
            .map_err(|e| KvError::BackendUnavailable(format!("task join: {e}")))?
    }
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("path", &self.path)
            .finish()
    }
}

fn read_txn(db: &Database) -> Result<redb::ReadTransaction, KvError> {
    db.begin_read()
        .map_err(|e| KvError::BackendUnavailable(format!("read txn: {e}")))
}

fn write_txn(db: &Database) -> Result<redb::WriteTransaction, KvError> {
    db.begin_write()
        .map_err(|e| KvError::BackendUnavailable(format!("write txn: {e}")))
}

fn commit(txn: redb::WriteTransaction) -> Result<(), KvError> {
    txn.commit()
        .map_err(|e| KvError::CorruptedData(format!("commit: {e}")))
}

#[async_trait]
impl KvBackend for RedbBackend {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        let key = key.to_vec();
        self.blocking(move |db| {
            let txn = read_txn(db)?;
            let table = match txn.open_table(DOCUMENTS) {
                Ok(t) => t,
                // Nothing has been written yet.
                Err(TableError::TableDoesNotExist(_)) => return Ok(None),
                Err(e) => return Err(KvError::CorruptedData(format!("open table: {e}"))),
            };
            let value = table
                .get(key.as_slice())
                .map_err(|e| KvError::CorruptedData(format!("get: {e}")))?;
            Ok(value.map(|v| v.value().to_vec()))
        })
        .await
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        let key = key.to_vec();
        let value = value.to_vec();
        self.blocking(move |db| {
            let txn = write_txn(db)?;
            {
                let mut table = txn
                    .open_table(DOCUMENTS)
                    .map_err(|e| KvError::BackendUnavailable(format!("open table: {e}")))?;
                table
                    .insert(key.as_slice(), value.as_slice())
                    .map_err(|e| KvError::CorruptedData(format!("insert: {e}")))?;
            }
            commit(txn)
        })
        .await
    }

    async fn delete(&self, key: &[u8]) -> Result<bool, KvError> {
        let key = key.to_vec();
        self.blocking(move |db| {
            let txn = write_txn(db)?;
            let existed = {
                let mut table = txn
                    .open_table(DOCUMENTS)
                    .map_err(|e| KvError::BackendUnavailable(format!("open table: {e}")))?;
                let removed = table
                    .remove(key.as_slice())
                    .map_err(|e| KvError::CorruptedData(format!("remove: {e}")))?;
                removed.is_some()
            };
            commit(txn)?;
            Ok(existed)
        })
        .await
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError> {
        let prefix = prefix.to_vec();
        self.blocking(move |db| {
            let txn = read_txn(db)?;
            let table = match txn.open_table(DOCUMENTS) {
                Ok(t) => t,
                Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
                Err(e) => return Err(KvError::CorruptedData(format!("open table: {e}"))),
            };

            let iter = table
                .range(prefix.as_slice()..)
                .map_err(|e| KvError::CorruptedData(format!("range scan: {e}")))?;

            let mut results = Vec::new();
            for entry in iter {
                let (k, v) = entry.map_err(|e| KvError::CorruptedData(format!("scan entry: {e}")))?;
                let k = k.value().to_vec();
                if !k.starts_with(&prefix) {
                    break;
                }
                results.push((k, v.value().to_vec()));
            }
            Ok(results)
        })
        .await
    }

    async fn batch_put(&self, entries: &[(&[u8], &[u8])]) -> Result<(), KvError> {
        let owned: Vec<(Vec<u8>, Vec<u8>)> = entries
            .iter()
            .map(|(k, v)| (k.to_vec(), v.to_vec()))
            .collect();
        self.blocking(move |db| {
            let txn = write_txn(db)?;
            {
                let mut table = txn
                    .open_table(DOCUMENTS)
                    .map_err(|e| KvError::BackendUnavailable(format!("open table: {e}")))?;
                for (k, v) in &owned {
                    table
                        .insert(k.as_slice(), v.as_slice())
                        .map_err(|e| KvError::CorruptedData(format!("batch insert: {e}")))?;
                }
            }
            commit(txn)
        })
        .await
    }

    async fn batch_delete(&self, keys: &[&[u8]]) -> Result<u64, KvError> {
        let owned: Vec<Vec<u8>> = keys.iter().map(|k| k.to_vec()).collect();
        self.blocking(move |db| {
            let txn = write_txn(db)?;
            let mut removed = 0u64;
            {
                let mut table = txn
                    .open_table(DOCUMENTS)
                    .map_err(|e| KvError::BackendUnavailable(format!("open table: {e}")))?;
                for k in &owned {
                    let existed = table
                        .remove(k.as_slice())
                        .map_err(|e| KvError::CorruptedData(format!("batch remove: {e}")))?
                        .is_some();
                    if existed {
                        removed += 1;
                    }
                }
            }
            commit(txn)?;
            Ok(removed)
        })
        .await
    }

    async fn flush(&self) -> Result<(), KvError> {
        // Commits are durable on return; nothing is buffered.
        Ok(())
    }

    fn name(&self) -> &str {
        "redb"
    }
}
