// SPDX-License-Identifier: PMPL-1.0-or-later
//! Document backend: rows as JSON documents in a [`KvBackend`].
//!
//! Each table is one [`Keyspace`] (`"table:{name}"`). A row's key is
//! encoded as `i{integer}` or `t{text}` so integer `5` and text `"5"` stay
//! distinct, as they do in SQLite. Auto-increment keys live only in the
//! document key and are re-attached on read.
//!
//! The engine has no query language, so every query is a prefix scan
//! followed by [`Filter::matches`] and [`Query::finish`]. Mutations hold a
//! write lock for their read-modify-write and commit through one batch.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use nutrilog_kv::{KvBackend, Keyspace};
use serde_json::{Map, Value as Json};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::codec::{document_to_row, row_to_document};
use crate::config::{Catalog, TableSpec};
use crate::error::{Result, StoreError};
use crate::filter::Filter;
use crate::query::Query;
use crate::statement;
use crate::store::{prepare_insert, prepare_update, ConflictPolicy, Store};
use crate::value::{Key, Row};

type Document = Map<String, Json>;
type Table = Keyspace<Arc<dyn KvBackend>>;

fn encode_key(key: &Key) -> String {
    match key {
        Key::Integer(i) => format!("i{i}"),
        Key::Text(s) => format!("t{s}"),
    }
}

fn decode_key(table: &str, raw: &str) -> Result<Key> {
    let corrupt = || StoreError::Codec(format!("unrecognised document key '{raw}' in '{table}'"));
    if let Some(digits) = raw.strip_prefix('i') {
        digits.parse::<i64>().map(Key::Integer).map_err(|_| corrupt())
    } else if let Some(text) = raw.strip_prefix('t') {
        Ok(Key::Text(text.to_string()))
    } else {
        Err(corrupt())
    }
}

/// [`Store`] over any [`KvBackend`].
///
/// # Example
///
/// ```rust
/// use nutrilog_kv::InMemoryBackend;
/// use nutrilog_store::{Catalog, ConflictPolicy, DocumentStore, Filter, Query, Row, Store, TableSpec};
///
/// # tokio_test::block_on(async {
/// let catalog = Catalog::new(vec![TableSpec::external("users", "id")]).unwrap();
/// let store = DocumentStore::new(InMemoryBackend::new(), catalog);
///
/// store
///     .insert("users", Row::new().with("id", "u1").with("email", "a@x.io"), ConflictPolicy::Fail)
///     .await
///     .unwrap();
/// let rows = store
///     .query("users", &Query::filter(Filter::all().eq("email", "a@x.io")))
///     .await
///     .unwrap();
/// assert_eq!(rows[0].text("id").unwrap(), "u1");
/// # });
/// ```
pub struct DocumentStore {
    backend: RwLock<Option<Arc<dyn KvBackend>>>,
    write_lock: Mutex<()>,
    catalog: Arc<Catalog>,
    name: String,
}

impl DocumentStore {
    pub fn new(backend: impl KvBackend + 'static, catalog: Catalog) -> Self {
        let name = format!("document/{}", backend.name());
        Self {
            backend: RwLock::new(Some(Arc::new(backend))),
            write_lock: Mutex::new(()),
            catalog: Arc::new(catalog),
            name,
        }
    }

    fn backend(&self) -> Result<Arc<dyn KvBackend>> {
        let guard = self
            .backend
            .read()
            .map_err(|_| StoreError::Backend("document backend lock poisoned".to_string()))?;
        guard.as_ref().map(Arc::clone).ok_or(StoreError::Closed)
    }

    fn table(&self, spec: &TableSpec) -> Result<Table> {
        Ok(Keyspace::new(self.backend()?, &format!("table:{}", spec.name)))
    }

    /// Every row in the table, paired with its document key.
    async fn load(&self, spec: &TableSpec, table: &Table) -> Result<Vec<(String, Row)>> {
        let documents: Vec<(String, Document)> = table.scan().await?;
        let mut rows = Vec::with_capacity(documents.len());
        for (doc_key, doc) in documents {
            let mut row = document_to_row(&doc)?;
            if spec.is_auto_increment() {
                row.set(spec.key_column.clone(), decode_key(&spec.name, &doc_key)?);
            }
            rows.push((doc_key, row));
        }
        Ok(rows)
    }

    /// The document persisted for `row`.
    fn to_document(spec: &TableSpec, row: &Row) -> Result<Document> {
        let mut doc = row_to_document(row)?;
        if spec.is_auto_increment() {
            doc.remove(&spec.key_column);
        }
        Ok(doc)
    }

    /// One past the largest integer key (negative keys included), or 1 for
    /// an empty table.
    async fn next_key(&self, spec: &TableSpec, table: &Table) -> Result<Key> {
        let mut max: Option<i64> = None;
        for raw in table.keys().await? {
            if let Key::Integer(i) = decode_key(&spec.name, &raw)? {
                max = Some(max.map_or(i, |m| m.max(i)));
            }
        }
        match max {
            None => Ok(Key::Integer(1)),
            Some(m) => m.checked_add(1).map(Key::Integer).ok_or_else(|| {
                StoreError::Backend(format!("key space of '{}' is exhausted", spec.name))
            }),
        }
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("name", &self.name)
            .field("tables", &self.catalog.len())
            .finish()
    }
}

#[async_trait]
impl Store for DocumentStore {
    #[instrument(level = "debug", skip(self, row), fields(backend = %self.name))]
    async fn insert(&self, table: &str, row: Row, policy: ConflictPolicy) -> Result<Key> {
        let spec = self.catalog.resolve(table)?;
        let (row, explicit) = prepare_insert(spec, row)?;
        let _guard = self.write_lock.lock().await;
        let docs = self.table(spec)?;

        let key = match explicit {
            Some(key) => key,
            None => self.next_key(spec, &docs).await?,
        };
        let doc_key = encode_key(&key);

        if docs.contains(&doc_key).await? {
            match policy {
                ConflictPolicy::Fail => {
                    return Err(StoreError::Conflict {
                        table: spec.name.clone(),
                        key: key.to_string(),
                    })
                }
                ConflictPolicy::Ignore => {
                    debug!(%key, "row exists, insert ignored");
                    return Ok(key);
                }
                ConflictPolicy::Replace => debug!(%key, "replacing existing row"),
            }
        }

        docs.put(&doc_key, &Self::to_document(spec, &row)?).await?;
        Ok(key)
    }

    #[instrument(level = "debug", skip(self, query), fields(backend = %self.name, filter = %query.filter))]
    async fn query(&self, table: &str, query: &Query) -> Result<Vec<Row>> {
        let spec = self.catalog.resolve(table)?;
        query.validate()?;
        let docs = self.table(spec)?;

        let matching: Vec<Row> = self
            .load(spec, &docs)
            .await?
            .into_iter()
            .map(|(_, row)| row)
            .filter(|row| query.filter.matches(row))
            .collect();
        let rows = query.finish(matching);
        debug!(rows = rows.len(), "query complete");
        Ok(rows)
    }

    #[instrument(level = "debug", skip(self, changes, filter), fields(backend = %self.name, filter = %filter))]
    async fn update(&self, table: &str, changes: Row, filter: &Filter) -> Result<u64> {
        let spec = self.catalog.resolve(table)?;
        prepare_update(spec, &changes, filter)?;
        let _guard = self.write_lock.lock().await;
        let docs = self.table(spec)?;

        let mut updated: Vec<(String, Document)> = Vec::new();
        for (doc_key, mut row) in self.load(spec, &docs).await? {
            if filter.matches(&row) {
                row.merge(&changes);
                updated.push((doc_key, Self::to_document(spec, &row)?));
            }
        }
        if !updated.is_empty() {
            docs.put_many(&updated).await?;
        }
        Ok(updated.len() as u64)
    }

    #[instrument(level = "debug", skip(self, filter), fields(backend = %self.name, filter = %filter))]
    async fn delete(&self, table: &str, filter: &Filter) -> Result<u64> {
        let spec = self.catalog.resolve(table)?;
        filter.validate()?;
        let _guard = self.write_lock.lock().await;
        let docs = self.table(spec)?;

        let doomed: Vec<String> = self
            .load(spec, &docs)
            .await?
            .into_iter()
            .filter(|(_, row)| filter.matches(row))
            .map(|(doc_key, _)| doc_key)
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }
        Ok(docs.delete_many(&doomed).await?)
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        self.backend()?;
        let kind = statement::classify(sql)?;
        // Tables appear on first write and documents need no indexes.
        debug!(?kind, backend = %self.name, "schema statement has no effect here");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let taken = {
            let mut guard = self
                .backend
                .write()
                .map_err(|_| StoreError::Backend("document backend lock poisoned".to_string()))?;
            guard.take()
        };
        if let Some(backend) = taken {
            let _guard = self.write_lock.lock().await;
            backend.flush().await?;
            info!(backend = %self.name, "closed document store");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
