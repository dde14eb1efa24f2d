// SPDX-License-Identifier: PMPL-1.0-or-later
//! The storage façade.
//!
//! [`Store`] is the one contract the rest of the system depends on. Both
//! [`crate::SqliteStore`] and [`crate::DocumentStore`] implement it, and
//! [`open_store`] picks one at runtime from [`StoreConfig`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{validate_identifier, BackendKind, Catalog, KeyPolicy, StoreConfig, TableSpec};
use crate::document::DocumentStore;
use crate::error::{Result, StoreError};
use crate::filter::Filter;
use crate::query::Query;
use crate::relational::SqliteStore;
use crate::value::{Key, Row, Value};

/// What `insert` does when the resolved key already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Overwrite the existing row entirely.
    Replace,
    /// Keep the existing row untouched and report success.
    Ignore,
    /// Report [`StoreError::Conflict`] and write nothing.
    #[default]
    Fail,
}

/// Relational-style access to a set of catalogued tables.
///
/// Implementations must return the same rows for the same sequence of
/// calls; only the order of rows that tie under `ORDER BY` (or of an
/// unordered query) may differ.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert one row and return its key.
    ///
    /// The row must not be empty. Externally-keyed tables need the key
    /// column; auto-increment tables allocate one unless the row names it.
    async fn insert(&self, table: &str, row: Row, policy: ConflictPolicy) -> Result<Key>;

    /// Rows matching the filter, ordered and truncated as requested.
    /// No match is an empty vector, never an error.
    async fn query(&self, table: &str, query: &Query) -> Result<Vec<Row>>;

    /// Merge `changes` into every matching row; returns how many matched.
    /// `Null` in `changes` clears that column. The key column is immutable.
    async fn update(&self, table: &str, changes: Row, filter: &Filter) -> Result<u64>;

    /// Delete matching rows; returns how many were removed.
    /// [`Filter::all`] deletes the whole table.
    async fn delete(&self, table: &str, filter: &Filter) -> Result<u64>;

    /// Schema definition escape hatch (see [`crate::statement`]).
    async fn execute(&self, statement: &str) -> Result<()>;

    /// Release the engine. Later calls fail with [`StoreError::Closed`];
    /// closing twice is fine.
    async fn close(&self) -> Result<()>;

    /// Backend name for logs.
    fn name(&self) -> &str;

    /// `query` with a string WHERE clause and ORDER BY.
    async fn query_where(
        &self,
        table: &str,
        where_clause: Option<&str>,
        where_args: &[Value],
        order_by: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Row>> {
        let query = Query::parse(where_clause, where_args, order_by, limit).inspect_err(|err| {
            warn!(table, backend = self.name(), error = %err, "rejected query");
        })?;
        self.query(table, &query).await
    }
}

/// Build the store described by `config`.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn Store>> {
    let catalog = Catalog::new(config.tables.iter().cloned())?;

    let store: Arc<dyn Store> = match config.backend {
        BackendKind::Sqlite => match &config.data_dir {
            Some(dir) => Arc::new(SqliteStore::open(dir.join(crate::config::SQLITE_FILE), catalog)?),
            None => Arc::new(SqliteStore::in_memory(catalog)?),
        },
        BackendKind::Memory => Arc::new(DocumentStore::new(
            nutrilog_kv::InMemoryBackend::new(),
            catalog,
        )),
        BackendKind::Redb => open_redb(config, catalog)?,
    };

    info!(
        backend = store.name(),
        tables = config.tables.len(),
        data_dir = ?config.data_dir,
        "opened store"
    );
    Ok(store)
}

#[cfg(feature = "redb-backend")]
fn open_redb(config: &StoreConfig, catalog: Catalog) -> Result<Arc<dyn Store>> {
    let dir = config.data_dir.as_ref().ok_or_else(|| {
        StoreError::InvalidQuery("the redb backend needs a data directory".to_string())
    })?;
    let backend = nutrilog_kv::RedbBackend::open(dir.join(crate::config::REDB_FILE))?;
    Ok(Arc::new(DocumentStore::new(backend, catalog)))
}

#[cfg(not(feature = "redb-backend"))]
fn open_redb(_config: &StoreConfig, _catalog: Catalog) -> Result<Arc<dyn Store>> {
    Err(StoreError::Backend(
        "built without the redb-backend feature".to_string(),
    ))
}

/// Checks shared by both backends before an insert touches storage.
///
/// Returns the row with `Null` columns removed and the caller-supplied key,
/// if any.
pub(crate) fn prepare_insert(spec: &TableSpec, row: Row) -> Result<(Row, Option<Key>)> {
    let row = row.without_nulls();
    if row.is_empty() {
        return Err(StoreError::InvalidQuery(format!(
            "cannot insert an empty row into '{}'",
            spec.name
        )));
    }
    for column in row.columns() {
        validate_identifier("column", column)?;
    }
    reject_non_finite(spec, &row)?;

    let key = match row.get(&spec.key_column) {
        Some(value) => Some(Key::from_value(&spec.key_column, value)?),
        None => None,
    };
    match (spec.key_policy, &key) {
        (KeyPolicy::External, None) => Err(StoreError::InvalidQuery(format!(
            "row for '{}' is missing key column '{}'",
            spec.name, spec.key_column
        ))),
        (KeyPolicy::AutoIncrement, Some(Key::Text(_))) => Err(StoreError::InvalidQuery(format!(
            "auto-increment key '{}.{}' must be an integer",
            spec.name, spec.key_column
        ))),
        _ => Ok((row, key)),
    }
}

/// Checks shared by both backends before an update touches storage.
pub(crate) fn prepare_update(spec: &TableSpec, changes: &Row, filter: &Filter) -> Result<()> {
    if changes.is_empty() {
        return Err(StoreError::InvalidQuery(format!(
            "update of '{}' has no columns to change",
            spec.name
        )));
    }
    if changes.contains(&spec.key_column) {
        return Err(StoreError::InvalidQuery(format!(
            "key column '{}.{}' cannot be updated",
            spec.name, spec.key_column
        )));
    }
    for column in changes.columns() {
        validate_identifier("column", column)?;
    }
    reject_non_finite(spec, changes)?;
    filter.validate()
}

/// NaN and the infinities have no document encoding, and SQLite would turn
/// NaN into NULL.
fn reject_non_finite(spec: &TableSpec, row: &Row) -> Result<()> {
    for (column, value) in row.iter() {
        if let Value::Real(r) = value {
            if !r.is_finite() {
                return Err(StoreError::Codec(format!(
                    "column '{}.{column}' holds non-finite real {r}",
                    spec.name
                )));
            }
        }
    }
    Ok(())
}
