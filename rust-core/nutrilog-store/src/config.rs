// SPDX-License-Identifier: PMPL-1.0-or-later
//! Store configuration and the table catalog.
//!
//! The backend is chosen once, at startup, from [`StoreConfig`]. The catalog
//! declares every table and how it is keyed; a table is either
//! auto-increment or externally keyed, never both.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Environment variable selecting the backend (`sqlite`, `memory`, `redb`).
pub const ENV_BACKEND: &str = "NUTRILOG_BACKEND";
/// Environment variable holding the data directory for file-backed stores.
pub const ENV_DATA_DIR: &str = "NUTRILOG_DATA_DIR";

/// SQLite database file name inside the data directory.
pub const SQLITE_FILE: &str = "nutrilog.sqlite3";
/// redb database file name inside the data directory.
pub const REDB_FILE: &str = "nutrilog.redb";

/// Which engine backs the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Relational engine (SQLite). In-memory when no data dir is set.
    #[default]
    Sqlite,
    /// Document emulation over the in-memory key-value engine.
    Memory,
    /// Document emulation over redb. Requires a data dir.
    Redb,
}

impl BackendKind {
    pub fn parse(text: &str) -> Result<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "relational" => Ok(BackendKind::Sqlite),
            "memory" | "in-memory" => Ok(BackendKind::Memory),
            "redb" | "document" => Ok(BackendKind::Redb),
            other => Err(StoreError::InvalidQuery(format!("unknown backend '{other}'"))),
        }
    }
}

/// How a table's primary key is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPolicy {
    /// The store allocates max-existing-key + 1 (1 for an empty table).
    AutoIncrement,
    /// The caller supplies the key in every inserted row.
    External,
}

/// One declared table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    pub key_column: String,
    pub key_policy: KeyPolicy,
}

impl TableSpec {
    pub fn auto_increment(name: impl Into<String>, key_column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_column: key_column.into(),
            key_policy: KeyPolicy::AutoIncrement,
        }
    }

    pub fn external(name: impl Into<String>, key_column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_column: key_column.into(),
            key_policy: KeyPolicy::External,
        }
    }

    pub fn is_auto_increment(&self) -> bool {
        self.key_policy == KeyPolicy::AutoIncrement
    }
}

/// Validated lookup of declared tables.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: HashMap<String, TableSpec>,
}

impl Catalog {
    /// Build from specs, rejecting bad identifiers and duplicates.
    pub fn new(specs: impl IntoIterator<Item = TableSpec>) -> Result<Self> {
        let mut tables = HashMap::new();
        for spec in specs {
            validate_identifier("table", &spec.name)?;
            validate_identifier("column", &spec.key_column)?;
            if tables.contains_key(&spec.name) {
                return Err(StoreError::InvalidQuery(format!(
                    "table '{}' declared twice",
                    spec.name
                )));
            }
            tables.insert(spec.name.clone(), spec);
        }
        Ok(Self { tables })
    }

    /// Resolve a table, `NotFound` if it was never declared.
    pub fn resolve(&self, table: &str) -> Result<&TableSpec> {
        self.tables
            .get(table)
            .ok_or_else(|| StoreError::NotFound(format!("table '{table}' is not declared")))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Top-level store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: BackendKind,
    /// Directory for file-backed engines. `None` keeps SQLite in memory.
    pub data_dir: Option<PathBuf>,
    pub tables: Vec<TableSpec>,
}

impl StoreConfig {
    pub fn new(backend: BackendKind, tables: Vec<TableSpec>) -> Self {
        Self {
            backend,
            data_dir: None,
            tables,
        }
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Read [`ENV_BACKEND`] and [`ENV_DATA_DIR`]. Unset variables keep the
    /// defaults (in-memory SQLite).
    pub fn from_env(tables: Vec<TableSpec>) -> Result<Self> {
        let backend = match std::env::var(ENV_BACKEND) {
            Ok(value) => BackendKind::parse(&value)?,
            Err(_) => BackendKind::default(),
        };
        let data_dir = std::env::var_os(ENV_DATA_DIR).map(PathBuf::from);
        Ok(Self {
            backend,
            data_dir,
            tables,
        })
    }
}

/// Table and column names: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn validate_identifier(what: &str, name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidQuery(format!("invalid {what} name '{name}'")))
    }
}
