// SPDX-License-Identifier: PMPL-1.0-or-later
//! Store error types.
//!
//! Every façade operation reports one of these instead of succeeding with
//! wrong data. Absence is never an error: lookups that miss return an empty
//! result, and `NotFound` is reserved for tables the catalog cannot resolve.

use nutrilog_kv::KvError;
use thiserror::Error;

/// Errors returned by [`crate::Store`] operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A referenced table is not declared in the catalog.
    #[error("not found: {0}")]
    NotFound(String),

    /// A `ConflictPolicy::Fail` insert hit an existing key.
    #[error("conflict: table '{table}' already holds key {key}")]
    Conflict { table: String, key: String },

    /// A malformed WHERE clause, placeholder mismatch, bad identifier,
    /// empty row, or any other request that cannot be executed as written.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A row could not be converted to or from its stored or typed form.
    #[error("codec error: {0}")]
    Codec(String),

    /// The store has been closed.
    #[error("store is closed")]
    Closed,

    /// The underlying engine failed.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, StoreError>;

impl From<KvError> for StoreError {
    fn from(err: KvError) -> Self {
        match err {
            KvError::SerializationError(msg) => StoreError::Codec(msg),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(format!("SQLite error: {err}"))
    }
}
