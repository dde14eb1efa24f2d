// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Error type for the key-value layer.

use thiserror::Error;

/// Errors raised by a [`crate::KvBackend`] or a [`crate::Keyspace`].
#[derive(Debug, Error)]
pub enum KvError {
    /// An I/O error occurred in the underlying storage layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// The stored data is corrupted or in an unexpected format.
    #[error("corrupted data: {0}")]
    CorruptedData(String),

    /// The engine cannot be reached (file locked, task aborted, ...).
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// Convenience alias used throughout the crate.
pub type KvResult<T> = Result<T, KvError>;
