// SPDX-License-Identifier: PMPL-1.0-or-later
//! Errors surfaced by the entity accessors.

use nutrilog_store::StoreError;
use thiserror::Error;

use crate::recognition::RecognitionError;

#[derive(Error, Debug)]
pub enum AccessorError {
    /// Propagated unchanged from the store.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("recognition failed: {0}")]
    Recognition(#[from] RecognitionError),

    /// The operation needs a signed-in actor and there is none.
    #[error("no signed-in actor")]
    NoSession,

    /// Caller input rejected before reaching the store.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, AccessorError>;
