// SPDX-License-Identifier: PMPL-1.0-or-later
//! Boundary to session management.
//!
//! The actor id is an opaque column value here. Nothing is authenticated.

/// Who is signed in, if anyone.
pub trait SessionProvider: Send + Sync {
    fn current_actor(&self) -> Option<String>;
}

/// A session fixed at construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticSession {
    actor: Option<String>,
}

impl StaticSession {
    pub fn signed_in(actor: impl Into<String>) -> Self {
        Self {
            actor: Some(actor.into()),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }
}

impl SessionProvider for StaticSession {
    fn current_actor(&self) -> Option<String> {
        self.actor.clone()
    }
}
