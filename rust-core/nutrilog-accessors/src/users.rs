// SPDX-License-Identifier: PMPL-1.0-or-later
//! `users`: one row per actor, keyed by the actor id.

use std::sync::Arc;

use nutrilog_store::{ConflictPolicy, Filter, Query, Record, Row, Store};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::schema::{ID, USERS};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub created_at: i64,
}

impl Record for User {
    const TABLE: &'static str = USERS;

    fn to_row(&self) -> Row {
        Row::new()
            .with(ID, &self.id)
            .with("email", &self.email)
            .with("name", self.name.clone())
            .with("createdAt", self.created_at)
    }

    fn from_row(row: &Row) -> nutrilog_store::Result<Self> {
        Ok(Self {
            id: row.text(ID)?,
            email: row.text("email")?,
            name: row.opt_text("name")?,
            created_at: row.integer("createdAt")?,
        })
    }
}

pub struct UserAccessor {
    store: Arc<dyn Store>,
}

impl UserAccessor {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Insert or fully replace.
    pub async fn upsert(&self, user: &User) -> Result<()> {
        self.store
            .insert(User::TABLE, user.to_row(), ConflictPolicy::Replace)
            .await?;
        Ok(())
    }

    /// Insert a new user. An existing id is a `Conflict`.
    pub async fn create(&self, user: &User) -> Result<()> {
        self.store
            .insert(User::TABLE, user.to_row(), ConflictPolicy::Fail)
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<User>> {
        let query = Query::filter(Filter::all().eq(ID, id)).limit(1);
        let rows = self.store.query(User::TABLE, &query).await?;
        Ok(rows.first().map(User::from_row).transpose()?)
    }

    /// Returns whether the user existed.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let removed = self
            .store
            .delete(User::TABLE, &Filter::all().eq(ID, id))
            .await?;
        Ok(removed > 0)
    }
}
