// SPDX-License-Identifier: PMPL-1.0-or-later
//! `profiles`: body metrics and nutrition targets, auto-increment keyed.
//!
//! An actor normally has one profile row. `save` merges into the newest one
//! and only inserts when the actor has none.

use std::sync::Arc;

use nutrilog_store::{
    ConflictPolicy, Filter, OrderBy, Query, Record, Row, Store, StoreError,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::schema::{ID, PROFILES};

/// Daily nutrition targets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Targets {
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
}

impl Targets {
    fn to_row(self) -> Row {
        Row::new()
            .with("targetCalories", self.calories)
            .with("proteinTarget", self.protein)
            .with("fatTarget", self.fat)
            .with("carbTarget", self.carbs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Assigned by the store; ignored by `save`.
    pub id: Option<i64>,
    pub actor_id: String,
    pub weight: f64,
    pub height: f64,
    pub age: i64,
    pub activity_level: String,
    pub gender: String,
    pub goal: String,
    /// Absent until computed. Saving `None` keeps stored targets.
    pub targets: Option<Targets>,
    pub updated_at: i64,
}

impl Record for Profile {
    const TABLE: &'static str = PROFILES;

    fn to_row(&self) -> Row {
        let mut row = Row::new()
            .with(ID, self.id)
            .with("actorId", &self.actor_id)
            .with("weight", self.weight)
            .with("height", self.height)
            .with("age", self.age)
            .with("activityLevel", &self.activity_level)
            .with("gender", &self.gender)
            .with("goal", &self.goal)
            .with("updatedAt", self.updated_at);
        if let Some(targets) = self.targets {
            row.merge(&targets.to_row());
        }
        row
    }

    fn from_row(row: &Row) -> nutrilog_store::Result<Self> {
        let targets = match row.opt_real("targetCalories")? {
            Some(calories) => Some(Targets {
                calories,
                protein: row.real("proteinTarget")?,
                fat: row.real("fatTarget")?,
                carbs: row.real("carbTarget")?,
            }),
            None => None,
        };
        Ok(Self {
            id: Some(row.integer(ID)?),
            actor_id: row.text("actorId")?,
            weight: row.real("weight")?,
            height: row.real("height")?,
            age: row.integer("age")?,
            activity_level: row.text("activityLevel")?,
            gender: row.text("gender")?,
            goal: row.text("goal")?,
            targets,
            updated_at: row.integer("updatedAt")?,
        })
    }
}

pub struct ProfileAccessor {
    store: Arc<dyn Store>,
}

impl ProfileAccessor {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Store `profile` as the actor's current profile and return its id.
    pub async fn save(&self, profile: &Profile) -> Result<i64> {
        let mut row = profile.to_row();
        row.remove(ID);

        if let Some(existing) = self.latest_for(&profile.actor_id).await? {
            if let Some(id) = existing.id {
                self.store
                    .update(Profile::TABLE, row, &Filter::all().eq(ID, id))
                    .await?;
                debug!(actor = %profile.actor_id, id, "profile updated");
                return Ok(id);
            }
        }

        let key = self
            .store
            .insert(Profile::TABLE, row, ConflictPolicy::Fail)
            .await?;
        let id = key.as_integer().ok_or_else(|| {
            StoreError::Codec(format!("profile key {key} is not an integer"))
        })?;
        debug!(actor = %profile.actor_id, id, "profile created");
        Ok(id)
    }

    /// The actor's most recently updated profile.
    pub async fn latest_for(&self, actor_id: &str) -> Result<Option<Profile>> {
        let query = Query::filter(Filter::all().eq("actorId", actor_id))
            .order_by(OrderBy::desc("updatedAt"))
            .limit(1);
        let rows = self.store.query(Profile::TABLE, &query).await?;
        Ok(rows.first().map(Profile::from_row).transpose()?)
    }

    /// Merge new targets into the actor's profile rows. Returns rows touched.
    pub async fn update_targets(&self, actor_id: &str, targets: Targets, updated_at: i64) -> Result<u64> {
        let changes = targets.to_row().with("updatedAt", updated_at);
        let touched = self
            .store
            .update(Profile::TABLE, changes, &Filter::all().eq("actorId", actor_id))
            .await?;
        Ok(touched)
    }
}
