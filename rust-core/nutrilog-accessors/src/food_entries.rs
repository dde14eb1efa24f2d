// SPDX-License-Identifier: PMPL-1.0-or-later
//! `foodEntries`: what an actor ate and when.
//!
//! Entries are keyed by a caller-chosen id (a UUID for photo logs).
//! Nutrient columns hold the totals for the entry as eaten, so `quantity`
//! is informational and already folded into them.

use std::sync::Arc;

use nutrilog_store::{decode_all, ConflictPolicy, Filter, OrderBy, Query, Record, Row, Store};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::clock::{day_start, DAY_MS};
use crate::error::{AccessorError, Result};
use crate::recognition::{NutritionEstimate, Recognizer};
use crate::schema::{FOOD_ENTRIES, ID};
use crate::session::SessionProvider;

/// Calories and macronutrients (grams).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Macros {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

impl Macros {
    fn validate(&self) -> Result<()> {
        let fields = [
            ("calories", self.calories),
            ("protein", self.protein),
            ("carbs", self.carbs),
            ("fat", self.fat),
        ];
        for (field, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(AccessorError::InvalidInput(format!(
                    "{field} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }

    fn to_row(self) -> Row {
        Row::new()
            .with("calories", self.calories)
            .with("protein", self.protein)
            .with("carbs", self.carbs)
            .with("fat", self.fat)
    }

    fn scaled(self, factor: f64) -> Self {
        Self {
            calories: self.calories * factor,
            protein: self.protein * factor,
            carbs: self.carbs * factor,
            fat: self.fat * factor,
        }
    }
}

impl From<&NutritionEstimate> for Macros {
    fn from(estimate: &NutritionEstimate) -> Self {
        Self {
            calories: estimate.calories,
            protein: estimate.protein_grams,
            carbs: estimate.carb_grams,
            fat: estimate.fat_grams,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodEntry {
    pub id: String,
    pub actor_id: String,
    pub name: String,
    #[serde(flatten)]
    pub macros: Macros,
    pub quantity: f64,
    pub image_ref: Option<String>,
    /// Milliseconds since the epoch.
    pub occurred_at: i64,
}

impl Record for FoodEntry {
    const TABLE: &'static str = FOOD_ENTRIES;

    fn to_row(&self) -> Row {
        let mut row = Row::new()
            .with(ID, &self.id)
            .with("actorId", &self.actor_id)
            .with("name", &self.name)
            .with("quantity", self.quantity)
            .with("imageRef", self.image_ref.clone())
            .with("occurredAt", self.occurred_at);
        row.merge(&self.macros.to_row());
        row
    }

    fn from_row(row: &Row) -> nutrilog_store::Result<Self> {
        Ok(Self {
            id: row.text(ID)?,
            actor_id: row.text("actorId")?,
            name: row.text("name")?,
            macros: Macros {
                calories: row.real("calories")?,
                protein: row.real("protein")?,
                carbs: row.real("carbs")?,
                fat: row.real("fat")?,
            },
            quantity: row.real("quantity")?,
            image_ref: row.opt_text("imageRef")?,
            occurred_at: row.integer("occurredAt")?,
        })
    }
}

/// Sums over one actor's day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyTotals {
    pub day_start: i64,
    pub entries: usize,
    pub macros: Macros,
}

pub struct FoodEntryAccessor {
    store: Arc<dyn Store>,
}

impl FoodEntryAccessor {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Insert a new entry. An existing id is a `Conflict`.
    pub async fn add(&self, entry: &FoodEntry) -> Result<()> {
        entry.macros.validate()?;
        if !entry.quantity.is_finite() || entry.quantity <= 0.0 {
            return Err(AccessorError::InvalidInput(format!(
                "quantity must be positive, got {}",
                entry.quantity
            )));
        }
        self.store
            .insert(FoodEntry::TABLE, entry.to_row(), ConflictPolicy::Fail)
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<FoodEntry>> {
        let query = Query::filter(Filter::all().eq(ID, id)).limit(1);
        let rows = self.store.query(FoodEntry::TABLE, &query).await?;
        Ok(rows.first().map(FoodEntry::from_row).transpose()?)
    }

    /// Entries in `[from, to)`, oldest first.
    pub async fn in_range(&self, actor_id: &str, from: i64, to: i64) -> Result<Vec<FoodEntry>> {
        let query = Query::filter(
            Filter::all()
                .eq("actorId", actor_id)
                .ge("occurredAt", from)
                .lt("occurredAt", to),
        )
        .order_by(OrderBy::asc("occurredAt"));
        let rows = self.store.query(FoodEntry::TABLE, &query).await?;
        Ok(decode_all(&rows)?)
    }

    /// Entries on the UTC day containing `day`, oldest first.
    pub async fn for_day(&self, actor_id: &str, day: i64) -> Result<Vec<FoodEntry>> {
        let start = day_start(day)?;
        self.in_range(actor_id, start, start + DAY_MS).await
    }

    /// The `limit` newest entries.
    pub async fn recent(&self, actor_id: &str, limit: usize) -> Result<Vec<FoodEntry>> {
        let query = Query::filter(Filter::all().eq("actorId", actor_id))
            .order_by(OrderBy::desc("occurredAt"))
            .limit(limit);
        let rows = self.store.query(FoodEntry::TABLE, &query).await?;
        Ok(decode_all(&rows)?)
    }

    /// Overwrite the nutrient columns of one entry. Returns whether it exists.
    pub async fn update_macros(&self, id: &str, macros: Macros) -> Result<bool> {
        macros.validate()?;
        let touched = self
            .store
            .update(FoodEntry::TABLE, macros.to_row(), &Filter::all().eq(ID, id))
            .await?;
        Ok(touched > 0)
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let removed = self
            .store
            .delete(FoodEntry::TABLE, &Filter::all().eq(ID, id))
            .await?;
        Ok(removed > 0)
    }

    /// Remove every entry of one actor. Returns how many went.
    pub async fn delete_all_for(&self, actor_id: &str) -> Result<u64> {
        let removed = self
            .store
            .delete(FoodEntry::TABLE, &Filter::all().eq("actorId", actor_id))
            .await?;
        info!(actor = %actor_id, removed, "deleted food entries");
        Ok(removed)
    }

    pub async fn daily_totals(&self, actor_id: &str, day: i64) -> Result<DailyTotals> {
        let entries = self.for_day(actor_id, day).await?;
        let mut totals = DailyTotals {
            day_start: day_start(day)?,
            entries: entries.len(),
            macros: Macros::default(),
        };
        for entry in &entries {
            totals.macros.calories += entry.macros.calories;
            totals.macros.protein += entry.macros.protein;
            totals.macros.carbs += entry.macros.carbs;
            totals.macros.fat += entry.macros.fat;
        }
        Ok(totals)
    }

    /// Recognise `image` and log it for the signed-in actor.
    ///
    /// The estimate describes one serving; the stored nutrients are scaled
    /// by `quantity`. Nothing is written if recognition fails.
    #[instrument(skip(self, recognizer, session, image), fields(bytes = image.len()))]
    pub async fn log_from_photo(
        &self,
        recognizer: &dyn Recognizer,
        session: &dyn SessionProvider,
        image: &[u8],
        quantity: f64,
        now_ms: i64,
    ) -> Result<FoodEntry> {
        let actor_id = session.current_actor().ok_or(AccessorError::NoSession)?;
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(AccessorError::InvalidInput(format!(
                "quantity must be positive, got {quantity}"
            )));
        }

        let estimate = recognizer.classify(image).await?;
        let entry = FoodEntry {
            id: Uuid::new_v4().to_string(),
            actor_id,
            name: estimate.name.clone(),
            macros: Macros::from(&estimate).scaled(quantity),
            quantity,
            image_ref: None,
            occurred_at: now_ms,
        };
        self.add(&entry).await?;
        debug!(id = %entry.id, name = %entry.name, "logged entry from photo");
        Ok(entry)
    }
}
