// SPDX-License-Identifier: PMPL-1.0-or-later
//! The persisted layout: three tables and their indexes.

use nutrilog_store::{Store, TableSpec};
use tracing::info;

use crate::error::Result;

pub const USERS: &str = "users";
pub const PROFILES: &str = "profiles";
pub const FOOD_ENTRIES: &str = "foodEntries";

/// Key column of every table.
pub const ID: &str = "id";

/// `users` keyed by actor id, `profiles` auto-increment, `foodEntries` keyed
/// by entry id.
pub fn catalog() -> Vec<TableSpec> {
    vec![
        TableSpec::external(USERS, ID),
        TableSpec::auto_increment(PROFILES, ID),
        TableSpec::external(FOOD_ENTRIES, ID),
    ]
}

/// Schema statements applied at startup.
///
/// Columns are declared without a type so SQLite stores every value exactly
/// as written.
pub const DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (id PRIMARY KEY NOT NULL, email, name, createdAt)",
    "CREATE TABLE IF NOT EXISTS profiles (id INTEGER PRIMARY KEY, actorId, weight, height, age, \
     activityLevel, gender, goal, targetCalories, proteinTarget, fatTarget, carbTarget, updatedAt)",
    "CREATE TABLE IF NOT EXISTS foodEntries (id PRIMARY KEY NOT NULL, actorId, name, calories, \
     protein, carbs, fat, quantity, imageRef, occurredAt)",
    "CREATE INDEX IF NOT EXISTS idx_profiles_actor ON profiles(actorId, updatedAt)",
    "CREATE INDEX IF NOT EXISTS idx_food_entries_actor_time ON foodEntries(actorId, occurredAt)",
];

/// Run every [`DDL`] statement against `store`.
pub async fn install(store: &dyn Store) -> Result<()> {
    for statement in DDL {
        store.execute(statement).await?;
    }
    info!(backend = store.name(), statements = DDL.len(), "schema installed");
    Ok(())
}
