// SPDX-License-Identifier: PMPL-1.0-or-later
//
// NutriLog entity accessors.
//
// One accessor per table, each holding the injected `Arc<dyn Store>` and
// translating domain calls into store calls. Also home to the two external
// boundaries the accessors need: photo recognition and the current session.
//
// # Modules
//
// - [`users`], [`profiles`], [`food_entries`] -- Entities and accessors.
// - [`schema`] -- Table catalog and startup DDL.
// - [`recognition`] -- `Recognizer` trait and the HTTP client.
// - [`session`] -- `SessionProvider` trait.
// - [`clock`] -- UTC day arithmetic.
// - [`error`] -- `AccessorError`.
//
// # Example
//
// ```rust
// use nutrilog_accessors::{schema, FoodEntry, FoodEntryAccessor, Macros};
// use nutrilog_store::{open_store, BackendKind, StoreConfig};
//
// # tokio_test::block_on(async {
// let store = open_store(&StoreConfig::new(BackendKind::Sqlite, schema::catalog())).unwrap();
// schema::install(store.as_ref()).await.unwrap();
//
// let entries = FoodEntryAccessor::new(store);
// entries
//     .add(&FoodEntry {
//         id: "e1".into(),
//         actor_id: "u1".into(),
//         name: "Porridge".into(),
//         macros: Macros { calories: 450.0, protein: 12.0, carbs: 70.0, fat: 9.0 },
//         quantity: 1.0,
//         image_ref: None,
//         occurred_at: 1_700_010_000_000,
//     })
//     .await
//     .unwrap();
// let totals = entries.daily_totals("u1", 1_700_010_000_000).await.unwrap();
// assert_eq!(totals.macros.calories, 450.0);
// # });
// ```

pub mod clock;
pub mod error;
pub mod food_entries;
pub mod profiles;
pub mod recognition;
pub mod schema;
pub mod session;
pub mod users;

#[cfg(test)]
mod testing;

pub use clock::{day_start, DAY_MS};
pub use error::{AccessorError, Result};
pub use food_entries::{DailyTotals, FoodEntry, FoodEntryAccessor, Macros};
pub use profiles::{Profile, ProfileAccessor, Targets};
pub use recognition::{
    HttpRecognizer, NutritionEstimate, RecognitionError, Recognizer, RecognizerConfig,
};
pub use session::{SessionProvider, StaticSession};
pub use users::{User, UserAccessor};
