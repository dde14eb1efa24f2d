// SPDX-License-Identifier: PMPL-1.0-or-later
//
// NutriLog persistence core.
//
// One storage contract, the `Store` trait, with two interchangeable backends:
// a relational one on SQLite and a document one on any `nutrilog_kv`
// engine. Callers describe what they want with typed filters and queries and
// get the same rows back from either backend.
//
// # Modules
//
// - [`store`] -- The `Store` trait, conflict policies and `open_store`.
// - [`value`] -- `Value`, `Key` and `Row`, the data model.
// - [`filter`] -- Conjunctive filters and the shared evaluator.
// - [`query`] -- Ordering, limits and the cross-type sort order.
// - [`codec`] -- Typed records <-> rows <-> JSON documents.
// - [`config`] -- Backend selection, table catalog, environment loading.
// - [`statement`] -- The schema statements `execute` accepts.
// - [`relational`] -- `SqliteStore`.
// - [`document`] -- `DocumentStore`.
// - [`error`] -- `StoreError`.
//
// # Example
//
// ```rust
// use nutrilog_store::{open_store, BackendKind, ConflictPolicy, Filter, OrderBy, Query, Row, StoreConfig, TableSpec};
//
// # tokio_test::block_on(async {
// let config = StoreConfig::new(
//     BackendKind::Memory,
//     vec![TableSpec::external("foodEntries", "id")],
// );
// let store = open_store(&config).unwrap();
//
// for (id, at) in [("e1", 30), ("e2", 10)] {
//     let row = Row::new().with("id", id).with("actorId", "u1").with("occurredAt", at);
//     store.insert("foodEntries", row, ConflictPolicy::Fail).await.unwrap();
// }
//
// let query = Query::filter(Filter::all().eq("actorId", "u1")).order_by(OrderBy::asc("occurredAt"));
// let rows = store.query("foodEntries", &query).await.unwrap();
// assert_eq!(rows[0].text("id").unwrap(), "e2");
// # });
// ```

pub mod codec;
pub mod config;
pub mod document;
pub mod error;
pub mod filter;
pub mod query;
pub mod relational;
pub mod statement;
pub mod store;
pub mod value;

pub use codec::{decode_all, Record};
pub use config::{BackendKind, Catalog, KeyPolicy, StoreConfig, TableSpec};
pub use document::DocumentStore;
pub use error::{Result, StoreError};
pub use filter::{CompareOp, Condition, Filter};
pub use query::{Direction, OrderBy, Query};
pub use relational::SqliteStore;
pub use store::{open_store, ConflictPolicy, Store};
pub use value::{Key, Row, Value};
