// SPDX-License-Identifier: PMPL-1.0-or-later
//
// NutriLog key-value layer.
//
// The document backend of the persistence core has nothing but a byte-keyed
// store underneath it. This crate defines that store (`KvBackend`), ships two
// engines for it, and layers per-table keyspaces on top so several tables can
// share one physical store.
//
// # Modules
//
// - [`backend`] -- The `KvBackend` trait (get/put/delete/prefix scan/batches).
// - [`error`] -- The `KvError` enum covering all backend failure modes.
// - [`memory`] -- An in-memory `BTreeMap` engine for tests and ephemeral use.
// - [`keyspace`] -- A serde-based, namespace-prefixed view of one table.
// - [`redb_backend`] -- The persistent engine (feature `redb-backend`).
//
// # Example
//
// ```rust
// use nutrilog_kv::keyspace::Keyspace;
// use nutrilog_kv::memory::InMemoryBackend;
//
// # tokio_test::block_on(async {
// let users = Keyspace::new(InMemoryBackend::new(), "users");
// users.put("tu1", &serde_json::json!({"name": "Ada"})).await.unwrap();
//
// let doc: serde_json::Value = users.get("tu1").await.unwrap().unwrap();
// assert_eq!(doc["name"], "Ada");
// # });
// ```

pub mod backend;
pub mod error;
pub mod keyspace;
pub mod memory;

#[cfg(feature = "redb-backend")]
pub mod redb_backend;

pub use backend::KvBackend;
pub use error::KvError;
pub use keyspace::Keyspace;
pub use memory::InMemoryBackend;

#[cfg(feature = "redb-backend")]
pub use redb_backend::RedbBackend;
