// SPDX-License-Identifier: PMPL-1.0-or-later
//! Shared fixtures for unit tests.

use std::sync::Arc;

use nutrilog_store::{open_store, BackendKind, Store, StoreConfig};

use crate::schema;

/// A fresh store per backend, schema installed.
pub(crate) async fn stores() -> Vec<Arc<dyn Store>> {
    let mut stores = Vec::new();
    for backend in [BackendKind::Sqlite, BackendKind::Memory] {
        let store = open_store(&StoreConfig::new(backend, schema::catalog())).unwrap();
        schema::install(store.as_ref()).await.unwrap();
        stores.push(store);
    }
    stores
}
