// SPDX-License-Identifier: PMPL-1.0-or-later
//! Behaviour every `Store` implementation must share.
//!
//! Each check is written once against `Arc<dyn Store>` and instantiated for
//! SQLite, the in-memory document store and the redb document store.

use std::sync::Arc;

use nutrilog_store::{
    open_store, BackendKind, ConflictPolicy, Filter, Key, OrderBy, Query, Row, Store,
    StoreConfig, StoreError, TableSpec, Value,
};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

const DAY_MS: i64 = 86_400_000;

fn tables() -> Vec<TableSpec> {
    vec![
        TableSpec::external("users", "id"),
        TableSpec::auto_increment("profiles", "id"),
        TableSpec::external("foodEntries", "id"),
    ]
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A store plus whatever keeps its files alive.
struct Fixture {
    store: Arc<dyn Store>,
    _dir: Option<TempDir>,
}

fn sqlite_fixture() -> Fixture {
    init_tracing();
    let config = StoreConfig::new(BackendKind::Sqlite, tables());
    Fixture {
        store: open_store(&config).unwrap(),
        _dir: None,
    }
}

fn memory_fixture() -> Fixture {
    init_tracing();
    let config = StoreConfig::new(BackendKind::Memory, tables());
    Fixture {
        store: open_store(&config).unwrap(),
        _dir: None,
    }
}

fn redb_fixture() -> Fixture {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let config = StoreConfig::new(BackendKind::Redb, tables()).with_data_dir(dir.path());
    Fixture {
        store: open_store(&config).unwrap(),
        _dir: Some(dir),
    }
}

fn entry(id: &str, actor: &str, calories: impl Into<Value>, occurred_at: i64) -> Row {
    Row::new()
        .with("id", id)
        .with("actorId", actor)
        .with("name", format!("meal {id}"))
        .with("calories", calories)
        .with("occurredAt", occurred_at)
}

fn ids(rows: &[Row]) -> Vec<String> {
    rows.iter().map(|r| r.text("id").unwrap()).collect()
}

fn sorted_ids(rows: &[Row]) -> Vec<String> {
    let mut ids = ids(rows);
    ids.sort();
    ids
}

async fn insert_all(store: &dyn Store, rows: Vec<Row>) {
    for row in rows {
        store
            .insert("foodEntries", row, ConflictPolicy::Fail)
            .await
            .unwrap();
    }
}

// ===========================================================================
// Checks
// ===========================================================================

async fn check_auto_increment_is_monotonic(store: Arc<dyn Store>) {
    let mut keys = Vec::new();
    for weight in [60, 61, 62, 63, 64] {
        let row = Row::new().with("actorId", "u1").with("weight", weight);
        keys.push(store.insert("profiles", row, ConflictPolicy::Fail).await.unwrap());
    }
    let expected: Vec<Key> = (1..=5).map(Key::Integer).collect();
    assert_eq!(keys, expected);

    // The synthesized key is visible as a column.
    let rows = store
        .query("profiles", &Query::all().order_by(OrderBy::asc("id")))
        .await
        .unwrap();
    let visible: Vec<i64> = rows.iter().map(|r| r.integer("id").unwrap()).collect();
    assert_eq!(visible, vec![1, 2, 3, 4, 5]);

    // A lower key disappearing never lowers the next allocation.
    store.delete("profiles", &Filter::all().eq("id", 2)).await.unwrap();
    let next = store
        .insert("profiles", Row::new().with("weight", 70), ConflictPolicy::Fail)
        .await
        .unwrap();
    assert_eq!(next, Key::Integer(6));

    // Max + 1: removing the highest key lets it be reallocated.
    store.delete("profiles", &Filter::all().eq("id", 6)).await.unwrap();
    let next = store
        .insert("profiles", Row::new().with("weight", 71), ConflictPolicy::Fail)
        .await
        .unwrap();
    assert_eq!(next, Key::Integer(6));

    // An emptied table starts over at 1.
    store.delete("profiles", &Filter::all()).await.unwrap();
    let next = store
        .insert("profiles", Row::new().with("weight", 72), ConflictPolicy::Fail)
        .await
        .unwrap();
    assert_eq!(next, Key::Integer(1));
}

async fn check_explicit_key_on_auto_increment_table(store: Arc<dyn Store>) {
    let row = Row::new().with("id", 10).with("weight", 80);
    let key = store.insert("profiles", row, ConflictPolicy::Fail).await.unwrap();
    assert_eq!(key, Key::Integer(10));

    let next = store
        .insert("profiles", Row::new().with("weight", 81), ConflictPolicy::Fail)
        .await
        .unwrap();
    assert_eq!(next, Key::Integer(11));

    let dup = store
        .insert("profiles", Row::new().with("id", 10).with("weight", 1), ConflictPolicy::Fail)
        .await;
    assert!(matches!(dup, Err(StoreError::Conflict { .. })));
}

async fn check_negative_keys_allocate_max_plus_one(store: Arc<dyn Store>) {
    let row = Row::new().with("id", -5).with("weight", 80);
    store.insert("profiles", row, ConflictPolicy::Fail).await.unwrap();

    let next = store
        .insert("profiles", Row::new().with("weight", 81), ConflictPolicy::Fail)
        .await
        .unwrap();
    assert_eq!(next, Key::Integer(-4));

    let row = Row::new().with("id", -10).with("weight", 82);
    store.insert("profiles", row, ConflictPolicy::Fail).await.unwrap();
    let next = store
        .insert("profiles", Row::new().with("weight", 83), ConflictPolicy::Fail)
        .await
        .unwrap();
    assert_eq!(next, Key::Integer(-3));
}

async fn check_conflict_policies(store: Arc<dyn Store>) {
    let original = Row::new()
        .with("id", "u1")
        .with("email", "a@x.io")
        .with("name", "Ada");
    store
        .insert("users", original.clone(), ConflictPolicy::Fail)
        .await
        .unwrap();
    let by_id = Query::filter(Filter::all().eq("id", "u1"));

    // Ignore: untouched, still reports the key.
    let key = store
        .insert(
            "users",
            Row::new().with("id", "u1").with("email", "ignored@x.io"),
            ConflictPolicy::Ignore,
        )
        .await
        .unwrap();
    assert_eq!(key, Key::from("u1"));
    assert_eq!(store.query("users", &by_id).await.unwrap(), vec![original.clone()]);

    // Fail: Conflict and no write.
    let err = store
        .insert(
            "users",
            Row::new().with("id", "u1").with("email", "failed@x.io"),
            ConflictPolicy::Fail,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict { ref table, .. } if table == "users"));
    assert_eq!(store.query("users", &by_id).await.unwrap(), vec![original]);

    // Replace: the old row is gone entirely, `name` included.
    let replacement = Row::new().with("id", "u1").with("email", "b@x.io");
    store
        .insert("users", replacement.clone(), ConflictPolicy::Replace)
        .await
        .unwrap();
    assert_eq!(store.query("users", &by_id).await.unwrap(), vec![replacement]);
}

async fn check_where_range_is_inclusive(store: Arc<dyn Store>) {
    insert_all(
        store.as_ref(),
        vec![
            entry("e300", "u1", 300, 5),
            entry("e50", "u1", 50, 1),
            entry("e301", "u1", 301, 6),
            entry("e100", "u1", 100, 2),
            entry("e200", "u1", 200.5, 3),
            entry("etext", "u1", "250", 4),
        ],
    )
    .await;

    let rows = store
        .query_where(
            "foodEntries",
            Some("calories >= ? AND calories <= ?"),
            &[Value::from(100), Value::from(300)],
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(sorted_ids(&rows), vec!["e100", "e200", "e300"]);
}

async fn check_update_is_a_merge(store: Arc<dyn Store>) {
    insert_all(
        store.as_ref(),
        vec![entry("e1", "u1", 450, 1).with("protein", 10)],
    )
    .await;

    let touched = store
        .update(
            "foodEntries",
            Row::new().with("calories", 250),
            &Filter::all().eq("id", "e1"),
        )
        .await
        .unwrap();
    assert_eq!(touched, 1);

    let rows = store.query("foodEntries", &Query::all()).await.unwrap();
    assert_eq!(rows[0].integer("calories").unwrap(), 250);
    assert_eq!(rows[0].integer("protein").unwrap(), 10);
    assert_eq!(rows[0].text("name").unwrap(), "meal e1");

    let none = store
        .update(
            "foodEntries",
            Row::new().with("calories", 1),
            &Filter::all().eq("id", "nope"),
        )
        .await
        .unwrap();
    assert_eq!(none, 0);
}

async fn check_update_adds_and_clears_columns(store: Arc<dyn Store>) {
    insert_all(store.as_ref(), vec![entry("e1", "u1", 450, 1)]).await;

    store
        .update(
            "foodEntries",
            Row::new().with("imageRef", "img-1").with("name", Value::Null),
            &Filter::all().eq("id", "e1"),
        )
        .await
        .unwrap();

    let row = store.query("foodEntries", &Query::all()).await.unwrap().remove(0);
    assert_eq!(row.text("imageRef").unwrap(), "img-1");
    assert!(!row.contains("name"));
}

async fn check_empty_results_are_not_errors(store: Arc<dyn Store>) {
    // Declared but never written.
    assert!(store.query("foodEntries", &Query::all()).await.unwrap().is_empty());
    assert_eq!(store.delete("foodEntries", &Filter::all()).await.unwrap(), 0);

    insert_all(store.as_ref(), vec![entry("e1", "u1", 450, 1)]).await;
    let miss = Query::filter(Filter::all().eq("actorId", "nobody"));
    assert!(store.query("foodEntries", &miss).await.unwrap().is_empty());

    // A column no row has is simply never matched.
    let unknown = Query::filter(Filter::all().eq("mood", "happy"));
    assert!(store.query("foodEntries", &unknown).await.unwrap().is_empty());

    // Undeclared tables are a different matter.
    assert!(matches!(
        store.query("drinks", &Query::all()).await,
        Err(StoreError::NotFound(_))
    ));
}

async fn check_day_query_end_to_end(store: Arc<dyn Store>) {
    let day_start = 1_700_006_400_000i64;
    let t = day_start + 12 * 3_600_000;
    insert_all(
        store.as_ref(),
        vec![
            entry("e1", "u1", 450, t),
            entry("e0", "u1", 300, day_start - 1),
            entry("e2", "u1", 200, day_start + DAY_MS),
            entry("e3", "u2", 100, t),
        ],
    )
    .await;

    let rows = store
        .query_where(
            "foodEntries",
            Some("actorId = ? AND occurredAt >= ? AND occurredAt < ?"),
            &[
                Value::from("u1"),
                Value::from(day_start),
                Value::from(day_start + DAY_MS),
            ],
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(rows, vec![entry("e1", "u1", 450, t)]);
}

async fn check_order_and_limit(store: Arc<dyn Store>) {
    insert_all(
        store.as_ref(),
        vec![
            entry("b", "u1", 2, 20),
            entry("d", "u1", 4, 40),
            entry("a", "u1", 1, 10),
            entry("c", "u1", 3, 30),
        ],
    )
    .await;

    let newest_two = Query::all().order_by(OrderBy::desc("occurredAt")).limit(2);
    let rows = store.query("foodEntries", &newest_two).await.unwrap();
    assert_eq!(ids(&rows), vec!["d", "c"]);

    let rows = store
        .query_where("foodEntries", None, &[], Some("occurredAt ASC"), Some(3))
        .await
        .unwrap();
    assert_eq!(ids(&rows), vec!["a", "b", "c"]);

    let none = Query::all().limit(0);
    assert!(store.query("foodEntries", &none).await.unwrap().is_empty());
}

async fn check_mixed_type_ordering(store: Arc<dyn Store>) {
    insert_all(
        store.as_ref(),
        vec![
            Row::new().with("id", "text").with("rank", "10"),
            Row::new().with("id", "real").with("rank", 2.5),
            Row::new().with("id", "absent"),
            Row::new().with("id", "int").with("rank", 3),
            Row::new().with("id", "upper").with("rank", "B"),
            Row::new().with("id", "lower").with("rank", "a"),
        ],
    )
    .await;

    let rows = store
        .query("foodEntries", &Query::all().order_by(OrderBy::asc("rank")))
        .await
        .unwrap();
    assert_eq!(ids(&rows), vec!["absent", "real", "int", "text", "upper", "lower"]);

    let rows = store
        .query("foodEntries", &Query::all().order_by(OrderBy::desc("rank")))
        .await
        .unwrap();
    assert_eq!(ids(&rows), vec!["lower", "upper", "text", "int", "real", "absent"]);
}

async fn check_text_never_equals_number(store: Arc<dyn Store>) {
    insert_all(
        store.as_ref(),
        vec![entry("num", "u1", 450, 1), entry("txt", "u1", "450", 2)],
    )
    .await;

    let rows = store
        .query("foodEntries", &Query::filter(Filter::all().eq("calories", 450)))
        .await
        .unwrap();
    assert_eq!(ids(&rows), vec!["num"]);

    let rows = store
        .query("foodEntries", &Query::filter(Filter::all().eq("calories", 450.0)))
        .await
        .unwrap();
    assert_eq!(ids(&rows), vec!["num"]);

    let rows = store
        .query("foodEntries", &Query::filter(Filter::all().eq("calories", "450")))
        .await
        .unwrap();
    assert_eq!(ids(&rows), vec!["txt"]);

    // Ordering operators never match text, on either side.
    let rows = store
        .query("foodEntries", &Query::filter(Filter::all().ge("calories", 0)))
        .await
        .unwrap();
    assert_eq!(ids(&rows), vec!["num"]);
    let rows = store
        .query("foodEntries", &Query::filter(Filter::all().le("name", "zzz")))
        .await
        .unwrap();
    assert!(rows.is_empty());
}

async fn check_malformed_clauses_fail_without_effect(store: Arc<dyn Store>) {
    insert_all(store.as_ref(), vec![entry("e1", "u1", 450, 1)]).await;

    let bad = [
        ("calories > ?", vec![Value::from(1)]),
        ("calories = ? OR calories = ?", vec![Value::from(1), Value::from(2)]),
        ("name LIKE ?", vec![Value::from("m%")]),
        ("calories = ?", vec![]),
        ("calories = ?", vec![Value::from(1), Value::from(2)]),
        ("calories = 450", vec![]),
        ("actorId = ? and calories = ?", vec![Value::from("u1"), Value::from(450)]),
    ];
    for (clause, args) in bad {
        let result = store
            .query_where("foodEntries", Some(clause), &args, None, None)
            .await;
        assert!(
            matches!(result, Err(StoreError::InvalidQuery(_))),
            "'{clause}' should be rejected, got {result:?}"
        );
    }

    let bad_order = store
        .query_where("foodEntries", None, &[], Some("occurredAt; DROP TABLE x"), None)
        .await;
    assert!(matches!(bad_order, Err(StoreError::InvalidQuery(_))));

    let bad_column = store
        .delete("foodEntries", &Filter::all().eq("a\"b", 1))
        .await;
    assert!(matches!(bad_column, Err(StoreError::InvalidQuery(_))));
    assert_eq!(store.query("foodEntries", &Query::all()).await.unwrap().len(), 1);
}

async fn check_invalid_writes(store: Arc<dyn Store>) {
    let empty = store.insert("users", Row::new(), ConflictPolicy::Fail).await;
    assert!(matches!(empty, Err(StoreError::InvalidQuery(_))));

    let keyless = store
        .insert("users", Row::new().with("email", "a@x.io"), ConflictPolicy::Fail)
        .await;
    assert!(matches!(keyless, Err(StoreError::InvalidQuery(_))));

    let real_key = store
        .insert("users", Row::new().with("id", 1.5), ConflictPolicy::Fail)
        .await;
    assert!(matches!(real_key, Err(StoreError::InvalidQuery(_))));

    let rekey = store
        .update("users", Row::new().with("id", "u2"), &Filter::all())
        .await;
    assert!(matches!(rekey, Err(StoreError::InvalidQuery(_))));

    let undeclared = store
        .insert("drinks", Row::new().with("id", 1), ConflictPolicy::Fail)
        .await;
    assert!(matches!(undeclared, Err(StoreError::NotFound(_))));
}

async fn check_non_finite_reals_are_rejected(store: Arc<dyn Store>) {
    insert_all(store.as_ref(), vec![entry("e1", "u1", 450, 1)]).await;

    for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        let inserted = store
            .insert("foodEntries", entry("e2", "u1", bad, 2), ConflictPolicy::Fail)
            .await;
        assert!(matches!(inserted, Err(StoreError::Codec(_))), "insert of {bad}");

        let updated = store
            .update(
                "foodEntries",
                Row::new().with("calories", bad),
                &Filter::all().eq("id", "e1"),
            )
            .await;
        assert!(matches!(updated, Err(StoreError::Codec(_))), "update of {bad}");
    }

    let rows = store.query("foodEntries", &Query::all()).await.unwrap();
    assert_eq!(ids(&rows), vec!["e1"]);
    assert_eq!(rows[0].get("calories"), Some(&Value::Integer(450)));
}

async fn check_large_integers_compare_exactly(store: Arc<dyn Store>) {
    // 2^53 + 1 against the nearest real, 2^53.
    let big = 9_007_199_254_740_993i64;
    let near = 9_007_199_254_740_992.0;
    insert_all(
        store.as_ref(),
        vec![entry("int", "u1", big, 1), entry("real", "u1", near, 2)],
    )
    .await;

    let equal = store
        .query("foodEntries", &Query::filter(Filter::all().eq("calories", near)))
        .await
        .unwrap();
    assert_eq!(ids(&equal), vec!["real"]);

    let above = store
        .query("foodEntries", &Query::filter(Filter::all().ge("calories", big)))
        .await
        .unwrap();
    assert_eq!(ids(&above), vec!["int"]);

    let ordered = store
        .query(
            "foodEntries",
            &Query::all().order_by(OrderBy::desc("calories")),
        )
        .await
        .unwrap();
    assert_eq!(ids(&ordered), vec!["int", "real"]);
}

async fn check_delete_counts(store: Arc<dyn Store>) {
    insert_all(
        store.as_ref(),
        vec![
            entry("a", "u1", 1, 1),
            entry("b", "u1", 2, 2),
            entry("c", "u2", 3, 3),
        ],
    )
    .await;

    let removed = store
        .delete("foodEntries", &Filter::all().eq("actorId", "u1"))
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(store.delete("foodEntries", &Filter::all()).await.unwrap(), 1);
    assert!(store.query("foodEntries", &Query::all()).await.unwrap().is_empty());
}

async fn check_execute_accepts_schema_statements_only(store: Arc<dyn Store>) {
    store
        .execute("CREATE TABLE IF NOT EXISTS foodEntries (id PRIMARY KEY NOT NULL, actorId, occurredAt)")
        .await
        .unwrap();
    store
        .execute("CREATE INDEX IF NOT EXISTS idx_food_entries_actor ON foodEntries(actorId, occurredAt)")
        .await
        .unwrap();
    insert_all(store.as_ref(), vec![entry("e1", "u1", 450, 1)]).await;
    assert_eq!(store.query("foodEntries", &Query::all()).await.unwrap().len(), 1);

    for statement in ["DROP TABLE foodEntries", "DELETE FROM foodEntries", "", "   "] {
        assert!(
            matches!(store.execute(statement).await, Err(StoreError::InvalidQuery(_))),
            "'{statement}' should be rejected"
        );
    }
    assert_eq!(store.query("foodEntries", &Query::all()).await.unwrap().len(), 1);
}

async fn check_close_is_idempotent(store: Arc<dyn Store>) {
    insert_all(store.as_ref(), vec![entry("e1", "u1", 450, 1)]).await;
    store.close().await.unwrap();
    store.close().await.unwrap();

    assert!(matches!(
        store.query("foodEntries", &Query::all()).await,
        Err(StoreError::Closed)
    ));
    assert!(matches!(
        store
            .insert("foodEntries", entry("e2", "u1", 1, 1), ConflictPolicy::Fail)
            .await,
        Err(StoreError::Closed)
    ));

    // Closed wins over statement validation.
    for statement in ["CREATE INDEX i ON foodEntries(actorId)", "DROP TABLE foodEntries"] {
        assert!(
            matches!(store.execute(statement).await, Err(StoreError::Closed)),
            "'{statement}' after close"
        );
    }
}

// ===========================================================================
// Instantiation
// ===========================================================================

macro_rules! on_every_backend {
    ($($check:ident),* $(,)?) => {
        mod sqlite {
            $(
                #[tokio::test]
                async fn $check() {
                    let fixture = super::sqlite_fixture();
                    super::$check(fixture.store.clone()).await;
                }
            )*
        }

        mod memory {
            $(
                #[tokio::test]
                async fn $check() {
                    let fixture = super::memory_fixture();
                    super::$check(fixture.store.clone()).await;
                }
            )*
        }

        mod redb {
            $(
                #[tokio::test]
                async fn $check() {
                    let fixture = super::redb_fixture();
                    super::$check(fixture.store.clone()).await;
                }
            )*
        }
    };
}

on_every_backend!(
    check_auto_increment_is_monotonic,
    check_explicit_key_on_auto_increment_table,
    check_negative_keys_allocate_max_plus_one,
    check_conflict_policies,
    check_where_range_is_inclusive,
    check_update_is_a_merge,
    check_update_adds_and_clears_columns,
    check_empty_results_are_not_errors,
    check_day_query_end_to_end,
    check_order_and_limit,
    check_mixed_type_ordering,
    check_text_never_equals_number,
    check_malformed_clauses_fail_without_effect,
    check_invalid_writes,
    check_non_finite_reals_are_rejected,
    check_large_integers_compare_exactly,
    check_delete_counts,
    check_execute_accepts_schema_statements_only,
    check_close_is_idempotent,
);

// ===========================================================================
// Persistence
// ===========================================================================

async fn survives_reopen(backend: BackendKind) {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let config = StoreConfig::new(backend, tables()).with_data_dir(dir.path());

    let store = open_store(&config).unwrap();
    for weight in [60, 61, 62] {
        store
            .insert("profiles", Row::new().with("weight", weight), ConflictPolicy::Fail)
            .await
            .unwrap();
    }
    store.delete("profiles", &Filter::all().eq("id", 1)).await.unwrap();
    store.close().await.unwrap();
    drop(store);

    let store = open_store(&config).unwrap();
    let rows = store
        .query("profiles", &Query::all().order_by(OrderBy::asc("id")))
        .await
        .unwrap();
    assert_eq!(
        rows,
        vec![
            Row::new().with("id", 2).with("weight", 61),
            Row::new().with("id", 3).with("weight", 62),
        ]
    );
    let next = store
        .insert("profiles", Row::new().with("weight", 63), ConflictPolicy::Fail)
        .await
        .unwrap();
    assert_eq!(next, Key::Integer(4));
    store.close().await.unwrap();
}

#[tokio::test]
async fn test_sqlite_file_survives_reopen() {
    survives_reopen(BackendKind::Sqlite).await;
}

#[tokio::test]
async fn test_redb_file_survives_reopen() {
    survives_reopen(BackendKind::Redb).await;
}

#[tokio::test]
async fn test_redb_requires_data_dir() {
    let config = StoreConfig::new(BackendKind::Redb, tables());
    assert!(matches!(open_store(&config), Err(StoreError::InvalidQuery(_))));
}

#[tokio::test]
async fn test_backend_names() {
    assert_eq!(sqlite_fixture().store.name(), "sqlite");
    assert_eq!(memory_fixture().store.name(), "document/in-memory");
    assert_eq!(redb_fixture().store.name(), "document/redb");
}
