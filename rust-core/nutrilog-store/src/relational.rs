// SPDX-License-Identifier: PMPL-1.0-or-later
//! Relational backend: SQLite through `rusqlite`.
//!
//! Filtering, ordering, limiting and key allocation are all done by SQLite.
//! Filters are rendered to SQL that reproduces the evaluator's rules
//! exactly:
//!
//! - `col = ?` as is. Columns carry no declared type, so SQLite applies no
//!   affinity and `450` never equals `'450'`.
//! - ordering operators with a numeric argument become
//!   `(typeof(col) IN ('integer','real') AND col OP ?)`, because SQLite
//!   would otherwise order text after every number;
//! - ordering operators with a non-numeric argument can never match and
//!   render as `0`.
//!
//! Auto-increment tables use `INTEGER PRIMARY KEY` (not `AUTOINCREMENT`), so
//! SQLite allocates max(rowid) + 1 and restarts at 1 once the table is empty.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, ErrorCode};
use tracing::{debug, info, instrument};

use crate::config::{Catalog, TableSpec};
use crate::error::{Result, StoreError};
use crate::filter::{CompareOp, Filter};
use crate::query::{Direction, Query};
use crate::statement;
use crate::store::{prepare_insert, prepare_update, ConflictPolicy, Store};
use crate::value::{Key, Row, Value};

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Real(r) => ToSqlOutput::Owned(SqlValue::Real(*r)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// Identifiers are validated before they get here, so quoting cannot be
/// escaped.
fn quote(identifier: &str) -> String {
    format!("\"{identifier}\"")
}

/// Render a filter as ` WHERE ...` with `?N` placeholders numbered from
/// `first_param`. Returns an empty string for the empty filter.
///
/// `integer_key` names an `INTEGER PRIMARY KEY` column. It has integer
/// affinity, so SQLite would coerce `'7'` to `7`; equality against a
/// non-numeric argument is rendered as `0` instead.
fn render_filter(filter: &Filter, first_param: usize, integer_key: Option<&str>) -> (String, Vec<Value>) {
    let mut params = Vec::new();
    let mut clauses = Vec::with_capacity(filter.conditions().len());

    for condition in filter.conditions() {
        let column = quote(&condition.column);
        let clause = match condition.op {
            CompareOp::Eq
                if integer_key == Some(condition.column.as_str())
                    && !condition.value.is_numeric() =>
            {
                "0".to_string()
            }
            CompareOp::Eq => {
                params.push(condition.value.clone());
                format!("{column} = ?{}", first_param + params.len() - 1)
            }
            op if condition.value.is_numeric() => {
                params.push(condition.value.clone());
                format!(
                    "(typeof({column}) IN ('integer', 'real') AND {column} {} ?{})",
                    op.as_sql(),
                    first_param + params.len() - 1
                )
            }
            _ => "0".to_string(),
        };
        clauses.push(clause);
    }

    if clauses.is_empty() {
        (String::new(), params)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), params)
    }
}

fn integer_key(spec: &TableSpec) -> Option<&str> {
    spec.is_auto_increment().then_some(spec.key_column.as_str())
}

fn is_key_conflict(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => {
            failure.code == ErrorCode::ConstraintViolation
                && (failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE)
        }
        _ => false,
    }
}

fn read_value(column: &str, value: ValueRef<'_>) -> Result<Value> {
    match value {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(i) => Ok(Value::Integer(i)),
        ValueRef::Real(r) => Ok(Value::Real(r)),
        ValueRef::Text(bytes) => String::from_utf8(bytes.to_vec())
            .map(Value::Text)
            .map_err(|e| StoreError::Codec(format!("column '{column}' is not UTF-8: {e}"))),
        ValueRef::Blob(_) => Err(StoreError::Codec(format!(
            "column '{column}' holds a blob, which rows cannot carry"
        ))),
    }
}

/// Connection plus a cache of each table's columns.
struct Session {
    conn: Connection,
    columns: HashMap<String, HashSet<String>>,
}

impl Session {
    fn new(conn: Connection) -> Self {
        Self {
            conn,
            columns: HashMap::new(),
        }
    }

    /// Columns of `table`, or `None` if it does not exist yet.
    fn table_columns(&mut self, table: &str) -> Result<Option<HashSet<String>>> {
        if let Some(cached) = self.columns.get(table) {
            return Ok(Some(cached.clone()));
        }
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote(table)))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<HashSet<String>>>()?;
        drop(stmt);

        if names.is_empty() {
            return Ok(None);
        }
        self.columns.insert(table.to_string(), names.clone());
        Ok(Some(names))
    }

    /// Create the table on first write and add any column it lacks.
    fn ensure_columns<'a>(
        &mut self,
        spec: &TableSpec,
        wanted: impl Iterator<Item = &'a str>,
    ) -> Result<()> {
        let existing = match self.table_columns(&spec.name)? {
            Some(columns) => columns,
            None => {
                let key_decl = if spec.is_auto_increment() {
                    "INTEGER PRIMARY KEY"
                } else {
                    "PRIMARY KEY NOT NULL"
                };
                self.conn.execute(
                    &format!(
                        "CREATE TABLE IF NOT EXISTS {} ({} {key_decl})",
                        quote(&spec.name),
                        quote(&spec.key_column)
                    ),
                    [],
                )?;
                debug!(table = %spec.name, "created table");
                HashSet::from([spec.key_column.clone()])
            }
        };

        let mut columns = existing;
        for column in wanted {
            if columns.contains(column) {
                continue;
            }
            self.conn.execute(
                &format!("ALTER TABLE {} ADD COLUMN {}", quote(&spec.name), quote(column)),
                [],
            )?;
            debug!(table = %spec.name, column, "added column");
            columns.insert(column.to_string());
        }
        self.columns.insert(spec.name.clone(), columns);
        Ok(())
    }

    fn insert(&mut self, spec: &TableSpec, row: &Row, explicit: Option<Key>, policy: ConflictPolicy) -> Result<Key> {
        self.ensure_columns(spec, row.columns())?;

        let verb = match policy {
            ConflictPolicy::Replace => "INSERT OR REPLACE",
            ConflictPolicy::Ignore => "INSERT OR IGNORE",
            ConflictPolicy::Fail => "INSERT",
        };
        let columns: Vec<String> = row.columns().map(quote).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "{verb} INTO {} ({}) VALUES ({})",
            quote(&spec.name),
            columns.join(", "),
            placeholders.join(", ")
        );
        let values: Vec<&Value> = row.iter().map(|(_, v)| v).collect();

        match self.conn.execute(&sql, params_from_iter(values)) {
            Ok(_) => {}
            Err(err) if is_key_conflict(&err) => {
                return Err(StoreError::Conflict {
                    table: spec.name.clone(),
                    key: explicit.map_or_else(|| "?".to_string(), |k| k.to_string()),
                })
            }
            Err(err) => return Err(err.into()),
        }

        Ok(explicit.unwrap_or_else(|| Key::Integer(self.conn.last_insert_rowid())))
    }

    /// True if the table exists and has every column the filter names.
    /// A missing column can never match, so the caller may skip the engine.
    fn filter_applies(&mut self, table: &str, filter: &Filter) -> Result<Option<HashSet<String>>> {
        let Some(columns) = self.table_columns(table)? else {
            return Ok(None);
        };
        let all_known = filter
            .conditions()
            .iter()
            .all(|c| columns.contains(&c.column));
        Ok(all_known.then_some(columns))
    }

    fn query(&mut self, spec: &TableSpec, query: &Query) -> Result<Vec<Row>> {
        let Some(columns) = self.filter_applies(&spec.name, &query.filter)? else {
            return Ok(Vec::new());
        };

        let (where_sql, params) = render_filter(&query.filter, 1, integer_key(spec));
        let mut sql = format!("SELECT * FROM {}{where_sql}", quote(&spec.name));
        if let Some(order_by) = query.order_by.as_ref().filter(|o| columns.contains(&o.column)) {
            let direction = match order_by.direction {
                Direction::Asc => "ASC",
                Direction::Desc => "DESC",
            };
            sql.push_str(&format!(" ORDER BY {} {direction}", quote(&order_by.column)));
        }
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", i64::try_from(limit).unwrap_or(i64::MAX)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;

        let mut results = Vec::new();
        while let Some(sql_row) = rows.next()? {
            let mut row = Row::new();
            for (idx, name) in names.iter().enumerate() {
                let value = read_value(name, sql_row.get_ref(idx)?)?;
                if !value.is_null() {
                    row.set(name.clone(), value);
                }
            }
            results.push(row);
        }
        Ok(results)
    }

    fn update(&mut self, spec: &TableSpec, changes: &Row, filter: &Filter) -> Result<u64> {
        if self.filter_applies(&spec.name, filter)?.is_none() {
            return Ok(0);
        }
        self.ensure_columns(spec, changes.columns())?;

        let assignments: Vec<String> = changes
            .columns()
            .enumerate()
            .map(|(i, column)| format!("{} = ?{}", quote(column), i + 1))
            .collect();
        let (where_sql, filter_params) =
            render_filter(filter, changes.len() + 1, integer_key(spec));
        let sql = format!(
            "UPDATE {} SET {}{where_sql}",
            quote(&spec.name),
            assignments.join(", ")
        );

        let params: Vec<&Value> = changes
            .iter()
            .map(|(_, v)| v)
            .chain(filter_params.iter())
            .collect();
        let touched = self.conn.execute(&sql, params_from_iter(params))?;
        Ok(touched as u64)
    }

    fn delete(&mut self, spec: &TableSpec, filter: &Filter) -> Result<u64> {
        if self.filter_applies(&spec.name, filter)?.is_none() {
            return Ok(0);
        }
        let (where_sql, params) = render_filter(filter, 1, integer_key(spec));
        let sql = format!("DELETE FROM {}{where_sql}", quote(&spec.name));
        let removed = self.conn.execute(&sql, params_from_iter(params.iter()))?;
        Ok(removed as u64)
    }

    fn execute(&mut self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        // The statement may have created a table or changed its shape.
        self.columns.clear();
        Ok(())
    }
}

/// [`Store`] backed by a SQLite database.
///
/// # Example
///
/// ```rust
/// use nutrilog_store::{Catalog, ConflictPolicy, Query, Row, SqliteStore, Store, TableSpec};
///
/// # tokio_test::block_on(async {
/// let catalog = Catalog::new(vec![TableSpec::auto_increment("profiles", "id")]).unwrap();
/// let store = SqliteStore::in_memory(catalog).unwrap();
///
/// let key = store
///     .insert("profiles", Row::new().with("weight", 70), ConflictPolicy::Fail)
///     .await
///     .unwrap();
/// assert_eq!(key.as_integer(), Some(1));
/// assert_eq!(store.query("profiles", &Query::all()).await.unwrap().len(), 1);
/// # });
/// ```
pub struct SqliteStore {
    session: Arc<Mutex<Option<Session>>>,
    catalog: Arc<Catalog>,
}

impl SqliteStore {
    /// Open or create a database file.
    pub fn open(path: impl AsRef<Path>, catalog: Catalog) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Backend(format!("create {}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "opened sqlite store");
        Ok(Self::from_connection(conn, catalog))
    }

    /// A private in-memory database.
    pub fn in_memory(catalog: Catalog) -> Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?, catalog))
    }

    fn from_connection(conn: Connection, catalog: Catalog) -> Self {
        Self {
            session: Arc::new(Mutex::new(Some(Session::new(conn)))),
            catalog: Arc::new(catalog),
        }
    }

    fn spec(&self, table: &str) -> Result<TableSpec> {
        self.catalog.resolve(table).cloned()
    }

    /// Run `op` on the blocking pool with the open session.
    async fn with_session<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Session) -> Result<T> + Send + 'static,
    {
        let session = Arc::clone(&self.session);
        tokio::task::spawn_blocking(move || {
            let mut guard = session
                .lock()
                .map_err(|_| StoreError::Backend("sqlite session lock poisoned".to_string()))?;
            let session = guard.as_mut().ok_or(StoreError::Closed)?;
            op(session)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("task join: {e}")))?
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("tables", &self.catalog.len())
            .finish()
    }
}

#[async_trait]
impl Store for SqliteStore {
    #[instrument(level = "debug", skip(self, row), fields(backend = "sqlite"))]
    async fn insert(&self, table: &str, row: Row, policy: ConflictPolicy) -> Result<Key> {
        let spec = self.spec(table)?;
        let (row, explicit) = prepare_insert(&spec, row)?;
        self.with_session(move |s| s.insert(&spec, &row, explicit, policy))
            .await
    }

    #[instrument(level = "debug", skip(self, query), fields(backend = "sqlite", filter = %query.filter))]
    async fn query(&self, table: &str, query: &Query) -> Result<Vec<Row>> {
        let spec = self.spec(table)?;
        query.validate()?;
        let query = query.clone();
        let rows = self
            .with_session(move |s| s.query(&spec, &query))
            .await?;
        debug!(rows = rows.len(), "query complete");
        Ok(rows)
    }

    #[instrument(level = "debug", skip(self, changes, filter), fields(backend = "sqlite", filter = %filter))]
    async fn update(&self, table: &str, changes: Row, filter: &Filter) -> Result<u64> {
        let spec = self.spec(table)?;
        prepare_update(&spec, &changes, filter)?;
        let filter = filter.clone();
        self.with_session(move |s| s.update(&spec, &changes, &filter))
            .await
    }

    #[instrument(level = "debug", skip(self, filter), fields(backend = "sqlite", filter = %filter))]
    async fn delete(&self, table: &str, filter: &Filter) -> Result<u64> {
        let spec = self.spec(table)?;
        filter.validate()?;
        let filter = filter.clone();
        self.with_session(move |s| s.delete(&spec, &filter))
            .await
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        let sql = sql.to_string();
        self.with_session(move |s| {
            let kind = statement::classify(&sql)?;
            debug!(?kind, "executing schema statement");
            s.execute(&sql)
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let session = Arc::clone(&self.session);
        tokio::task::spawn_blocking(move || {
            let mut guard = session
                .lock()
                .map_err(|_| StoreError::Backend("sqlite session lock poisoned".to_string()))?;
            if let Some(open) = guard.take() {
                open.conn.close().map_err(|(_, e)| StoreError::from(e))?;
                info!("closed sqlite store");
            }
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Backend(format!("task join: {e}")))?
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}
