// SPDX-License-Identifier: PMPL-1.0-or-later
//! Record codec.
//!
//! Two conversions live here:
//!
//! - typed entity <-> [`Row`], through the [`Record`] trait that entity types
//!   implement;
//! - [`Row`] <-> JSON document, the form the document backend persists.
//!
//! JSON keeps integer and real apart (`3` vs `3.0`), so a row read back from
//! the document store carries exactly the value types that were written.

use serde_json::{Map, Number, Value as Json};

use crate::error::{Result, StoreError};
use crate::value::{Row, Value};

/// A typed entity stored as one row of one table.
pub trait Record: Sized {
    /// Table holding this entity.
    const TABLE: &'static str;

    /// Flatten into a row. `Null` columns are allowed and mean "absent".
    fn to_row(&self) -> Row;

    /// Rebuild from a row, failing with [`StoreError::Codec`] when a
    /// required column is missing or has the wrong type.
    fn from_row(row: &Row) -> Result<Self>;
}

/// Decode every row of a query result.
pub fn decode_all<R: Record>(rows: &[Row]) -> Result<Vec<R>> {
    rows.iter().map(R::from_row).collect()
}

/// Encode a row as a JSON object. `Null` columns are dropped.
pub fn row_to_document(row: &Row) -> Result<Map<String, Json>> {
    let mut doc = Map::new();
    for (column, value) in row.iter() {
        let json = match value {
            Value::Null => continue,
            Value::Integer(i) => Json::Number(Number::from(*i)),
            Value::Real(r) => Json::Number(Number::from_f64(*r).ok_or_else(|| {
                StoreError::Codec(format!("column '{column}' holds non-finite real {r}"))
            })?),
            Value::Text(s) => Json::String(s.clone()),
        };
        doc.insert(column.to_string(), json);
    }
    Ok(doc)
}

/// Decode a JSON object produced by [`row_to_document`].
pub fn document_to_row(doc: &Map<String, Json>) -> Result<Row> {
    let mut row = Row::new();
    for (column, json) in doc {
        let value = match json {
            Json::Null => continue,
            Json::Number(n) => number_to_value(column, n)?,
            Json::String(s) => Value::Text(s.clone()),
            other => {
                return Err(StoreError::Codec(format!(
                    "column '{column}' holds unsupported JSON value {other}"
                )))
            }
        };
        row.set(column.clone(), value);
    }
    Ok(row)
}

fn number_to_value(column: &str, n: &Number) -> Result<Value> {
    if let Some(i) = n.as_i64() {
        return Ok(Value::Integer(i));
    }
    n.as_f64()
        .map(Value::Real)
        .ok_or_else(|| StoreError::Codec(format!("column '{column}' holds unrepresentable number {n}")))
}
