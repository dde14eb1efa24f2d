// SPDX-License-Identifier: PMPL-1.0-or-later
//! Values, keys and rows.
//!
//! A [`Row`] is the generic record shape both backends exchange: column name
//! to [`Value`], ordered by column name so that equal rows compare equal
//! whichever backend produced them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    /// True for `Integer` and `Real`.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Real(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => write!(f, "'{s}'"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<Key> for Value {
    fn from(key: Key) -> Self {
        match key {
            Key::Integer(i) => Value::Integer(i),
            Key::Text(s) => Value::Text(s),
        }
    }
}

/// A primary-key value: caller-supplied text or integer, or a synthesized
/// auto-increment integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Key {
    Integer(i64),
    Text(String),
}

impl Key {
    /// Interpret `value` as a key. Only integers and text qualify.
    pub fn from_value(column: &str, value: &Value) -> Result<Key> {
        match value {
            Value::Integer(i) => Ok(Key::Integer(*i)),
            Value::Text(s) => Ok(Key::Text(s.clone())),
            other => Err(StoreError::InvalidQuery(format!(
                "key column '{column}' must be integer or text, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Key::Integer(i) => Some(*i),
            Key::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Key::Text(s) => Some(s),
            Key::Integer(_) => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Integer(i) => write!(f, "{i}"),
            Key::Text(s) => write!(f, "'{s}'"),
        }
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Key::Integer(v)
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key::Text(v.to_string())
    }
}

impl From<String> for Key {
    fn from(v: String) -> Self {
        Key::Text(v)
    }
}

/// A record: column name to value.
///
/// Rows handed to `insert`/`update` may carry `Null`, which means "no value"
/// (and, in an update, "clear this column"). Rows returned by a store never
/// contain `Null` columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row(BTreeMap<String, Value>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style `set`.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.0.remove(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Drop every `Null` column.
    pub fn without_nulls(mut self) -> Self {
        self.0.retain(|_, v| !v.is_null());
        self
    }

    /// Field merge used by `update`: columns in `changes` overwrite, `Null`
    /// clears, everything else is kept.
    pub fn merge(&mut self, changes: &Row) {
        for (column, value) in changes.iter() {
            if value.is_null() {
                self.0.remove(column);
            } else {
                self.0.insert(column.to_string(), value.clone());
            }
        }
    }

    fn required(&self, column: &str) -> Result<&Value> {
        match self.0.get(column) {
            Some(Value::Null) | None => {
                Err(StoreError::Codec(format!("missing column '{column}'")))
            }
            Some(value) => Ok(value),
        }
    }

    fn mistyped(column: &str, wanted: &str, got: &Value) -> StoreError {
        StoreError::Codec(format!(
            "column '{column}' should be {wanted}, found {}",
            got.type_name()
        ))
    }

    /// Required text column.
    pub fn text(&self, column: &str) -> Result<String> {
        self.opt_text(column)?
            .ok_or_else(|| StoreError::Codec(format!("missing column '{column}'")))
    }

    /// Required integer column.
    pub fn integer(&self, column: &str) -> Result<i64> {
        match self.required(column)? {
            Value::Integer(i) => Ok(*i),
            other => Err(Self::mistyped(column, "integer", other)),
        }
    }

    /// Required numeric column; integers are widened.
    pub fn real(&self, column: &str) -> Result<f64> {
        let value = self.required(column)?;
        value
            .as_f64()
            .ok_or_else(|| Self::mistyped(column, "numeric", value))
    }

    pub fn opt_text(&self, column: &str) -> Result<Option<String>> {
        match self.0.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Text(s)) => Ok(Some(s.clone())),
            Some(other) => Err(Self::mistyped(column, "text", other)),
        }
    }

    pub fn opt_integer(&self, column: &str) -> Result<Option<i64>> {
        match self.0.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Integer(i)) => Ok(Some(*i)),
            Some(other) => Err(Self::mistyped(column, "integer", other)),
        }
    }

    pub fn opt_real(&self, column: &str) -> Result<Option<f64>> {
        match self.0.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_f64()
                .map(Some)
                .ok_or_else(|| Self::mistyped(column, "numeric", value)),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Row(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
