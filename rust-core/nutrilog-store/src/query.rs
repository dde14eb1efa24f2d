// SPDX-License-Identifier: PMPL-1.0-or-later
//! Query shape: filter, ordering and limit.
//!
//! Ordering follows SQLite's cross-type rules so both backends sort alike:
//! absent/null first, then numbers by value (integer and real interleaved),
//! then text in byte order. `DESC` reverses the whole order.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{Result, StoreError};
use crate::filter::{compare_numeric, Filter};
use crate::value::{Row, Value};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// `ORDER BY column [ASC|DESC]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Desc,
        }
    }

    /// Parse `"column"`, `"column ASC"` or `"column DESC"` (keyword case
    /// does not matter).
    pub fn parse(text: &str) -> Result<Self> {
        let mut parts = text.split_whitespace();
        let column = parts
            .next()
            .ok_or_else(|| StoreError::InvalidQuery("empty ORDER BY".to_string()))?;
        crate::config::validate_identifier("column", column)?;

        let direction = match parts.next() {
            None => Direction::Asc,
            Some(word) if word.eq_ignore_ascii_case("asc") => Direction::Asc,
            Some(word) if word.eq_ignore_ascii_case("desc") => Direction::Desc,
            Some(word) => {
                return Err(StoreError::InvalidQuery(format!(
                    "unsupported ORDER BY direction '{word}'"
                )))
            }
        };
        if let Some(extra) = parts.next() {
            return Err(StoreError::InvalidQuery(format!(
                "unexpected '{extra}' in ORDER BY '{text}'"
            )));
        }

        Ok(Self {
            column: column.to_string(),
            direction,
        })
    }

    /// Compare two rows under this ordering.
    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        let ordering = compare_sort_values(a.get(&self.column), b.get(&self.column));
        match self.direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        }
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Asc => write!(f, "{} ASC", self.column),
            Direction::Desc => write!(f, "{} DESC", self.column),
        }
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Integer(_)) | Some(Value::Real(_)) => 1,
        Some(Value::Text(_)) => 2,
    }
}

/// Total order over optional column values.
pub fn compare_sort_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Some(Value::Text(x)), Some(Value::Text(y))) => x.as_bytes().cmp(y.as_bytes()),
        (Some(x), Some(y)) => compare_numeric(x, y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

/// Everything `query` needs besides the table name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub filter: Filter,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    /// Every row, in whatever order the backend enumerates them.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filter(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Build from the string form used by callers that carry raw clauses.
    pub fn parse(
        where_clause: Option<&str>,
        where_args: &[Value],
        order_by: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Self> {
        Ok(Self {
            filter: Filter::parse(where_clause.unwrap_or(""), where_args)?,
            order_by: order_by.map(OrderBy::parse).transpose()?,
            limit,
        })
    }

    pub fn order_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = Some(order_by);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.filter.validate()?;
        if let Some(order_by) = &self.order_by {
            crate::config::validate_identifier("column", &order_by.column)?;
        }
        Ok(())
    }

    /// Sort (stable) and truncate rows that already passed the filter.
    pub fn finish(&self, mut rows: Vec<Row>) -> Vec<Row> {
        if let Some(order_by) = &self.order_by {
            rows.sort_by(|a, b| order_by.compare(a, b));
        }
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
        rows
    }
}
