// SPDX-License-Identifier: PMPL-1.0-or-later
//! WHERE clauses: typed builder, string parser and evaluator.
//!
//! A [`Filter`] is a conjunction of [`Condition`]s, each `column OP value`
//! with `OP` one of `=`, `>=`, `<`, `<=`. There is no OR, NOT, LIKE, IN or
//! grouping.
//!
//! Filters are normally built directly:
//!
//! ```rust
//! use nutrilog_store::Filter;
//!
//! let day = Filter::all()
//!     .eq("actorId", "u1")
//!     .ge("occurredAt", 1_700_000_000_000i64)
//!     .lt("occurredAt", 1_700_086_400_000i64);
//! assert_eq!(day.conditions().len(), 3);
//! ```
//!
//! The string form `"actorId = ? AND occurredAt >= ?"` plus positional
//! arguments is accepted by [`Filter::parse`], which produces the same typed
//! value or fails with `InvalidQuery`. A fragment it does not understand is
//! never dropped.

use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Result, StoreError};
use crate::value::{Row, Value};

/// Comparison operator of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }

    fn from_sql(token: &str) -> Option<Self> {
        match token {
            "=" => Some(CompareOp::Eq),
            ">=" => Some(CompareOp::Ge),
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Le),
            _ => None,
        }
    }

    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ge => ordering != Ordering::Less,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// One bound condition: `column OP value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub op: CompareOp,
    pub value: Value,
}

impl Condition {
    pub fn new(column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    /// Evaluate against one row.
    ///
    /// A missing column never matches. Numbers compare numerically; any
    /// other pairing only ever satisfies `=`, and only by exact equality.
    pub fn matches(&self, row: &Row) -> bool {
        let Some(actual) = row.get(&self.column) else {
            return false;
        };
        if let Some(ordering) = compare_numeric(actual, &self.value) {
            return self.op.accepts(ordering);
        }
        match (self.op, actual, &self.value) {
            (CompareOp::Eq, Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.column, self.op, self.value)
    }
}

/// Numeric ordering when both sides are numbers, `None` otherwise.
///
/// Integer against real is exact, like SQLite: no rounding of integers
/// beyond 2^53.
pub(crate) fn compare_numeric(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some(x.cmp(y)),
        (Value::Real(x), Value::Real(y)) => x.partial_cmp(y),
        (Value::Integer(x), Value::Real(y)) => compare_int_real(*x, *y),
        (Value::Real(x), Value::Integer(y)) => compare_int_real(*y, *x).map(Ordering::reverse),
        _ => None,
    }
}

fn compare_int_real(int: i64, real: f64) -> Option<Ordering> {
    // 2^63: the first real above every i64.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if real.is_nan() {
        return None;
    }
    if real >= LIMIT {
        return Some(Ordering::Less);
    }
    if real < -LIMIT {
        return Some(Ordering::Greater);
    }
    // In range, so the truncated real is an exact i64.
    let whole = real.trunc();
    match int.cmp(&(whole as i64)) {
        Ordering::Equal => whole.partial_cmp(&real),
        unequal => Some(unequal),
    }
}

/// A conjunction of conditions. The empty filter matches every row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    /// The filter with no conditions.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(Condition::new(column, CompareOp::Eq, value))
    }

    pub fn ge(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(Condition::new(column, CompareOp::Ge, value))
    }

    pub fn lt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(Condition::new(column, CompareOp::Lt, value))
    }

    pub fn le(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(Condition::new(column, CompareOp::Le, value))
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// True when every condition holds for `row`.
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|c| c.matches(row))
    }

    /// Reject conditions naming an unusable column.
    pub fn validate(&self) -> Result<()> {
        for condition in &self.conditions {
            crate::config::validate_identifier("column", &condition.column)?;
        }
        Ok(())
    }

    /// Parse `"col OP ? AND col OP ? ..."` and bind `args` left to right.
    ///
    /// A blank clause with no arguments is [`Filter::all`]. Every fragment
    /// must be one of `col = ?`, `col >= ?`, `col < ?`, `col <= ?`, and the
    /// number of placeholders must equal the number of arguments.
    pub fn parse(clause: &str, args: &[Value]) -> Result<Filter> {
        if clause.trim().is_empty() {
            if args.is_empty() {
                return Ok(Filter::all());
            }
            return Err(StoreError::InvalidQuery(format!(
                "{} argument(s) supplied for an empty WHERE clause",
                args.len()
            )));
        }

        let mut filter = Filter::all();
        let mut args_iter = args.iter();
        for (position, fragment) in and_separator().split(clause).enumerate() {
            let captures = fragment_pattern().captures(fragment).ok_or_else(|| {
                StoreError::InvalidQuery(format!("unsupported WHERE fragment '{}'", fragment.trim()))
            })?;
            let op = CompareOp::from_sql(&captures[2]).ok_or_else(|| {
                StoreError::InvalidQuery(format!("unsupported operator '{}'", &captures[2]))
            })?;
            let value = args_iter.next().ok_or_else(|| {
                StoreError::InvalidQuery(format!(
                    "placeholder {} in '{}' has no argument",
                    position + 1,
                    clause
                ))
            })?;
            filter = filter.and(Condition::new(&captures[1], op, value.clone()));
        }

        let surplus = args_iter.count();
        if surplus > 0 {
            return Err(StoreError::InvalidQuery(format!(
                "{surplus} argument(s) left over after binding '{clause}'"
            )));
        }
        Ok(filter)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conditions.is_empty() {
            return f.write_str("<all>");
        }
        for (i, condition) in self.conditions.iter().enumerate() {
            if i > 0 {
                f.write_str(" AND ")?;
            }
            write!(f, "{condition}")?;
        }
        Ok(())
    }
}

fn and_separator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+AND\s+").expect("static regex"))
}

fn fragment_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*(>=|<=|=|<)\s*\?\s*$").expect("static regex")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(calories: i64) -> Row {
        Row::new()
            .with("actorId", "u1")
            .with("calories", calories)
            .with("fat", 2.5)
    }

    #[test]
    fn test_parse_binds_in_order() {
        let filter = Filter::parse(
            "calories >= ? AND calories <= ?",
            &[Value::from(100), Value::from(300)],
        )
        .unwrap();
        assert_eq!(
            filter,
            Filter::all().ge("calories", 100).le("calories", 300)
        );
    }

    #[test]
    fn test_parse_tolerates_spacing() {
        let filter = Filter::parse("actorId=?  AND   occurredAt< ?", &["u1".into(), 5.into()]).unwrap();
        assert_eq!(filter.conditions()[0].op, CompareOp::Eq);
        assert_eq!(filter.conditions()[1].op, CompareOp::Lt);
        assert_eq!(filter.conditions()[1].column, "occurredAt");
    }

    #[test]
    fn test_parse_blank_clause() {
        assert!(Filter::parse("  ", &[]).unwrap().is_empty());
        assert!(matches!(
            Filter::parse("", &[Value::from(1)]),
            Err(StoreError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_parse_rejects_unsupported_forms() {
        let one = [Value::from(1)];
        for clause in [
            "calories > ?",
            "calories != ?",
            "name LIKE ?",
            "id IN (?)",
            "a = ? OR b = ?",
            "calories = 5",
            "(calories = ?)",
            "calories = ? and fat = ?",
            "calories = ? AND",
            "1calories = ?",
        ] {
            assert!(
                matches!(Filter::parse(clause, &one), Err(StoreError::InvalidQuery(_))),
                "clause {clause:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_placeholder_mismatch() {
        assert!(matches!(
            Filter::parse("a = ? AND b = ?", &[Value::from(1)]),
            Err(StoreError::InvalidQuery(msg)) if msg.contains("placeholder 2")
        ));
        assert!(matches!(
            Filter::parse("a = ?", &[Value::from(1), Value::from(2)]),
            Err(StoreError::InvalidQuery(msg)) if msg.contains("left over")
        ));
    }

    #[test]
    fn test_range_is_inclusive() {
        let filter = Filter::all().ge("calories", 100).le("calories", 300);
        assert!(filter.matches(&entry(100)));
        assert!(filter.matches(&entry(300)));
        assert!(!filter.matches(&entry(99)));
        assert!(!filter.matches(&entry(301)));
    }

    #[test]
    fn test_integer_and_real_compare_numerically() {
        assert!(Filter::all().eq("calories", 100.0).matches(&entry(100)));
        assert!(Filter::all().lt("fat", 3).matches(&entry(0)));
        assert!(!Filter::all().ge("fat", 2.6).matches(&entry(0)));
    }

    #[test]
    fn test_large_integers_compare_exactly_with_reals() {
        // 2^53 + 1 has no f64 of its own.
        let row = Row::new().with("n", 9_007_199_254_740_993i64);
        assert!(!Filter::all().eq("n", 9_007_199_254_740_992.0).matches(&row));
        assert!(Filter::all().ge("n", 9_007_199_254_740_992.0).matches(&row));
        assert!(!Filter::all().le("n", 9_007_199_254_740_992.0).matches(&row));

        let cmp = |i: i64, r: f64| compare_numeric(&Value::from(i), &Value::from(r));
        assert_eq!(cmp(i64::MAX, 9_223_372_036_854_775_808.0), Some(Ordering::Less));
        assert_eq!(cmp(i64::MIN, -9_223_372_036_854_775_808.0), Some(Ordering::Equal));
        assert_eq!(cmp(-5, -5.5), Some(Ordering::Greater));
        assert_eq!(cmp(-6, -5.5), Some(Ordering::Less));
        assert_eq!(cmp(3, 3.0), Some(Ordering::Equal));
        assert_eq!(cmp(3, f64::NAN), None);
        assert_eq!(
            compare_numeric(&Value::from(2.5), &Value::from(2)),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn test_text_only_supports_equality() {
        let row = entry(0);
        assert!(Filter::all().eq("actorId", "u1").matches(&row));
        assert!(!Filter::all().eq("actorId", "u2").matches(&row));
        assert!(!Filter::all().ge("actorId", "a").matches(&row));
        assert!(!Filter::all().le("calories", "zzz").matches(&row));
        assert!(!Filter::all().eq("calories", "0").matches(&row));
    }

    #[test]
    fn test_missing_column_and_null_never_match() {
        let row = entry(0);
        assert!(!Filter::all().eq("quantity", 1).matches(&row));
        assert!(!Filter::all().eq("actorId", Value::Null).matches(&row));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(Filter::all().matches(&Row::new()));
    }

    #[test]
    fn test_display() {
        let filter = Filter::all().eq("actorId", "u1").lt("occurredAt", 10);
        assert_eq!(filter.to_string(), "actorId = 'u1' AND occurredAt < 10");
        assert_eq!(Filter::all().to_string(), "<all>");
    }
}
