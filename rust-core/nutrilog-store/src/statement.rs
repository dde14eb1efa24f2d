// SPDX-License-Identifier: PMPL-1.0-or-later
//! Validation for the `execute` escape hatch.
//!
//! Only schema definition is allowed through: `CREATE TABLE`, `CREATE INDEX`
//! and `CREATE UNIQUE INDEX`. The relational backend runs them, the document
//! backend has nothing to apply them to and ignores them. Anything else is
//! rejected on both.

use crate::error::{Result, StoreError};

/// Kind of an accepted DDL statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdlKind {
    CreateTable,
    CreateIndex,
}

/// Classify `statement`, or fail with `InvalidQuery`.
pub fn classify(statement: &str) -> Result<DdlKind> {
    let body = statement.trim().trim_end_matches(';').trim_end();
    if body.is_empty() {
        return Err(StoreError::InvalidQuery("empty statement".to_string()));
    }
    if body.contains(';') {
        return Err(StoreError::InvalidQuery(
            "only one statement may be executed at a time".to_string(),
        ));
    }

    let words: Vec<String> = body
        .split_whitespace()
        .take(3)
        .map(|w| w.to_ascii_uppercase())
        .collect();
    let words: Vec<&str> = words.iter().map(String::as_str).collect();

    match words.as_slice() {
        ["CREATE", "TABLE", ..] => Ok(DdlKind::CreateTable),
        ["CREATE", "INDEX", ..] | ["CREATE", "UNIQUE", "INDEX"] => Ok(DdlKind::CreateIndex),
        _ => Err(StoreError::InvalidQuery(format!(
            "execute only accepts CREATE TABLE / CREATE INDEX, got '{}'",
            truncate(body, 48)
        ))),
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
