// SPDX-License-Identifier: PMPL-1.0-or-later
//! Millisecond timestamps and calendar days (UTC).

use chrono::{DateTime, Utc};

use crate::error::{AccessorError, Result};

/// Length of a calendar day in milliseconds.
pub const DAY_MS: i64 = 86_400_000;

/// UTC midnight at or before `ms`.
pub fn day_start(ms: i64) -> Result<i64> {
    let instant = DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| AccessorError::InvalidInput(format!("timestamp {ms} is out of range")))?;
    let midnight = instant
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| AccessorError::InvalidInput(format!("no midnight for {ms}")))?;
    Ok(midnight.and_utc().timestamp_millis())
}

/// Current time in milliseconds since the epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
