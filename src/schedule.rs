//! Five-field cron parsing and next-run computation.
//!
//! Schedules use standard five-field cron (minute, hour, day-of-month, month,
//! day-of-week). The `cron` crate wants a seconds field, so parsing pins it
//! to `0`, keeping schedules at minute resolution.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::common::error::{VigilError, VigilResult};

/// Parse a five-field cron expression.
pub fn parse(expr: &str) -> VigilResult<Schedule> {
    let fields = expr.split_whitespace().count();
    if fields != 5 {
        return Err(VigilError::Validation(format!(
            "invalid cron expression '{expr}': expected 5 fields, got {fields}"
        )));
    }
    Schedule::from_str(&format!("0 {expr}"))
        .map_err(|e| VigilError::Validation(format!("invalid cron expression '{expr}': {e}")))
}

/// The first firing instant strictly after `after`.
pub fn next_run(schedule: &Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&after).next()
}
