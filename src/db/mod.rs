//! SQLite persistence layer.
//!
//! Each store wraps the shared `SqlitePool`. Timestamps are stored as
//! fixed-width RFC 3339 TEXT so SQL range comparisons order chronologically;
//! nested documents (target, rules, attempts, verdicts) are JSON TEXT columns.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::common::error::{VigilError, VigilResult};

/// Alert log storage.
pub mod alerts;

/// Check configuration storage.
pub mod checks;

/// Execution history storage.
pub mod executions;

/// Distributed schedule leases.
pub mod leases;

/// Serialize a timestamp for storage. Microsecond precision keeps the
/// string width fixed, so lexicographic SQL comparison matches time order.
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
pub(crate) fn parse_ts(raw: &str) -> VigilResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| VigilError::Database(format!("invalid timestamp '{raw}': {e}")))
}

/// Parse an optional stored timestamp.
pub(crate) fn parse_opt_ts(raw: Option<&str>) -> VigilResult<Option<DateTime<Utc>>> {
    raw.map(parse_ts).transpose()
}
