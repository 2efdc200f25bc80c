//! Time zone parsing and conversion helpers.
//!
//! What this module provides:
//! - [`parse_zone`]: Parse an IANA zone name (e.g., "Europe/Minsk") into a [`Tz`].
//! - [`parse_ts_to_utc`] / [`parse_opt_ts`]: Parse the RFC-3339 text stored in
//!   `delivery_history` back into UTC instants.
//! - [`to_rfc3339_millis`]: The one format every timestamp column is written in.
//! - [`local_date`]: The calendar date of an instant as seen from a caller's zone.
//! - [`start_of_day_utc`]: The first instant of a local calendar day, in UTC.
//!
//! Notes:
//! - Daily aggregates are keyed by the UTC calendar date. Caller zones only
//!   matter when a period query decides which calendar dates belong to which
//!   period (see [`crate::resolver`]).
//! - Some zones skip or repeat midnight on DST changes (e.g., "America/Santiago").
//!   [`start_of_day_utc`] resolves those with [`DstPolicy::Lenient`].

use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::StatsError;

/// Parse an IANA time zone name.
pub fn parse_zone(name: &str) -> Result<Tz, StatsError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| StatsError::UnknownZone(name.to_string()))
}

/// RFC-3339 with offset -> UTC.
///
/// Example:
/// - "2025-03-01T09:30:00+03:00" -> "2025-03-01T06:30:00Z"
pub fn parse_ts_to_utc(s: &str) -> anyhow::Result<DateTime<Utc>> {
    let dt = DateTime::parse_from_rfc3339(s).with_context(|| format!("bad rfc3339: {s}"))?;
    Ok(dt.with_timezone(&Utc))
}

/// Parse an optional stored timestamp column.
pub fn parse_opt_ts(s: Option<&str>) -> anyhow::Result<Option<DateTime<Utc>>> {
    s.map(parse_ts_to_utc).transpose()
}

/// Format a UTC datetime as an RFC-3339 string with millisecond precision.
pub fn to_rfc3339_millis(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Calendar date of `ts` in `zone`.
pub fn local_date(ts: DateTime<Utc>, zone: Tz) -> NaiveDate {
    ts.with_timezone(&zone).date_naive()
}

/// Policy for handling DST edge cases when converting local naive timestamps to UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DstPolicy {
    /// Error on ambiguous (fall-back) or nonexistent (spring-forward) local times.
    Strict,
    /// Earliest instant on ambiguity; shift forward through a gap.
    Lenient,
}

/// Convert a naive local timestamp to UTC using a specific zone and DST policy.
///
/// Under [`DstPolicy::Lenient`] a nonexistent local time is nudged forward one
/// minute at a time (capped at 2 hours) until it lands on a valid instant.
pub fn from_local_naive_with_policy(
    naive: NaiveDateTime,
    tz: Tz,
    policy: DstPolicy,
) -> anyhow::Result<DateTime<Utc>> {
    use chrono::offset::LocalResult::*;
    match (tz.from_local_datetime(&naive), policy) {
        (Single(dt), _) => Ok(dt.with_timezone(&Utc)),
        (Ambiguous(a, _), DstPolicy::Lenient) => Ok(a.with_timezone(&Utc)),
        (Ambiguous(..), DstPolicy::Strict) => Err(anyhow::anyhow!("ambiguous local time")),
        (None, DstPolicy::Lenient) => {
            let mut t = naive;
            for _ in 0..120 {
                t += chrono::Duration::minutes(1);
                if let Single(dt) = tz.from_local_datetime(&t) {
                    return Ok(dt.with_timezone(&Utc));
                }
            }
            Err(anyhow::anyhow!("nonexistent local time"))
        }
        (None, DstPolicy::Strict) => Err(anyhow::anyhow!("nonexistent local time")),
    }
}

/// First instant of `date` in `zone`, as UTC.
pub fn start_of_day_utc(date: NaiveDate, zone: Tz) -> anyhow::Result<DateTime<Utc>> {
    from_local_naive_with_policy(date.and_time(chrono::NaiveTime::MIN), zone, DstPolicy::Lenient)
}
