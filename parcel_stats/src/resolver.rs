//! Period queries: one entry per period between two instants, answered from
//! rollups when every requested store has one, otherwise from daily rows.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use diesel::SqliteConnection;
use serde::Serialize;
use tracing::debug;

use crate::{
    aggregate::AggregateRepo,
    counters::{Counters, FixedDays},
    error::StatsError,
    period::Granularity,
    tz,
};

/// A period-stats request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodQuery {
    /// Stores to sum over.
    pub store_ids: BTreeSet<i64>,
    /// Period size.
    pub granularity: Granularity,
    /// Inclusive range start.
    pub from: DateTime<Utc>,
    /// Inclusive range end.
    pub to: DateTime<Utc>,
    /// Zone the range and the period boundaries are read in.
    pub zone: Tz,
}

/// Totals of one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodStats {
    /// Human label: `2025-03-01`, `Week 9`, `March 2025`, `2025`.
    pub label: String,
    /// First day of the period.
    pub period_start: NaiveDate,
    /// Parcels sent.
    pub sent: i64,
    /// Parcels delivered.
    pub delivered: i64,
    /// Parcels returned.
    pub returned: i64,
    /// Sum of arrival-to-outcome days.
    pub sum_delivery_days: FixedDays,
    /// Sum of arrival-to-pickup days.
    pub sum_pickup_days: FixedDays,
    /// Granularity that actually answered: the query's own when a complete
    /// rollup was used, `day` after a fallback.
    pub source: Granularity,
}

impl PeriodStats {
    fn new(granularity: Granularity, start: NaiveDate, counters: Counters, source: Granularity) -> Self {
        PeriodStats {
            label: granularity.label(start),
            period_start: start,
            sent: counters.sent,
            delivered: counters.delivered,
            returned: counters.returned,
            sum_delivery_days: counters.sum_delivery_days,
            sum_pickup_days: counters.sum_pickup_days,
            source,
        }
    }
}

/// Resolve `query` into chronologically ordered, zero-filled period entries.
pub fn get_period_stats(
    conn: &mut SqliteConnection,
    repo: &impl AggregateRepo,
    query: &PeriodQuery,
) -> anyhow::Result<Vec<PeriodStats>> {
    let g = query.granularity;
    let from = tz::local_date(query.from, query.zone);
    let to = tz::local_date(query.to, query.zone);
    if from > to {
        return Err(StatsError::InvalidRange { from, to }.into());
    }

    let store_ids: Vec<i64> = query.store_ids.iter().copied().collect();
    let last = g.align(to);
    let mut cursor = g.align(from);
    let mut out = Vec::new();

    loop {
        let next = g.next(cursor);
        let until = next.unwrap_or(NaiveDate::MAX);

        let mut answered = None;
        if g != Granularity::Day && !store_ids.is_empty() {
            let rollup = repo.sum_rollups(conn, &store_ids, g, g.period_key(cursor))?;
            if rollup.rows == store_ids.len() {
                answered = Some(PeriodStats::new(g, cursor, rollup.counters, g));
            } else {
                debug!(
                    period = %g.label(cursor),
                    rollups = rollup.rows,
                    stores = store_ids.len(),
                    "incomplete rollup coverage, summing daily rows"
                );
            }
        }
        let stats = match answered {
            Some(stats) => stats,
            None => {
                let daily = repo.sum_daily(conn, &store_ids, cursor, until)?;
                PeriodStats::new(g, cursor, daily, Granularity::Day)
            }
        };
        out.push(stats);

        match next {
            Some(n) if n <= last => cursor = n,
            _ => break,
        }
    }
    Ok(out)
}
