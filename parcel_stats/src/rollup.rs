//! Folding daily rows into week/month/year rollups.
//!
//! [`fold_date`] is strictly additive: folding the same date twice counts it
//! twice. [`fold_date_once`] adds a per-date marker in `rollup_fold_log`, and
//! [`rebuild_period`] recomputes one period from its closed daily rows,
//! replacing whatever the rollup rows held and marking those dates folded.

use anyhow::{Context, bail};
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    aggregate::{AggregateKey, AggregateRepo, Bucket, DailyRow},
    carrier::CarrierCode,
    period::{Granularity, PeriodKey},
    schema::rollup_fold_log,
    tz,
};

/// Outcome of folding one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FoldReport {
    /// UTC date that was folded.
    pub day: NaiveDate,
    /// Store-level daily rows folded.
    pub store_rows: usize,
    /// Carrier-level daily rows folded.
    pub carrier_rows: usize,
    /// Rows whose fold failed and was rolled back.
    pub failed: usize,
    /// The date was already in the fold log and nothing was done.
    pub already_folded: bool,
}

impl FoldReport {
    fn empty(day: NaiveDate) -> Self {
        FoldReport {
            day,
            store_rows: 0,
            carrier_rows: 0,
            failed: 0,
            already_folded: false,
        }
    }
}

/// Outcome of rebuilding one rollup period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    /// Rollup rows removed before re-adding.
    pub deleted: usize,
    /// Daily rows summed into the period.
    pub daily_rows: usize,
    /// First day not summed: the period end, or today if the period is open.
    pub until: NaiveDate,
    /// Dates newly recorded in the fold log.
    pub marked: usize,
}

fn fold_row(
    conn: &mut SqliteConnection,
    repo: &impl AggregateRepo,
    row: &DailyRow,
) -> anyhow::Result<()> {
    for g in Granularity::ROLLUPS {
        let key = AggregateKey {
            store_id: row.store_id,
            carrier: row.carrier.as_ref(),
            bucket: Bucket::Rollup(g, g.period_key(row.day)),
        };
        repo.add(conn, &key, &row.counters)?;
    }
    Ok(())
}

fn day_after(day: NaiveDate) -> anyhow::Result<NaiveDate> {
    day.succ_opt().with_context(|| format!("no day after {day}"))
}

/// How each daily row's fold is isolated from the others.
#[derive(Clone, Copy)]
enum RowScope {
    /// Top level: every row gets its own `BEGIN IMMEDIATE`.
    Immediate,
    /// Inside an open transaction: every row gets a savepoint.
    Savepoint,
}

fn fold_rows(
    conn: &mut SqliteConnection,
    repo: &impl AggregateRepo,
    day: NaiveDate,
    scope: RowScope,
) -> anyhow::Result<FoldReport> {
    let rows = repo.daily_rows(conn, day, day_after(day)?)?;
    let mut report = FoldReport::empty(day);

    for row in &rows {
        let folded = match scope {
            RowScope::Immediate => {
                conn.immediate_transaction::<_, anyhow::Error, _>(|c| fold_row(c, repo, row))
            }
            RowScope::Savepoint => conn.transaction::<_, anyhow::Error, _>(|c| fold_row(c, repo, row)),
        };
        match folded {
            Ok(()) if row.carrier.is_some() => report.carrier_rows += 1,
            Ok(()) => report.store_rows += 1,
            Err(e) => {
                report.failed += 1;
                warn!(
                    %day,
                    store_id = row.store_id,
                    carrier = row.carrier.as_ref().map(CarrierCode::as_str),
                    error = %e,
                    "daily row fold failed"
                );
            }
        }
    }

    info!(
        %day,
        store_rows = report.store_rows,
        carrier_rows = report.carrier_rows,
        failed = report.failed,
        "date folded"
    );
    Ok(report)
}

/// Add every daily row dated `day` into its week, month and year rollups.
///
/// Each row folds in its own transaction; a failing row is logged, counted
/// in [`FoldReport::failed`] and skipped. Must not run inside a transaction.
pub fn fold_date(
    conn: &mut SqliteConnection,
    repo: &impl AggregateRepo,
    day: NaiveDate,
) -> anyhow::Result<FoldReport> {
    fold_rows(conn, repo, day, RowScope::Immediate)
}

/// Insert the fold marker for `day`. Returns `false` if it was already there.
fn mark_folded(conn: &mut SqliteConnection, day: NaiveDate, now: DateTime<Utc>) -> anyhow::Result<bool> {
    let inserted = diesel::insert_into(rollup_fold_log::table)
        .values((
            rollup_fold_log::day.eq(day),
            rollup_fold_log::folded_at.eq(tz::to_rfc3339_millis(now)),
        ))
        .on_conflict(rollup_fold_log::day)
        .do_nothing()
        .execute(conn)?;
    Ok(inserted == 1)
}

/// [`fold_date`] guarded by `rollup_fold_log`: a date is folded at most once.
///
/// The marker and the row folds commit in one transaction, so a crash
/// leaves the date either folded and marked or neither. Each row still
/// folds under its own savepoint: a failing row is skipped and the marker
/// is kept for the rows that went in.
pub fn fold_date_once(
    conn: &mut SqliteConnection,
    repo: &impl AggregateRepo,
    day: NaiveDate,
    now: DateTime<Utc>,
) -> anyhow::Result<FoldReport> {
    conn.immediate_transaction::<_, anyhow::Error, _>(|c| {
        if !mark_folded(c, day, now)? {
            info!(%day, "date already folded, skipping");
            return Ok(FoldReport {
                already_folded: true,
                ..FoldReport::empty(day)
            });
        }
        fold_rows(c, repo, day, RowScope::Savepoint)
    })
}

/// Recompute the rollup rows of one period from daily rows.
///
/// Only days before `now`'s UTC date are summed, since today's daily rows are
/// still growing. Every summed date is recorded in `rollup_fold_log`, so the
/// nightly [`fold_date_once`] will not add it a second time. Fails for a
/// period with no closed day yet.
///
/// Run inside a transaction so readers never see the period half rebuilt.
pub fn rebuild_period(
    conn: &mut SqliteConnection,
    repo: &impl AggregateRepo,
    granularity: Granularity,
    period: PeriodKey,
    now: DateTime<Utc>,
) -> anyhow::Result<RebuildReport> {
    if granularity == Granularity::Day {
        bail!("day is not a rollup granularity");
    }
    let start = granularity
        .period_start(period)
        .with_context(|| format!("invalid {granularity} period {}/{}", period.year, period.number))?;
    let end = granularity
        .next(start)
        .with_context(|| format!("{granularity} period starting {start} has no end"))?;
    let until = end.min(now.date_naive());
    if until <= start {
        bail!("{granularity} period starting {start} has no closed day yet");
    }

    let deleted = repo.delete_rollups(conn, granularity, period)?;
    let rows = repo.daily_rows(conn, start, until)?;
    for row in &rows {
        let key = AggregateKey {
            store_id: row.store_id,
            carrier: row.carrier.as_ref(),
            bucket: Bucket::Rollup(granularity, period),
        };
        repo.add(conn, &key, &row.counters)?;
    }

    let mut marked = 0;
    for day in start.iter_days().take_while(|d| *d < until) {
        if mark_folded(conn, day, now)? {
            marked += 1;
        }
    }

    info!(
        granularity = %granularity,
        year = period.year,
        number = period.number,
        deleted,
        daily_rows = rows.len(),
        marked,
        %until,
        "rollup period rebuilt"
    );
    Ok(RebuildReport {
        deleted,
        daily_rows: rows.len(),
        until,
        marked,
    })
}
