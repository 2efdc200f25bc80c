//! Aggregate store: counter rows at every granularity.
//!
//! Six tables share the [`Counters`] payload:
//!
//! | bucket   | store level            | carrier level            |
//! |----------|------------------------|--------------------------|
//! | current  | `current_store_stats`  | `current_carrier_stats`  |
//! | daily    | `daily_store_stats`    | `daily_carrier_stats`    |
//! | rollup   | `rollup_store_stats`   | `rollup_carrier_stats`   |
//!
//! An [`AggregateKey`] addresses exactly one row. Writers never read-then-write:
//! - [`AggregateRepo::add`] is a single `INSERT .. ON CONFLICT .. DO UPDATE SET
//!   col = col + excluded.col`, so concurrent first writers cannot create two
//!   rows for one key.
//! - [`AggregateRepo::subtract`] is a single `UPDATE .. SET col = MAX(col - d, 0)`.
//!   A missing row is treated as already zero and reported as `false`.
//!
//! Rollup rows are only ever added to by the folder (or rebuilt); subtracting
//! from them is refused.

pub mod repo;

use chrono::NaiveDate;
use diesel::SqliteConnection;
use tracing::warn;

use crate::{
    carrier::CarrierCode,
    counters::Counters,
    period::{Granularity, PeriodKey},
};

pub use repo::SqliteAggregates;

/// Result type used throughout the aggregate store.
pub type RepoResult<T> = anyhow::Result<T>;

/// Which time bucket of a store (or store+carrier) a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    /// All-time running total.
    Current,
    /// One UTC calendar day.
    Daily(NaiveDate),
    /// A folded week/month/year.
    Rollup(Granularity, PeriodKey),
}

/// Identity of one aggregate row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AggregateKey<'a> {
    /// Owning store.
    pub store_id: i64,
    /// `None` addresses the store-level table.
    pub carrier: Option<&'a CarrierCode>,
    /// Time bucket.
    pub bucket: Bucket,
}

/// The set of rows a single parcel event touches: current-state and (when the
/// date is known) daily, at store level and, when the carrier is resolved, at
/// carrier level.
#[derive(Debug, Clone, Copy)]
pub struct Target<'a> {
    /// Owning store.
    pub store_id: i64,
    /// Resolved carrier; `None` skips carrier-level rows.
    pub carrier: Option<&'a CarrierCode>,
    /// Daily bucket; `None` skips daily rows.
    pub day: Option<NaiveDate>,
}

impl<'a> Target<'a> {
    /// Every row key this target spans.
    pub fn keys(&self) -> Vec<AggregateKey<'a>> {
        let mut scopes = vec![None];
        if let Some(c) = self.carrier {
            scopes.push(Some(c));
        }
        let mut buckets = vec![Bucket::Current];
        if let Some(d) = self.day {
            buckets.push(Bucket::Daily(d));
        }
        scopes
            .into_iter()
            .flat_map(|carrier| {
                buckets.iter().map(move |&bucket| AggregateKey {
                    store_id: self.store_id,
                    carrier,
                    bucket,
                })
            })
            .collect()
    }
}

/// One daily row as read by the folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyRow {
    /// Owning store.
    pub store_id: i64,
    /// `None` for store-level rows.
    pub carrier: Option<CarrierCode>,
    /// UTC calendar date.
    pub day: NaiveDate,
    /// Row payload.
    pub counters: Counters,
}

/// Result of summing one period's rollup rows across several stores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollupSum {
    /// How many of the requested stores had a rollup row.
    pub rows: usize,
    /// Sum over those rows.
    pub counters: Counters,
}

/// Portable surface, SQLite implementation lives in `repo.rs`.
pub trait AggregateRepo {
    /// Add `delta` to the row at `key`, creating it if absent.
    fn add(
        &self,
        conn: &mut SqliteConnection,
        key: &AggregateKey<'_>,
        delta: &Counters,
    ) -> RepoResult<()>;

    /// Subtract `delta` from the row at `key`, clamping every field at zero.
    ///
    /// Returns `false` if the row does not exist (nothing to subtract from).
    fn subtract(
        &self,
        conn: &mut SqliteConnection,
        key: &AggregateKey<'_>,
        delta: &Counters,
    ) -> RepoResult<bool>;

    /// Read one row.
    fn get(&self, conn: &mut SqliteConnection, key: &AggregateKey<'_>)
    -> RepoResult<Option<Counters>>;

    /// Sum store-level rollup rows of one period for `store_ids`.
    fn sum_rollups(
        &self,
        conn: &mut SqliteConnection,
        store_ids: &[i64],
        granularity: Granularity,
        period: PeriodKey,
    ) -> RepoResult<RollupSum>;

    /// Sum store-level daily rows with `from <= day < until` for `store_ids`.
    fn sum_daily(
        &self,
        conn: &mut SqliteConnection,
        store_ids: &[i64],
        from: NaiveDate,
        until: NaiveDate,
    ) -> RepoResult<Counters>;

    /// All daily rows (store and carrier level) with `from <= day < until`.
    fn daily_rows(
        &self,
        conn: &mut SqliteConnection,
        from: NaiveDate,
        until: NaiveDate,
    ) -> RepoResult<Vec<DailyRow>>;

    /// Delete every rollup row (store and carrier level) of one period.
    fn delete_rollups(
        &self,
        conn: &mut SqliteConnection,
        granularity: Granularity,
        period: PeriodKey,
    ) -> RepoResult<usize>;

    /// Add `delta` to every row `target` spans.
    fn contribute(
        &self,
        conn: &mut SqliteConnection,
        target: &Target<'_>,
        delta: &Counters,
    ) -> RepoResult<()> {
        for key in target.keys() {
            self.add(conn, &key, delta)?;
        }
        Ok(())
    }

    /// Subtract `delta` from every row `target` spans; missing rows are logged
    /// and skipped.
    fn retract(
        &self,
        conn: &mut SqliteConnection,
        target: &Target<'_>,
        delta: &Counters,
    ) -> RepoResult<()> {
        for key in target.keys() {
            if !self.subtract(conn, &key, delta)? {
                warn!(
                    store_id = key.store_id,
                    carrier = key.carrier.map(CarrierCode::as_str),
                    bucket = ?key.bucket,
                    "aggregate row missing on decrement, treating as zero"
                );
            }
        }
        Ok(())
    }
}
