//! [`StatsEngine`]: the entry points lifecycle handlers, the scheduler and
//! reporting call.
//!
//! Every mutating entry point runs in one `BEGIN IMMEDIATE` transaction, so
//! the include gate, the counter upserts and the history updates commit or
//! roll back together. [`StatsEngine::fold_date`] is the exception: each
//! daily row folds in its own transaction.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, NaiveDate, Utc};
use diesel::{Connection, SqliteConnection};

use crate::{
    aggregate::{AggregateKey, AggregateRepo, Bucket, SqliteAggregates},
    carrier::{CarrierClassifier, CarrierCode},
    contributor::{self, SavedEvent},
    counters::Counters,
    models::{DeliveryHistory, Parcel},
    period::{Granularity, PeriodKey},
    resolver::{self, PeriodQuery, PeriodStats},
    rollback,
    rollup::{self, FoldReport, RebuildReport},
    status::ParcelStatus,
};

/// Source of "now". Decides today's daily bucket and stamps missing outcome dates.
pub trait Clock {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A settable clock for tests and replays. Millisecond resolution.
#[derive(Debug)]
pub struct FixedClock(AtomicI64);

impl FixedClock {
    /// Clock frozen at `at`.
    pub fn at(at: DateTime<Utc>) -> Self {
        FixedClock(AtomicI64::new(at.timestamp_millis()))
    }

    /// Move the clock to `at`.
    pub fn set(&self, at: DateTime<Utc>) {
        self.0.store(at.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.0.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

/// Statistics aggregation and rollback engine.
///
/// Holds no state of its own beyond its collaborators; all state lives in
/// the database behind the connection passed to each call.
#[derive(Debug)]
pub struct StatsEngine<C, K = SystemClock> {
    classifier: C,
    clock: K,
    repo: SqliteAggregates,
}

impl<C: CarrierClassifier> StatsEngine<C, SystemClock> {
    /// Engine on the wall clock.
    pub fn new(classifier: C) -> Self {
        Self::with_clock(classifier, SystemClock)
    }
}

impl<C: CarrierClassifier, K: Clock> StatsEngine<C, K> {
    /// Engine on a custom clock.
    pub fn with_clock(classifier: C, clock: K) -> Self {
        StatsEngine {
            classifier,
            clock,
            repo: SqliteAggregates::new(),
        }
    }

    /// The engine's clock.
    pub fn clock(&self) -> &K {
        &self.clock
    }

    /// The carrier classifier in use.
    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// A parcel was created or saved; counts `sent` for new parcels and moves
    /// it between stores on relocation.
    pub fn on_parcel_saved(
        &self,
        conn: &mut SqliteConnection,
        parcel: &Parcel,
        is_new: bool,
        previous_store_id: Option<i64>,
        previous_timestamp: Option<DateTime<Utc>>,
    ) -> anyhow::Result<bool> {
        let event = SavedEvent {
            is_new,
            previous_store_id,
            previous_timestamp,
        };
        let now = self.clock.now();
        conn.immediate_transaction(|c| {
            contributor::parcel_saved(c, &self.repo, &self.classifier, parcel, event, now)
        })
    }

    /// A parcel entered a terminal status. Counted at most once per parcel.
    pub fn on_terminal_status_reached(
        &self,
        conn: &mut SqliteConnection,
        parcel: &Parcel,
        history: &DeliveryHistory,
        previous_status: Option<ParcelStatus>,
        new_status: ParcelStatus,
    ) -> anyhow::Result<bool> {
        let now = self.clock.now();
        conn.immediate_transaction(|c| {
            contributor::terminal_status_reached(
                c,
                &self.repo,
                &self.classifier,
                parcel,
                history,
                previous_status,
                new_status,
                now,
            )
        })
    }

    /// A parcel left a terminal status; `history` is the snapshot taken
    /// before the regression.
    pub fn on_terminal_status_reverted(
        &self,
        conn: &mut SqliteConnection,
        history: &DeliveryHistory,
        parcel: &Parcel,
        previous_status: ParcelStatus,
    ) -> anyhow::Result<bool> {
        conn.immediate_transaction(|c| {
            rollback::terminal_status_reverted(c, &self.repo, history, parcel, previous_status)
        })
    }

    /// Additively fold one UTC date into the rollups. Not idempotent.
    pub fn fold_date(&self, conn: &mut SqliteConnection, day: NaiveDate) -> anyhow::Result<FoldReport> {
        rollup::fold_date(conn, &self.repo, day)
    }

    /// Fold one UTC date unless it has been folded through this method before.
    pub fn fold_date_once(
        &self,
        conn: &mut SqliteConnection,
        day: NaiveDate,
    ) -> anyhow::Result<FoldReport> {
        rollup::fold_date_once(conn, &self.repo, day, self.clock.now())
    }

    /// Fold yesterday (UTC), once. What the nightly scheduler calls.
    pub fn fold_yesterday(&self, conn: &mut SqliteConnection) -> anyhow::Result<FoldReport> {
        let today = self.clock.now().date_naive();
        let yesterday = today
            .pred_opt()
            .ok_or_else(|| anyhow::anyhow!("no day before {today}"))?;
        self.fold_date_once(conn, yesterday)
    }

    /// Replace one period's rollups with the sum of its daily rows up to
    /// yesterday, and mark those dates folded.
    pub fn rebuild_period(
        &self,
        conn: &mut SqliteConnection,
        granularity: Granularity,
        period: PeriodKey,
    ) -> anyhow::Result<RebuildReport> {
        let now = self.clock.now();
        conn.immediate_transaction(|c| rollup::rebuild_period(c, &self.repo, granularity, period, now))
    }

    /// Per-period totals for a set of stores.
    pub fn get_period_stats(
        &self,
        conn: &mut SqliteConnection,
        query: &PeriodQuery,
    ) -> anyhow::Result<Vec<PeriodStats>> {
        conn.transaction(|c| resolver::get_period_stats(c, &self.repo, query))
    }

    /// All-time totals of a store, or of one of its carriers. Zero if none.
    pub fn get_current_totals(
        &self,
        conn: &mut SqliteConnection,
        store_id: i64,
        carrier: Option<&CarrierCode>,
    ) -> anyhow::Result<Counters> {
        self.totals(conn, store_id, carrier, Bucket::Current)
    }

    /// Totals of a store (or carrier) on one UTC date. Zero if none.
    pub fn get_daily_totals(
        &self,
        conn: &mut SqliteConnection,
        store_id: i64,
        carrier: Option<&CarrierCode>,
        day: NaiveDate,
    ) -> anyhow::Result<Counters> {
        self.totals(conn, store_id, carrier, Bucket::Daily(day))
    }

    /// Stored rollup row, if the period has been folded for this store.
    pub fn get_rollup(
        &self,
        conn: &mut SqliteConnection,
        store_id: i64,
        carrier: Option<&CarrierCode>,
        granularity: Granularity,
        period: PeriodKey,
    ) -> anyhow::Result<Option<Counters>> {
        let key = AggregateKey {
            store_id,
            carrier,
            bucket: Bucket::Rollup(granularity, period),
        };
        self.repo.get(conn, &key)
    }

    fn totals(
        &self,
        conn: &mut SqliteConnection,
        store_id: i64,
        carrier: Option<&CarrierCode>,
        bucket: Bucket,
    ) -> anyhow::Result<Counters> {
        let key = AggregateKey {
            store_id,
            carrier,
            bucket,
        };
        Ok(self.repo.get(conn, &key)?.unwrap_or_default())
    }
}
