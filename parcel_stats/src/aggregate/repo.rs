//! SQLite implementation of [`AggregateRepo`].

use anyhow::bail;
use chrono::NaiveDate;
use diesel::{prelude::*, sql_types::BigInt, upsert::excluded};

use crate::{
    aggregate::{AggregateKey, AggregateRepo, Bucket, DailyRow, RepoResult, RollupSum},
    carrier::CarrierCode,
    counters::{CounterRow, Counters},
    period::{Granularity, PeriodKey},
};

diesel::define_sql_function! {
    /// SQLite's scalar two-argument `MAX`, used to floor decrements at zero.
    #[sql_name = "MAX"]
    fn floor_at(value: BigInt, floor: BigInt) -> BigInt;
}

// ---- column helpers: every aggregate table shares the same five counters ----

macro_rules! counter_columns {
    ($t:ident) => {
        (
            $t::sent,
            $t::delivered,
            $t::returned,
            $t::sum_delivery_days,
            $t::sum_pickup_days,
        )
    };
}

macro_rules! insert_values {
    ($t:ident, $d:expr, $($key:expr),+ $(,)?) => {
        (
            $($key,)+
            $t::sent.eq($d.sent),
            $t::delivered.eq($d.delivered),
            $t::returned.eq($d.returned),
            $t::sum_delivery_days.eq($d.sum_delivery_days.hundredths()),
            $t::sum_pickup_days.eq($d.sum_pickup_days.hundredths()),
        )
    };
}

macro_rules! accumulate {
    ($t:ident) => {
        (
            $t::sent.eq($t::sent + excluded($t::sent)),
            $t::delivered.eq($t::delivered + excluded($t::delivered)),
            $t::returned.eq($t::returned + excluded($t::returned)),
            $t::sum_delivery_days.eq($t::sum_delivery_days + excluded($t::sum_delivery_days)),
            $t::sum_pickup_days.eq($t::sum_pickup_days + excluded($t::sum_pickup_days)),
        )
    };
}

macro_rules! clamped_subtract {
    ($t:ident, $d:expr) => {
        (
            $t::sent.eq(floor_at($t::sent - $d.sent, 0_i64)),
            $t::delivered.eq(floor_at($t::delivered - $d.delivered, 0_i64)),
            $t::returned.eq(floor_at($t::returned - $d.returned, 0_i64)),
            $t::sum_delivery_days.eq(floor_at(
                $t::sum_delivery_days - $d.sum_delivery_days.hundredths(),
                0_i64,
            )),
            $t::sum_pickup_days.eq(floor_at(
                $t::sum_pickup_days - $d.sum_pickup_days.hundredths(),
                0_i64,
            )),
        )
    };
}

/// Aggregate store backed by the SQLite schema in [`crate::schema`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteAggregates;

impl SqliteAggregates {
    /// Create a new repository handle (stateless).
    pub fn new() -> Self {
        Self
    }
}

impl AggregateRepo for SqliteAggregates {
    fn add(
        &self,
        conn: &mut SqliteConnection,
        key: &AggregateKey<'_>,
        d: &Counters,
    ) -> RepoResult<()> {
        let store = key.store_id;
        match (key.bucket, key.carrier.map(CarrierCode::as_str)) {
            (Bucket::Current, None) => {
                use crate::schema::current_store_stats::dsl as t;
                diesel::insert_into(t::current_store_stats)
                    .values(insert_values!(t, d, t::store_id.eq(store)))
                    .on_conflict(t::store_id)
                    .do_update()
                    .set(accumulate!(t))
                    .execute(conn)?;
            }
            (Bucket::Current, Some(carrier)) => {
                use crate::schema::current_carrier_stats::dsl as t;
                diesel::insert_into(t::current_carrier_stats)
                    .values(insert_values!(
                        t,
                        d,
                        t::store_id.eq(store),
                        t::carrier.eq(carrier)
                    ))
                    .on_conflict((t::store_id, t::carrier))
                    .do_update()
                    .set(accumulate!(t))
                    .execute(conn)?;
            }
            (Bucket::Daily(day), None) => {
                use crate::schema::daily_store_stats::dsl as t;
                diesel::insert_into(t::daily_store_stats)
                    .values(insert_values!(t, d, t::store_id.eq(store), t::day.eq(day)))
                    .on_conflict((t::store_id, t::day))
                    .do_update()
                    .set(accumulate!(t))
                    .execute(conn)?;
            }
            (Bucket::Daily(day), Some(carrier)) => {
                use crate::schema::daily_carrier_stats::dsl as t;
                diesel::insert_into(t::daily_carrier_stats)
                    .values(insert_values!(
                        t,
                        d,
                        t::store_id.eq(store),
                        t::carrier.eq(carrier),
                        t::day.eq(day)
                    ))
                    .on_conflict((t::store_id, t::carrier, t::day))
                    .do_update()
                    .set(accumulate!(t))
                    .execute(conn)?;
            }
            (Bucket::Rollup(g, p), None) => {
                use crate::schema::rollup_store_stats::dsl as t;
                diesel::insert_into(t::rollup_store_stats)
                    .values(insert_values!(
                        t,
                        d,
                        t::store_id.eq(store),
                        t::granularity.eq(g.as_str()),
                        t::period_year.eq(p.year),
                        t::period_number.eq(p.number)
                    ))
                    .on_conflict((t::store_id, t::granularity, t::period_year, t::period_number))
                    .do_update()
                    .set(accumulate!(t))
                    .execute(conn)?;
            }
            (Bucket::Rollup(g, p), Some(carrier)) => {
                use crate::schema::rollup_carrier_stats::dsl as t;
                diesel::insert_into(t::rollup_carrier_stats)
                    .values(insert_values!(
                        t,
                        d,
                        t::store_id.eq(store),
                        t::carrier.eq(carrier),
                        t::granularity.eq(g.as_str()),
                        t::period_year.eq(p.year),
                        t::period_number.eq(p.number)
                    ))
                    .on_conflict((
                        t::store_id,
                        t::carrier,
                        t::granularity,
                        t::period_year,
                        t::period_number,
                    ))
                    .do_update()
                    .set(accumulate!(t))
                    .execute(conn)?;
            }
        }
        Ok(())
    }

    fn subtract(
        &self,
        conn: &mut SqliteConnection,
        key: &AggregateKey<'_>,
        d: &Counters,
    ) -> RepoResult<bool> {
        let store = key.store_id;
        let touched = match (key.bucket, key.carrier.map(CarrierCode::as_str)) {
            (Bucket::Current, None) => {
                use crate::schema::current_store_stats::dsl as t;
                diesel::update(t::current_store_stats.filter(t::store_id.eq(store)))
                    .set(clamped_subtract!(t, d))
                    .execute(conn)?
            }
            (Bucket::Current, Some(carrier)) => {
                use crate::schema::current_carrier_stats::dsl as t;
                diesel::update(
                    t::current_carrier_stats
                        .filter(t::store_id.eq(store))
                        .filter(t::carrier.eq(carrier)),
                )
                .set(clamped_subtract!(t, d))
                .execute(conn)?
            }
            (Bucket::Daily(day), None) => {
                use crate::schema::daily_store_stats::dsl as t;
                diesel::update(
                    t::daily_store_stats
                        .filter(t::store_id.eq(store))
                        .filter(t::day.eq(day)),
                )
                .set(clamped_subtract!(t, d))
                .execute(conn)?
            }
            (Bucket::Daily(day), Some(carrier)) => {
                use crate::schema::daily_carrier_stats::dsl as t;
                diesel::update(
                    t::daily_carrier_stats
                        .filter(t::store_id.eq(store))
                        .filter(t::carrier.eq(carrier))
                        .filter(t::day.eq(day)),
                )
                .set(clamped_subtract!(t, d))
                .execute(conn)?
            }
            (Bucket::Rollup(..), _) => {
                bail!("rollup rows are only folded or rebuilt, never decremented")
            }
        };
        Ok(touched > 0)
    }

    fn get(
        &self,
        conn: &mut SqliteConnection,
        key: &AggregateKey<'_>,
    ) -> RepoResult<Option<Counters>> {
        let store = key.store_id;
        let row: Option<CounterRow> = match (key.bucket, key.carrier.map(CarrierCode::as_str)) {
            (Bucket::Current, None) => {
                use crate::schema::current_store_stats::dsl as t;
                t::current_store_stats
                    .filter(t::store_id.eq(store))
                    .select(counter_columns!(t))
                    .first(conn)
                    .optional()?
            }
            (Bucket::Current, Some(carrier)) => {
                use crate::schema::current_carrier_stats::dsl as t;
                t::current_carrier_stats
                    .filter(t::store_id.eq(store))
                    .filter(t::carrier.eq(carrier))
                    .select(counter_columns!(t))
                    .first(conn)
                    .optional()?
            }
            (Bucket::Daily(day), None) => {
                use crate::schema::daily_store_stats::dsl as t;
                t::daily_store_stats
                    .filter(t::store_id.eq(store))
                    .filter(t::day.eq(day))
                    .select(counter_columns!(t))
                    .first(conn)
                    .optional()?
            }
            (Bucket::Daily(day), Some(carrier)) => {
                use crate::schema::daily_carrier_stats::dsl as t;
                t::daily_carrier_stats
                    .filter(t::store_id.eq(store))
                    .filter(t::carrier.eq(carrier))
                    .filter(t::day.eq(day))
                    .select(counter_columns!(t))
                    .first(conn)
                    .optional()?
            }
            (Bucket::Rollup(g, p), None) => {
                use crate::schema::rollup_store_stats::dsl as t;
                t::rollup_store_stats
                    .filter(t::store_id.eq(store))
                    .filter(t::granularity.eq(g.as_str()))
                    .filter(t::period_year.eq(p.year))
                    .filter(t::period_number.eq(p.number))
                    .select(counter_columns!(t))
                    .first(conn)
                    .optional()?
            }
            (Bucket::Rollup(g, p), Some(carrier)) => {
                use crate::schema::rollup_carrier_stats::dsl as t;
                t::rollup_carrier_stats
                    .filter(t::store_id.eq(store))
                    .filter(t::carrier.eq(carrier))
                    .filter(t::granularity.eq(g.as_str()))
                    .filter(t::period_year.eq(p.year))
                    .filter(t::period_number.eq(p.number))
                    .select(counter_columns!(t))
                    .first(conn)
                    .optional()?
            }
        };
        Ok(row.map(Counters::from))
    }

    fn sum_rollups(
        &self,
        conn: &mut SqliteConnection,
        store_ids: &[i64],
        granularity: Granularity,
        period: PeriodKey,
    ) -> RepoResult<RollupSum> {
        use crate::schema::rollup_store_stats::dsl as t;

        let rows: Vec<CounterRow> = t::rollup_store_stats
            .filter(t::store_id.eq_any(store_ids.to_vec()))
            .filter(t::granularity.eq(granularity.as_str()))
            .filter(t::period_year.eq(period.year))
            .filter(t::period_number.eq(period.number))
            .select(counter_columns!(t))
            .load(conn)?;

        Ok(RollupSum {
            rows: rows.len(),
            counters: rows.into_iter().map(Counters::from).sum(),
        })
    }

    fn sum_daily(
        &self,
        conn: &mut SqliteConnection,
        store_ids: &[i64],
        from: NaiveDate,
        until: NaiveDate,
    ) -> RepoResult<Counters> {
        use crate::schema::daily_store_stats::dsl as t;

        let rows: Vec<CounterRow> = t::daily_store_stats
            .filter(t::store_id.eq_any(store_ids.to_vec()))
            .filter(t::day.ge(from))
            .filter(t::day.lt(until))
            .select(counter_columns!(t))
            .load(conn)?;

        Ok(rows.into_iter().map(Counters::from).sum())
    }

    fn daily_rows(
        &self,
        conn: &mut SqliteConnection,
        from: NaiveDate,
        until: NaiveDate,
    ) -> RepoResult<Vec<DailyRow>> {
        let mut out = Vec::new();
        {
            use crate::schema::daily_store_stats::dsl as t;
            let rows: Vec<(i64, NaiveDate, i64, i64, i64, i64, i64)> = t::daily_store_stats
                .filter(t::day.ge(from))
                .filter(t::day.lt(until))
                .order((t::day, t::store_id))
                .select((
                    t::store_id,
                    t::day,
                    t::sent,
                    t::delivered,
                    t::returned,
                    t::sum_delivery_days,
                    t::sum_pickup_days,
                ))
                .load(conn)?;
            out.extend(rows.into_iter().map(|(store_id, day, s, dl, r, sd, sp)| DailyRow {
                store_id,
                carrier: None,
                day,
                counters: Counters::from((s, dl, r, sd, sp)),
            }));
        }
        {
            use crate::schema::daily_carrier_stats::dsl as t;
            let rows: Vec<(i64, String, NaiveDate, i64, i64, i64, i64, i64)> =
                t::daily_carrier_stats
                    .filter(t::day.ge(from))
                    .filter(t::day.lt(until))
                    .order((t::day, t::store_id, t::carrier))
                    .select((
                        t::store_id,
                        t::carrier,
                        t::day,
                        t::sent,
                        t::delivered,
                        t::returned,
                        t::sum_delivery_days,
                        t::sum_pickup_days,
                    ))
                    .load(conn)?;
            out.extend(
                rows.into_iter()
                    .map(|(store_id, carrier, day, s, dl, r, sd, sp)| DailyRow {
                        store_id,
                        carrier: CarrierCode::new(&carrier),
                        day,
                        counters: Counters::from((s, dl, r, sd, sp)),
                    }),
            );
        }
        Ok(out)
    }

    fn delete_rollups(
        &self,
        conn: &mut SqliteConnection,
        granularity: Granularity,
        period: PeriodKey,
    ) -> RepoResult<usize> {
        use crate::schema::{rollup_carrier_stats as rc, rollup_store_stats as rs};

        let stores = diesel::delete(
            rs::table
                .filter(rs::granularity.eq(granularity.as_str()))
                .filter(rs::period_year.eq(period.year))
                .filter(rs::period_number.eq(period.number)),
        )
        .execute(conn)?;
        let carriers = diesel::delete(
            rc::table
                .filter(rc::granularity.eq(granularity.as_str()))
                .filter(rc::period_year.eq(period.year))
                .filter(rc::period_number.eq(period.number)),
        )
        .execute(conn)?;
        Ok(stores + carriers)
    }
}
