//! Parcel and customer rows.
//!
//! The statistics engine owns two pieces of per-parcel state:
//! - `parcels.included_in_statistics`, flipped with compare-and-set updates so
//!   a terminal outcome is counted at most once even under duplicate events;
//! - the recipient's personal counters in `customers`.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use tracing::warn;

use crate::{
    aggregate::repo::floor_at,
    error::StatsError,
    models::{Customer, NewParcel, Parcel},
    schema::{customers, parcels},
    status::{Outcome, ParcelStatus},
    tz,
};

/// Insert a parcel in the given status.
pub fn insert_parcel(
    conn: &mut SqliteConnection,
    track_number: &str,
    store_id: i64,
    customer_id: Option<i64>,
    status: ParcelStatus,
    at: DateTime<Utc>,
) -> anyhow::Result<Parcel> {
    let updated_at = tz::to_rfc3339_millis(at);
    let parcel = diesel::insert_into(parcels::table)
        .values(&NewParcel {
            track_number,
            store_id,
            customer_id,
            status: status.as_str(),
            updated_at: &updated_at,
        })
        .returning(Parcel::as_returning())
        .get_result(conn)?;
    Ok(parcel)
}

/// Look a parcel up by id.
pub fn find_parcel(conn: &mut SqliteConnection, id: i64) -> anyhow::Result<Option<Parcel>> {
    Ok(parcels::table
        .find(id)
        .select(Parcel::as_select())
        .first(conn)
        .optional()?)
}

/// Fail with [`StatsError::ParcelNotFound`] unless the parcel row exists.
pub fn ensure_parcel(conn: &mut SqliteConnection, id: i64) -> anyhow::Result<()> {
    let found: Option<i64> = parcels::table
        .find(id)
        .select(parcels::id)
        .first(conn)
        .optional()?;
    match found {
        Some(_) => Ok(()),
        None => Err(StatsError::ParcelNotFound(id).into()),
    }
}

/// Record a status change (and its time) on the parcel row.
pub fn set_status(
    conn: &mut SqliteConnection,
    id: i64,
    status: ParcelStatus,
    at: DateTime<Utc>,
) -> anyhow::Result<bool> {
    let n = diesel::update(parcels::table.find(id))
        .set((
            parcels::status.eq(status.as_str()),
            parcels::updated_at.eq(tz::to_rfc3339_millis(at)),
        ))
        .execute(conn)?;
    Ok(n > 0)
}

/// Move a parcel to another store.
pub fn set_store(conn: &mut SqliteConnection, id: i64, store_id: i64) -> anyhow::Result<bool> {
    let n = diesel::update(parcels::table.find(id))
        .set(parcels::store_id.eq(store_id))
        .execute(conn)?;
    Ok(n > 0)
}

/// Flip `included_in_statistics` from false to true.
///
/// Returns `false` if the parcel was already included (or does not exist).
pub fn mark_included(conn: &mut SqliteConnection, id: i64) -> anyhow::Result<bool> {
    let n = diesel::update(
        parcels::table
            .find(id)
            .filter(parcels::included_in_statistics.eq(false)),
    )
    .set(parcels::included_in_statistics.eq(true))
    .execute(conn)?;
    Ok(n == 1)
}

/// Flip `included_in_statistics` from true to false.
///
/// Returns `false` if the parcel was not included (or does not exist).
pub fn mark_excluded(conn: &mut SqliteConnection, id: i64) -> anyhow::Result<bool> {
    let n = diesel::update(
        parcels::table
            .find(id)
            .filter(parcels::included_in_statistics.eq(true)),
    )
    .set(parcels::included_in_statistics.eq(false))
    .execute(conn)?;
    Ok(n == 1)
}

// ---- customers ----

/// Insert a customer with zeroed counters.
pub fn create_customer(conn: &mut SqliteConnection) -> anyhow::Result<Customer> {
    let customer = diesel::insert_into(customers::table)
        .default_values()
        .returning(Customer::as_returning())
        .get_result(conn)?;
    Ok(customer)
}

/// Look a customer up by id.
pub fn find_customer(conn: &mut SqliteConnection, id: i64) -> anyhow::Result<Option<Customer>> {
    Ok(customers::table
        .find(id)
        .select(Customer::as_select())
        .first(conn)
        .optional()?)
}

/// `sent += 1` for a newly created parcel.
pub fn customer_sent(conn: &mut SqliteConnection, id: i64) -> anyhow::Result<()> {
    let n = diesel::update(customers::table.find(id))
        .set(customers::sent.eq(customers::sent + 1_i64))
        .execute(conn)?;
    if n == 0 {
        warn!(customer_id = id, "customer missing, personal counters not updated");
    }
    Ok(())
}

/// Move one parcel from `sent` to the outcome bucket.
pub fn customer_finalized(
    conn: &mut SqliteConnection,
    id: i64,
    outcome: Outcome,
) -> anyhow::Result<()> {
    let dec_sent = customers::sent.eq(floor_at(customers::sent - 1_i64, 0_i64));
    let n = match outcome {
        Outcome::Delivered => diesel::update(customers::table.find(id))
            .set((dec_sent, customers::delivered.eq(customers::delivered + 1_i64)))
            .execute(conn)?,
        Outcome::Returned => diesel::update(customers::table.find(id))
            .set((dec_sent, customers::returned.eq(customers::returned + 1_i64)))
            .execute(conn)?,
    };
    if n == 0 {
        warn!(customer_id = id, "customer missing, personal counters not updated");
    }
    Ok(())
}

/// Undo [`customer_finalized`]: decrement the outcome bucket, re-increment `sent`.
pub fn customer_reverted(
    conn: &mut SqliteConnection,
    id: i64,
    outcome: Outcome,
) -> anyhow::Result<()> {
    let inc_sent = customers::sent.eq(customers::sent + 1_i64);
    let n = match outcome {
        Outcome::Delivered => diesel::update(customers::table.find(id))
            .set((
                customers::delivered.eq(floor_at(customers::delivered - 1_i64, 0_i64)),
                inc_sent,
            ))
            .execute(conn)?,
        Outcome::Returned => diesel::update(customers::table.find(id))
            .set((
                customers::returned.eq(floor_at(customers::returned - 1_i64, 0_i64)),
                inc_sent,
            ))
            .execute(conn)?,
    };
    if n == 0 {
        warn!(customer_id = id, "customer missing on rollback, treating as zero");
    }
    Ok(())
}
