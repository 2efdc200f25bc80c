//! Delivery history repository: one row per parcel, created lazily on the
//! first status observation.
//!
//! The terminal contribution and its rollback both recompute day sums from
//! these stored dates (no deltas are cached), so the dates must only change
//! through this module.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use tracing::warn;

use crate::{
    carrier::CarrierClassifier,
    models::{DeliveryHistory, Parcel},
    schema::delivery_history as dh,
    status::Outcome,
    tz,
};

/// Dates newly learned about a parcel. `None` fields leave the stored value alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KnownDates {
    /// Handed to the carrier.
    pub sent: Option<DateTime<Utc>>,
    /// Reached the pickup point.
    pub arrived: Option<DateTime<Utc>>,
    /// Picked up.
    pub received: Option<DateTime<Utc>>,
    /// Returned to sender.
    pub returned: Option<DateTime<Utc>>,
}

#[derive(AsChangeset)]
#[diesel(table_name = dh)]
struct DatesChangeset {
    send_date: Option<String>,
    arrived_date: Option<String>,
    received_date: Option<String>,
    returned_date: Option<String>,
}

/// Look the history row of a parcel up.
pub fn find(conn: &mut SqliteConnection, parcel_id: i64) -> anyhow::Result<Option<DeliveryHistory>> {
    Ok(dh::table
        .find(parcel_id)
        .select(DeliveryHistory::as_select())
        .first(conn)
        .optional()?)
}

/// Return the history row of `parcel`, creating it on first observation.
///
/// The carrier is resolved once, here; an unknown carrier is stored as NULL.
pub fn get_or_create(
    conn: &mut SqliteConnection,
    parcel: &Parcel,
    classifier: &impl CarrierClassifier,
) -> anyhow::Result<DeliveryHistory> {
    if let Some(existing) = find(conn, parcel.id)? {
        return Ok(existing);
    }
    let carrier = classifier.resolve(&parcel.track_number);
    if carrier.is_none() {
        warn!(
            parcel_id = parcel.id,
            track_number = %parcel.track_number,
            "unresolved carrier, parcel excluded from carrier statistics"
        );
    }
    let row = DeliveryHistory {
        parcel_id: parcel.id,
        store_id: parcel.store_id,
        carrier: carrier.map(|c| c.as_str().to_string()),
        send_date: None,
        arrived_date: None,
        received_date: None,
        returned_date: None,
    };
    // Two first observers may race here; the loser keeps the winner's row.
    diesel::insert_into(dh::table)
        .values(&row)
        .on_conflict(dh::parcel_id)
        .do_nothing()
        .execute(conn)?;
    find(conn, parcel.id)?.ok_or_else(|| anyhow::anyhow!("history for parcel {} vanished", parcel.id))
}

/// Merge newly known dates into the history row and return the updated row.
pub fn record_dates(
    conn: &mut SqliteConnection,
    parcel_id: i64,
    dates: KnownDates,
) -> anyhow::Result<Option<DeliveryHistory>> {
    let changes = DatesChangeset {
        send_date: dates.sent.map(tz::to_rfc3339_millis),
        arrived_date: dates.arrived.map(tz::to_rfc3339_millis),
        received_date: dates.received.map(tz::to_rfc3339_millis),
        returned_date: dates.returned.map(tz::to_rfc3339_millis),
    };
    if dates != KnownDates::default() {
        diesel::update(dh::table.find(parcel_id))
            .set(&changes)
            .execute(conn)?;
    }
    find(conn, parcel_id)
}

/// Stamp the outcome date (received or returned) for an outcome.
pub fn record_outcome(
    conn: &mut SqliteConnection,
    parcel_id: i64,
    outcome: Outcome,
    at: DateTime<Utc>,
) -> anyhow::Result<Option<DeliveryHistory>> {
    let dates = match outcome {
        Outcome::Delivered => KnownDates {
            received: Some(at),
            ..KnownDates::default()
        },
        Outcome::Returned => KnownDates {
            returned: Some(at),
            ..KnownDates::default()
        },
    };
    record_dates(conn, parcel_id, dates)
}

/// Remember the carrier of a history row that had none.
pub fn set_carrier(conn: &mut SqliteConnection, parcel_id: i64, carrier: &str) -> anyhow::Result<()> {
    diesel::update(dh::table.find(parcel_id).filter(dh::carrier.is_null()))
        .set(dh::carrier.eq(carrier))
        .execute(conn)?;
    Ok(())
}

/// Clear `received_date` and `returned_date` after a terminal status was reversed.
pub fn clear_outcome_dates(conn: &mut SqliteConnection, parcel_id: i64) -> anyhow::Result<()> {
    diesel::update(dh::table.find(parcel_id))
        .set((
            dh::received_date.eq(None::<String>),
            dh::returned_date.eq(None::<String>),
        ))
        .execute(conn)?;
    Ok(())
}

/// Re-point the history row at a new owning store after a relocation.
pub fn move_to_store(conn: &mut SqliteConnection, parcel_id: i64, store_id: i64) -> anyhow::Result<()> {
    diesel::update(dh::table.find(parcel_id))
        .set(dh::store_id.eq(store_id))
        .execute(conn)?;
    Ok(())
}
