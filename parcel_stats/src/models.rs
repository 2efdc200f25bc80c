//! Diesel models mapping to the database schema.
//!
//! These types mirror the tables defined in the embedded migrations and in
//! [`crate::schema`]:
//! - [`crate::schema::stores`]: owners of every aggregate row
//! - [`crate::schema::customers`]: per-customer personal counters
//! - [`crate::schema::parcels`]: the parcel itself, including the
//!   `included_in_statistics` gate
//! - [`crate::schema::delivery_history`]: one row per parcel with the dates the
//!   day sums are computed from
//!
//! Aggregate tables have no model struct; they are read as
//! [`crate::counters::CounterRow`] tuples (see [`crate::aggregate`]).

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::{
    carrier::CarrierCode,
    error::StatsError,
    schema::*,
    status::{Outcome, ParcelStatus},
    tz,
};

/// A row in [`crate::schema::stores`].
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Selectable)]
#[diesel(table_name = stores, check_for_backend(diesel::sqlite::Sqlite))]
pub struct Store {
    /// Database primary key.
    pub id: i64,
    /// Owning account; kept for reporting, not interpreted here.
    pub owner_id: i64,
    /// Display name.
    pub name: String,
}

/// Insertable form of [`Store`].
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = stores)]
pub struct NewStore<'a> {
    /// Owning account.
    pub owner_id: i64,
    /// Display name.
    pub name: &'a str,
}

/// A row in [`crate::schema::customers`]: personal counters of one recipient.
///
/// `sent` counts parcels still in flight; a terminal outcome moves one unit
/// from `sent` to `delivered` or `returned`.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Selectable)]
#[diesel(table_name = customers, check_for_backend(diesel::sqlite::Sqlite))]
pub struct Customer {
    /// Database primary key.
    pub id: i64,
    /// Parcels sent and not yet finalized.
    pub sent: i64,
    /// Parcels picked up.
    pub delivered: i64,
    /// Parcels returned.
    pub returned: i64,
}

/// A row in [`crate::schema::parcels`].
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Selectable)]
#[diesel(table_name = parcels, check_for_backend(diesel::sqlite::Sqlite))]
pub struct Parcel {
    /// Database primary key.
    pub id: i64,
    /// Carrier track number as entered.
    pub track_number: String,
    /// Current owning store.
    pub store_id: i64,
    /// Recipient, when known.
    pub customer_id: Option<i64>,
    /// Lifecycle status text; see [`Parcel::status`].
    pub status: String,
    /// True once this parcel's terminal outcome has been folded into aggregates.
    pub included_in_statistics: bool,
    /// Last lifecycle event in RFC3339 UTC.
    pub updated_at: String,
}

impl Parcel {
    /// Parsed lifecycle status.
    pub fn status(&self) -> Result<ParcelStatus, StatsError> {
        self.status.parse()
    }
}

/// Insertable form of [`Parcel`].
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = parcels)]
pub struct NewParcel<'a> {
    /// Carrier track number.
    pub track_number: &'a str,
    /// Owning store.
    pub store_id: i64,
    /// Recipient, when known.
    pub customer_id: Option<i64>,
    /// Initial status text.
    pub status: &'a str,
    /// Last lifecycle event in RFC3339 UTC.
    pub updated_at: &'a str,
}

/// A row in [`crate::schema::delivery_history`]: the dates behind one parcel's
/// terminal contribution.
///
/// All dates are RFC3339 UTC text; use the accessors for parsed values.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Selectable, Insertable)]
#[diesel(table_name = delivery_history, primary_key(parcel_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DeliveryHistory {
    /// FK to [`Parcel::id`]; one history row per parcel.
    pub parcel_id: i64,
    /// Store the parcel belonged to when the history was created.
    pub store_id: i64,
    /// Carrier code resolved from the track number; NULL when unknown.
    pub carrier: Option<String>,
    /// Handed to the carrier.
    pub send_date: Option<String>,
    /// Reached the pickup point.
    pub arrived_date: Option<String>,
    /// Picked up by the recipient. Cleared on rollback.
    pub received_date: Option<String>,
    /// Returned to the sender. Cleared on rollback.
    pub returned_date: Option<String>,
}

impl DeliveryHistory {
    /// Resolved carrier, if any.
    pub fn carrier_code(&self) -> Option<CarrierCode> {
        self.carrier.as_deref().and_then(CarrierCode::new)
    }

    /// Parsed `arrived_date`.
    pub fn arrived_at(&self) -> anyhow::Result<Option<DateTime<Utc>>> {
        tz::parse_opt_ts(self.arrived_date.as_deref())
    }

    /// Parsed `received_date`.
    pub fn received_at(&self) -> anyhow::Result<Option<DateTime<Utc>>> {
        tz::parse_opt_ts(self.received_date.as_deref())
    }

    /// Parsed `returned_date`.
    pub fn returned_at(&self) -> anyhow::Result<Option<DateTime<Utc>>> {
        tz::parse_opt_ts(self.returned_date.as_deref())
    }

    /// The date that keys an outcome's daily bucket: received for delivered,
    /// returned for returned.
    pub fn outcome_at(&self, outcome: Outcome) -> anyhow::Result<Option<DateTime<Utc>>> {
        match outcome {
            Outcome::Delivered => self.received_at(),
            Outcome::Returned => self.returned_at(),
        }
    }
}
