//! Reversal of a terminal contribution when a parcel regresses out of a
//! terminal status.
//!
//! The delta is recomputed from the history snapshot taken before the
//! regression with the same [`terminal_contribution`] the forward path used,
//! and subtracted from the same rows (current-state and the outcome date's
//! daily bucket, store and carrier level). Every subtraction is clamped at
//! zero.
//!
//! Rollups are not touched. A day that was already folded keeps its stale
//! week/month/year totals until the period is rebuilt with
//! [`crate::rollup::rebuild_period`].

use diesel::SqliteConnection;
use tracing::{debug, info, warn};

use crate::{
    aggregate::{AggregateRepo, Target},
    contributor::terminal_contribution,
    history,
    models::{DeliveryHistory, Parcel},
    parcels,
    status::ParcelStatus,
};

/// Undo the terminal contribution of `parcel`.
///
/// No-op (returns `false`) unless `previous_status` is terminal and the
/// parcel is currently included in statistics. The include flag is cleared
/// with a compare-and-set, so concurrent duplicate reversals subtract once.
pub fn terminal_status_reverted(
    conn: &mut SqliteConnection,
    repo: &impl AggregateRepo,
    snapshot: &DeliveryHistory,
    parcel: &Parcel,
    previous_status: ParcelStatus,
) -> anyhow::Result<bool> {
    let Some(outcome) = previous_status.outcome() else {
        debug!(parcel_id = parcel.id, previous = %previous_status, "previous status was not terminal");
        return Ok(false);
    };
    parcels::ensure_parcel(conn, parcel.id)?;
    if !parcels::mark_excluded(conn, parcel.id)? {
        debug!(parcel_id = parcel.id, "parcel was never counted, nothing to roll back");
        return Ok(false);
    }

    let contribution = terminal_contribution(snapshot, outcome)?;
    if contribution.day.is_none() {
        warn!(
            parcel_id = parcel.id,
            outcome = ?outcome,
            "history has no outcome date, daily bucket left as is"
        );
    }

    let carrier = match snapshot.carrier_code() {
        Some(code) => Some(code),
        // The forward path may have resolved the carrier after the snapshot was taken.
        None => history::find(conn, parcel.id)?.and_then(|h| h.carrier_code()),
    };

    repo.retract(
        conn,
        &Target {
            store_id: snapshot.store_id,
            carrier: carrier.as_ref(),
            day: contribution.day,
        },
        &contribution.delta,
    )?;
    history::clear_outcome_dates(conn, parcel.id)?;

    if let Some(customer_id) = parcel.customer_id {
        parcels::customer_reverted(conn, customer_id, outcome)?;
    }
    info!(
        parcel_id = parcel.id,
        store_id = snapshot.store_id,
        day = ?contribution.day,
        "terminal outcome rolled back"
    );
    Ok(true)
}
