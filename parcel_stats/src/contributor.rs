//! Forward contributions: `+1 sent` on creation or relocation, and the
//! terminal outcome (`+1 delivered/returned` plus day sums) on finalization.
//!
//! Day sums are always recomputed from the stored history dates by
//! [`terminal_contribution`]; the rollback path calls the same function so
//! both directions apply identical deltas.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::SqliteConnection;
use tracing::{debug, info, warn};

use crate::{
    aggregate::{AggregateRepo, Target},
    carrier::{CarrierClassifier, CarrierCode},
    counters::{Counters, FixedDays},
    history,
    models::{DeliveryHistory, Parcel},
    parcels,
    status::{Outcome, ParcelStatus},
};

/// What a parcel save looked like from the caller's side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SavedEvent {
    /// The parcel row was just created.
    pub is_new: bool,
    /// Owning store before this save, if the parcel existed.
    pub previous_store_id: Option<i64>,
    /// Time of the previous lifecycle event; keys the old daily bucket on relocation.
    pub previous_timestamp: Option<DateTime<Utc>>,
}

impl SavedEvent {
    /// A freshly created parcel.
    pub fn created() -> Self {
        SavedEvent {
            is_new: true,
            ..SavedEvent::default()
        }
    }

    /// An existing parcel whose store may have changed.
    pub fn updated(previous_store_id: i64, previous_timestamp: Option<DateTime<Utc>>) -> Self {
        SavedEvent {
            is_new: false,
            previous_store_id: Some(previous_store_id),
            previous_timestamp,
        }
    }

    fn moved_from(&self, store_id: i64) -> Option<i64> {
        self.previous_store_id.filter(|&prev| prev != store_id)
    }
}

/// The delta a terminal outcome adds, and the daily bucket it lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Contribution {
    /// UTC date of the outcome; `None` when the outcome date is unknown.
    pub day: Option<NaiveDate>,
    pub delta: Counters,
}

/// Compute the terminal contribution of `history` for `outcome`.
///
/// - `sum_delivery_days`: arrival to outcome date, when both are known;
/// - `sum_pickup_days`: arrival to received date, delivered only.
pub(crate) fn terminal_contribution(
    history: &DeliveryHistory,
    outcome: Outcome,
) -> anyhow::Result<Contribution> {
    let arrived = history.arrived_at()?;
    let outcome_at = history.outcome_at(outcome)?;

    let elapsed = match (arrived, outcome_at) {
        (Some(a), Some(o)) => FixedDays::between(a, o),
        _ => FixedDays::ZERO,
    };
    let mut delta = Counters {
        sum_delivery_days: elapsed,
        ..Counters::default()
    };
    match outcome {
        Outcome::Delivered => {
            delta.delivered = 1;
            delta.sum_pickup_days = elapsed;
        }
        Outcome::Returned => delta.returned = 1,
    }

    Ok(Contribution {
        day: outcome_at.map(|ts| ts.date_naive()),
        delta,
    })
}

fn resolve_or_warn(classifier: &impl CarrierClassifier, parcel: &Parcel) -> Option<CarrierCode> {
    let carrier = classifier.resolve(&parcel.track_number);
    if carrier.is_none() {
        warn!(
            parcel_id = parcel.id,
            track_number = %parcel.track_number,
            "unresolved carrier, counting at store level only"
        );
    }
    carrier
}

/// Apply the `sent` side of a parcel save.
///
/// - new parcel: `+1 sent` to the store (and carrier) at current-state and
///   today's daily bucket, `+1 sent` to the customer;
/// - relocation: the same increment on the new store, and a clamped
///   decrement on the old store's current-state and the old event date's
///   daily bucket. An already counted terminal outcome moves along with it.
///
/// Returns `false` when the save touched no counters.
pub fn parcel_saved(
    conn: &mut SqliteConnection,
    repo: &impl AggregateRepo,
    classifier: &impl CarrierClassifier,
    parcel: &Parcel,
    event: SavedEvent,
    now: DateTime<Utc>,
) -> anyhow::Result<bool> {
    let moved_from = event.moved_from(parcel.store_id);
    if !event.is_new && moved_from.is_none() {
        debug!(parcel_id = parcel.id, "parcel saved without store change");
        return Ok(false);
    }

    let carrier = resolve_or_warn(classifier, parcel);
    let sent = Counters::one_sent();
    repo.contribute(
        conn,
        &Target {
            store_id: parcel.store_id,
            carrier: carrier.as_ref(),
            day: Some(now.date_naive()),
        },
        &sent,
    )?;

    if let Some(old_store) = moved_from {
        let old_day = event.previous_timestamp.map(|ts| ts.date_naive());
        if old_day.is_none() {
            warn!(
                parcel_id = parcel.id,
                store_id = old_store,
                "relocated parcel has no previous event time, old daily bucket left as is"
            );
        }
        repo.retract(
            conn,
            &Target {
                store_id: old_store,
                carrier: carrier.as_ref(),
                day: old_day,
            },
            &sent,
        )?;
        relocate_outcome(conn, repo, parcel)?;
        info!(
            parcel_id = parcel.id,
            from = old_store,
            to = parcel.store_id,
            "parcel relocated"
        );
    }

    if let (true, Some(customer_id)) = (event.is_new, parcel.customer_id) {
        parcels::customer_sent(conn, customer_id)?;
    }
    Ok(true)
}

/// Move the history row, and a counted terminal outcome, to the parcel's new
/// store so neither store ends up with more outcomes than parcels sent.
fn relocate_outcome(
    conn: &mut SqliteConnection,
    repo: &impl AggregateRepo,
    parcel: &Parcel,
) -> anyhow::Result<()> {
    let Some(hist) = history::find(conn, parcel.id)? else {
        return Ok(());
    };
    if hist.store_id == parcel.store_id {
        return Ok(());
    }
    let outcome = parcel.status().ok().and_then(ParcelStatus::outcome);
    if let (true, Some(outcome)) = (parcel.included_in_statistics, outcome) {
        let contribution = terminal_contribution(&hist, outcome)?;
        let carrier = hist.carrier_code();
        repo.retract(
            conn,
            &Target {
                store_id: hist.store_id,
                carrier: carrier.as_ref(),
                day: contribution.day,
            },
            &contribution.delta,
        )?;
        repo.contribute(
            conn,
            &Target {
                store_id: parcel.store_id,
                carrier: carrier.as_ref(),
                day: contribution.day,
            },
            &contribution.delta,
        )?;
    }
    history::move_to_store(conn, parcel.id, parcel.store_id)
}

/// Count a parcel's terminal outcome, at most once.
///
/// The `included_in_statistics` compare-and-set gates the whole contribution:
/// a duplicate event finds the flag already set and changes nothing. A missing
/// outcome date is stamped with `now` before the delta is computed. An event
/// for a parcel that no longer exists fails with `StatsError::ParcelNotFound`.
///
/// Returns `true` if the outcome was counted by this call.
#[allow(clippy::too_many_arguments)]
pub fn terminal_status_reached(
    conn: &mut SqliteConnection,
    repo: &impl AggregateRepo,
    classifier: &impl CarrierClassifier,
    parcel: &Parcel,
    history_row: &DeliveryHistory,
    previous_status: Option<ParcelStatus>,
    new_status: ParcelStatus,
    now: DateTime<Utc>,
) -> anyhow::Result<bool> {
    let Some(outcome) = new_status.outcome() else {
        debug!(parcel_id = parcel.id, status = %new_status, "status is not terminal");
        return Ok(false);
    };
    parcels::ensure_parcel(conn, parcel.id)?;
    if !parcels::mark_included(conn, parcel.id)? {
        debug!(
            parcel_id = parcel.id,
            previous = ?previous_status,
            "terminal outcome already counted"
        );
        return Ok(false);
    }

    let mut hist = history_row.clone();
    if hist.outcome_at(outcome)?.is_none() {
        hist = history::record_outcome(conn, parcel.id, outcome, now)?
            .ok_or_else(|| anyhow::anyhow!("no delivery history for parcel {}", parcel.id))?;
    }

    let carrier = match hist.carrier_code() {
        Some(code) => Some(code),
        None => {
            let resolved = resolve_or_warn(classifier, parcel);
            if let Some(code) = &resolved {
                history::set_carrier(conn, parcel.id, code.as_str())?;
            }
            resolved
        }
    };

    let contribution = terminal_contribution(&hist, outcome)?;
    repo.contribute(
        conn,
        &Target {
            store_id: hist.store_id,
            carrier: carrier.as_ref(),
            day: contribution.day,
        },
        &contribution.delta,
    )?;

    if let Some(customer_id) = parcel.customer_id {
        parcels::customer_finalized(conn, customer_id, outcome)?;
    }
    debug!(
        parcel_id = parcel.id,
        store_id = hist.store_id,
        carrier = carrier.as_ref().map(CarrierCode::as_str),
        day = ?contribution.day,
        "terminal outcome counted"
    );
    Ok(true)
}
