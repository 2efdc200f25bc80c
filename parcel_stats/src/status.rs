//! Parcel lifecycle status as a closed set of variants.
//!
//! Terminal-ness is a property of the variant: only [`ParcelStatus::Delivered`]
//! and [`ParcelStatus::Returned`] are terminal, and each maps to an [`Outcome`]
//! that selects which counter a terminal contribution touches.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::StatsError;

/// Where a parcel is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParcelStatus {
    /// Handed to the carrier.
    Sent,
    /// Moving between carrier facilities.
    InTransit,
    /// Waiting at the pickup point.
    Arrived,
    /// Picked up by the recipient.
    Delivered,
    /// Returned to the sender.
    Returned,
}

/// The counter a terminal status contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Counts towards `delivered`, carries pickup days.
    Delivered,
    /// Counts towards `returned`.
    Returned,
}

impl ParcelStatus {
    /// Every variant, in lifecycle order.
    pub const ALL: [ParcelStatus; 5] = [
        ParcelStatus::Sent,
        ParcelStatus::InTransit,
        ParcelStatus::Arrived,
        ParcelStatus::Delivered,
        ParcelStatus::Returned,
    ];

    /// Terminal outcome for this status, if any.
    pub const fn outcome(self) -> Option<Outcome> {
        match self {
            ParcelStatus::Delivered => Some(Outcome::Delivered),
            ParcelStatus::Returned => Some(Outcome::Returned),
            ParcelStatus::Sent | ParcelStatus::InTransit | ParcelStatus::Arrived => None,
        }
    }

    /// True for statuses that will not change under normal operation.
    pub const fn is_terminal(self) -> bool {
        self.outcome().is_some()
    }

    /// Database / wire representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            ParcelStatus::Sent => "sent",
            ParcelStatus::InTransit => "in_transit",
            ParcelStatus::Arrived => "arrived",
            ParcelStatus::Delivered => "delivered",
            ParcelStatus::Returned => "returned",
        }
    }
}

impl fmt::Display for ParcelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParcelStatus {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParcelStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| StatsError::UnknownStatus(s.to_string()))
    }
}
