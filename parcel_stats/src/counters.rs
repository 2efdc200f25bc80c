//! The counter payload shared by every aggregate row, and the day math that
//! feeds its fixed-point sums.
//!
//! [`FixedDays`] stores hundredths of a day, which is exactly what the
//! `sum_delivery_days` / `sum_pickup_days` columns hold.

use std::{
    fmt,
    ops::{Add, AddAssign},
};

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

const SECS_PER_DAY: i64 = 24 * 60 * 60;

/// Non-negative fixed-point day count with two decimal places.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FixedDays(i64);

impl FixedDays {
    /// Zero days.
    pub const ZERO: FixedDays = FixedDays(0);

    /// Build from hundredths of a day, clamping negatives at zero.
    pub const fn from_hundredths(h: i64) -> Self {
        if h < 0 { FixedDays(0) } else { FixedDays(h) }
    }

    /// Whole days.
    pub const fn from_days(days: i64) -> Self {
        Self::from_hundredths(days * 100)
    }

    /// Raw column value.
    pub const fn hundredths(self) -> i64 {
        self.0
    }

    /// Elapsed time between two instants, rounded half-up to the hundredth.
    ///
    /// Reversed or equal instants yield zero.
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        let secs = to.signed_duration_since(from).num_seconds();
        if secs <= 0 {
            return FixedDays::ZERO;
        }
        FixedDays((secs * 100 + SECS_PER_DAY / 2) / SECS_PER_DAY)
    }
}

impl Add for FixedDays {
    type Output = FixedDays;

    fn add(self, rhs: FixedDays) -> FixedDays {
        FixedDays(self.0.saturating_add(rhs.0))
    }
}

impl fmt::Display for FixedDays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for FixedDays {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0 as f64 / 100.0)
    }
}

/// Counter fields of an aggregate row, also used as the delta applied to one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    /// Parcels handed to a carrier.
    pub sent: i64,
    /// Parcels picked up by the recipient.
    pub delivered: i64,
    /// Parcels returned to the sender.
    pub returned: i64,
    /// Sum of arrival-to-outcome durations.
    pub sum_delivery_days: FixedDays,
    /// Sum of arrival-to-pickup durations (delivered only).
    pub sum_pickup_days: FixedDays,
}

/// Column order used when selecting counters: sent, delivered, returned,
/// sum_delivery_days, sum_pickup_days.
pub type CounterRow = (i64, i64, i64, i64, i64);

impl Counters {
    /// `+1 sent`.
    pub const fn one_sent() -> Self {
        Counters {
            sent: 1,
            delivered: 0,
            returned: 0,
            sum_delivery_days: FixedDays::ZERO,
            sum_pickup_days: FixedDays::ZERO,
        }
    }

    /// `delivered + returned <= sent` and nothing negative.
    pub fn is_consistent(&self) -> bool {
        self.sent >= 0
            && self.delivered >= 0
            && self.returned >= 0
            && self.delivered + self.returned <= self.sent
    }
}

impl From<CounterRow> for Counters {
    fn from((sent, delivered, returned, delivery, pickup): CounterRow) -> Self {
        Counters {
            sent,
            delivered,
            returned,
            sum_delivery_days: FixedDays::from_hundredths(delivery),
            sum_pickup_days: FixedDays::from_hundredths(pickup),
        }
    }
}

impl AddAssign for Counters {
    fn add_assign(&mut self, rhs: Counters) {
        self.sent += rhs.sent;
        self.delivered += rhs.delivered;
        self.returned += rhs.returned;
        self.sum_delivery_days = self.sum_delivery_days + rhs.sum_delivery_days;
        self.sum_pickup_days = self.sum_pickup_days + rhs.sum_pickup_days;
    }
}

impl Add for Counters {
    type Output = Counters;

    fn add(mut self, rhs: Counters) -> Counters {
        self += rhs;
        self
    }
}

impl std::iter::Sum for Counters {
    fn sum<I: Iterator<Item = Counters>>(iter: I) -> Counters {
        iter.fold(Counters::default(), Add::add)
    }
}
