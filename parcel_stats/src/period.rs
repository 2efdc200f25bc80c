//! Calendar periods used by rollups and period queries.
//!
//! - Day: one calendar date.
//! - Week: Monday-aligned, keyed by ISO week-based year + ISO week number.
//!   (2024-12-30 belongs to 2025-W01.)
//! - Month: calendar month, keyed by (year, month).
//! - Year: calendar year, keyed by (year, 1).
//!
//! All functions work on [`NaiveDate`]; callers decide which zone the dates are in.
//!
//! ```
//! use chrono::NaiveDate;
//! use parcel_stats::period::Granularity;
//!
//! let d = NaiveDate::from_ymd_opt(2025, 2, 26).unwrap(); // a Wednesday
//! let monday = Granularity::Week.align(d);
//! assert_eq!(monday, NaiveDate::from_ymd_opt(2025, 2, 24).unwrap());
//! assert_eq!(Granularity::Week.label(monday), "Week 9");
//! ```

use std::{fmt, str::FromStr};

use chrono::{Datelike, Days, Months, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::StatsError;

/// Time-bucket size of an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// Calendar day
    Day,
    /// ISO week (Monday-based)
    Week,
    /// Calendar month
    Month,
    /// Calendar year
    Year,
}

/// Identity of a rollup period: `period_year` + `period_number`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeriodKey {
    /// ISO week-based year for weeks, calendar year otherwise.
    pub year: i32,
    /// ISO week, calendar month, or 1 for years.
    pub number: i32,
}

impl Granularity {
    /// The coarse granularities that have rollup rows, in fold order.
    pub const ROLLUPS: [Granularity; 3] = [Granularity::Week, Granularity::Month, Granularity::Year];

    /// Start of the period containing `date`.
    pub fn align(self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Day => date,
            Granularity::Week => date.week(Weekday::Mon).first_day(),
            Granularity::Month => date.with_day(1).unwrap_or(date),
            Granularity::Year => date.with_ordinal(1).unwrap_or(date),
        }
    }

    /// Start of the period after the one starting at `start`.
    ///
    /// Returns `None` only at the edge of chrono's representable range.
    pub fn next(self, start: NaiveDate) -> Option<NaiveDate> {
        let start = self.align(start);
        match self {
            Granularity::Day => start.checked_add_days(Days::new(1)),
            Granularity::Week => start.checked_add_days(Days::new(7)),
            Granularity::Month => start.checked_add_months(Months::new(1)),
            Granularity::Year => start.checked_add_months(Months::new(12)),
        }
    }

    /// Rollup key of the period containing `date`.
    pub fn period_key(self, date: NaiveDate) -> PeriodKey {
        match self {
            Granularity::Day => PeriodKey {
                year: date.year(),
                number: date.ordinal() as i32,
            },
            Granularity::Week => {
                let iso = date.iso_week();
                PeriodKey {
                    year: iso.year(),
                    number: iso.week() as i32,
                }
            }
            Granularity::Month => PeriodKey {
                year: date.year(),
                number: date.month() as i32,
            },
            Granularity::Year => PeriodKey {
                year: date.year(),
                number: 1,
            },
        }
    }

    /// First calendar date of the period identified by `key`.
    pub fn period_start(self, key: PeriodKey) -> Option<NaiveDate> {
        let number = u32::try_from(key.number).ok()?;
        match self {
            Granularity::Day => NaiveDate::from_yo_opt(key.year, number),
            Granularity::Week => NaiveDate::from_isoywd_opt(key.year, number, Weekday::Mon),
            Granularity::Month => NaiveDate::from_ymd_opt(key.year, number, 1),
            Granularity::Year if number == 1 => NaiveDate::from_ymd_opt(key.year, 1, 1),
            Granularity::Year => None,
        }
    }

    /// Human label for the period starting at `start`.
    pub fn label(self, start: NaiveDate) -> String {
        match self {
            Granularity::Day => start.format("%Y-%m-%d").to_string(),
            Granularity::Week => format!("Week {}", start.iso_week().week()),
            Granularity::Month => start.format("%B %Y").to_string(),
            Granularity::Year => start.year().to_string(),
        }
    }

    /// Database / CLI representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Year => "year",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "d" => Ok(Granularity::Day),
            "week" | "w" => Ok(Granularity::Week),
            "month" | "m" => Ok(Granularity::Month),
            "year" | "y" => Ok(Granularity::Year),
            _ => Err(StatsError::UnknownGranularity(s.to_string())),
        }
    }
}
