//! Typed failures callers may want to match on.
//!
//! Most fallible operations in this crate return `anyhow::Result`; these
//! variants are raised through it and can be recovered with
//! `err.downcast_ref::<StatsError>()`.

/// Errors that can be distinguished by callers of the statistics engine.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum StatsError {
    /// The IANA zone name could not be parsed.
    #[error("unknown time zone: {0}")]
    UnknownZone(String),

    /// A stored or supplied parcel status is not one of the known variants.
    #[error("unknown parcel status: {0}")]
    UnknownStatus(String),

    /// A granularity string is not one of day/week/month/year.
    #[error("unknown granularity: {0}")]
    UnknownGranularity(String),

    /// The parcel row referenced by an event does not exist.
    #[error("parcel {0} not found")]
    ParcelNotFound(i64),

    /// A query range whose start lies after its end.
    #[error("invalid range: {from} is after {to}")]
    InvalidRange {
        /// Inclusive start (caller zone).
        from: chrono::NaiveDate,
        /// Inclusive end (caller zone).
        to: chrono::NaiveDate,
    },
}
