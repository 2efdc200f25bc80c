//! Parcel delivery statistics: incremental counters, rollback of corrected
//! outcomes, nightly rollups and period queries over SQLite.

#![deny(missing_docs)]

pub mod aggregate;
pub mod carrier;
pub mod config;
pub mod contributor;
pub mod counters;
pub mod db;
pub mod engine;
pub mod error;
pub mod history;
pub mod models;
pub mod parcels;
pub mod period;
pub mod resolver;
pub mod rollback;
pub mod rollup;
#[allow(missing_docs)]
pub mod schema;
pub mod status;
pub mod stores;
pub mod tz;

pub use engine::{Clock, FixedClock, StatsEngine, SystemClock};
pub use error::StatsError;
