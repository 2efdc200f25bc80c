//! Database utilities for connections and schema migrations.
//!
//! - [`connection::connect_sqlite`] opens a connection with WAL, `foreign_keys=ON`
//!   and a 5000ms `busy_timeout`.
//! - [`migrate::run_sqlite`] and [`migrate::run_all`] apply the embedded
//!   migrations.
//!
//! Example:
//! ```no_run
//! use parcel_stats::db::{connection, migrate};
//!
//! let db_path = std::env::temp_dir().join("parcel_stats_example.db");
//! migrate::run_all(db_path.to_str().unwrap()).expect("migrations");
//! let _conn = connection::connect_sqlite(db_path.to_str().unwrap()).expect("connect");
//! ```

pub mod connection;
pub mod migrate;
