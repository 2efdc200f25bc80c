//! SQLite connection helpers.
//!
//! [`connect_sqlite`] opens a connection and applies the PRAGMAs the engine
//! depends on: WAL journaling, `foreign_keys=ON` (store deletion cascades
//! through every aggregate table) and a 5000ms `busy_timeout` so concurrent
//! writers queue instead of failing with `SQLITE_BUSY`.
//!
//! Example:
//! ```no_run
//! use parcel_stats::db::connection::connect_sqlite;
//!
//! let path = std::env::temp_dir().join("parcel_stats_example.db");
//! let _conn = connect_sqlite(path.to_str().unwrap()).expect("open sqlite");
//! ```

use anyhow::Context;
use diesel::{Connection, RunQueryDsl, SqliteConnection, sql_query};

/// Open a SQLite connection and apply connection-wide PRAGMAs.
pub fn connect_sqlite(database_url: &str) -> anyhow::Result<SqliteConnection> {
    let path = strip_scheme(database_url);
    let mut conn = SqliteConnection::establish(path)
        .with_context(|| format!("open sqlite database {path}"))?;

    sql_query("PRAGMA journal_mode=WAL;").execute(&mut conn)?;
    sql_query("PRAGMA foreign_keys=ON;").execute(&mut conn)?;
    sql_query("PRAGMA busy_timeout=5000;").execute(&mut conn)?;
    Ok(conn)
}

/// Accept both `sqlite:path` / `sqlite://path` URLs and bare file paths.
pub(crate) fn strip_scheme(database_url: &str) -> &str {
    database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_is_optional() {
        assert_eq!(strip_scheme("sqlite://stats.db"), "stats.db");
        assert_eq!(strip_scheme("sqlite:stats.db"), "stats.db");
        assert_eq!(strip_scheme("/var/lib/stats.db"), "/var/lib/stats.db");
    }
}
