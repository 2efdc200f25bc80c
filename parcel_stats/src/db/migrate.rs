//! Embedded schema migrations.

use anyhow::anyhow;
use diesel::{Connection, SqliteConnection, connection::SimpleConnection};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::info;

use super::connection::strip_scheme;

/// Embedded Diesel migrations bundled with this crate.
///
/// Applied by [`run_sqlite`] to bring the database schema up to date.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Run pending migrations on the SQLite database at `url`.
///
/// Switches the journal to WAL first; the setting is persistent for the file.
pub fn run_sqlite(url: &str) -> anyhow::Result<()> {
    let mut conn = SqliteConnection::establish(strip_scheme(url))?;
    conn.batch_execute("PRAGMA journal_mode=WAL;")?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow!(e))?;
    info!(applied = applied.len(), "migrations applied");
    Ok(())
}

/// Run pending migrations for `database_url`.
///
/// Accepts `sqlite:` URLs and bare file paths. Server databases are refused:
/// the aggregate upserts are written against SQLite's `ON CONFLICT` and
/// scalar `MAX` semantics.
pub fn run_all(database_url: &str) -> anyhow::Result<()> {
    if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        anyhow::bail!("Unsupported DATABASE_URL: {database_url} (only SQLite is supported)");
    }
    run_sqlite(database_url)
}
