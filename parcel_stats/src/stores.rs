//! Store rows: creation and cascading deletion.
//!
//! Every aggregate table references `stores(id)` with `ON DELETE CASCADE`, so
//! deleting a store removes its rows at every granularity. The cascade relies
//! on `PRAGMA foreign_keys=ON`, which [`crate::db::connection::connect_sqlite`]
//! applies.

use diesel::prelude::*;
use tracing::info;

use crate::{
    models::{NewStore, Store},
    schema::stores,
};

/// Insert a store and return it.
pub fn create_store(
    conn: &mut SqliteConnection,
    owner_id: i64,
    name: &str,
) -> anyhow::Result<Store> {
    let store = diesel::insert_into(stores::table)
        .values(&NewStore { owner_id, name })
        .returning(Store::as_returning())
        .get_result(conn)?;
    Ok(store)
}

/// Look a store up by id.
pub fn find_store(conn: &mut SqliteConnection, id: i64) -> anyhow::Result<Option<Store>> {
    Ok(stores::table
        .find(id)
        .select(Store::as_select())
        .first(conn)
        .optional()?)
}

/// Delete a store together with its parcels and every aggregate row.
///
/// Returns `false` if no such store existed.
pub fn delete_store(conn: &mut SqliteConnection, id: i64) -> anyhow::Result<bool> {
    let n = diesel::delete(stores::table.find(id)).execute(conn)?;
    if n > 0 {
        info!(store_id = id, "store deleted with all statistics");
    }
    Ok(n > 0)
}
