#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use diesel::QueryableByName;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Integer, Text};
use parcel_stats::aggregate::{AggregateKey, AggregateRepo, Bucket, SqliteAggregates};
use parcel_stats::carrier::CarrierCode;
use parcel_stats::counters::{Counters, FixedDays};
use parcel_stats::db::{connection, migrate};
use parcel_stats::history::{self, KnownDates};
use parcel_stats::models::{DeliveryHistory, Parcel};
use parcel_stats::status::ParcelStatus;
use parcel_stats::{FixedClock, StatsEngine, parcels, stores};
use std::path::PathBuf;
use tempfile::TempDir;

#[derive(QueryableByName)]
struct JournalMode {
    #[diesel(sql_type = Text)]
    journal_mode: String,
}
#[derive(QueryableByName)]
struct ForeignKeys {
    #[diesel(sql_type = Integer)]
    foreign_keys: i32,
}
#[derive(QueryableByName)]
struct BusyTimeout {
    #[diesel(sql_type = Integer, column_name = "timeout")]
    busy_timeout: i32,
}
#[derive(QueryableByName)]
struct Count {
    #[diesel(sql_type = BigInt)]
    n: i64,
}

pub struct TestDb {
    _dir: TempDir,    // keep alive for the life of the test
    pub path: String, // <tmpdir>/test.db
}

pub fn setup_db() -> (TestDb, SqliteConnection) {
    let dir = TempDir::new().expect("tempdir");
    let mut p = PathBuf::from(dir.path());
    p.push("test.db");
    let path = p.to_string_lossy().to_string();

    migrate::run_all(&path).expect("migrations");

    let mut conn = connection::connect_sqlite(&path).expect("connect");
    assert_sqlite_pragmas(&mut conn);
    (TestDb { _dir: dir, path }, conn)
}

pub fn assert_sqlite_pragmas(conn: &mut SqliteConnection) {
    use diesel::sql_query;

    let jm: JournalMode = sql_query("PRAGMA journal_mode;").get_result(conn).unwrap();
    assert_eq!(jm.journal_mode.to_lowercase(), "wal"); // WAL is persistent per DB file

    let fk: ForeignKeys = sql_query("PRAGMA foreign_keys;").get_result(conn).unwrap();
    assert_eq!(fk.foreign_keys, 1);

    let bt: BusyTimeout = sql_query("PRAGMA busy_timeout;").get_result(conn).unwrap();
    assert_eq!(bt.busy_timeout, 5000);
}

pub fn count_rows(conn: &mut SqliteConnection, table: &str) -> i64 {
    let c: Count = diesel::sql_query(format!("SELECT COUNT(*) AS n FROM {table}"))
        .get_result(conn)
        .unwrap();
    c.n
}

// ---- time helpers ----

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

// ---- engine with a test classifier ----

/// Track numbers starting with `RB` are Belpost, `BY` Evropochta, anything else unknown.
pub fn classify(track: &str) -> Option<CarrierCode> {
    match track.get(..2) {
        Some("RB") => CarrierCode::new("belpost"),
        Some("BY") => CarrierCode::new("evropochta"),
        _ => None,
    }
}

pub type TestEngine = StatsEngine<fn(&str) -> Option<CarrierCode>, FixedClock>;

pub fn engine(now: DateTime<Utc>) -> TestEngine {
    StatsEngine::with_clock(
        classify as fn(&str) -> Option<CarrierCode>,
        FixedClock::at(now),
    )
}

pub fn belpost() -> CarrierCode {
    CarrierCode::new("belpost").unwrap()
}

// ---- seeding ----

pub fn seed_store(conn: &mut SqliteConnection, name: &str) -> i64 {
    stores::create_store(conn, 1, name).expect("store").id
}

/// Create a parcel (and its customer) and run the creation event through the engine.
pub fn new_parcel(
    conn: &mut SqliteConnection,
    engine: &TestEngine,
    store_id: i64,
    track: &str,
) -> Parcel {
    use parcel_stats::Clock;

    let customer = parcels::create_customer(conn).expect("customer");
    let parcel = parcels::insert_parcel(
        conn,
        track,
        store_id,
        Some(customer.id),
        ParcelStatus::Sent,
        engine.clock().now(),
    )
    .expect("parcel");
    assert!(
        engine
            .on_parcel_saved(conn, &parcel, true, None, None)
            .expect("saved")
    );
    parcel
}

/// Record arrival and an outcome date on the history row.
pub fn record_history(
    conn: &mut SqliteConnection,
    engine: &TestEngine,
    parcel: &Parcel,
    dates: KnownDates,
) -> DeliveryHistory {
    history::get_or_create(conn, parcel, engine.classifier()).expect("history");
    history::record_dates(conn, parcel.id, dates)
        .expect("dates")
        .expect("history row")
}

/// Drive a parcel to `status` the way a lifecycle handler would.
pub fn finalize(
    conn: &mut SqliteConnection,
    engine: &TestEngine,
    parcel: &Parcel,
    dates: KnownDates,
    status: ParcelStatus,
) -> bool {
    let hist = record_history(conn, engine, parcel, dates);
    let counted = engine
        .on_terminal_status_reached(conn, parcel, &hist, Some(ParcelStatus::Arrived), status)
        .expect("terminal");
    parcels::set_status(conn, parcel.id, status, hist_time(engine)).expect("status");
    counted
}

/// Regress a parcel out of `previous` into in-transit.
pub fn revert(
    conn: &mut SqliteConnection,
    engine: &TestEngine,
    parcel: &Parcel,
    previous: ParcelStatus,
) -> bool {
    let snapshot = history::find(conn, parcel.id).expect("find").expect("history");
    let current = parcels::find_parcel(conn, parcel.id).expect("find").expect("parcel");
    let reverted = engine
        .on_terminal_status_reverted(conn, &snapshot, &current, previous)
        .expect("revert");
    parcels::set_status(conn, parcel.id, ParcelStatus::InTransit, hist_time(engine))
        .expect("status");
    reverted
}

fn hist_time(engine: &TestEngine) -> DateTime<Utc> {
    use parcel_stats::Clock;
    engine.clock().now()
}

/// Write a daily store row directly.
pub fn put_daily(
    conn: &mut SqliteConnection,
    store_id: i64,
    carrier: Option<&CarrierCode>,
    on: NaiveDate,
    counters: Counters,
) {
    SqliteAggregates::new()
        .add(
            conn,
            &AggregateKey {
                store_id,
                carrier,
                bucket: Bucket::Daily(on),
            },
            &counters,
        )
        .expect("daily row");
}

pub fn counters(sent: i64, delivered: i64, returned: i64) -> Counters {
    Counters {
        sent,
        delivered,
        returned,
        ..Counters::default()
    }
}

pub fn with_days(mut c: Counters, delivery: i64, pickup: i64) -> Counters {
    c.sum_delivery_days = FixedDays::from_hundredths(delivery);
    c.sum_pickup_days = FixedDays::from_hundredths(pickup);
    c
}
