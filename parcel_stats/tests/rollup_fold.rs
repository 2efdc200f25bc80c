mod common;
use common::{at, belpost, count_rows, counters, day, engine, put_daily, setup_db, with_days};

use diesel::prelude::*;
use diesel::sql_query;
use parcel_stats::counters::Counters;
use parcel_stats::period::{Granularity, PeriodKey};

const WEEK_9: PeriodKey = PeriodKey { year: 2025, number: 9 };
const WEEK_10: PeriodKey = PeriodKey { year: 2025, number: 10 };

/// Daily rows for Mon 2025-02-24 ..= Sun 2025-03-02 (ISO week 9) and their sum.
fn seed_week_9(conn: &mut SqliteConnection, store: i64) -> Counters {
    let mut total = Counters::default();
    for (i, d) in (24..=28).map(|d| day(2025, 2, d)).chain([day(2025, 3, 1), day(2025, 3, 2)]).enumerate() {
        let n = i as i64 + 1;
        let c = with_days(counters(n + 2, n, 1), n * 100, n * 50);
        put_daily(conn, store, None, d, c);
        put_daily(conn, store, Some(&belpost()), d, c);
        total += c;
    }
    total
}

fn fold_week_9(conn: &mut SqliteConnection, eng: &common::TestEngine) {
    for d in (24..=28).map(|d| day(2025, 2, d)).chain([day(2025, 3, 1), day(2025, 3, 2)]) {
        let report = eng.fold_date(conn, d).unwrap();
        assert_eq!((report.store_rows, report.carrier_rows, report.failed), (1, 1, 0));
    }
}

#[test]
fn folding_a_week_sums_its_daily_rows_into_every_rollup() {
    let (_db, mut conn) = setup_db();
    let eng = engine(at(2025, 3, 3, 2));
    let store = common::seed_store(&mut conn, "north");
    let total = seed_week_9(&mut conn, store);

    fold_week_9(&mut conn, &eng);

    let week = eng
        .get_rollup(&mut conn, store, None, Granularity::Week, WEEK_9)
        .unwrap();
    assert_eq!(week, Some(total));
    assert_eq!(
        eng.get_rollup(&mut conn, store, Some(&belpost()), Granularity::Week, WEEK_9)
            .unwrap(),
        Some(total)
    );

    // the week straddles February and March
    let feb = eng
        .get_rollup(&mut conn, store, None, Granularity::Month, PeriodKey { year: 2025, number: 2 })
        .unwrap()
        .unwrap();
    let mar = eng
        .get_rollup(&mut conn, store, None, Granularity::Month, PeriodKey { year: 2025, number: 3 })
        .unwrap()
        .unwrap();
    assert_eq!(feb + mar, total);
    assert_eq!(mar.sent, 6 + 2 + 7 + 2);

    let year = eng
        .get_rollup(&mut conn, store, None, Granularity::Year, PeriodKey { year: 2025, number: 1 })
        .unwrap();
    assert_eq!(year, Some(total));
}

#[test]
fn folding_the_same_date_twice_doubles_the_rollups() {
    let (_db, mut conn) = setup_db();
    let eng = engine(at(2025, 3, 2, 2));
    let store = common::seed_store(&mut conn, "north");
    let c = with_days(counters(5, 3, 1), 420, 300);
    put_daily(&mut conn, store, None, day(2025, 3, 1), c);

    eng.fold_date(&mut conn, day(2025, 3, 1)).unwrap();
    eng.fold_date(&mut conn, day(2025, 3, 1)).unwrap();

    for (g, key) in [
        (Granularity::Week, WEEK_9),
        (Granularity::Month, PeriodKey { year: 2025, number: 3 }),
        (Granularity::Year, PeriodKey { year: 2025, number: 1 }),
    ] {
        let rollup = eng.get_rollup(&mut conn, store, None, g, key).unwrap();
        assert_eq!(rollup, Some(c + c), "{g} rollup should be doubled");
    }
}

#[test]
fn fold_once_skips_a_date_already_in_the_log() {
    let (_db, mut conn) = setup_db();
    let eng = engine(at(2025, 3, 2, 2));
    let store = common::seed_store(&mut conn, "north");
    let c = counters(5, 3, 1);
    put_daily(&mut conn, store, None, day(2025, 3, 1), c);

    let first = eng.fold_yesterday(&mut conn).unwrap();
    assert_eq!(first.day, day(2025, 3, 1));
    assert!(!first.already_folded);
    assert_eq!(first.store_rows, 1);

    let second = eng.fold_date_once(&mut conn, day(2025, 3, 1)).unwrap();
    assert!(second.already_folded);
    assert_eq!(second.store_rows, 0);

    assert_eq!(
        eng.get_rollup(&mut conn, store, None, Granularity::Week, WEEK_9)
            .unwrap(),
        Some(c)
    );
    assert_eq!(common::count_rows(&mut conn, "rollup_fold_log"), 1);
}

#[test]
fn a_failing_row_does_not_stop_the_rest_of_the_fold() {
    let (_db, mut conn) = setup_db();
    let eng = engine(at(2025, 3, 2, 2));
    let good = common::seed_store(&mut conn, "good");
    let bad = common::seed_store(&mut conn, "bad");
    put_daily(&mut conn, good, None, day(2025, 3, 1), counters(2, 1, 0));
    put_daily(&mut conn, bad, None, day(2025, 3, 1), counters(4, 1, 1));
    put_daily(&mut conn, bad, Some(&belpost()), day(2025, 3, 1), counters(4, 1, 1));

    sql_query(format!(
        "CREATE TRIGGER reject_bad BEFORE INSERT ON rollup_store_stats
         WHEN NEW.store_id = {bad}
         BEGIN SELECT RAISE(ABORT, 'boom'); END;"
    ))
    .execute(&mut conn)
    .unwrap();

    let report = eng.fold_date(&mut conn, day(2025, 3, 1)).unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.store_rows, 1);
    assert_eq!(report.carrier_rows, 1);

    assert_eq!(
        eng.get_rollup(&mut conn, good, None, Granularity::Month, PeriodKey { year: 2025, number: 3 })
            .unwrap(),
        Some(counters(2, 1, 0))
    );
    // the failed row rolled back as a whole: no week row slipped through
    assert_eq!(
        eng.get_rollup(&mut conn, bad, None, Granularity::Week, WEEK_9)
            .unwrap(),
        None
    );
    assert_eq!(
        eng.get_rollup(&mut conn, bad, Some(&belpost()), Granularity::Week, WEEK_9)
            .unwrap(),
        Some(counters(4, 1, 1))
    );
}

#[test]
fn rebuilding_a_period_replaces_instead_of_adding() {
    let (_db, mut conn) = setup_db();
    let eng = engine(at(2025, 3, 3, 2));
    let store = common::seed_store(&mut conn, "north");
    let total = seed_week_9(&mut conn, store);

    fold_week_9(&mut conn, &eng);
    fold_week_9(&mut conn, &eng);
    assert_eq!(
        eng.get_rollup(&mut conn, store, None, Granularity::Week, WEEK_9)
            .unwrap(),
        Some(total + total)
    );

    let report = eng
        .rebuild_period(&mut conn, Granularity::Week, WEEK_9)
        .unwrap();
    assert_eq!(report.deleted, 2);
    assert_eq!(report.daily_rows, 14);
    assert_eq!(report.until, day(2025, 3, 3));
    assert_eq!(report.marked, 7);
    assert_eq!(
        eng.get_rollup(&mut conn, store, None, Granularity::Week, WEEK_9)
            .unwrap(),
        Some(total)
    );
    assert_eq!(
        eng.get_rollup(&mut conn, store, Some(&belpost()), Granularity::Week, WEEK_9)
            .unwrap(),
        Some(total)
    );

    assert!(
        eng.rebuild_period(&mut conn, Granularity::Day, WEEK_9)
            .is_err()
    );
}

fn week_10_sent(conn: &mut SqliteConnection, eng: &common::TestEngine, store: i64) -> i64 {
    eng.get_rollup(conn, store, None, Granularity::Week, WEEK_10)
        .unwrap()
        .map_or(0, |c| c.sent)
}

/// Mon 2025-03-03 and Tue 2025-03-04 folded nightly, Wed 2025-03-05 still open.
fn seed_open_week_10(conn: &mut SqliteConnection, eng: &common::TestEngine, store: i64) {
    put_daily(conn, store, None, day(2025, 3, 3), counters(2, 0, 0));
    eng.clock().set(at(2025, 3, 4, 0));
    eng.fold_yesterday(conn).unwrap();
    put_daily(conn, store, None, day(2025, 3, 4), counters(3, 0, 0));
    eng.clock().set(at(2025, 3, 5, 0));
    eng.fold_yesterday(conn).unwrap();
    put_daily(conn, store, None, day(2025, 3, 5), counters(4, 0, 0));
}

#[test]
fn rebuilding_an_open_week_leaves_today_to_the_nightly_fold() {
    let (_db, mut conn) = setup_db();
    let eng = engine(at(2025, 3, 3, 9));
    let store = common::seed_store(&mut conn, "north");
    seed_open_week_10(&mut conn, &eng, store);

    eng.clock().set(at(2025, 3, 5, 10));
    let report = eng
        .rebuild_period(&mut conn, Granularity::Week, WEEK_10)
        .unwrap();
    assert_eq!(report.until, day(2025, 3, 5));
    assert_eq!(report.daily_rows, 2);
    assert_eq!(report.marked, 0, "monday and tuesday were already in the log");
    assert_eq!(week_10_sent(&mut conn, &eng, store), 5);

    eng.clock().set(at(2025, 3, 6, 0));
    let nightly = eng.fold_yesterday(&mut conn).unwrap();
    assert_eq!(nightly.day, day(2025, 3, 5));
    assert!(!nightly.already_folded);
    assert_eq!(week_10_sent(&mut conn, &eng, store), 2 + 3 + 4);
}

#[test]
fn rebuild_before_the_nightly_fold_marks_the_dates_it_summed() {
    let (_db, mut conn) = setup_db();
    let eng = engine(at(2025, 3, 3, 9));
    let store = common::seed_store(&mut conn, "north");
    seed_open_week_10(&mut conn, &eng, store);

    // past midnight, but the scheduler has not folded wednesday yet
    eng.clock().set(at(2025, 3, 6, 0));
    let report = eng
        .rebuild_period(&mut conn, Granularity::Week, WEEK_10)
        .unwrap();
    assert_eq!(report.until, day(2025, 3, 6));
    assert_eq!(report.marked, 1);
    assert_eq!(week_10_sent(&mut conn, &eng, store), 9);

    let nightly = eng.fold_yesterday(&mut conn).unwrap();
    assert!(nightly.already_folded);
    assert_eq!(week_10_sent(&mut conn, &eng, store), 9);
    assert_eq!(count_rows(&mut conn, "rollup_fold_log"), 3);
}

#[test]
fn rebuilding_a_period_that_has_not_started_fails() {
    let (_db, mut conn) = setup_db();
    let eng = engine(at(2025, 3, 3, 9));
    common::seed_store(&mut conn, "north");

    // week 10 starts today
    assert!(
        eng.rebuild_period(&mut conn, Granularity::Week, WEEK_10)
            .is_err()
    );
    assert!(
        eng.rebuild_period(&mut conn, Granularity::Month, PeriodKey { year: 2025, number: 4 })
            .is_err()
    );
    assert_eq!(count_rows(&mut conn, "rollup_fold_log"), 0);
}

#[test]
fn fold_once_keeps_no_marker_when_the_fold_cannot_run() {
    let (_db, mut conn) = setup_db();
    let eng = engine(at(2025, 3, 2, 2));
    let store = common::seed_store(&mut conn, "north");
    put_daily(&mut conn, store, None, day(2025, 3, 1), counters(5, 3, 1));

    sql_query("ALTER TABLE daily_carrier_stats RENAME TO daily_carrier_stats_away")
        .execute(&mut conn)
        .unwrap();
    assert!(eng.fold_yesterday(&mut conn).is_err());
    assert_eq!(count_rows(&mut conn, "rollup_fold_log"), 0);
    assert_eq!(count_rows(&mut conn, "rollup_store_stats"), 0);

    sql_query("ALTER TABLE daily_carrier_stats_away RENAME TO daily_carrier_stats")
        .execute(&mut conn)
        .unwrap();
    let retried = eng.fold_yesterday(&mut conn).unwrap();
    assert!(!retried.already_folded);
    assert_eq!(
        eng.get_rollup(&mut conn, store, None, Granularity::Week, WEEK_9)
            .unwrap(),
        Some(counters(5, 3, 1))
    );
}

#[test]
fn fold_once_skips_a_failing_row_and_keeps_the_rest() {
    let (_db, mut conn) = setup_db();
    let eng = engine(at(2025, 3, 2, 2));
    let good = common::seed_store(&mut conn, "good");
    let bad = common::seed_store(&mut conn, "bad");
    put_daily(&mut conn, good, None, day(2025, 3, 1), counters(2, 1, 0));
    put_daily(&mut conn, bad, None, day(2025, 3, 1), counters(4, 1, 1));

    sql_query(format!(
        "CREATE TRIGGER reject_bad BEFORE INSERT ON rollup_store_stats
         WHEN NEW.store_id = {bad}
         BEGIN SELECT RAISE(ABORT, 'boom'); END;"
    ))
    .execute(&mut conn)
    .unwrap();

    let report = eng.fold_yesterday(&mut conn).unwrap();
    assert_eq!((report.store_rows, report.failed), (1, 1));
    assert_eq!(count_rows(&mut conn, "rollup_fold_log"), 1);
    assert_eq!(
        eng.get_rollup(&mut conn, good, None, Granularity::Year, PeriodKey { year: 2025, number: 1 })
            .unwrap(),
        Some(counters(2, 1, 0))
    );
    assert_eq!(
        eng.get_rollup(&mut conn, bad, None, Granularity::Week, WEEK_9)
            .unwrap(),
        None
    );
}
