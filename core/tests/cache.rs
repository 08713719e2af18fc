use chrono::{Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use curtailment_core::{
    cache::QueryCache,
    clock::ManualClock,
    config::AppConfig,
    dashboard::Dashboard,
    error::{IngestError, IngestResult},
    reader::Reader,
    record::{BoaVolumeRecord, CurtailmentReading, CurtailmentRecord},
    store::{CurtailmentStore, SqliteStore},
    writer::Writer,
};
use std::cell::Cell;
use std::path::PathBuf;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn ts(d: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2022, 6, d).unwrap().and_hms_opt(h, 0, 0).unwrap()
}

fn cache() -> QueryCache<ManualClock> {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
    QueryCache::new(Duration::minutes(10), clock)
}

fn reading(t: NaiveDateTime) -> CurtailmentReading {
    CurtailmentReading {
        time_from: t,
        time_to: t + Duration::minutes(30),
        level_fpn: Some(1.0),
        level_boal: Some(0.0),
        level_after_boal: Some(0.0),
        delta_mw: Some(-1.0),
        cost_gbp: None,
    }
}

/// Loader that counts invocations.
fn counting(calls: &Cell<usize>) -> impl Fn(NaiveDateTime, NaiveDateTime) -> IngestResult<Vec<CurtailmentReading>> + '_ {
    move |start, _end| {
        calls.set(calls.get() + 1);
        Ok(vec![reading(start)])
    }
}

// ── Expiry ───────────────────────────────────────────────────────────────────

#[test]
fn repeat_within_ttl_is_served_from_cache() {
    let cache = cache();
    let calls = Cell::new(0);

    let a = cache.get_or_load(ts(1, 0), ts(2, 0), counting(&calls)).unwrap();
    cache.clock().advance(Duration::minutes(9));
    let b = cache.get_or_load(ts(1, 0), ts(2, 0), counting(&calls)).unwrap();

    assert_eq!(calls.get(), 1);
    assert_eq!(a, b);
}

#[test]
fn entry_expires_after_ttl() {
    let cache = cache();
    let calls = Cell::new(0);

    cache.get_or_load(ts(1, 0), ts(2, 0), counting(&calls)).unwrap();
    cache.clock().advance(Duration::minutes(10) + Duration::seconds(1));
    cache.get_or_load(ts(1, 0), ts(2, 0), counting(&calls)).unwrap();

    assert_eq!(calls.get(), 2);
}

#[test]
fn different_windows_are_separate_entries() {
    let cache = cache();
    let calls = Cell::new(0);

    cache.get_or_load(ts(1, 0), ts(2, 0), counting(&calls)).unwrap();
    cache.get_or_load(ts(1, 0), ts(3, 0), counting(&calls)).unwrap();

    assert_eq!(calls.get(), 2);
    assert_eq!(cache.len(), 2);
}

#[test]
fn expired_entries_are_evicted() {
    let cache = cache();
    let calls = Cell::new(0);
    cache.get_or_load(ts(1, 0), ts(2, 0), counting(&calls)).unwrap();
    cache.get_or_load(ts(3, 0), ts(4, 0), counting(&calls)).unwrap();

    cache.clock().advance(Duration::minutes(11));
    cache.get_or_load(ts(5, 0), ts(6, 0), counting(&calls)).unwrap();

    assert_eq!(cache.len(), 1);
}

#[test]
fn failed_loads_are_not_cached() {
    let cache = cache();
    let calls = Cell::new(0);

    let failed = cache.get_or_load(ts(1, 0), ts(2, 0), |_, _| Err(IngestError::Query("down".into())));
    let ok = cache.get_or_load(ts(1, 0), ts(2, 0), counting(&calls));

    assert!(matches!(failed, Err(IngestError::Query(_))));
    assert!(ok.is_ok());
    assert_eq!(calls.get(), 1);
}

// ── Dashboard ────────────────────────────────────────────────────────────────

#[test]
fn dashboard_reads_through_the_cache() {
    let store = SqliteStore::in_memory().unwrap();
    store.ensure_schema().unwrap();
    let writer = Writer::new(&store);
    let record = |t| CurtailmentRecord {
        time: t,
        level_fpn: Some(10.0),
        level_boal: Some(4.0),
        level_after_boal: Some(4.0),
        delta_mw: Some(-6.0),
        cost_gbp: Some(60.0),
    };
    writer.write_curtailment(&[record(ts(1, 0))]).unwrap();
    let sql_dir = PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/../sql"));
    let dashboard = Dashboard::new(Reader::new(&store, &sql_dir), cache());

    let first = dashboard.current_dataset().unwrap();
    // A write inside the TTL is not visible yet.
    writer.write_curtailment(&[record(ts(1, 1))]).unwrap();
    let second = dashboard.current_dataset().unwrap();

    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
}

#[test]
fn latest_dataset_runs_from_2020_to_opening_time() {
    let store = SqliteStore::in_memory().unwrap();
    store.ensure_schema().unwrap();
    let old = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
    let future = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
    let rows: Vec<CurtailmentRecord> = [old, ts(1, 0), future]
        .into_iter()
        .map(|t| CurtailmentRecord {
            time: t,
            level_fpn: Some(1.0),
            level_boal: Some(1.0),
            level_after_boal: Some(1.0),
            delta_mw: Some(0.0),
            cost_gbp: None,
        })
        .collect();
    Writer::new(&store).write_curtailment(&rows).unwrap();
    let sql_dir = PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/../sql"));
    // The manual clock reads 2024-01-01, so the 2025 row is out of range.
    let dashboard = Dashboard::new(Reader::new(&store, &sql_dir), cache());

    let latest = dashboard.latest_dataset().unwrap();

    assert_eq!(latest.len(), 2);
    assert_eq!(latest[0].time_from, old);
}

#[test]
fn dashboard_from_config_serves_subset_plot_rows() {
    let store = SqliteStore::in_memory().unwrap();
    let subset = BoaVolumeRecord {
        date: NaiveDate::from_ymd_opt(2025, 4, 1),
        settlement_period: Some(5),
        boa_volume: Some(-7.5),
        ..BoaVolumeRecord::named("Beinn Tharsuinn")
    };
    Writer::new(&store).replace_boa_volumes(&[subset]).unwrap();
    let config = AppConfig {
        sql_dir: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/../sql")),
        ..AppConfig::default_test()
    };
    let dashboard = Dashboard::from_config(&store, &config).unwrap();

    let rows = dashboard.scottish_plot_rows().unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].level_after_boal_mw, 7.5);
}
