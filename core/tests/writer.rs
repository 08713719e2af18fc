use chrono::{NaiveDate, NaiveDateTime};
use curtailment_core::{
    error::{IngestError, IngestResult},
    query::Dialect,
    record::{BoaVolumeRecord, CurtailmentReading, CurtailmentRecord, PriceRecord},
    store::{ConnectionReport, CurtailmentStore, SqliteStore},
    types::{Timestamp, BOA_VOLUMES_TABLE, CURTAILMENT_TABLE, PRICE_TABLE},
    writer::{WriteOutcome, Writer},
};
use std::sync::atomic::{AtomicUsize, Ordering};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn ts(d: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2022, 1, d).unwrap().and_hms_opt(h, m, 0).unwrap()
}

fn store() -> SqliteStore {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = SqliteStore::in_memory().expect("in-memory store");
    store.ensure_schema().expect("schema");
    store
}

fn curtailment(time: NaiveDateTime) -> CurtailmentRecord {
    CurtailmentRecord {
        time,
        level_fpn: Some(10.0),
        level_boal: Some(2.0),
        level_after_boal: Some(8.0),
        delta_mw: Some(-2.0),
        cost_gbp: Some(150.0),
    }
}

fn price(time: NaiveDateTime, p: f64) -> PriceRecord {
    PriceRecord { time, system_buy_price: Some(p) }
}

/// Counts every call that would reach the database.
#[derive(Default)]
struct CountingStore {
    calls: AtomicUsize,
}

impl CountingStore {
    fn hit(&self) -> IngestResult<usize> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }
}

impl CurtailmentStore for CountingStore {
    fn dialect(&self) -> Dialect { Dialect::Sqlite }
    fn ensure_schema(&self) -> IngestResult<()> { self.hit().map(|_| ()) }
    fn append_curtailment(&self, _: &[CurtailmentRecord]) -> IngestResult<usize> { self.hit() }
    fn append_price(&self, _: &[PriceRecord]) -> IngestResult<usize> { self.hit() }
    fn replace_boa_volumes(&self, _: &[BoaVolumeRecord]) -> IngestResult<usize> { self.hit() }
    fn query_curtailment(&self, _: &str, _: &[&Timestamp]) -> IngestResult<Vec<CurtailmentReading>> {
        self.hit().map(|_| Vec::new())
    }
    fn select_boa_volumes(&self) -> IngestResult<Vec<BoaVolumeRecord>> { self.hit().map(|_| Vec::new()) }
    fn probe(&self) -> IngestResult<ConnectionReport> {
        Err(IngestError::Connection("not a real database".into()))
    }
}

// ── Empty batches ────────────────────────────────────────────────────────────

#[test]
fn empty_batches_never_reach_the_store() {
    let fake = CountingStore::default();
    let writer = Writer::new(&fake);

    assert_eq!(writer.write_curtailment(&[]).unwrap(), WriteOutcome::Empty);
    assert_eq!(writer.write_price(&[]).unwrap(), WriteOutcome::Empty);

    assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
}

// ── Curtailment ──────────────────────────────────────────────────────────────

#[test]
fn curtailment_rows_are_appended() {
    let store = store();
    let writer = Writer::new(&store);

    let out = writer
        .write_curtailment(&[curtailment(ts(1, 0, 0)), curtailment(ts(1, 0, 30))])
        .unwrap();
    writer.write_curtailment(&[curtailment(ts(1, 1, 0))]).unwrap();

    assert_eq!(out, WriteOutcome::Written(2));
    assert_eq!(store.count_rows(CURTAILMENT_TABLE).unwrap(), 3);
}

/// Curtailment has no duplicate tolerance, but repeated times are simply appended.
#[test]
fn curtailment_accepts_repeated_times() {
    let store = store();
    let writer = Writer::new(&store);

    writer.write_curtailment(&[curtailment(ts(1, 0, 0))]).unwrap();
    writer.write_curtailment(&[curtailment(ts(1, 0, 0))]).unwrap();

    assert_eq!(store.count_rows(CURTAILMENT_TABLE).unwrap(), 2);
}

#[test]
fn curtailment_failure_propagates() {
    // No ensure_schema: the table does not exist.
    let store = SqliteStore::in_memory().unwrap();
    let writer = Writer::new(&store);

    let result = writer.write_curtailment(&[curtailment(ts(1, 0, 0))]);

    assert!(matches!(result, Err(IngestError::Database(_))));
}

// ── Price ────────────────────────────────────────────────────────────────────

#[test]
fn duplicate_price_time_is_not_raised_and_not_duplicated() {
    let store = store();
    let writer = Writer::new(&store);

    writer.write_price(&[price(ts(2, 0, 0), 90.0)]).unwrap();
    let second = writer.write_price(&[price(ts(2, 0, 0), 120.0)]).unwrap();

    assert_eq!(
        second,
        WriteOutcome::Skipped { rows: 1, first: ts(2, 0, 0), last: ts(2, 0, 0) }
    );
    assert_eq!(store.count_rows(PRICE_TABLE).unwrap(), 1);
}

/// One colliding row skips the whole batch, including its fresh rows.
#[test]
fn price_collision_skips_the_whole_batch() {
    let store = store();
    let writer = Writer::new(&store);
    writer.write_price(&[price(ts(3, 1, 0), 50.0)]).unwrap();

    let out = writer
        .write_price(&[
            price(ts(3, 0, 0), 40.0),
            price(ts(3, 0, 30), 45.0),
            price(ts(3, 1, 0), 55.0),
        ])
        .unwrap();

    match out {
        WriteOutcome::Skipped { rows, first, last } => {
            assert_eq!(rows, 3);
            assert_eq!(first, ts(3, 0, 0));
            assert_eq!(last, ts(3, 1, 0));
        }
        other => panic!("expected a skipped batch, got {other:?}"),
    }
    assert_eq!(store.count_rows(PRICE_TABLE).unwrap(), 1);
}

#[test]
fn non_colliding_price_batches_are_written() {
    let store = store();
    let writer = Writer::new(&store);

    let a = writer.write_price(&[price(ts(4, 0, 0), 1.0), price(ts(4, 0, 30), 2.0)]).unwrap();
    let b = writer.write_price(&[price(ts(4, 1, 0), 3.0)]).unwrap();

    assert_eq!(a.rows_written() + b.rows_written(), 3);
    assert_eq!(store.count_rows(PRICE_TABLE).unwrap(), 3);
}

// ── Subset replace ───────────────────────────────────────────────────────────

#[test]
fn replace_boa_volumes_does_not_accumulate() {
    let store = store();
    let writer = Writer::new(&store);
    let first: Vec<BoaVolumeRecord> = ["Beinn A", "Beinn B", "Beinn C"]
        .iter()
        .map(|n| BoaVolumeRecord::named(n))
        .collect();
    let second = vec![BoaVolumeRecord::named("Isle of Lewis")];

    writer.replace_boa_volumes(&first).unwrap();
    writer.replace_boa_volumes(&second).unwrap();

    assert_eq!(store.count_rows(BOA_VOLUMES_TABLE).unwrap(), 1);
    let rows = store.select_boa_volumes().unwrap();
    assert_eq!(rows[0].generator_full_name.as_deref(), Some("Isle of Lewis"));
}

#[test]
fn replace_with_no_rows_leaves_an_empty_table() {
    let store = store();
    let writer = Writer::new(&store);
    writer.replace_boa_volumes(&[BoaVolumeRecord::named("Cairn Uish")]).unwrap();

    writer.replace_boa_volumes(&[]).unwrap();

    assert_eq!(store.count_rows(BOA_VOLUMES_TABLE).unwrap(), 0);
}
