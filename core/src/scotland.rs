//! Scottish subset pipeline — name filter, CSV round trip, and plot shaping.
//!
//! Offline batch only:
//!   raw feed CSV → filter_scottish → subset CSV → replace_boa_volumes
//!   boa_volumes_scotland → to_plot_rows → dashboard

use crate::{
    error::{IngestError, IngestResult},
    record::{boa_records_from_table, boa_records_to_table, BoaVolumeRecord, PlotRow},
    store::CurtailmentStore,
    table::RawTable,
    writer::{WriteOutcome, Writer},
};
use chrono::NaiveTime;
use std::path::Path;

/// Generator-name fragments that mark a Scottish site.
pub const SCOTTISH_KEYWORDS: &[&str] = &["Beinn", "Dumfries", "Scottish", "Isle", "Cairn"];

/// Case-insensitive substring match against any keyword. A missing name never matches.
pub fn is_scottish(name: Option<&str>, keywords: &[&str]) -> bool {
    let Some(name) = name else {
        return false;
    };
    let name = name.to_lowercase();
    keywords.iter().any(|k| name.contains(&k.to_lowercase()))
}

pub fn filter_scottish(records: &[BoaVolumeRecord]) -> Vec<BoaVolumeRecord> {
    filter_by_keywords(records, SCOTTISH_KEYWORDS)
}

pub fn filter_by_keywords(records: &[BoaVolumeRecord], keywords: &[&str]) -> Vec<BoaVolumeRecord> {
    let kept: Vec<BoaVolumeRecord> = records
        .iter()
        .filter(|r| is_scottish(r.generator_full_name.as_deref(), keywords))
        .cloned()
        .collect();
    log::info!("Rows filtered for Scotland: {} of {}", kept.len(), records.len());
    kept
}

/// Reshape subset rows into the dashboard's plotting schema.
///
/// The feed has no FPN or cost signal, so those are zero. The plotted level is
/// the magnitude of the acceptance volume; its sign only gives direction.
pub fn to_plot_rows(records: &[BoaVolumeRecord]) -> IngestResult<Vec<PlotRow>> {
    records
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let date = r
                .date
                .ok_or_else(|| IngestError::Shape(format!("row {i}: Date is missing")))?;
            let volume = r
                .boa_volume
                .ok_or_else(|| IngestError::Shape(format!("row {i}: BOA_Volume is missing")))?;
            Ok(PlotRow {
                local_datetime:      date.and_time(NaiveTime::MIN),
                level_fpn_mw:        0.0,
                level_after_boal_mw: volume.abs(),
                cost_gbp:            0.0,
                turnup_cost_gbp:     0.0,
            })
        })
        .collect()
}

/// Read a raw feed CSV, keep the Scottish rows, and write them to `output`
/// with every original column. Returns (total, kept).
pub fn filter_csv(input: impl AsRef<Path>, output: impl AsRef<Path>) -> IngestResult<(usize, usize)> {
    let table = RawTable::from_csv_path(input)?;
    let records = boa_records_from_table(&table)?;
    let kept = filter_scottish(&records);
    let mut out = boa_records_to_table(&kept);
    // Keep the input's column order rather than canonical-first.
    reorder_columns(&mut out, &table.columns);
    out.write_csv_path(output)?;
    Ok((records.len(), kept.len()))
}

/// Load a subset CSV into `boa_volumes_scotland`, replacing whatever was there.
pub fn load_subset_csv(path: impl AsRef<Path>, store: &dyn CurtailmentStore) -> IngestResult<WriteOutcome> {
    let table = RawTable::from_csv_path(path)?;
    let records = boa_records_from_table(&table)?;
    Writer::new(store).replace_boa_volumes(&records)
}

fn reorder_columns(table: &mut RawTable, order: &[String]) {
    let mut target: Vec<String> = order.iter().filter(|c| table.has_column(c)).cloned().collect();
    for c in &table.columns {
        if !target.contains(c) {
            target.push(c.clone());
        }
    }
    let positions: Vec<usize> = target
        .iter()
        .filter_map(|c| table.column_index(c))
        .collect();
    table.rows = table
        .rows
        .iter()
        .map(|row| positions.iter().map(|&p| row.get(p).cloned().flatten()).collect())
        .collect();
    table.columns = target;
}
