//! Canonical record shapes. Column names here are part of the storage contract.

use crate::{
    error::IngestResult,
    table::{parse_f64, parse_i64, RawTable},
    types::{parse_date, Timestamp},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One row of the `curtailment` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurtailmentRecord {
    pub time:             Timestamp,
    /// Numeric cells may be blank upstream; blanks are stored as NULL.
    pub level_fpn:        Option<f64>,
    pub level_boal:       Option<f64>,
    pub level_after_boal: Option<f64>,
    pub delta_mw:         Option<f64>,
    /// Legacy files often carry no cost column.
    pub cost_gbp:         Option<f64>,
}

impl CurtailmentRecord {
    pub const COLUMNS: [&'static str; 6] = [
        "time",
        "level_fpn",
        "level_boal",
        "level_after_boal",
        "delta_mw",
        "cost_gbp",
    ];
}

/// One row of the `sbp` table. `time` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub time:             Timestamp,
    pub system_buy_price: Option<f64>,
}

impl PriceRecord {
    pub const COLUMNS: [&'static str; 2] = ["time", "system_buy_price"];
}

/// A row returned by the curtailment read template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurtailmentReading {
    #[serde(rename = "timeFrom")]
    pub time_from:        Timestamp,
    #[serde(rename = "timeTo")]
    pub time_to:          Timestamp,
    pub level_fpn:        Option<f64>,
    pub level_boal:       Option<f64>,
    pub level_after_boal: Option<f64>,
    pub delta_mw:         Option<f64>,
    pub cost_gbp:         Option<f64>,
}

pub const BOA_DATE: &str = "Date";
pub const BOA_SETTLEMENT_PERIOD: &str = "Settlement_Period";
pub const BOA_GENERATOR_NAME: &str = "Generator_Full_Name";
pub const BOA_VOLUME: &str = "BOA_Volume";

/// One generator-level bid-offer acceptance row from the subset feed.
///
/// The four named fields are typed; every other column of the feed rides
/// along in `extra` as text so the subset can be written back out whole.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BoaVolumeRecord {
    pub date:                Option<NaiveDate>,
    pub settlement_period:   Option<i64>,
    pub generator_full_name: Option<String>,
    pub boa_volume:          Option<f64>,
    pub extra:               BTreeMap<String, Option<String>>,
}

impl BoaVolumeRecord {
    pub const COLUMNS: [&'static str; 4] = [BOA_DATE, BOA_SETTLEMENT_PERIOD, BOA_GENERATOR_NAME, BOA_VOLUME];

    pub fn is_canonical(column: &str) -> bool {
        Self::COLUMNS.contains(&column)
    }

    pub fn named(name: &str) -> Self {
        Self {
            generator_full_name: Some(name.to_string()),
            ..Self::default()
        }
    }
}

/// Parse a raw feed into BOA records. Absent canonical columns leave the field `None`;
/// a present but malformed value is a schema error.
pub fn boa_records_from_table(table: &RawTable) -> IngestResult<Vec<BoaVolumeRecord>> {
    let date_idx = table.column_index(BOA_DATE);
    let period_idx = table.column_index(BOA_SETTLEMENT_PERIOD);
    let name_idx = table.column_index(BOA_GENERATOR_NAME);
    let volume_idx = table.column_index(BOA_VOLUME);
    let extra_cols: Vec<(usize, &String)> = table
        .columns
        .iter()
        .enumerate()
        .filter(|(_, c)| !BoaVolumeRecord::is_canonical(c))
        .collect();

    let mut out = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        let at = |idx: Option<usize>| idx.and_then(|i| table.cell(row, i));
        let date = match at(date_idx) {
            Some(v) => Some(parse_date(v)?),
            None => None,
        };
        out.push(BoaVolumeRecord {
            date,
            settlement_period: parse_i64(at(period_idx), BOA_SETTLEMENT_PERIOD, row)?,
            generator_full_name: at(name_idx).map(str::to_string),
            boa_volume: parse_f64(at(volume_idx), BOA_VOLUME, row)?,
            extra: extra_cols
                .iter()
                .map(|(i, c)| ((*c).clone(), table.cell(row, *i).map(str::to_string)))
                .collect(),
        });
    }
    Ok(out)
}

/// Ordered column set covering every record: canonical columns first, then
/// passthrough columns sorted by name. `filter_csv` restores the input order
/// when writing CSV.
pub fn boa_columns(records: &[BoaVolumeRecord]) -> Vec<String> {
    let mut columns: Vec<String> = BoaVolumeRecord::COLUMNS.iter().map(|c| c.to_string()).collect();
    for r in records {
        for key in r.extra.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

/// Inverse of [`boa_records_from_table`], used to write a subset back to CSV.
pub fn boa_records_to_table(records: &[BoaVolumeRecord]) -> RawTable {
    let columns = boa_columns(records);
    let rows = records
        .iter()
        .map(|r| {
            columns
                .iter()
                .map(|c| match c.as_str() {
                    BOA_DATE => r.date.map(|d| d.format("%Y-%m-%d").to_string()),
                    BOA_SETTLEMENT_PERIOD => r.settlement_period.map(|p| p.to_string()),
                    BOA_GENERATOR_NAME => r.generator_full_name.clone(),
                    BOA_VOLUME => r.boa_volume.map(|v| v.to_string()),
                    other => r.extra.get(other).cloned().flatten(),
                })
                .collect()
        })
        .collect();
    RawTable { columns, rows }
}

/// Plotting shape shared by every feed on the dashboard. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotRow {
    pub local_datetime:      Timestamp,
    pub level_fpn_mw:        f64,
    pub level_after_boal_mw: f64,
    pub cost_gbp:            f64,
    pub turnup_cost_gbp:     f64,
}
