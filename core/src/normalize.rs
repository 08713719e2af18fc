//! Schema normaliser — maps heterogeneous input columns onto canonical records.
//!
//! RULES:
//!   - Pure: nothing here touches the database.
//!   - Empty input is never an error, whatever its columns.
//!   - A column needed for renaming or projection that is missing from
//!     non-empty input is a schema error. Unreferenced columns are ignored.

use crate::{
    error::IngestResult,
    record::{CurtailmentRecord, PriceRecord},
    table::{parse_f64, RawTable},
    types::parse_timestamp,
};

const FEED_RENAMES: &[(&str, &str)] = &[("local_datetime", "time")];

const PRICE_RENAMES: &[(&str, &str)] = &[
    ("local_datetime", "time"),
    ("systemSellPrice", "system_buy_price"),
];

const LEGACY_RENAMES: &[(&str, &str)] = &[
    ("Time", "time"),
    ("Level_FPN", "level_fpn"),
    ("Level_BOAL", "level_boal"),
    ("Level_After_BOAL", "level_after_boal"),
    ("delta", "delta_mw"),
];

/// Upstream curtailment feed → canonical rows.
pub fn normalize_curtailment(raw: &RawTable) -> IngestResult<Vec<CurtailmentRecord>> {
    if raw.is_empty() {
        log::debug!("normalize: empty curtailment batch");
        return Ok(Vec::new());
    }
    let mut table = raw.clone();
    table.rename(FEED_RENAMES);
    project_curtailment(&table)
}

/// Upstream price feed → `{time, system_buy_price}`; every other column is dropped.
pub fn normalize_price(raw: &RawTable) -> IngestResult<Vec<PriceRecord>> {
    if raw.is_empty() {
        log::debug!("normalize: empty price batch");
        return Ok(Vec::new());
    }
    let mut table = raw.clone();
    table.rename(PRICE_RENAMES);
    let time_idx = table.require("time")?;
    let price_idx = table.require("system_buy_price")?;

    let mut out = Vec::with_capacity(table.len());
    let mut dropped = 0usize;
    for row in 0..table.len() {
        let Some(time) = table.cell(row, time_idx) else {
            dropped += 1;
            continue;
        };
        out.push(PriceRecord {
            time:             parse_timestamp(time)?,
            system_buy_price: parse_f64(table.cell(row, price_idx), "system_buy_price", row)?,
        });
    }
    if dropped > 0 {
        log::warn!("normalize: dropped {dropped} price rows with no time");
    }
    Ok(out)
}

/// Legacy per-file export (`Time`, `Level_FPN`, ...) → canonical rows.
/// `cost_gbp` is optional in these files.
pub fn normalize_legacy_file(raw: &RawTable) -> IngestResult<Vec<CurtailmentRecord>> {
    if raw.is_empty() {
        log::debug!("normalize: no data to load");
        return Ok(Vec::new());
    }
    let mut table = raw.clone();
    table.rename(LEGACY_RENAMES);
    project_curtailment(&table)
}

fn project_curtailment(table: &RawTable) -> IngestResult<Vec<CurtailmentRecord>> {
    let time_idx = table.require("time")?;
    let fpn_idx = table.require("level_fpn")?;
    let boal_idx = table.require("level_boal")?;
    let after_idx = table.require("level_after_boal")?;
    let delta_idx = table.require("delta_mw")?;
    let cost_idx = table.column_index("cost_gbp");

    let number = |row: usize, idx: usize, name: &str| parse_f64(table.cell(row, idx), name, row);

    let mut out = Vec::with_capacity(table.len());
    let mut dropped = 0usize;
    for row in 0..table.len() {
        let Some(time) = table.cell(row, time_idx) else {
            dropped += 1;
            continue;
        };
        out.push(CurtailmentRecord {
            time:             parse_timestamp(time)?,
            level_fpn:        number(row, fpn_idx, "level_fpn")?,
            level_boal:       number(row, boal_idx, "level_boal")?,
            level_after_boal: number(row, after_idx, "level_after_boal")?,
            delta_mw:         number(row, delta_idx, "delta_mw")?,
            cost_gbp:         match cost_idx {
                Some(i) => number(row, i, "cost_gbp")?,
                None => None,
            },
        });
    }
    if dropped > 0 {
        log::warn!("normalize: dropped {dropped} curtailment rows with no time");
    }
    Ok(out)
}
