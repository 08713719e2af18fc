//! Reader — time-bounded curtailment reads and the subset table read.

use crate::{
    error::IngestResult,
    query::{QueryTemplate, END_TIME, READ_DATA_TEMPLATE, START_TIME},
    record::{BoaVolumeRecord, CurtailmentReading},
    store::CurtailmentStore,
    types::Timestamp,
};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

/// Midnight on a fixed calendar date.
pub(crate) fn midnight(year: i32, month: u32, day: u32) -> Timestamp {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("constant calendar date")
}

/// Default read window: calendar year 2022.
pub fn default_range() -> (Timestamp, Timestamp) {
    (midnight(2022, 1, 1), midnight(2023, 1, 1))
}

pub struct Reader<'a> {
    store:   &'a dyn CurtailmentStore,
    sql_dir: PathBuf,
}

impl<'a> Reader<'a> {
    pub fn new(store: &'a dyn CurtailmentStore, sql_dir: impl AsRef<Path>) -> Self {
        Self {
            store,
            sql_dir: sql_dir.as_ref().to_path_buf(),
        }
    }

    /// The template is read on every call, so edits to the file apply without a restart.
    fn template(&self) -> IngestResult<QueryTemplate> {
        let template = QueryTemplate::load(&self.sql_dir, READ_DATA_TEMPLATE, self.store.dialect())?;
        template.expect_params(&[START_TIME, END_TIME])?;
        Ok(template)
    }

    /// Rows whose time falls in `[start_time, end_time]`. An empty window is not an error.
    pub fn read_curtailment(&self, start_time: Timestamp, end_time: Timestamp) -> IngestResult<Vec<CurtailmentReading>> {
        let template = self.template()?;
        let params = template.bind(&[(START_TIME, &start_time), (END_TIME, &end_time)])?;
        let rows = self
            .store
            .query_curtailment(&template.sql, &params)
            .map_err(|e| e.into_query())?;
        log::info!("Read {} curtailment rows from {start_time} to {end_time}", rows.len());
        Ok(rows)
    }

    pub fn read_default(&self) -> IngestResult<Vec<CurtailmentReading>> {
        let (start, end) = default_range();
        self.read_curtailment(start, end)
    }

    /// Whole subset table, ordered by `Date` then `Settlement_Period`.
    pub fn read_boa_volumes_scotland(&self) -> IngestResult<Vec<BoaVolumeRecord>> {
        let rows = self.store.select_boa_volumes().map_err(|e| e.into_query())?;
        log::info!("Read {} boa_volumes_scotland rows", rows.len());
        Ok(rows)
    }
}
