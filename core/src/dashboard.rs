//! Dashboard-facing data access: the Reader behind the query cache.

use crate::{
    cache::QueryCache,
    clock::{Clock, SystemClock},
    config::AppConfig,
    error::IngestResult,
    reader::{default_range, midnight, Reader},
    record::{CurtailmentReading, PlotRow},
    scotland::to_plot_rows,
    store::CurtailmentStore,
    types::Timestamp,
};
use chrono::Timelike;
use std::sync::Arc;

pub struct Dashboard<'a, C: Clock = SystemClock> {
    reader:    Reader<'a>,
    cache:     QueryCache<C>,
    opened_at: Timestamp,
}

impl<'a> Dashboard<'a, SystemClock> {
    pub fn from_config(store: &'a dyn CurtailmentStore, config: &AppConfig) -> IngestResult<Self> {
        let cache = QueryCache::new(config.cache_ttl()?, SystemClock);
        Ok(Self::new(Reader::new(store, &config.sql_dir), cache))
    }
}

impl<'a, C: Clock> Dashboard<'a, C> {
    pub fn new(reader: Reader<'a>, cache: QueryCache<C>) -> Self {
        let now = cache.clock().now().naive_utc();
        let opened_at = now.with_nanosecond(0).unwrap_or(now);
        Self {
            reader,
            cache,
            opened_at,
        }
    }

    /// The Reader's default window.
    pub fn current_dataset(&self) -> IngestResult<Arc<Vec<CurtailmentReading>>> {
        let (start, end) = default_range();
        self.dataset(start, end)
    }

    /// Everything from 2020-01-01 up to when this dashboard was opened.
    /// The end is fixed at construction so repeated calls share a cache entry.
    pub fn latest_dataset(&self) -> IngestResult<Arc<Vec<CurtailmentReading>>> {
        self.dataset(midnight(2020, 1, 1), self.opened_at)
    }

    pub fn dataset(&self, start: Timestamp, end: Timestamp) -> IngestResult<Arc<Vec<CurtailmentReading>>> {
        self.cache
            .get_or_load(start, end, |s, e| self.reader.read_curtailment(s, e))
    }

    /// Subset rows in plotting shape. Not cached: the table changes only by offline reload.
    pub fn scottish_plot_rows(&self) -> IngestResult<Vec<PlotRow>> {
        let records = self.reader.read_boa_volumes_scotland()?;
        to_plot_rows(&records)
    }
}
