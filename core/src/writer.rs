//! Writer — appends normalised batches to the store.
//!
//! RULES:
//!   - An empty batch never reaches the store.
//!   - Curtailment failures propagate untouched.
//!   - A duplicate `time` in a price batch is logged and swallowed; the batch is
//!     skipped whole. Rows that collide are never retried.

use crate::{
    error::{IngestError, IngestResult},
    record::{BoaVolumeRecord, CurtailmentRecord, PriceRecord},
    store::CurtailmentStore,
    types::Timestamp,
};

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// Nothing to write; the store was not touched.
    Empty,
    Written(usize),
    /// The batch collided with existing keys and was rolled back.
    Skipped {
        rows:  usize,
        first: Timestamp,
        last:  Timestamp,
    },
}

impl WriteOutcome {
    pub fn rows_written(&self) -> usize {
        match self {
            WriteOutcome::Written(n) => *n,
            _ => 0,
        }
    }
}

pub struct Writer<'a> {
    store: &'a dyn CurtailmentStore,
}

impl<'a> Writer<'a> {
    pub fn new(store: &'a dyn CurtailmentStore) -> Self {
        Self { store }
    }

    pub fn write_curtailment(&self, records: &[CurtailmentRecord]) -> IngestResult<WriteOutcome> {
        if records.is_empty() {
            log::debug!("There was no curtailment data to write to the database");
            return Ok(WriteOutcome::Empty);
        }
        log::info!("Adding curtailment to database ({})", records.len());
        let n = self.store.append_curtailment(records)?;
        Ok(WriteOutcome::Written(n))
    }

    pub fn write_price(&self, records: &[PriceRecord]) -> IngestResult<WriteOutcome> {
        if records.is_empty() {
            log::debug!("There was no sbp data to write to the database");
            return Ok(WriteOutcome::Empty);
        }
        log::info!("Adding sbp to database ({})", records.len());
        match self.store.append_price(records) {
            Ok(n) => Ok(WriteOutcome::Written(n)),
            Err(IngestError::DuplicateKey { rows, first, last, .. }) => {
                log::warn!("Failed to write sbp batch of {rows} rows from {first} to {last}: duplicate time");
                Ok(WriteOutcome::Skipped { rows, first, last })
            }
            Err(e) => Err(e),
        }
    }

    /// Full replace of the subset table. Run offline; concurrent readers of the
    /// same table are the operator's problem.
    pub fn replace_boa_volumes(&self, records: &[BoaVolumeRecord]) -> IngestResult<WriteOutcome> {
        log::info!("Replacing boa_volumes_scotland with {} rows", records.len());
        let n = self.store.replace_boa_volumes(records)?;
        Ok(WriteOutcome::Written(n))
    }
}
