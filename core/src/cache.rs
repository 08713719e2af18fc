//! Query cache — memoises curtailment reads per (start, end) for a fixed TTL.
//!
//! RULES:
//!   - Expiry is time-based only; nothing is ever written back.
//!   - Failed reads are not cached.

use crate::{
    clock::Clock,
    error::IngestResult,
    record::CurtailmentReading,
    types::Timestamp,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type Key = (Timestamp, Timestamp);

struct Entry {
    stored_at: DateTime<Utc>,
    rows:      Arc<Vec<CurtailmentReading>>,
}

pub struct QueryCache<C: Clock> {
    ttl:     Duration,
    clock:   C,
    entries: Mutex<HashMap<Key, Entry>>,
}

impl<C: Clock> QueryCache<C> {
    pub fn new(ttl: Duration, clock: C) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Return the cached rows for the window, or run `load` and remember them.
    pub fn get_or_load<F>(&self, start: Timestamp, end: Timestamp, load: F) -> IngestResult<Arc<Vec<CurtailmentReading>>>
    where
        F: FnOnce(Timestamp, Timestamp) -> IngestResult<Vec<CurtailmentReading>>,
    {
        let now = self.clock.now();
        {
            let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
            entries.retain(|_, e| now - e.stored_at < self.ttl);
            if let Some(e) = entries.get(&(start, end)) {
                log::debug!("cache hit {start}..{end}");
                return Ok(Arc::clone(&e.rows));
            }
        }

        // The lock is not held across the read; two callers may both miss and load.
        let rows = Arc::new(load(start, end)?);
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert((start, end), Entry {
                stored_at: now,
                rows:      Arc::clone(&rows),
            });
        Ok(rows)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
