//! Persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Writer, Reader and the subset pipeline call store methods and never
//! execute SQL directly.
//!
//! Two backends implement the same contract:
//!   - `PgStore`     — pooled Postgres, built by the connection provider.
//!   - `SqliteStore` — embedded SQLite, for local runs and tests.

mod pg;
mod sqlite;

pub use self::pg::PgStore;
pub use self::sqlite::SqliteStore;

use crate::{
    error::IngestResult,
    query::Dialect,
    record::{BoaVolumeRecord, CurtailmentReading, CurtailmentRecord, PriceRecord},
    types::Timestamp,
};
use serde::Serialize;

/// What a connection check found.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionReport {
    pub search_path:       String,
    pub curtailment_table: bool,
    /// Up to three times from the curtailment table, oldest first.
    pub sample_times:      Vec<Timestamp>,
}

/// The contract every backend fulfils.
///
/// Each call is self-contained: it checks out a connection, runs its
/// statements (inside one transaction where it writes) and releases it.
pub trait CurtailmentStore {
    fn dialect(&self) -> Dialect;

    /// Create `curtailment` and `sbp` if they do not exist yet.
    fn ensure_schema(&self) -> IngestResult<()>;

    /// Append all rows. Returns the number written.
    fn append_curtailment(&self, records: &[CurtailmentRecord]) -> IngestResult<usize>;

    /// Append all rows, or none. A uniqueness violation on `time` comes back as
    /// `IngestError::DuplicateKey` and leaves the table unchanged.
    fn append_price(&self, records: &[PriceRecord]) -> IngestResult<usize>;

    /// Drop and recreate `boa_volumes_scotland` holding exactly `records`.
    fn replace_boa_volumes(&self, records: &[BoaVolumeRecord]) -> IngestResult<usize>;

    /// Run a compiled read template with positional timestamp parameters.
    fn query_curtailment(&self, sql: &str, params: &[&Timestamp]) -> IngestResult<Vec<CurtailmentReading>>;

    /// Whole `boa_volumes_scotland` table ordered by date then settlement period.
    fn select_boa_volumes(&self) -> IngestResult<Vec<BoaVolumeRecord>>;

    fn probe(&self) -> IngestResult<ConnectionReport>;
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Time range of a batch, for duplicate-key reports.
pub(crate) fn time_span<'a, I>(times: I) -> Option<(Timestamp, Timestamp)>
where
    I: IntoIterator<Item = &'a Timestamp>,
{
    times.into_iter().fold(None, |acc, t| match acc {
        None => Some((*t, *t)),
        Some((lo, hi)) => Some((lo.min(*t), hi.max(*t))),
    })
}

/// DDL for the replace-only subset table: canonical columns typed, passthrough as text.
pub(crate) fn boa_table_ddl(table: &str, columns: &[String]) -> IngestResult<String> {
    let mut defs = Vec::with_capacity(columns.len());
    for col in columns {
        crate::types::checked_column(col)?;
        let ty = match col.as_str() {
            crate::record::BOA_DATE => "DATE",
            crate::record::BOA_SETTLEMENT_PERIOD => "BIGINT",
            crate::record::BOA_VOLUME => "DOUBLE PRECISION",
            _ => "TEXT",
        };
        defs.push(format!("{} {ty}", quote_ident(col)));
    }
    Ok(format!("CREATE TABLE {} ({})", quote_ident(table), defs.join(", ")))
}

pub(crate) fn boa_insert_sql(table: &str, columns: &[String], dialect: Dialect) -> String {
    let cols: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let marks: Vec<String> = (1..=columns.len())
        .map(|i| match dialect {
            Dialect::Postgres => format!("${i}"),
            Dialect::Sqlite => format!("?{i}"),
        })
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        cols.join(", "),
        marks.join(", ")
    )
}

pub(crate) fn boa_select_sql(table: &str) -> String {
    format!(
        "SELECT * FROM {} ORDER BY \"Date\", \"Settlement_Period\"",
        quote_ident(table)
    )
}
