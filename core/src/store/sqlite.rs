use super::{
    boa_insert_sql, boa_select_sql, boa_table_ddl, time_span, ConnectionReport, CurtailmentStore,
};
use crate::{
    error::{IngestError, IngestResult},
    query::Dialect,
    record::{
        boa_columns, BoaVolumeRecord, CurtailmentReading, CurtailmentRecord, PriceRecord, BOA_DATE,
        BOA_GENERATOR_NAME, BOA_SETTLEMENT_PERIOD, BOA_VOLUME,
    },
    types::{Timestamp, BOA_VOLUMES_TABLE, CURTAILMENT_TABLE, PRICE_TABLE},
};
use rusqlite::{params, types::Value, Connection, ErrorCode};
use std::sync::{Mutex, MutexGuard};

pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<String>, // None for :memory:
}

impl SqliteStore {
    /// Open (or create) the database file at `path`.
    pub fn open(path: &str) -> IngestResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode only matters for real files.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> IngestResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    fn conn(&self) -> IngestResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| IngestError::Connection("sqlite connection lock poisoned".into()))
    }

    /// Row count of any table; tests use this to check write effects.
    pub fn count_rows(&self, table: &str) -> IngestResult<i64> {
        let conn = self.conn()?;
        let n = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", super::quote_ident(table)),
            [],
            |row| row.get(0),
        )?;
        Ok(n)
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(f, _) => {
            f.code == ErrorCode::ConstraintViolation
                && (f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE)
        }
        _ => false,
    }
}

fn read_error(e: rusqlite::Error) -> IngestError {
    match e {
        rusqlite::Error::InvalidColumnName(name) => {
            IngestError::Query(format!("result set has no column '{name}'"))
        }
        other => IngestError::Database(other),
    }
}

fn boa_value(record: &BoaVolumeRecord, column: &str) -> Value {
    match column {
        BOA_DATE => record
            .date
            .map_or(Value::Null, |d| Value::Text(d.format("%Y-%m-%d").to_string())),
        BOA_SETTLEMENT_PERIOD => record.settlement_period.map_or(Value::Null, Value::Integer),
        BOA_GENERATOR_NAME => record
            .generator_full_name
            .clone()
            .map_or(Value::Null, Value::Text),
        BOA_VOLUME => record.boa_volume.map_or(Value::Null, Value::Real),
        other => record
            .extra
            .get(other)
            .cloned()
            .flatten()
            .map_or(Value::Null, Value::Text),
    }
}

impl CurtailmentStore for SqliteStore {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn ensure_schema(&self) -> IngestResult<()> {
        self.conn()?
            .execute_batch(include_str!("../../../sql/schema.sqlite.sql"))?;
        Ok(())
    }

    fn append_curtailment(&self, records: &[CurtailmentRecord]) -> IngestResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {CURTAILMENT_TABLE}
                 (time, level_fpn, level_boal, level_after_boal, delta_mw, cost_gbp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
            ))?;
            for r in records {
                stmt.execute(params![
                    r.time,
                    r.level_fpn,
                    r.level_boal,
                    r.level_after_boal,
                    r.delta_mw,
                    r.cost_gbp,
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    fn append_price(&self, records: &[PriceRecord]) -> IngestResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {PRICE_TABLE} (time, system_buy_price) VALUES (?1, ?2)"
            ))?;
            for r in records {
                if let Err(e) = stmt.execute(params![r.time, r.system_buy_price]) {
                    if is_unique_violation(&e) {
                        // Dropping the transaction rolls the whole batch back.
                        let (first, last) = time_span(records.iter().map(|r| &r.time))
                            .unwrap_or((r.time, r.time));
                        return Err(IngestError::DuplicateKey {
                            table: PRICE_TABLE,
                            rows: records.len(),
                            first,
                            last,
                        });
                    }
                    return Err(e.into());
                }
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    fn replace_boa_volumes(&self, records: &[BoaVolumeRecord]) -> IngestResult<usize> {
        let columns = boa_columns(records);
        let ddl = boa_table_ddl(BOA_VOLUMES_TABLE, &columns)?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {};",
            super::quote_ident(BOA_VOLUMES_TABLE)
        ))?;
        tx.execute_batch(&ddl)?;
        {
            let mut stmt = tx.prepare(&boa_insert_sql(BOA_VOLUMES_TABLE, &columns, Dialect::Sqlite))?;
            for r in records {
                let values: Vec<Value> = columns.iter().map(|c| boa_value(r, c)).collect();
                stmt.execute(rusqlite::params_from_iter(values))?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    fn query_curtailment(&self, sql: &str, params: &[&Timestamp]) -> IngestResult<Vec<CurtailmentReading>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).map_err(read_error)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                Ok(CurtailmentReading {
                    time_from:        row.get("timeFrom")?,
                    time_to:          row.get("timeTo")?,
                    level_fpn:        row.get("level_fpn")?,
                    level_boal:       row.get("level_boal")?,
                    level_after_boal: row.get("level_after_boal")?,
                    delta_mw:         row.get("delta_mw")?,
                    cost_gbp:         row.get("cost_gbp")?,
                })
            })
            .map_err(read_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_error)?;
        Ok(rows)
    }

    fn select_boa_volumes(&self) -> IngestResult<Vec<BoaVolumeRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&boa_select_sql(BOA_VOLUMES_TABLE))?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let records = stmt
            .query_map([], |row| {
                let mut r = BoaVolumeRecord::default();
                for (i, name) in names.iter().enumerate() {
                    match name.as_str() {
                        BOA_DATE => r.date = row.get(i)?,
                        BOA_SETTLEMENT_PERIOD => r.settlement_period = row.get(i)?,
                        BOA_GENERATOR_NAME => r.generator_full_name = row.get(i)?,
                        BOA_VOLUME => r.boa_volume = row.get(i)?,
                        other => {
                            r.extra.insert(other.to_string(), row.get(i)?);
                        }
                    }
                }
                Ok(r)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn probe(&self) -> IngestResult<ConnectionReport> {
        let conn = self.conn()?;
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![CURTAILMENT_TABLE],
            |row| row.get(0),
        )?;
        let mut sample_times = Vec::new();
        if exists > 0 {
            let mut stmt = conn.prepare(&format!(
                "SELECT time FROM {CURTAILMENT_TABLE} ORDER BY time LIMIT 3"
            ))?;
            sample_times = stmt
                .query_map([], |row| row.get::<_, Timestamp>(0))?
                .collect::<Result<Vec<_>, _>>()?;
        }
        Ok(ConnectionReport {
            search_path: "main".into(),
            curtailment_table: exists > 0,
            sample_times,
        })
    }
}
