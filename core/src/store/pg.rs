use super::{
    boa_insert_sql, boa_select_sql, boa_table_ddl, quote_ident, time_span, ConnectionReport,
    CurtailmentStore,
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
use postgres::error::SqlState;
use postgres::types::ToSql;
use postgres::Row;
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;
use tokio_postgres_rustls::MakeRustlsConnect;

pub(crate) type PgManager = PostgresConnectionManager<MakeRustlsConnect>;

/// Postgres backend over a shared r2d2 pool. Cloning shares the pool.
#[derive(Clone)]
pub struct PgStore {
    pool:   Pool<PgManager>,
    schema: String,
}

impl PgStore {
    pub(crate) fn from_pool(pool: Pool<PgManager>, schema: String) -> Self {
        Self { pool, schema }
    }

    fn conn(&self) -> IngestResult<PooledConnection<PgManager>> {
        Ok(self.pool.get()?)
    }

    pub fn pool_state(&self) -> r2d2::State {
        self.pool.state()
    }
}

type Param = Box<dyn ToSql + Sync>;

fn boa_param(record: &BoaVolumeRecord, column: &str) -> Param {
    match column {
        BOA_DATE => Box::new(record.date),
        BOA_SETTLEMENT_PERIOD => Box::new(record.settlement_period),
        BOA_GENERATOR_NAME => Box::new(record.generator_full_name.clone()),
        BOA_VOLUME => Box::new(record.boa_volume),
        other => Box::new(record.extra.get(other).cloned().flatten()),
    }
}

fn column_error(column: &str, e: postgres::Error) -> IngestError {
    IngestError::Query(format!("result column '{column}': {e}"))
}

fn reading_from_row(row: &Row) -> IngestResult<CurtailmentReading> {
    let get_ts = |name: &str| row.try_get::<_, Timestamp>(name).map_err(|e| column_error(name, e));
    let get_f = |name: &str| row.try_get::<_, Option<f64>>(name).map_err(|e| column_error(name, e));
    Ok(CurtailmentReading {
        time_from:        get_ts("timeFrom")?,
        time_to:          get_ts("timeTo")?,
        level_fpn:        get_f("level_fpn")?,
        level_boal:       get_f("level_boal")?,
        level_after_boal: get_f("level_after_boal")?,
        delta_mw:         get_f("delta_mw")?,
        cost_gbp:         get_f("cost_gbp")?,
    })
}

fn boa_from_row(row: &Row) -> IngestResult<BoaVolumeRecord> {
    let mut r = BoaVolumeRecord::default();
    for (i, col) in row.columns().iter().enumerate() {
        match col.name() {
            BOA_DATE => r.date = row.try_get(i)?,
            BOA_SETTLEMENT_PERIOD => r.settlement_period = row.try_get(i)?,
            BOA_GENERATOR_NAME => r.generator_full_name = row.try_get(i)?,
            BOA_VOLUME => r.boa_volume = row.try_get(i)?,
            other => {
                r.extra.insert(other.to_string(), row.try_get(i)?);
            }
        }
    }
    Ok(r)
}

impl CurtailmentStore for PgStore {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn ensure_schema(&self) -> IngestResult<()> {
        self.conn()?.batch_execute(include_str!("../../../sql/schema.sql"))?;
        Ok(())
    }

    fn append_curtailment(&self, records: &[CurtailmentRecord]) -> IngestResult<usize> {
        let mut conn = self.conn()?;
        let mut tx = conn.transaction()?;
        let stmt = tx.prepare(&format!(
            "INSERT INTO {CURTAILMENT_TABLE}
             (time, level_fpn, level_boal, level_after_boal, delta_mw, cost_gbp)
             VALUES ($1, $2, $3, $4, $5, $6)"
        ))?;
        for r in records {
            tx.execute(
                &stmt,
                &[&r.time, &r.level_fpn, &r.level_boal, &r.level_after_boal, &r.delta_mw, &r.cost_gbp],
            )?;
        }
        tx.commit()?;
        Ok(records.len())
    }

    fn append_price(&self, records: &[PriceRecord]) -> IngestResult<usize> {
        let mut conn = self.conn()?;
        let mut tx = conn.transaction()?;
        let stmt = tx.prepare(&format!(
            "INSERT INTO {PRICE_TABLE} (time, system_buy_price) VALUES ($1, $2)"
        ))?;
        for r in records {
            if let Err(e) = tx.execute(&stmt, &[&r.time, &r.system_buy_price]) {
                if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                    // The aborted transaction rolls back on drop.
                    let (first, last) =
                        time_span(records.iter().map(|r| &r.time)).unwrap_or((r.time, r.time));
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
        tx.commit()?;
        Ok(records.len())
    }

    fn replace_boa_volumes(&self, records: &[BoaVolumeRecord]) -> IngestResult<usize> {
        let columns = boa_columns(records);
        let ddl = boa_table_ddl(BOA_VOLUMES_TABLE, &columns)?;
        let mut conn = self.conn()?;
        // DDL is transactional in Postgres: readers see the old table or the new one.
        let mut tx = conn.transaction()?;
        tx.batch_execute(&format!("DROP TABLE IF EXISTS {};", quote_ident(BOA_VOLUMES_TABLE)))?;
        tx.batch_execute(&ddl)?;
        let stmt = tx.prepare(&boa_insert_sql(BOA_VOLUMES_TABLE, &columns, Dialect::Postgres))?;
        for r in records {
            let values: Vec<Param> = columns.iter().map(|c| boa_param(r, c)).collect();
            let refs: Vec<&(dyn ToSql + Sync)> = values.iter().map(|v| v.as_ref()).collect();
            tx.execute(&stmt, &refs)?;
        }
        tx.commit()?;
        Ok(records.len())
    }

    fn query_curtailment(&self, sql: &str, params: &[&Timestamp]) -> IngestResult<Vec<CurtailmentReading>> {
        let mut conn = self.conn()?;
        let bound: Vec<&(dyn ToSql + Sync)> = params.iter().map(|t| *t as &(dyn ToSql + Sync)).collect();
        let rows = conn
            .query(sql, &bound)
            .map_err(|e| IngestError::Query(e.to_string()))?;
        rows.iter().map(reading_from_row).collect()
    }

    fn select_boa_volumes(&self) -> IngestResult<Vec<BoaVolumeRecord>> {
        let mut conn = self.conn()?;
        let rows = conn.query(&boa_select_sql(BOA_VOLUMES_TABLE), &[])?;
        rows.iter().map(boa_from_row).collect()
    }

    fn probe(&self) -> IngestResult<ConnectionReport> {
        let mut conn = self.conn()?;
        let search_path: String = conn.query_one("SHOW search_path", &[])?.get(0);
        let exists: bool = conn
            .query_one(
                "SELECT EXISTS (
                    SELECT FROM information_schema.tables
                    WHERE table_schema = $1 AND table_name = $2
                 )",
                &[&self.schema, &CURTAILMENT_TABLE],
            )?
            .get(0);
        let mut sample_times = Vec::new();
        if exists {
            sample_times = conn
                .query(
                    &format!("SELECT time FROM {CURTAILMENT_TABLE} ORDER BY time LIMIT 3"),
                    &[],
                )?
                .iter()
                .map(|row| row.try_get::<_, Timestamp>(0))
                .collect::<Result<Vec<_>, _>>()?;
        }
        Ok(ConnectionReport {
            search_path,
            curtailment_table: exists,
            sample_times,
        })
    }
}
