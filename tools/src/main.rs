//! curtail: batch entry points for the curtailment store.
//!
//! Usage:
//!   curtail load-legacy data/2022-01.csv data/2022-02.csv
//!   curtail ingest-price feed/sbp.csv
//!   curtail filter-scotland --input boa_data_2025_26.csv --output boa_data_scotland.csv
//!   curtail load-scotland boa_data_scotland.csv
//!   curtail read --start "2022-06-01" --end "2022-07-01"
//!   curtail --sqlite local.db check
//!
//! Postgres settings come from the environment (`.env.local` / `.env` are loaded first).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use curtailment_core::{
    config::DEFAULT_SQL_DIR,
    normalize::{normalize_curtailment, normalize_legacy_file, normalize_price},
    provider::ConnectionProvider,
    reader::{default_range, Reader},
    scotland,
    store::{CurtailmentStore, SqliteStore},
    table::RawTable,
    types::{parse_timestamp, Timestamp},
    writer::{WriteOutcome, Writer},
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "curtail", about = "Wind curtailment ingestion and query tools")]
struct Cli {
    /// Use an embedded SQLite file instead of Postgres.
    #[arg(long, global = true)]
    sqlite: Option<PathBuf>,

    /// Directory holding query templates (overrides SQL_DIR).
    #[arg(long, global = true)]
    sql_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Keep only Scottish generators from a raw BOA feed CSV.
    FilterScotland {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    #[command(flatten)]
    Store(StoreCommand),
}

/// Commands that need a database.
#[derive(Subcommand)]
enum StoreCommand {
    /// Load legacy per-file exports (Time, Level_FPN, ...) into `curtailment`.
    LoadLegacy { files: Vec<PathBuf> },
    /// Append an upstream curtailment feed CSV.
    IngestCurtailment { file: PathBuf },
    /// Append an upstream price feed CSV into `sbp`; duplicate times are skipped.
    IngestPrice { file: PathBuf },
    /// Replace `boa_volumes_scotland` with the rows of a subset CSV.
    LoadScotland { file: PathBuf },
    /// Print curtailment rows in a time window as JSON lines.
    Read {
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    /// Print the Scottish subset in plotting shape as JSON lines.
    ScotlandPlot,
    /// Check connectivity, search path and the curtailment table.
    Check,
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::dotenv();
    env_logger::init();

    let cli = Cli::parse();
    let sql_dir = resolve_sql_dir(cli.sql_dir);

    match cli.command {
        // Filtering touches only files.
        Command::FilterScotland { input, output } => {
            let (total, kept) = scotland::filter_csv(&input, &output)
                .with_context(|| format!("filtering {}", input.display()))?;
            println!("Total rows in dataset: {total}");
            println!("Rows filtered for Scotland: {kept}");
            println!("Wrote {}", output.display());
            Ok(())
        }
        Command::Store(command) => {
            let bootstrap = !matches!(command, StoreCommand::Check);
            let store = open_store(cli.sqlite.as_ref(), bootstrap)?;
            run(command, store.as_ref(), sql_dir)
        }
    }
}

fn run(command: StoreCommand, store: &dyn CurtailmentStore, sql_dir: PathBuf) -> Result<()> {
    let writer = Writer::new(store);

    match command {
        StoreCommand::LoadLegacy { files } => {
            for path in files {
                let table = RawTable::from_csv_path(&path)
                    .with_context(|| format!("reading {}", path.display()))?
                    .without_index_column();
                let records = normalize_legacy_file(&table)?;
                report(&path, writer.write_curtailment(&records)?);
            }
        }
        StoreCommand::IngestCurtailment { file } => {
            let records = normalize_curtailment(&RawTable::from_csv_path(&file)?)?;
            report(&file, writer.write_curtailment(&records)?);
        }
        StoreCommand::IngestPrice { file } => {
            let records = normalize_price(&RawTable::from_csv_path(&file)?)?;
            report(&file, writer.write_price(&records)?);
        }
        StoreCommand::LoadScotland { file } => {
            report(&file, scotland::load_subset_csv(&file, store)?);
        }
        StoreCommand::Read { start, end } => {
            let (default_start, default_end) = default_range();
            let start = parse_bound(start, default_start)?;
            let end = parse_bound(end, default_end)?;
            let rows = Reader::new(store, &sql_dir).read_curtailment(start, end)?;
            for row in &rows {
                println!("{}", serde_json::to_string(row)?);
            }
            log::info!("{} rows", rows.len());
        }
        StoreCommand::ScotlandPlot => {
            let records = Reader::new(store, &sql_dir).read_boa_volumes_scotland()?;
            for row in scotland::to_plot_rows(&records)? {
                println!("{}", serde_json::to_string(&row)?);
            }
        }
        StoreCommand::Check => {
            let report = store.probe()?;
            println!("Current search_path: {}", report.search_path);
            println!("Does 'curtailment' table exist? {}", report.curtailment_table);
            for t in &report.sample_times {
                println!("  sample: {t}");
            }
        }
    }

    Ok(())
}

fn open_store(sqlite: Option<&PathBuf>, bootstrap: bool) -> Result<Box<dyn CurtailmentStore>> {
    match sqlite {
        Some(path) => {
            let store = SqliteStore::open(&path.to_string_lossy())?;
            if bootstrap {
                store.ensure_schema()?;
            }
            Ok(Box::new(store))
        }
        None => {
            let provider = ConnectionProvider::from_env().context("database configuration")?;
            let store = if bootstrap {
                provider.connect_and_bootstrap()?
            } else {
                provider.connect()?
            };
            Ok(Box::new(store))
        }
    }
}

fn resolve_sql_dir(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| {
        std::env::var("SQL_DIR")
            .ok()
            .filter(|d| !d.trim().is_empty())
            .map(PathBuf::from)
    })
    .unwrap_or_else(|| PathBuf::from(DEFAULT_SQL_DIR))
}

fn parse_bound(raw: Option<String>, default: Timestamp) -> Result<Timestamp> {
    match raw {
        Some(s) => parse_timestamp(&s).with_context(|| format!("bad time bound '{s}'")),
        None => Ok(default),
    }
}

fn report(path: &std::path::Path, outcome: WriteOutcome) {
    match outcome {
        WriteOutcome::Empty => println!("{}: no data", path.display()),
        WriteOutcome::Written(n) => println!("{}: wrote {n} rows", path.display()),
        WriteOutcome::Skipped { rows, first, last } => {
            println!("{}: skipped {rows} rows ({first} to {last}) on duplicate time", path.display())
        }
    }
}
