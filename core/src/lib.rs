//! Curtailment and system price ingestion, time-ranged reads, and the
//! Scottish BOA subset pipeline.
//!
//! DATA FLOW:
//!   raw CSV / feed → normalize → Writer → store ← Reader → QueryCache → dashboard
//!   raw BOA feed → scotland::filter_scottish → CSV → Writer (replace) → Reader → to_plot_rows

pub mod cache;
pub mod clock;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod normalize;
pub mod provider;
pub mod query;
pub mod reader;
pub mod record;
pub mod scotland;
pub mod store;
pub mod table;
pub mod types;
pub mod writer;
