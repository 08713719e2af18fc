use crate::types::Timestamp;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Duplicate key in '{table}': {rows} rows from {first} to {last}")]
    DuplicateKey {
        table: &'static str,
        rows:  usize,
        first: Timestamp,
        last:  Timestamp,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Postgres error: {0}")]
    Postgres(#[from] postgres::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<r2d2::Error> for IngestError {
    fn from(e: r2d2::Error) -> Self {
        IngestError::Connection(format!("pool checkout failed: {e}"))
    }
}

impl IngestError {
    /// Read paths surface backend failures as query failures.
    pub fn into_query(self) -> Self {
        match self {
            IngestError::Connection(msg) => IngestError::Query(format!("connection unavailable: {msg}")),
            IngestError::Database(e) => IngestError::Query(e.to_string()),
            IngestError::Postgres(e) => IngestError::Query(e.to_string()),
            other => other,
        }
    }
}

pub type IngestResult<T> = Result<T, IngestError>;
