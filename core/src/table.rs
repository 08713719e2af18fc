//! Untyped tabular input — a CSV file or an upstream feed batch before normalisation.

use crate::error::{IngestError, IngestResult};
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    /// Blank cells are `None`.
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    /// Build from string literals. Empty strings become `None`.
    pub fn from_rows(columns: &[&str], rows: &[&[&str]]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|v| cell(v)).collect())
                .collect(),
        }
    }

    pub fn from_csv_path(path: impl AsRef<Path>) -> IngestResult<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| IngestError::Io(std::io::Error::new(e.kind(), format!("{}: {e}", path.display()))))?;
        Self::from_csv_reader(file)
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> IngestResult<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);
        let columns = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            rows.push(record.iter().map(cell).collect());
        }
        Ok(Self { columns, rows })
    }

    /// Drop the first column, the way a CSV written with its row index is read back.
    pub fn without_index_column(mut self) -> Self {
        if self.columns.is_empty() {
            return self;
        }
        self.columns.remove(0);
        for row in &mut self.rows {
            if !row.is_empty() {
                row.remove(0);
            }
        }
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Rename columns in place. Names not present are ignored.
    pub fn rename(&mut self, mapping: &[(&str, &str)]) {
        for col in &mut self.columns {
            if let Some((_, to)) = mapping.iter().find(|(from, _)| *from == col.as_str()) {
                *col = to.to_string();
            }
        }
    }

    /// Index of a column the caller cannot do without.
    pub fn require(&self, name: &str) -> IngestResult<usize> {
        self.column_index(name)
            .ok_or_else(|| IngestError::Schema(format!("required column '{name}' is missing")))
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .and_then(|c| c.as_deref())
    }

    pub fn write_csv_path(&self, path: impl AsRef<Path>) -> IngestResult<()> {
        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row.iter().map(|c| c.as_deref().unwrap_or("")))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

fn cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parse an optional numeric cell. `NaN` and friends are left to `f64::from_str`.
pub(crate) fn parse_f64(raw: Option<&str>, column: &str, row: usize) -> IngestResult<Option<f64>> {
    match raw {
        None => Ok(None),
        Some(v) => v
            .parse::<f64>()
            .map(Some)
            .map_err(|_| IngestError::Schema(format!("row {row}: column '{column}' is not numeric: '{v}'"))),
    }
}

pub(crate) fn parse_i64(raw: Option<&str>, column: &str, row: usize) -> IngestResult<Option<i64>> {
    match raw {
        None => Ok(None),
        // Settlement periods often arrive as "12.0" from float-typed exports.
        Some(v) => v
            .parse::<i64>()
            .or_else(|_| match v.parse::<f64>() {
                Ok(f) if f.fract() == 0.0 => Ok(f as i64),
                _ => Err(()),
            })
            .map(Some)
            .map_err(|_| IngestError::Schema(format!("row {row}: column '{column}' is not an integer: '{v}'"))),
    }
}
