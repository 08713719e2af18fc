//! Shared primitive types and table names.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::error::{IngestError, IngestResult};

/// Timestamps are stored without a zone; the feeds are already in local market time.
pub type Timestamp = NaiveDateTime;

pub const CURTAILMENT_TABLE: &str = "curtailment";
pub const PRICE_TABLE: &str = "sbp";
pub const BOA_VOLUMES_TABLE: &str = "boa_volumes_scotland";

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];

/// Parse a timestamp cell. Offsets are normalised to UTC; bare dates map to midnight.
pub fn parse_timestamp(raw: &str) -> IngestResult<Timestamp> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc).naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Ok(dt.with_timezone(&Utc).naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(ts);
        }
    }
    parse_date(s)
        .map(|d| d.and_time(NaiveTime::MIN))
        .map_err(|_| IngestError::Schema(format!("unparseable timestamp '{raw}'")))
}

/// Parse a date cell. A full timestamp is accepted and truncated to its date.
pub fn parse_date(raw: &str) -> IngestResult<NaiveDate> {
    let s = raw.trim();
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(ts.date());
        }
    }
    Err(IngestError::Schema(format!("unparseable date '{raw}'")))
}

/// Column names from a feed header. Always quoted when interpolated, so any
/// text is allowed up to the server's identifier length.
pub fn checked_column(name: &str) -> IngestResult<&str> {
    if name.is_empty() || name.len() > 63 || name.contains('\0') {
        return Err(IngestError::Schema(format!("invalid column name '{name}'")));
    }
    Ok(name)
}

/// Schema names are passed through startup options unquoted, so only plain names are allowed.
pub fn checked_identifier(name: &str) -> IngestResult<&str> {
    let ok = !name.is_empty()
        && name.len() <= 63
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ' ' || c == '-');
    if ok {
        Ok(name)
    } else {
        Err(IngestError::Schema(format!("invalid column or schema name '{name}'")))
    }
}
