//! Source timestamps to naive local wall-clock time.
//!
//! All date-derived features are computed on a fixed UTC+1 clock so that
//! daylight-saving transitions never produce duplicate or missing hours.
//! Offset-less source values are taken as UTC.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Etc::GMTMinus1;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::table::{RawReadingTable, Reading, ReadingTable, DATE_COLUMN};

const OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%d %H:%M%:z",
];

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

pub fn parse_source_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(trimmed, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(parsed.and_utc());
        }
    }

    None
}

/// Timestamp written on the local clock already, as in derived tables.
/// Values that still carry an offset are converted to UTC+1.
pub fn parse_local_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .or_else(|| parse_source_timestamp(trimmed).map(to_local_naive))
}

pub fn to_local_naive(instant: DateTime<Utc>) -> NaiveDateTime {
    instant.with_timezone(&GMTMinus1).naive_local()
}

/// Converts every source timestamp to naive UTC+1, failing on the first unparseable cell.
pub fn normalize_timestamps(raw: &RawReadingTable) -> Result<ReadingTable, PipelineError> {
    let mut rows = Vec::with_capacity(raw.rows.len());
    for (idx, row) in raw.rows.iter().enumerate() {
        let instant = parse_source_timestamp(&row.date).ok_or_else(|| PipelineError::Parse {
            row: idx,
            column: DATE_COLUMN.to_string(),
            value: row.date.clone(),
        })?;
        rows.push(Reading::new(to_local_naive(instant), row.values.clone()));
    }

    let (duplicates, out_of_order) = timeline_anomalies(&rows);
    if duplicates > 0 {
        warn!(
            component = "time_normalizer",
            event = "source.duplicates_detected",
            duplicates
        );
    }
    if out_of_order > 0 {
        warn!(
            component = "time_normalizer",
            event = "source.out_of_order",
            out_of_order
        );
    }

    if let (Some(first), Some(last)) = (rows.first(), rows.last()) {
        debug!(
            component = "time_normalizer",
            event = "time.normalized.range",
            first = %first.timestamp,
            last = %last.timestamp
        );
    }
    info!(
        component = "time_normalizer",
        event = "time.normalized",
        rows = rows.len()
    );

    Ok(ReadingTable::new(rows))
}

/// Counts rows repeating an earlier local timestamp and rows older than their predecessor.
fn timeline_anomalies(rows: &[Reading]) -> (usize, usize) {
    let mut seen = HashSet::with_capacity(rows.len());
    let duplicates = rows
        .iter()
        .filter(|row| !seen.insert(row.timestamp))
        .count();
    let out_of_order = rows
        .windows(2)
        .filter(|pair| pair[1].timestamp < pair[0].timestamp)
        .count();
    (duplicates, out_of_order)
}
