//! Quality gate applied before any cleaning strategy.

use chrono::Datelike;
use tracing::info;

use crate::table::ReadingTable;

/// First local date after the known meter desynchronization.
pub const DESYNC_CUTOVER: (i32, u32, u32) = (2024, 10, 2);

/// Physical ceiling for relative humidity in percent.
pub const HUMIDITY_CEILING: f64 = 100.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QualityGateReport {
    pub trimmed_rows: usize,
    pub clamped_humidity: usize,
}

/// Drops rows with a missing total on or after the cutover date.
pub fn trim_trailing_desync(table: &ReadingTable) -> ReadingTable {
    let rows = table
        .rows
        .iter()
        .filter(|row| {
            let date = (
                row.timestamp.year(),
                row.timestamp.month(),
                row.timestamp.day(),
            );
            !(row.total_consumption.is_none() && date >= DESYNC_CUTOVER)
        })
        .cloned()
        .collect();
    table.with_rows(rows)
}

pub fn clamp_humidity(table: &ReadingTable) -> ReadingTable {
    let mut rows = table.rows.clone();
    for row in &mut rows {
        if let Some(humidity) = row.values.humidity {
            if humidity > HUMIDITY_CEILING {
                row.values.humidity = Some(HUMIDITY_CEILING);
            }
        }
    }
    table.with_rows(rows)
}

pub fn apply_quality_gate(table: &ReadingTable) -> (ReadingTable, QualityGateReport) {
    let trimmed = trim_trailing_desync(table);
    let clamped_humidity = trimmed
        .rows
        .iter()
        .filter(|row| matches!(row.values.humidity, Some(h) if h > HUMIDITY_CEILING))
        .count();
    let gated = clamp_humidity(&trimmed);

    let report = QualityGateReport {
        trimmed_rows: table.len() - trimmed.len(),
        clamped_humidity,
    };

    info!(
        component = "quality",
        event = "quality.gate.applied",
        input_rows = table.len(),
        output_rows = gated.len(),
        trimmed_rows = report.trimmed_rows,
        clamped_humidity = report.clamped_humidity
    );

    (gated, report)
}
