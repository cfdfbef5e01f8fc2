//! Mutually exclusive policies for missing and implausible meter readings.
//!
//! Every strategy takes the gated table by reference and returns a new one,
//! so the three can be applied to the same input side by side.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::PipelineError;
use crate::table::{Measure, Reading, ReadingTable};

/// Readings of the NE5 meter below this are sensor faults.
pub const NE5_FLOOR: f64 = 60_000.0;
/// Readings of the NE7 meter below this are sensor faults.
pub const NE7_FLOOR: f64 = 100_000.0;

pub const METER_FLOORS: [(Measure, f64); 2] =
    [(Measure::ValueNe5, NE5_FLOOR), (Measure::ValueNe7, NE7_FLOOR)];

/// Columns filled from calendar-bucket means, in processing order.
pub const INTERPOLATED_MEASURES: [Measure; 10] = [
    Measure::ValueNe5,
    Measure::ValueNe7,
    Measure::Humidity,
    Measure::Temperature,
    Measure::WindDirection,
    Measure::WindSpeedScalar,
    Measure::WindSpeedVector,
    Measure::AirPressure,
    Measure::RainDuration,
    Measure::SolarIrradiance,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CleaningStrategy {
    /// Keep gaps, overwrite floor violations with `None`.
    Retain,
    /// Drop incomplete rows and floor violations.
    Remove,
    /// Fill gaps and floor violations from (month, day, hour) means.
    Interpolate,
}

impl CleaningStrategy {
    pub const ALL: [CleaningStrategy; 3] = [Self::Retain, Self::Remove, Self::Interpolate];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Retain => "retain",
            Self::Remove => "remove",
            Self::Interpolate => "interpolate",
        }
    }
}

impl fmt::Display for CleaningStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CleaningStrategy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retain" | "retain_nan" => Ok(Self::Retain),
            "remove" | "remove_nan" => Ok(Self::Remove),
            "interpolate" | "interpolate_nan" => Ok(Self::Interpolate),
            other => Err(PipelineError::Configuration(format!(
                "unknown cleaning strategy '{other}' (expected retain, remove or interpolate)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleaningReport {
    pub input_rows: usize,
    pub output_rows: usize,
    pub nulled_values: usize,
    pub filled_values: usize,
    pub replaced_floor_violations: usize,
}

pub fn clean(table: &ReadingTable, strategy: CleaningStrategy) -> ReadingTable {
    clean_with_report(table, strategy).0
}

pub fn clean_with_report(
    table: &ReadingTable,
    strategy: CleaningStrategy,
) -> (ReadingTable, CleaningReport) {
    let (cleaned, report) = match strategy {
        CleaningStrategy::Retain => retain_invalid_as_missing(table),
        CleaningStrategy::Remove => remove_invalid_rows(table),
        CleaningStrategy::Interpolate => interpolate_by_calendar_bucket(table),
    };

    info!(
        component = "cleaning",
        event = "cleaning.strategy.applied",
        strategy = strategy.as_str(),
        input_rows = report.input_rows,
        output_rows = report.output_rows,
        nulled_values = report.nulled_values,
        filled_values = report.filled_values,
        replaced_floor_violations = report.replaced_floor_violations
    );

    (cleaned, report)
}

pub fn violates_floor(measure: Measure, value: f64) -> bool {
    METER_FLOORS
        .iter()
        .any(|(floored, floor)| *floored == measure && value < *floor)
}

fn retain_invalid_as_missing(table: &ReadingTable) -> (ReadingTable, CleaningReport) {
    let mut rows = table.rows.clone();
    let mut nulled_values = 0usize;
    for row in &mut rows {
        for (measure, floor) in METER_FLOORS {
            let slot = measure.slot(&mut row.values);
            if matches!(*slot, Some(v) if v < floor) {
                *slot = None;
                nulled_values += 1;
            }
        }
        row.recompute_total();
    }

    let report = CleaningReport {
        input_rows: table.len(),
        output_rows: rows.len(),
        nulled_values,
        ..CleaningReport::default()
    };
    (table.with_rows(rows), report)
}

fn remove_invalid_rows(table: &ReadingTable) -> (ReadingTable, CleaningReport) {
    let mut rows: Vec<Reading> = table
        .rows
        .iter()
        .filter(|row| !row.has_missing())
        .filter(|row| {
            METER_FLOORS
                .iter()
                .all(|(measure, floor)| measure.get(&row.values).is_some_and(|v| v >= *floor))
        })
        .cloned()
        .collect();
    for row in &mut rows {
        row.recompute_total();
    }

    let report = CleaningReport {
        input_rows: table.len(),
        output_rows: rows.len(),
        ..CleaningReport::default()
    };
    (table.with_rows(rows), report)
}

fn interpolate_by_calendar_bucket(table: &ReadingTable) -> (ReadingTable, CleaningReport) {
    let mut rows = table.rows.clone();
    let mut filled_values = 0usize;
    let mut replaced_floor_violations = 0usize;

    // Each column sees the table as left by the previous column's pass.
    for measure in INTERPOLATED_MEASURES {
        let means = bucket_means(&rows, measure);
        for row in &mut rows {
            if measure.get(&row.values).is_some() {
                continue;
            }
            if let Some(mean) = means.get(&row.calendar().bucket()) {
                *measure.slot(&mut row.values) = Some(*mean);
                filled_values += 1;
            }
        }
    }

    // Means include the violating readings themselves.
    for (measure, floor) in METER_FLOORS {
        let means = bucket_means(&rows, measure);
        for row in &mut rows {
            let Some(value) = measure.get(&row.values) else {
                continue;
            };
            if value >= floor {
                continue;
            }
            if let Some(mean) = means.get(&row.calendar().bucket()) {
                *measure.slot(&mut row.values) = Some(*mean);
                replaced_floor_violations += 1;
            }
        }
    }

    for row in &mut rows {
        row.recompute_total();
    }

    let report = CleaningReport {
        input_rows: table.len(),
        output_rows: rows.len(),
        filled_values,
        replaced_floor_violations,
        ..CleaningReport::default()
    };
    (table.with_rows(rows), report)
}

/// Mean of the non-missing values of `measure` per (month, day, hour).
fn bucket_means(rows: &[Reading], measure: Measure) -> HashMap<(u32, u32, u32), f64> {
    let mut sums: HashMap<(u32, u32, u32), (f64, usize)> = HashMap::new();
    for row in rows {
        if let Some(value) = measure.get(&row.values) {
            let entry = sums.entry(row.calendar().bucket()).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(bucket, (sum, count))| (bucket, sum / count as f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::derive_features;
    use crate::table::Measurements;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn complete(ne5: Option<f64>, ne7: Option<f64>) -> Measurements {
        Measurements {
            value_ne5: ne5,
            value_ne7: ne7,
            humidity: Some(70.0),
            rain_duration: Some(0.0),
            solar_irradiance: Some(10.0),
            temperature: Some(5.0),
            wind_direction: Some(90.0),
            wind_speed_scalar: Some(2.0),
            wind_speed_vector: Some(1.5),
            air_pressure: Some(960.0),
            holiday: Some(0),
            vacation: Some(0),
        }
    }

    fn table(rows: Vec<(NaiveDateTime, Measurements)>) -> ReadingTable {
        let rows = rows
            .into_iter()
            .map(|(ts, values)| {
                let mut row = Reading::new(ts, values);
                row.recompute_total();
                row
            })
            .collect();
        derive_features(&ReadingTable::new(rows))
    }

    #[test]
    fn strategy_names_parse_and_unknown_is_a_configuration_error() {
        assert_eq!(
            "Retain".parse::<CleaningStrategy>().unwrap(),
            CleaningStrategy::Retain
        );
        assert_eq!(
            "remove_nan".parse::<CleaningStrategy>().unwrap(),
            CleaningStrategy::Remove
        );
        assert_eq!(
            " interpolate ".parse::<CleaningStrategy>().unwrap(),
            CleaningStrategy::Interpolate
        );
        assert!(matches!(
            "median".parse::<CleaningStrategy>(),
            Err(PipelineError::Configuration(_))
        ));
        for strategy in CleaningStrategy::ALL {
            assert_eq!(strategy.to_string().parse::<CleaningStrategy>().unwrap(), strategy);
        }
    }

    #[test]
    fn floor_check_is_strictly_below() {
        assert!(violates_floor(Measure::ValueNe5, 59_999.9));
        assert!(!violates_floor(Measure::ValueNe5, 60_000.0));
        assert!(violates_floor(Measure::ValueNe7, 99_999.0));
        assert!(!violates_floor(Measure::ValueNe7, 100_000.0));
        assert!(!violates_floor(Measure::Humidity, -1.0));
    }

    #[test]
    fn interpolate_fills_gap_from_same_bucket_in_other_years() {
        let input = table(vec![
            (at(2020, 1, 5, 3), complete(Some(70_000.0), Some(110_000.0))),
            (at(2021, 1, 5, 3), complete(None, Some(130_000.0))),
            (at(2022, 1, 5, 3), complete(Some(80_000.0), Some(120_000.0))),
        ]);

        let out = clean(&input, CleaningStrategy::Interpolate);
        assert_eq!(out.rows[1].values.value_ne5, Some(75_000.0));
        assert_eq!(out.rows[1].total_consumption, Some(205_000.0));
    }

    #[test]
    fn interpolate_replaces_floor_violation_with_mean_including_itself() {
        let input = table(vec![
            (at(2020, 2, 1, 0), complete(Some(90_000.0), Some(110_000.0))),
            (at(2021, 2, 1, 0), complete(Some(1_000.0), Some(110_000.0))),
        ]);

        let out = clean(&input, CleaningStrategy::Interpolate);
        assert_eq!(out.rows[1].values.value_ne5, Some(45_500.0));
        assert_eq!(out.rows[0].values.value_ne5, Some(90_000.0));
    }

    #[test]
    fn interpolate_leaves_gap_when_bucket_has_no_values() {
        let input = table(vec![
            (at(2020, 4, 1, 0), complete(None, Some(110_000.0))),
            (at(2020, 4, 1, 1), complete(Some(70_000.0), Some(110_000.0))),
        ]);

        let (out, report) = clean_with_report(&input, CleaningStrategy::Interpolate);
        assert_eq!(out.rows[0].values.value_ne5, None);
        assert_eq!(out.rows[0].total_consumption, None);
        assert_eq!(report.filled_values, 0);
    }

    #[test]
    fn interpolated_gap_that_violates_floor_is_replaced_again() {
        let input = table(vec![
            (at(2020, 4, 1, 0), complete(Some(10_000.0), Some(110_000.0))),
            (at(2021, 4, 1, 0), complete(None, Some(110_000.0))),
        ]);

        let out = clean(&input, CleaningStrategy::Interpolate);
        // Gap filled with 10k, then both rows average to 10k again.
        assert_eq!(out.rows[1].values.value_ne5, Some(10_000.0));
        assert_eq!(out.rows[0].values.value_ne5, Some(10_000.0));
    }

    #[test]
    fn remove_drops_rows_with_gaps_in_weather_columns() {
        let mut gappy = complete(Some(70_000.0), Some(110_000.0));
        gappy.wind_direction = None;
        let mut no_flag = complete(Some(70_000.0), Some(110_000.0));
        no_flag.holiday = None;
        let input = table(vec![
            (at(2020, 1, 1, 0), complete(Some(70_000.0), Some(110_000.0))),
            (at(2020, 1, 1, 1), gappy),
            (at(2020, 1, 1, 2), no_flag),
        ]);

        let out = clean(&input, CleaningStrategy::Remove);
        assert_eq!(out.len(), 1);
        assert_eq!(out.rows[0].timestamp, at(2020, 1, 1, 0));
    }

    #[test]
    fn strategies_do_not_share_state() {
        let input = table(vec![
            (at(2020, 1, 1, 0), complete(Some(1_000.0), Some(110_000.0))),
            (at(2021, 1, 1, 0), complete(Some(70_000.0), Some(110_000.0))),
        ]);
        let before = input.clone();

        let retained = clean(&input, CleaningStrategy::Retain);
        let removed = clean(&input, CleaningStrategy::Remove);
        let interpolated = clean(&input, CleaningStrategy::Interpolate);

        assert_eq!(input, before);
        assert_eq!(retained.rows[0].values.value_ne5, None);
        assert_eq!(removed.len(), 1);
        assert_eq!(interpolated.rows[0].values.value_ne5, Some(35_500.0));
    }
}
