//! Hourly reading tables and the CSV source loader.
//!
//! Source files carry unit-suffixed headers such as `Hr [%Hr]` or `T [°C]`.
//! Headers are matched after [`sanitize_column_name`], so both the annotated
//! and the bare form are accepted.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::features::CalendarFeatures;
use crate::schema::{
    sanitize_column_name, TableSchema, CORONA_COLUMN, DAY_COLUMN, HOUR_COLUMN, MONTH_COLUMN,
    WEEKDAY_COLUMN, YEAR_COLUMN,
};

pub const DATE_COLUMN: &str = "Date";
pub const HOLIDAY_COLUMN: &str = "Holiday";
pub const VACATION_COLUMN: &str = "Vacation";
pub const TOTAL_COLUMN: &str = "NE_tot";

/// Continuous measurement columns of a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Measure {
    ValueNe5,
    ValueNe7,
    Humidity,
    RainDuration,
    SolarIrradiance,
    Temperature,
    WindDirection,
    WindSpeedScalar,
    WindSpeedVector,
    AirPressure,
}

impl Measure {
    /// Source file column order.
    pub const ALL: [Measure; 10] = [
        Measure::ValueNe5,
        Measure::ValueNe7,
        Measure::Humidity,
        Measure::RainDuration,
        Measure::SolarIrradiance,
        Measure::Temperature,
        Measure::WindDirection,
        Measure::WindSpeedScalar,
        Measure::WindSpeedVector,
        Measure::AirPressure,
    ];

    /// Model-safe column name.
    pub fn name(self) -> &'static str {
        match self {
            Self::ValueNe5 => "Value_NE5",
            Self::ValueNe7 => "Value_NE7",
            Self::Humidity => "Hr",
            Self::RainDuration => "RainDur",
            Self::SolarIrradiance => "StrGlo",
            Self::Temperature => "T",
            Self::WindDirection => "WD",
            Self::WindSpeedScalar => "WVs",
            Self::WindSpeedVector => "WVv",
            Self::AirPressure => "p",
        }
    }

    /// Header as written in the formatted source file.
    pub fn source_header(self) -> &'static str {
        match self {
            Self::ValueNe5 => "Value_NE5",
            Self::ValueNe7 => "Value_NE7",
            Self::Humidity => "Hr [%Hr]",
            Self::RainDuration => "RainDur [min]",
            Self::SolarIrradiance => "StrGlo [W/m2]",
            Self::Temperature => "T [°C]",
            Self::WindDirection => "WD [°]",
            Self::WindSpeedScalar => "WVs [m/s]",
            Self::WindSpeedVector => "WVv [m/s]",
            Self::AirPressure => "p [hPa]",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|measure| measure.name() == name)
    }

    pub fn get(self, values: &Measurements) -> Option<f64> {
        match self {
            Self::ValueNe5 => values.value_ne5,
            Self::ValueNe7 => values.value_ne7,
            Self::Humidity => values.humidity,
            Self::RainDuration => values.rain_duration,
            Self::SolarIrradiance => values.solar_irradiance,
            Self::Temperature => values.temperature,
            Self::WindDirection => values.wind_direction,
            Self::WindSpeedScalar => values.wind_speed_scalar,
            Self::WindSpeedVector => values.wind_speed_vector,
            Self::AirPressure => values.air_pressure,
        }
    }

    pub fn slot(self, values: &mut Measurements) -> &mut Option<f64> {
        match self {
            Self::ValueNe5 => &mut values.value_ne5,
            Self::ValueNe7 => &mut values.value_ne7,
            Self::Humidity => &mut values.humidity,
            Self::RainDuration => &mut values.rain_duration,
            Self::SolarIrradiance => &mut values.solar_irradiance,
            Self::Temperature => &mut values.temperature,
            Self::WindDirection => &mut values.wind_direction,
            Self::WindSpeedScalar => &mut values.wind_speed_scalar,
            Self::WindSpeedVector => &mut values.wind_speed_vector,
            Self::AirPressure => &mut values.air_pressure,
        }
    }

    fn is_required(self) -> bool {
        matches!(self, Self::ValueNe5 | Self::ValueNe7)
    }
}

/// Meter and weather values of one hourly sample. `None` marks a sensor gap.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    pub value_ne5: Option<f64>,
    pub value_ne7: Option<f64>,
    pub humidity: Option<f64>,
    pub rain_duration: Option<f64>,
    pub solar_irradiance: Option<f64>,
    pub temperature: Option<f64>,
    pub wind_direction: Option<f64>,
    pub wind_speed_scalar: Option<f64>,
    pub wind_speed_vector: Option<f64>,
    pub air_pressure: Option<f64>,
    pub holiday: Option<u8>,
    pub vacation: Option<u8>,
}

impl Measurements {
    pub fn has_missing(&self) -> bool {
        Measure::ALL.iter().any(|m| m.get(self).is_none())
            || self.holiday.is_none()
            || self.vacation.is_none()
    }

    pub fn total_consumption(&self) -> Option<f64> {
        match (self.value_ne5, self.value_ne7) {
            (Some(ne5), Some(ne7)) => Some(ne5 + ne7),
            _ => None,
        }
    }
}

/// A row as read from the source file, timestamp still in its source form.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReading {
    pub date: String,
    pub values: Measurements,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawReadingTable {
    pub rows: Vec<RawReading>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Naive local wall-clock time at UTC+1.
    pub timestamp: NaiveDateTime,
    pub values: Measurements,
    pub features: Option<CalendarFeatures>,
    pub total_consumption: Option<f64>,
}

impl Reading {
    pub fn new(timestamp: NaiveDateTime, values: Measurements) -> Self {
        Self {
            timestamp,
            values,
            features: None,
            total_consumption: None,
        }
    }

    /// Derived features, recomputed from the timestamp when not yet attached.
    pub fn calendar(&self) -> CalendarFeatures {
        self.features
            .unwrap_or_else(|| CalendarFeatures::from_timestamp(self.timestamp))
    }

    pub fn recompute_total(&mut self) {
        self.total_consumption = self.values.total_consumption();
    }

    pub fn has_missing(&self) -> bool {
        self.values.has_missing() || self.features.is_none() || self.total_consumption.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadingTable {
    pub rows: Vec<Reading>,
    pub schema: TableSchema,
}

impl ReadingTable {
    pub fn new(rows: Vec<Reading>) -> Self {
        Self {
            rows,
            schema: TableSchema::source_default(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Copy of this table with `rows` replaced and the schema kept.
    pub fn with_rows(&self, rows: Vec<Reading>) -> Self {
        Self {
            rows,
            schema: self.schema.clone(),
        }
    }
}

/// Adds `NE_tot`, the sum of both meters, to every row.
pub fn combine_power_consumption(table: &ReadingTable) -> ReadingTable {
    let mut rows = table.rows.clone();
    for row in &mut rows {
        row.recompute_total();
    }
    table.with_rows(rows)
}

struct HeaderIndex {
    date: usize,
    measures: HashMap<Measure, usize>,
    holiday: Option<usize>,
    vacation: Option<usize>,
}

pub fn read_source_csv(path: &Path) -> Result<RawReadingTable, PipelineError> {
    info!(
        component = "table",
        event = "source.read.start",
        path = %path.display()
    );

    let file = fs::File::open(path)?;
    let table = read_source(file, path)?;

    info!(
        component = "table",
        event = "source.read.finish",
        path = %path.display(),
        rows = table.rows.len()
    );

    Ok(table)
}

/// Reads a source table from any CSV reader; `path` is only used for errors.
pub fn read_source<R: std::io::Read>(
    reader: R,
    path: &Path,
) -> Result<RawReadingTable, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let index = index_headers(&headers, path)?;

    let mut rows = Vec::new();
    for (row_idx, record) in reader.records().enumerate() {
        let record = record?;
        rows.push(parse_source_record(&record, &index, row_idx)?);
    }

    Ok(RawReadingTable { rows })
}

fn index_headers(headers: &StringRecord, path: &Path) -> Result<HeaderIndex, PipelineError> {
    let by_name: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(idx, header)| (sanitize_column_name(header), idx))
        .collect();

    let date = *by_name
        .get(DATE_COLUMN)
        .ok_or_else(|| PipelineError::MissingColumn {
            path: path.to_path_buf(),
            column: DATE_COLUMN,
        })?;

    let mut measures = HashMap::new();
    for measure in Measure::ALL {
        match by_name.get(measure.name()) {
            Some(idx) => {
                measures.insert(measure, *idx);
            }
            None if measure.is_required() => {
                return Err(PipelineError::MissingColumn {
                    path: path.to_path_buf(),
                    column: measure.name(),
                });
            }
            None => {
                warn!(
                    component = "table",
                    event = "source.column_missing",
                    path = %path.display(),
                    column = measure.name()
                );
            }
        }
    }

    Ok(HeaderIndex {
        date,
        measures,
        holiday: by_name.get(HOLIDAY_COLUMN).copied(),
        vacation: by_name.get(VACATION_COLUMN).copied(),
    })
}

fn parse_source_record(
    record: &StringRecord,
    index: &HeaderIndex,
    row: usize,
) -> Result<RawReading, PipelineError> {
    let mut values = Measurements::default();
    for (measure, idx) in &index.measures {
        *measure.slot(&mut values) = parse_optional_f64(record, *idx, measure.name(), row)?;
    }
    values.holiday = parse_flag(record, index.holiday, HOLIDAY_COLUMN, row)?;
    values.vacation = parse_flag(record, index.vacation, VACATION_COLUMN, row)?;

    Ok(RawReading {
        date: record.get(index.date).unwrap_or_default().to_string(),
        values,
    })
}

/// Numeric cell; empty, `nan` and `null` cells are `None`.
pub(crate) fn parse_optional_f64(
    record: &StringRecord,
    idx: usize,
    column: &str,
    row: usize,
) -> Result<Option<f64>, PipelineError> {
    let raw = record.get(idx).unwrap_or_default();
    if is_missing(raw) {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| PipelineError::Parse {
            row,
            column: column.to_string(),
            value: raw.to_string(),
        })
}

fn parse_flag(
    record: &StringRecord,
    idx: Option<usize>,
    column: &str,
    row: usize,
) -> Result<Option<u8>, PipelineError> {
    let Some(idx) = idx else {
        return Ok(None);
    };
    let parsed = parse_optional_f64(record, idx, column, row)?;
    match parsed {
        None => Ok(None),
        Some(v) if v == 0.0 => Ok(Some(0)),
        Some(v) if v == 1.0 => Ok(Some(1)),
        Some(_) => Err(PipelineError::Parse {
            row,
            column: column.to_string(),
            value: record.get(idx).unwrap_or_default().to_string(),
        }),
    }
}

fn is_missing(raw: &str) -> bool {
    raw.is_empty() || raw.eq_ignore_ascii_case("nan") || raw.eq_ignore_ascii_case("null")
}

/// Writes a cleaned table with sanitized headers, derived features and `NE_tot`.
/// Cells follow the schema's column order.
pub fn write_cleaned_csv(table: &ReadingTable, path: &Path) -> Result<(), PipelineError> {
    let header: Vec<&str> = table
        .schema
        .columns
        .iter()
        .map(|column| column.name.as_str())
        .collect();
    if let Some(unknown) = header.iter().find(|name| !is_writable_column(name)) {
        return Err(PipelineError::Configuration(format!(
            "schema column '{unknown}' has no cleaned value to write"
        )));
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&header)?;
    for row in &table.rows {
        let record: Vec<String> = header.iter().map(|name| cell(row, name)).collect();
        writer.write_record(&record)?;
    }
    writer.flush()?;

    info!(
        component = "table",
        event = "cleaned.write.finish",
        path = %path.display(),
        rows = table.rows.len()
    );

    Ok(())
}

const CALENDAR_COLUMNS: [&str; 6] = [
    YEAR_COLUMN,
    MONTH_COLUMN,
    DAY_COLUMN,
    HOUR_COLUMN,
    WEEKDAY_COLUMN,
    CORONA_COLUMN,
];

fn is_writable_column(name: &str) -> bool {
    matches!(
        name,
        DATE_COLUMN | HOLIDAY_COLUMN | VACATION_COLUMN | TOTAL_COLUMN
    ) || CALENDAR_COLUMNS.contains(&name)
        || Measure::from_name(name).is_some()
}

fn cell(row: &Reading, name: &str) -> String {
    match name {
        DATE_COLUMN => row.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        HOLIDAY_COLUMN => format_flag(row.values.holiday),
        VACATION_COLUMN => format_flag(row.values.vacation),
        TOTAL_COLUMN => format_optional(row.total_consumption),
        other => match Measure::from_name(other) {
            Some(measure) => format_optional(measure.get(&row.values)),
            None => row
                .features
                .and_then(|features| calendar_cell(&features, other))
                .unwrap_or_default(),
        },
    }
}

fn calendar_cell(features: &CalendarFeatures, name: &str) -> Option<String> {
    let value = match name {
        YEAR_COLUMN => features.year.to_string(),
        MONTH_COLUMN => features.month.to_string(),
        DAY_COLUMN => features.day.to_string(),
        HOUR_COLUMN => features.hour.to_string(),
        WEEKDAY_COLUMN => features.weekday.to_string(),
        CORONA_COLUMN => features.corona.to_string(),
        _ => return None,
    };
    Some(value)
}

fn format_optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn format_flag(value: Option<u8>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
