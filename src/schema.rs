//! Column typing for model consumption.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::table::{
    Measure, ReadingTable, DATE_COLUMN, HOLIDAY_COLUMN, TOTAL_COLUMN, VACATION_COLUMN,
};

pub const YEAR_COLUMN: &str = "Year";
pub const MONTH_COLUMN: &str = "Month";
pub const DAY_COLUMN: &str = "Day";
pub const HOUR_COLUMN: &str = "Hour";
pub const WEEKDAY_COLUMN: &str = "Weekday";
pub const CORONA_COLUMN: &str = "Corona";

/// Columns handed to models as discrete categories.
pub const CATEGORICAL_COLUMNS: [&str; 8] = [
    VACATION_COLUMN,
    HOLIDAY_COLUMN,
    YEAR_COLUMN,
    MONTH_COLUMN,
    DAY_COLUMN,
    HOUR_COLUMN,
    WEEKDAY_COLUMN,
    CORONA_COLUMN,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnDType {
    Timestamp,
    Numeric,
    Categorical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub dtype: ColumnDType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<ColumnSpec>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("schema fingerprint mismatch: expected {expected}, got {actual}")]
    FingerprintMismatch { expected: String, actual: String },
}

impl TableSchema {
    /// Schema of a freshly loaded table: every column numeric except `Date`.
    pub fn source_default() -> Self {
        let mut columns = vec![ColumnSpec {
            name: DATE_COLUMN.to_string(),
            dtype: ColumnDType::Timestamp,
        }];
        let numeric = Measure::ALL
            .iter()
            .map(|m| m.name())
            .chain([HOLIDAY_COLUMN, VACATION_COLUMN])
            .chain([
                YEAR_COLUMN,
                MONTH_COLUMN,
                DAY_COLUMN,
                HOUR_COLUMN,
                WEEKDAY_COLUMN,
                CORONA_COLUMN,
            ])
            .chain([TOTAL_COLUMN]);
        columns.extend(numeric.map(|name| ColumnSpec {
            name: name.to_string(),
            dtype: ColumnDType::Numeric,
        }));
        Self { columns }
    }

    pub fn dtype_of(&self, name: &str) -> Option<ColumnDType> {
        self.columns
            .iter()
            .find(|column| column.name == name)
            .map(|column| column.dtype)
    }

    pub fn categorical_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|column| column.dtype == ColumnDType::Categorical)
            .map(|column| column.name.as_str())
            .collect()
    }

    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for column in &self.columns {
            hasher.update(column.name.as_bytes());
            hasher.update(match column.dtype {
                ColumnDType::Timestamp => ":timestamp;",
                ColumnDType::Numeric => ":numeric;",
                ColumnDType::Categorical => ":categorical;",
            });
        }
        hex::encode(hasher.finalize())
    }
}

/// Marks the calendar, holiday and pandemic columns as categorical. Values are untouched.
pub fn finalize_column_types(table: &ReadingTable) -> ReadingTable {
    let mut schema = table.schema.clone();
    for column in &mut schema.columns {
        if CATEGORICAL_COLUMNS.contains(&column.name.as_str()) {
            column.dtype = ColumnDType::Categorical;
        }
    }

    info!(
        component = "schema",
        event = "schema.finalized",
        categorical = ?schema.categorical_columns(),
        fingerprint = schema.fingerprint()
    );

    ReadingTable {
        rows: table.rows.clone(),
        schema,
    }
}

pub fn assert_schema_compatible(
    expected_fingerprint: &str,
    actual: &TableSchema,
) -> Result<(), SchemaError> {
    let actual_fingerprint = actual.fingerprint();
    if expected_fingerprint != actual_fingerprint {
        return Err(SchemaError::FingerprintMismatch {
            expected: expected_fingerprint.to_string(),
            actual: actual_fingerprint,
        });
    }
    Ok(())
}

/// Strips a unit annotation: the token before the first space.
pub fn sanitize_column_name(raw: &str) -> String {
    raw.trim()
        .split(' ')
        .next()
        .unwrap_or_default()
        .to_string()
}
