//! Loader for the seasonal-decomposition output table.
//!
//! The decomposition itself runs outside this crate and writes one CSV with a
//! local `Date` column, the trend estimate (`*_yhat`) and the remainder
//! (`*_remainder`) for each meter and for the total, next to any other numeric
//! columns it carried along. Rows are only filtered here, never recomputed.

use std::fs;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDateTime;
use tracing::info;

use crate::error::PipelineError;
use crate::schema::sanitize_column_name;
use crate::table::{parse_optional_f64, DATE_COLUMN};
use crate::time_normalizer::parse_local_timestamp;

/// Decomposition outputs every residual row must carry.
pub const RESIDUAL_COLUMNS: [&str; 6] = [
    "NE5_remainder",
    "NE5_yhat",
    "NE7_remainder",
    "NE7_yhat",
    "NETOT_remainder",
    "NETOT_yhat",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ResidualRow {
    pub timestamp: NaiveDateTime,
    /// Aligned with [`ResidualTable::columns`].
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResidualTable {
    /// Numeric column names in file order, `Date` excluded.
    pub columns: Vec<String>,
    pub rows: Vec<ResidualRow>,
}

impl ResidualTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<f64> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.values.get(idx).copied().flatten()
    }

    fn retain_rows(&self, keep: impl Fn(&ResidualRow) -> bool) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|row| keep(row)).cloned().collect(),
        }
    }
}

pub fn read_residuals_csv(path: &Path) -> Result<ResidualTable, PipelineError> {
    let file = fs::File::open(path)?;
    let table = read_residuals(file, path)?;

    info!(
        component = "residuals",
        event = "residuals.read.finish",
        path = %path.display(),
        rows = table.len(),
        columns = table.columns.len()
    );

    Ok(table)
}

/// Reads a decomposition table from any CSV reader; `path` is only used for
/// errors. Headerless columns (a written-out row index) are skipped.
pub fn read_residuals<R: Read>(reader: R, path: &Path) -> Result<ResidualTable, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let mut date_idx = None;
    let mut numeric = Vec::new();
    for (idx, header) in headers.iter().enumerate() {
        let name = sanitize_column_name(header);
        if name.is_empty() {
            continue;
        }
        if name == DATE_COLUMN {
            date_idx = Some(idx);
        } else {
            numeric.push((idx, name));
        }
    }

    let date_idx = date_idx.ok_or_else(|| PipelineError::MissingColumn {
        path: path.to_path_buf(),
        column: DATE_COLUMN,
    })?;
    if let Some(missing) = RESIDUAL_COLUMNS
        .iter()
        .find(|required| !numeric.iter().any(|(_, name)| name == *required))
    {
        return Err(PipelineError::MissingColumn {
            path: path.to_path_buf(),
            column: missing,
        });
    }

    let mut rows = Vec::new();
    for (row_idx, record) in reader.records().enumerate() {
        let record = record?;
        let raw_date = record.get(date_idx).unwrap_or_default();
        let timestamp = parse_local_timestamp(raw_date).ok_or_else(|| PipelineError::Parse {
            row: row_idx,
            column: DATE_COLUMN.to_string(),
            value: raw_date.to_string(),
        })?;
        let values = numeric
            .iter()
            .map(|(idx, name)| parse_optional_f64(&record, *idx, name, row_idx))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(ResidualRow { timestamp, values });
    }

    Ok(ResidualTable {
        columns: numeric.into_iter().map(|(_, name)| name).collect(),
        rows,
    })
}

/// Drops rows with a gap in any trend or remainder column. Gaps in the
/// carried-along columns are kept.
pub fn drop_missing_components(table: &ResidualTable) -> ResidualTable {
    let required: Vec<usize> = RESIDUAL_COLUMNS
        .iter()
        .filter_map(|name| table.column_index(name))
        .collect();
    let kept = table.retain_rows(|row| {
        required
            .iter()
            .all(|idx| row.values.get(*idx).copied().flatten().is_some())
    });
    log_dropped("components", table, &kept);
    kept
}

/// Drops rows with a gap in any column.
pub fn drop_incomplete_rows(table: &ResidualTable) -> ResidualTable {
    let kept = table.retain_rows(|row| row.values.iter().all(Option::is_some));
    log_dropped("all", table, &kept);
    kept
}

fn log_dropped(scope: &'static str, before: &ResidualTable, after: &ResidualTable) {
    info!(
        component = "residuals",
        event = "residuals.rows_dropped",
        scope,
        input_rows = before.len(),
        output_rows = after.len()
    );
}
