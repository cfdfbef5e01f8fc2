//! Raw source rows to a cleaned, feature-complete table.

use tracing::info;

use crate::cleaning::{clean, CleaningStrategy};
use crate::config::ProjectConfig;
use crate::error::PipelineError;
use crate::features::derive_features;
use crate::quality::apply_quality_gate;
use crate::residuals::{
    drop_incomplete_rows, drop_missing_components, read_residuals_csv, ResidualTable,
};
use crate::schema::finalize_column_types;
use crate::table::{combine_power_consumption, read_source_csv, RawReadingTable, ReadingTable};
use crate::time_normalizer::normalize_timestamps;

/// Every stage up to, but not including, the cleaning strategy.
pub fn prepare_table(raw: &RawReadingTable) -> Result<ReadingTable, PipelineError> {
    let normalized = normalize_timestamps(raw)?;
    let featured = derive_features(&normalized);
    let totals = combine_power_consumption(&featured);
    let (gated, _) = apply_quality_gate(&totals);
    Ok(finalize_column_types(&gated))
}

pub fn run_pipeline(
    raw: &RawReadingTable,
    strategy: CleaningStrategy,
) -> Result<ReadingTable, PipelineError> {
    let prepared = prepare_table(raw)?;
    let cleaned = clean(&prepared, strategy);

    info!(
        component = "pipeline",
        event = "pipeline.finish",
        strategy = strategy.as_str(),
        raw_rows = raw.rows.len(),
        cleaned_rows = cleaned.len()
    );

    Ok(cleaned)
}

pub fn load_cleaned(
    config: &ProjectConfig,
    strategy: CleaningStrategy,
) -> Result<ReadingTable, PipelineError> {
    info!(
        component = "pipeline",
        event = "pipeline.start",
        source_file = %config.source_file.display(),
        strategy = strategy.as_str()
    );
    let raw = read_source_csv(&config.source_file)?;
    run_pipeline(&raw, strategy)
}

pub fn load_data_retain_nan(config: &ProjectConfig) -> Result<ReadingTable, PipelineError> {
    load_cleaned(config, CleaningStrategy::Retain)
}

pub fn load_data_remove_nan(config: &ProjectConfig) -> Result<ReadingTable, PipelineError> {
    load_cleaned(config, CleaningStrategy::Remove)
}

pub fn load_data_interpolate_nan(config: &ProjectConfig) -> Result<ReadingTable, PipelineError> {
    load_cleaned(config, CleaningStrategy::Interpolate)
}

fn load_residuals(config: &ProjectConfig) -> Result<ResidualTable, PipelineError> {
    info!(
        component = "pipeline",
        event = "pipeline.residuals.start",
        residual_file = %config.residual_file.display()
    );
    read_residuals_csv(&config.residual_file)
}

/// Decomposition rows with every trend and remainder value present.
pub fn load_data_residuals_retain_nan(
    config: &ProjectConfig,
) -> Result<ResidualTable, PipelineError> {
    Ok(drop_missing_components(&load_residuals(config)?))
}

/// Decomposition rows without a gap in any column.
pub fn load_data_residuals_remove_nan(
    config: &ProjectConfig,
) -> Result<ResidualTable, PipelineError> {
    let components = drop_missing_components(&load_residuals(config)?);
    Ok(drop_incomplete_rows(&components))
}
