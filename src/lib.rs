//! Power consumption prediction core crate.
//!
//! Current implemented scope:
//! - raw hourly meter/weather readings to cleaned, feature-complete tables
//! - three cleaning strategies: retain, remove, interpolate
//! - loaders for the seasonal-decomposition residual table
//! - calendar-bucket baseline model with a versioned file registry
//! - HTTP prediction endpoint with a sentinel failure response

mod cleaning;
mod config;
mod error;
mod features;
mod model;
mod observability;
mod pipeline;
mod quality;
mod registry;
mod residuals;
mod schema;
mod serving;
mod table;
mod time_normalizer;

pub use cleaning::{
    clean, clean_with_report, violates_floor, CleaningReport, CleaningStrategy,
    INTERPOLATED_MEASURES, METER_FLOORS, NE5_FLOOR, NE7_FLOOR,
};
pub use config::{
    env_var, strategy_from_env, strategy_from_lookup, LogFormat, LoggingConfig, ProjectConfig,
    ServerConfig, DEFAULT_REGISTRY_DIR, DEFAULT_RESIDUAL_FILE, DEFAULT_SOURCE_FILE,
};
pub use error::PipelineError;
pub use features::{derive_features, is_pandemic_period, CalendarFeatures, PANDEMIC_PERIODS};
pub use model::{
    evaluate, evaluate_on_table, split_train_test, BucketMeanModel, EvaluationMetrics,
    ModelError, ModelInput, ModelOutput, Predictor, CONSUMPTION_UNIT, DEFAULT_TEST_ROWS,
};
pub use observability::{
    init_logging, log_app_bind, log_app_start, log_model_selected, LoggingInitError,
};
pub use pipeline::{
    load_cleaned, load_data_interpolate_nan, load_data_remove_nan, load_data_residuals_remove_nan,
    load_data_residuals_retain_nan, load_data_retain_nan, prepare_table, run_pipeline,
};
pub use quality::{
    apply_quality_gate, clamp_humidity, trim_trailing_desync, QualityGateReport, DESYNC_CUTOVER,
    HUMIDITY_CEILING,
};
pub use registry::{ModelRegistry, RegisteredModel, RegistryError};
pub use residuals::{
    drop_incomplete_rows, drop_missing_components, read_residuals, read_residuals_csv,
    ResidualRow, ResidualTable, RESIDUAL_COLUMNS,
};
pub use schema::{
    assert_schema_compatible, finalize_column_types, sanitize_column_name, ColumnDType,
    ColumnSpec, SchemaError, TableSchema, CATEGORICAL_COLUMNS,
};
pub use serving::{prediction_router, HealthResponse, PredictionService};
pub use table::{
    combine_power_consumption, read_source, read_source_csv, write_cleaned_csv, Measure,
    Measurements, RawReading, RawReadingTable, Reading, ReadingTable,
};
pub use time_normalizer::{
    normalize_timestamps, parse_local_timestamp, parse_source_timestamp, to_local_naive,
};
