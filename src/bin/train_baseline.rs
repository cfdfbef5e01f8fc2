//! Trains the calendar-bucket baseline, evaluates it on the held-out tail and
//! registers it.
//!
//! Usage: `train_baseline [strategy] [model_name]`.

use std::collections::BTreeMap;

use power_prediction::{
    evaluate_on_table, init_logging, load_cleaned, log_app_start, split_train_test,
    strategy_from_env, BucketMeanModel, CleaningStrategy, LoggingConfig, ModelRegistry,
    ProjectConfig, DEFAULT_TEST_ROWS,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = LoggingConfig::from_env();
    init_logging(&logging_cfg)?;
    log_app_start("train_baseline", &logging_cfg);

    let mut args = std::env::args().skip(1);
    let strategy = match args.next() {
        Some(raw) => raw.parse::<CleaningStrategy>()?,
        None => strategy_from_env(CleaningStrategy::Remove)?,
    };
    let model_name = args.next().unwrap_or_else(|| "BucketMean".to_string());

    let project = ProjectConfig::from_env();
    let cleaned = load_cleaned(&project, strategy)?;
    let (train, test) = split_train_test(&cleaned, DEFAULT_TEST_ROWS);
    if train.is_empty() {
        return Err(format!(
            "only {} cleaned rows; need more than {DEFAULT_TEST_ROWS} to hold out a test set",
            cleaned.len()
        )
        .into());
    }

    let model = BucketMeanModel::fit(&train)?;
    let metrics = evaluate_on_table(&model, &test)?;

    let mut params = BTreeMap::new();
    params.insert("cleaning_strategy".to_string(), strategy.to_string());
    params.insert("test_rows".to_string(), test.len().to_string());
    params.insert("train_rows".to_string(), train.len().to_string());
    params.insert("schema_fingerprint".to_string(), cleaned.schema.fingerprint());

    let mut registry = ModelRegistry::open(&project.registry_dir)?;
    let version = registry.register(&model_name, &model, &params, &metrics)?;

    println!(
        "Registered {model_name} v{version}: MAE={:.2} MSE={:.2} R2={:.4} MAPE={:.4}",
        metrics.mae, metrics.mse, metrics.r2, metrics.mape
    );

    Ok(())
}
