//! Cleans the configured source file and writes the result as CSV.
//!
//! Usage: `prepare_dataset [strategy] [output.csv]`. The strategy falls back
//! to `POWER_CLEANING_STRATEGY`, then `remove`.

use std::path::PathBuf;

use power_prediction::{
    init_logging, load_cleaned, log_app_start, strategy_from_env, write_cleaned_csv,
    CleaningStrategy, LoggingConfig, ProjectConfig,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = LoggingConfig::from_env();
    init_logging(&logging_cfg)?;
    log_app_start("prepare_dataset", &logging_cfg);

    let mut args = std::env::args().skip(1);
    let strategy = match args.next() {
        Some(raw) => raw.parse::<CleaningStrategy>()?,
        None => strategy_from_env(CleaningStrategy::Remove)?,
    };

    let project = ProjectConfig::from_env();
    let output = args
        .next()
        .map(|raw| project.resolve(PathBuf::from(raw)))
        .unwrap_or_else(|| project.resolve(format!("data/cleaned_{strategy}.csv")));

    let cleaned = load_cleaned(&project, strategy)?;
    write_cleaned_csv(&cleaned, &output)?;

    println!(
        "Wrote {} rows cleaned with strategy '{}' to {} (schema {})",
        cleaned.len(),
        strategy,
        output.display(),
        cleaned.schema.fingerprint()
    );

    Ok(())
}
