//! Tracing subscriber setup and the lifecycle events every binary emits.

use std::net::SocketAddr;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("invalid log filter '{directive}': {source}")]
    InvalidFilter {
        directive: String,
        #[source]
        source: ParseError,
    },
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Installs the global subscriber. A malformed `level` directive is an error
/// rather than a silent fallback, so a typo in `POWER_LOG_LEVEL` stops startup.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter = build_filter(&config.level)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_ansi(config.format == LogFormat::Pretty);

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }

    Ok(())
}

fn build_filter(directive: &str) -> Result<EnvFilter, LoggingInitError> {
    EnvFilter::try_new(directive).map_err(|source| LoggingInitError::InvalidFilter {
        directive: directive.to_string(),
        source,
    })
}

/// First event of every binary; `component` is the binary name.
pub fn log_app_start(component: &'static str, config: &LoggingConfig) {
    info!(
        component,
        event = "app.start",
        version = env!("CARGO_PKG_VERSION"),
        log_level = %config.level,
        log_format = ?config.format
    );
}

pub fn log_app_bind(bound_addr: SocketAddr) {
    info!(
        component = "prediction_server",
        event = "app.bind",
        bind_addr = %bound_addr,
        route = "/predict/"
    );
}

pub fn log_model_selected(model_name: &str, model_version: i64, registry: &str) {
    info!(
        component = "prediction_server",
        event = "model.selected",
        model_name,
        model_version,
        registry
    );
}
