//! Project paths and environment-driven settings shared by the binaries.
//!
//! Every settings type is built from a key lookup. `from_env` plugs in the
//! process environment; tests plug in a fixed map.

use std::env;
use std::path::{Path, PathBuf};

use crate::cleaning::CleaningStrategy;
use crate::error::PipelineError;

pub const DEFAULT_SOURCE_FILE: &str = "data/formatted_source_data.csv";
pub const DEFAULT_RESIDUAL_FILE: &str = "data/time_decomposition_remainder_data.csv";
pub const DEFAULT_REGISTRY_DIR: &str = "Models/registry";

/// Process environment lookup.
pub fn env_var(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn setting(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

/// Resolved locations of the input tables and the model registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    pub project_root: PathBuf,
    pub source_file: PathBuf,
    /// Seasonal-decomposition output with `*_remainder` and `*_yhat` columns.
    pub residual_file: PathBuf,
    pub registry_dir: PathBuf,
}

impl ProjectConfig {
    pub fn with_root(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        Self {
            source_file: project_root.join(DEFAULT_SOURCE_FILE),
            residual_file: project_root.join(DEFAULT_RESIDUAL_FILE),
            registry_dir: project_root.join(DEFAULT_REGISTRY_DIR),
            project_root,
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(env_var)
    }

    /// Reads `POWER_PROJECT_ROOT` (else the current directory),
    /// `POWER_SOURCE_FILE`, `POWER_RESIDUAL_FILE` and `POWER_REGISTRY_DIR`.
    /// Relative overrides resolve against the project root.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let root = setting(&lookup, "POWER_PROJECT_ROOT")
            .map(PathBuf::from)
            .or_else(|| env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        let mut config = Self::with_root(root);

        if let Some(source) = setting(&lookup, "POWER_SOURCE_FILE") {
            config.source_file = config.resolve(source);
        }
        if let Some(residuals) = setting(&lookup, "POWER_RESIDUAL_FILE") {
            config.residual_file = config.resolve(residuals);
        }
        if let Some(registry) = setting(&lookup, "POWER_REGISTRY_DIR") {
            config.registry_dir = config.resolve(registry);
        }

        config
    }

    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self::with_root(".")
    }
}

pub fn strategy_from_env(default: CleaningStrategy) -> Result<CleaningStrategy, PipelineError> {
    strategy_from_lookup(env_var, default)
}

/// Strategy from `POWER_CLEANING_STRATEGY`, or `default` when unset.
pub fn strategy_from_lookup(
    lookup: impl Fn(&str) -> Option<String>,
    default: CleaningStrategy,
) -> Result<CleaningStrategy, PipelineError> {
    match setting(&lookup, "POWER_CLEANING_STRATEGY") {
        Some(raw) => raw.parse(),
        None => Ok(default),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub model_name: String,
    pub model_version: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            model_name: "BucketMean".to_string(),
            model_version: 1,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(env_var)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PipelineError> {
        let mut config = Self::default();
        if let Some(addr) = setting(&lookup, "POWER_SERVER_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(name) = setting(&lookup, "POWER_MODEL_NAME") {
            config.model_name = name;
        }
        if let Some(raw) = setting(&lookup, "POWER_MODEL_VERSION") {
            config.model_version = raw.parse().map_err(|_| {
                PipelineError::Configuration(format!(
                    "POWER_MODEL_VERSION must be an integer, got '{raw}'"
                ))
            })?;
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Subscriber settings. Unrecognized format or target values keep the default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `power_prediction=debug`.
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(env_var)
    }

    /// Reads `POWER_LOG_LEVEL`, `POWER_LOG_FORMAT` (`json` or `pretty`) and
    /// `POWER_LOG_TARGET`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(level) = setting(&lookup, "POWER_LOG_LEVEL") {
            config.level = level;
        }
        match setting(&lookup, "POWER_LOG_FORMAT")
            .map(|raw| raw.to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => config.format = LogFormat::Json,
            Some("pretty") => config.format = LogFormat::Pretty,
            _ => {}
        }
        match setting(&lookup, "POWER_LOG_TARGET")
            .map(|raw| raw.to_ascii_lowercase())
            .as_deref()
        {
            Some("1" | "true" | "yes" | "on") => config.include_target = true,
            Some("0" | "false" | "no" | "off") => config.include_target = false,
            _ => {}
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key: &str| {
            pairs
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn paths_derive_from_root() {
        let cfg = ProjectConfig::with_root("/srv/power");
        assert_eq!(
            cfg.source_file,
            PathBuf::from("/srv/power/data/formatted_source_data.csv")
        );
        assert_eq!(
            cfg.residual_file,
            PathBuf::from("/srv/power/data/time_decomposition_remainder_data.csv")
        );
        assert_eq!(cfg.registry_dir, PathBuf::from("/srv/power/Models/registry"));
    }

    #[test]
    fn overrides_resolve_against_root() {
        let cfg = ProjectConfig::from_lookup(vars(&[
            ("POWER_PROJECT_ROOT", "/srv/power"),
            ("POWER_SOURCE_FILE", "raw/readings.csv"),
            ("POWER_RESIDUAL_FILE", " decomposition/remainder.csv "),
            ("POWER_REGISTRY_DIR", "/var/models"),
        ]));
        assert_eq!(cfg.project_root, PathBuf::from("/srv/power"));
        assert_eq!(cfg.source_file, PathBuf::from("/srv/power/raw/readings.csv"));
        assert_eq!(
            cfg.residual_file,
            PathBuf::from("/srv/power/decomposition/remainder.csv")
        );
        assert_eq!(cfg.registry_dir, PathBuf::from("/var/models"));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let cfg = ProjectConfig::from_lookup(vars(&[
            ("POWER_PROJECT_ROOT", "/srv/power"),
            ("POWER_SOURCE_FILE", "   "),
        ]));
        assert_eq!(cfg, ProjectConfig::with_root("/srv/power"));
    }

    #[test]
    fn strategy_is_parsed_or_defaulted() {
        let unset = strategy_from_lookup(vars(&[]), CleaningStrategy::Remove);
        assert_eq!(unset.unwrap(), CleaningStrategy::Remove);

        let set = strategy_from_lookup(
            vars(&[("POWER_CLEANING_STRATEGY", "interpolate")]),
            CleaningStrategy::Remove,
        );
        assert_eq!(set.unwrap(), CleaningStrategy::Interpolate);

        let bad = strategy_from_lookup(
            vars(&[("POWER_CLEANING_STRATEGY", "mode")]),
            CleaningStrategy::Remove,
        );
        assert!(matches!(bad, Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn server_version_must_be_numeric() {
        let err = ServerConfig::from_lookup(vars(&[("POWER_MODEL_VERSION", "latest")]));
        assert!(matches!(err, Err(PipelineError::Configuration(_))));

        let ok = ServerConfig::from_lookup(vars(&[
            ("POWER_MODEL_NAME", "Baseline"),
            ("POWER_MODEL_VERSION", "3"),
        ]))
        .unwrap();
        assert_eq!(ok.model_name, "Baseline");
        assert_eq!(ok.model_version, 3);
        assert_eq!(ok.bind_addr, "127.0.0.1:8000");
    }

    #[test]
    fn logging_defaults_to_pretty_info() {
        assert_eq!(LoggingConfig::from_lookup(vars(&[])), LoggingConfig::default());
    }

    #[test]
    fn logging_reads_level_format_and_target() {
        let cfg = LoggingConfig::from_lookup(vars(&[
            ("POWER_LOG_LEVEL", "power_prediction=debug"),
            ("POWER_LOG_FORMAT", "JSON"),
            ("POWER_LOG_TARGET", "off"),
        ]));
        assert_eq!(cfg.level, "power_prediction=debug");
        assert_eq!(cfg.format, LogFormat::Json);
        assert!(!cfg.include_target);
    }

    #[test]
    fn unrecognized_logging_values_keep_defaults() {
        let cfg = LoggingConfig::from_lookup(vars(&[
            ("POWER_LOG_LEVEL", "  "),
            ("POWER_LOG_FORMAT", "xml"),
            ("POWER_LOG_TARGET", "sometimes"),
        ]));
        assert_eq!(cfg, LoggingConfig::default());
    }
}
