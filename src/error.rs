//! Errors raised while loading and cleaning reading tables.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to parse {column} value '{value}' at row {row}")]
    Parse {
        row: usize,
        column: String,
        value: String,
    },
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("source file {path} is missing required column {column}")]
    MissingColumn { path: PathBuf, column: &'static str },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl PipelineError {
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }
}
