//! Error type shared by every stage of the workflow.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid date '{value}' in '{path}': {source}")]
    Date {
        path: PathBuf,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Missing column '{column}' in '{path}'")]
    MissingColumn { path: PathBuf, column: String },

    #[error("Invalid value '{value}' for column '{column}' at row {row} in '{path}'")]
    InvalidValue {
        path: PathBuf,
        column: String,
        row: usize,
        value: String,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("No usable data: {0}")]
    EmptyData(String),

    #[error("Step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },
}

impl WorkflowError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WorkflowError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        WorkflowError::Csv {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
