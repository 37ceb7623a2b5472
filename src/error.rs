use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Missing input: {what} ({})", path.display())]
    MissingInput { what: String, path: PathBuf },

    #[error("Validation failed at stage '{stage}': {detail}")]
    ValidationFailure { stage: String, detail: String },

    #[error("Could not open relation store at {}: {source}", path.display())]
    StoreConnection {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid pipeline state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Spreadsheet export failed: {0}")]
    Spreadsheet(#[from] rust_xlsxwriter::XlsxError),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Artifact publication failed: {0}")]
    Publish(String),
}

impl PipelineError {
    pub fn validation(stage: impl Into<String>, detail: impl Into<String>) -> Self {
        PipelineError::ValidationFailure {
            stage: stage.into(),
            detail: detail.into(),
        }
    }

    pub fn missing(what: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        PipelineError::MissingInput {
            what: what.into(),
            path: path.into(),
        }
    }

    pub fn is_validation_failure(&self) -> bool {
        matches!(self, PipelineError::ValidationFailure { .. })
    }

    pub fn is_missing_input(&self) -> bool {
        matches!(self, PipelineError::MissingInput { .. })
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
