//! Error types for the anomaly detection pipeline

use thiserror::Error;

/// Broad failure category, used for reporting and process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input, schema or configuration problems
    Configuration,
    /// The mixture model could not be fitted or evaluated
    ModelFitting,
    /// The anomaly threshold could not be computed
    Threshold,
}

impl ErrorKind {
    /// Process exit code for this category
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Configuration => 2,
            ErrorKind::ModelFitting => 3,
            ErrorKind::Threshold => 4,
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to read input {location}: {reason}")]
    Input { location: String, reason: String },

    #[error("Column '{column}' not found in input schema")]
    MissingColumn { column: String },

    #[error("Feature column '{column}' has non-numeric type {data_type}")]
    NonNumericFeature { column: String, data_type: String },

    #[error("Feature column '{column}' has a null value at row {row}")]
    NullFeature { column: String, row: usize },

    #[error("Feature column '{column}' has a non-finite value at row {row}")]
    NonFiniteFeature { column: String, row: usize },

    #[error("No feature columns left after excluding identifier and label columns")]
    NoFeatureColumns,

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Model fitting
    #[error("Need at least {k} distinct records to fit {k} components, found {distinct}")]
    InsufficientData { k: usize, distinct: usize },

    #[error(
        "Mixture fit (k={k}, seed={seed}) did not converge within {max_iterations} iterations: {reason}"
    )]
    NotConverged {
        k: usize,
        seed: u64,
        max_iterations: u64,
        reason: String,
    },

    #[error("Numerical instability in mixture model (k={k}, seed={seed}): {reason}")]
    NumericalInstability { k: usize, seed: u64, reason: String },

    #[error("Mixture fit (k={k}, seed={seed}) failed: {reason}")]
    Fit { k: usize, seed: u64, reason: String },

    // Threshold selection
    #[error("Cannot compute an anomaly threshold over an empty score set")]
    EmptyScores,

    #[error("Score of record {row} is not finite")]
    NonFiniteScore { row: usize },

    #[error("Invalid quantile request (q={quantile}, relative_error={relative_error})")]
    InvalidQuantile { quantile: f64, relative_error: f64 },
}

impl PipelineError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InsufficientData { .. }
            | PipelineError::NotConverged { .. }
            | PipelineError::NumericalInstability { .. }
            | PipelineError::Fit { .. } => ErrorKind::ModelFitting,
            PipelineError::EmptyScores
            | PipelineError::NonFiniteScore { .. }
            | PipelineError::InvalidQuantile { .. } => ErrorKind::Threshold,
            _ => ErrorKind::Configuration,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
