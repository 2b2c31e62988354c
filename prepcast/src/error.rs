//! Error types for the prepcast crate

use crate::pipeline::PipelineStage;
use crate::training::JobId;
use polars::prelude::PolarsError;
use thiserror::Error;

/// Blocking problem with the uploaded table's shape
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A required column header is absent
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    /// All columns present but no row could be coerced
    #[error("Dataset has no usable rows")]
    EmptyDataset,
}

/// Non-blocking problem with a single data row.
///
/// `row_index` is zero-based over the data rows (the header row is not
/// counted).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Row {row_index}: {reason}")]
pub struct RowError {
    pub row_index: usize,
    pub reason: String,
}

impl RowError {
    pub fn new(row_index: usize, reason: impl Into<String>) -> Self {
        Self {
            row_index,
            reason: reason.into(),
        }
    }
}

/// Reason a training job ended in `Failed`
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrainingFailure {
    /// Fewer valid records than the configured minimum
    #[error("Insufficient training data: {available} records, need at least {required}")]
    InsufficientData { available: usize, required: usize },

    /// Training produced non-finite values
    #[error("Training diverged: {0}")]
    Degenerate(String),

    /// The worker thread could not be started or stopped unexpectedly
    #[error("Training worker error: {0}")]
    Worker(String),

    /// The job was cancelled before it completed
    #[error("Training was cancelled")]
    Cancelled,
}

/// Custom error types for the prepcast crate
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Uploaded table violates the column contract
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Unknown feature id
    #[error("Feature not found: {id}")]
    NotFound { id: String },

    /// Feature toggled while a training job is running
    #[error("Feature '{feature}' is locked while training job {job} is running")]
    Locked { feature: String, job: JobId },

    /// A second training job was started while one is running
    #[error("Training job {running} is already running")]
    Conflict { running: JobId },

    /// Stage operation called before its prerequisite stage completed
    #[error("'{operation}' is not available in stage {stage:?}")]
    NotReady {
        operation: &'static str,
        stage: PipelineStage,
    },

    /// Job id not known to the controller
    #[error("Unknown training job: {0}")]
    UnknownJob(JobId),

    /// Training job ended in `Failed`
    #[error("Training failed: {0}")]
    Training(#[from] TrainingFailure),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error related to data processing
    #[error("Data error: {0}")]
    Data(String),

    /// Error from IO operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from CSV parsing
    #[error("CSV error: {0}")]
    Csv(String),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    Polars(String),

    /// Error from JSON (de)serialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, PipelineError>;

impl From<PolarsError> for PipelineError {
    fn from(err: PolarsError) -> Self {
        PipelineError::Polars(err.to_string())
    }
}

impl From<csv::Error> for PipelineError {
    fn from(err: csv::Error) -> Self {
        PipelineError::Csv(err.to_string())
    }
}

impl From<prep_math::MathError> for PipelineError {
    fn from(err: prep_math::MathError) -> Self {
        PipelineError::Data(err.to_string())
    }
}
