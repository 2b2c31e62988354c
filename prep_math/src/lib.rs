//! # Prep Math
//!
//! Numeric kernels shared by the prepcast pipeline: running statistics for
//! trailing-window anomaly rules and guarded ratios for waste calculations.

use thiserror::Error;

pub mod ratios;
pub mod stats;

pub use crate::ratios::{safe_ratio, waste_ratio};
pub use crate::stats::RunningStats;

/// Errors that can occur in numeric calculations
#[derive(Error, Debug, PartialEq)]
pub enum MathError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for numeric operations
pub type Result<T> = std::result::Result<T, MathError>;
