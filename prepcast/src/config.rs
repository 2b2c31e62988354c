//! Pipeline configuration
//!
//! All thresholds are tunable. The defaults reproduce the wizard's behaviour
//! (70% waste, 2 standard deviations) but are not product-validated values.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration for a pipeline session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub anomaly: AnomalyConfig,
    pub training: TrainingConfig,
    pub attribution: AttributionConfig,
}

/// Anomaly detector thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Waste ratio above which a record is `HighWaste`
    pub high_waste_ratio: f64,
    /// Standard deviations from the trailing mean that make an `OutlierSpike`
    pub outlier_std_devs: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            high_waste_ratio: 0.70,
            outlier_std_devs: 2.0,
        }
    }
}

/// Training job parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Backfitting passes; each one is a progress step
    pub epochs: usize,
    /// Minimum number of training records, below which the job fails
    pub min_records: usize,
    /// Share of trailing distinct dates held out for evaluation
    pub holdout_ratio: f64,
    /// Pseudo-count pulling sparse category effects towards zero
    pub shrinkage: f64,
    /// Pause between epochs, mostly useful to observe progress in demos
    pub step_delay_ms: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 20,
            min_records: 5,
            holdout_ratio: 0.2,
            shrinkage: 2.0,
            step_delay_ms: 0,
        }
    }
}

impl TrainingConfig {
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

/// How feature impacts are attributed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionMethod {
    /// Variance of each feature's additive contribution
    Additive,
    /// Error increase when a feature's values are shuffled
    Permutation,
}

/// Attribution parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributionConfig {
    pub method: AttributionMethod,
    /// Seed for permutation shuffles, fixed so results are reproducible
    pub seed: u64,
    pub permutation_rounds: usize,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            method: AttributionMethod::Additive,
            seed: 42,
            permutation_rounds: 5,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a JSON configuration; missing fields take defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Check every parameter is in range
    pub fn validate(&self) -> Result<()> {
        let ratio = self.anomaly.high_waste_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(PipelineError::InvalidParameter(format!(
                "high_waste_ratio must be between 0 and 1, got {}",
                ratio
            )));
        }
        if !(self.anomaly.outlier_std_devs > 0.0) {
            return Err(PipelineError::InvalidParameter(
                "outlier_std_devs must be greater than zero".to_string(),
            ));
        }
        if self.training.epochs == 0 {
            return Err(PipelineError::InvalidParameter(
                "epochs must be greater than zero".to_string(),
            ));
        }
        if self.training.min_records == 0 {
            return Err(PipelineError::InvalidParameter(
                "min_records must be greater than zero".to_string(),
            ));
        }
        let holdout = self.training.holdout_ratio;
        if !(0.0..1.0).contains(&holdout) {
            return Err(PipelineError::InvalidParameter(format!(
                "holdout_ratio must be in [0, 1), got {}",
                holdout
            )));
        }
        if !(self.training.shrinkage >= 0.0) {
            return Err(PipelineError::InvalidParameter(
                "shrinkage must be non-negative".to_string(),
            ));
        }
        if self.attribution.method == AttributionMethod::Permutation
            && self.attribution.permutation_rounds == 0
        {
            return Err(PipelineError::InvalidParameter(
                "permutation_rounds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
