//! Demand models
//!
//! A model is fitted step by step so the training controller can report
//! progress and stop between steps. The fitted result is immutable and
//! predicts `quantity_sold` for any item/date context with the same feature
//! schema.

use crate::data::{Dataset, Record};
use crate::error::TrainingFailure;
use crate::features::{FeatureContext, FeatureSnapshot};
use crate::training::JobId;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::sync::Arc;

pub mod additive;

pub use additive::AdditiveDemandModel;

/// An observation encoded against a model's enabled features.
///
/// `categories[j]` belongs to the model's j-th enabled feature; `None` is an
/// unknown category.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub item: String,
    pub categories: Vec<Option<String>>,
}

/// Report from one fitting step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    /// Mean squared training error after the step
    pub loss: f64,
}

/// Untrained model definition
pub trait DemandModel: Debug + Send + Sync {
    /// Start fitting on the training records with the given features
    fn begin_fit(
        &self,
        records: &[Record],
        features: &FeatureSnapshot,
    ) -> Result<Box<dyn ModelFit>, TrainingFailure>;

    /// Name of the model
    fn name(&self) -> &str;
}

/// An in-progress fit, advanced one unit of work at a time
pub trait ModelFit: Send {
    /// Number of `step` calls needed to finish
    fn total_steps(&self) -> usize;

    /// Run one unit of work
    fn step(&mut self) -> Result<StepReport, TrainingFailure>;

    /// Freeze the fitted parameters
    fn finish(self: Box<Self>) -> Result<Arc<dyn TrainedDemandModel>, TrainingFailure>;
}

/// Fitted model
pub trait TrainedDemandModel: Debug + Send + Sync {
    /// Encode a context against the model's enabled features
    fn encode(&self, context: &FeatureContext<'_>) -> FeatureRow;

    /// Predicted quantity sold, never negative
    fn predict_row(&self, row: &FeatureRow) -> f64;

    /// Per-feature additive contributions in enabled-feature order, if the
    /// model is additive
    fn contributions(&self, _row: &FeatureRow) -> Option<Vec<f64>> {
        None
    }

    /// Items seen during training, sorted
    fn items(&self) -> &[String];

    /// Name of the model
    fn name(&self) -> &str;
}

/// Artifact published by a completed training job
#[derive(Debug, Clone)]
pub struct TrainedModel {
    job_id: JobId,
    model: Arc<dyn TrainedDemandModel>,
    features: FeatureSnapshot,
    training_set: Dataset,
    holdout_set: Dataset,
    trained_at: DateTime<Utc>,
}

impl TrainedModel {
    pub fn new(
        job_id: JobId,
        model: Arc<dyn TrainedDemandModel>,
        features: FeatureSnapshot,
        training_set: Dataset,
        holdout_set: Dataset,
    ) -> Self {
        Self {
            job_id,
            model,
            features,
            training_set,
            holdout_set,
            trained_at: Utc::now(),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn model(&self) -> &dyn TrainedDemandModel {
        self.model.as_ref()
    }

    /// Feature snapshot the model was trained with
    pub fn features(&self) -> &FeatureSnapshot {
        &self.features
    }

    pub fn training_set(&self) -> &Dataset {
        &self.training_set
    }

    pub fn holdout_set(&self) -> &Dataset {
        &self.holdout_set
    }

    /// Records metrics are computed on: the hold-out split, or the training
    /// split when nothing was held out
    pub fn evaluation_set(&self) -> &Dataset {
        if self.holdout_set.is_empty() {
            &self.training_set
        } else {
            &self.holdout_set
        }
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    pub fn predict(&self, context: &FeatureContext<'_>) -> f64 {
        self.model.predict_row(&self.model.encode(context))
    }

    pub fn name(&self) -> &str {
        self.model.name()
    }
}
