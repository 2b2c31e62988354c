//! Guided pipeline session
//!
//! `AwaitingUpload -> AwaitingValidationReview -> AwaitingTraining ->
//! Forecasting`. Each stage consumes the artifact published by the previous
//! one, and no stage can be entered without its predecessor's artifact. Stage
//! artifacts are shared handles and are replaced wholesale, never edited.
//!
//! Training runs in the background. The session follows the active job
//! through its event stream and reacts to the terminal event whenever it is
//! polled: `Completed` advances to `Forecasting` with the new model, `Failed`
//! and `Cancelled` keep the current stage and record the reason.

use crate::anomaly::{waste_heatmap, Anomaly, AnomalyDetector, WasteHeatmap};
use crate::config::PipelineConfig;
use crate::data::{Dataset, RawTable};
use crate::error::{PipelineError, Result, TrainingFailure};
use crate::features::{Feature, FeatureRegistry};
use crate::forecast::{build_forecast, DateRange, ForecastQuery, ForecastResult};
use crate::models::{DemandModel, TrainedModel};
use crate::training::{JobController, JobEvent, JobId, JobStatus, TrainingJob};
use crate::validation::{validate, ValidationResult};
use serde::Serialize;
use std::fmt;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;

/// Stage of the guided pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PipelineStage {
    AwaitingUpload,
    AwaitingValidationReview,
    AwaitingTraining,
    Forecasting,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::AwaitingUpload => "awaiting upload",
            PipelineStage::AwaitingValidationReview => "awaiting validation review",
            PipelineStage::AwaitingTraining => "awaiting training",
            PipelineStage::Forecasting => "forecasting",
        };
        f.write_str(name)
    }
}

/// One user's pass through upload, validation, training and forecasting
#[derive(Debug)]
pub struct PipelineSession {
    config: PipelineConfig,
    detector: AnomalyDetector,
    controller: JobController,
    stage: PipelineStage,
    validation: Option<ValidationResult>,
    anomalies: Arc<Vec<Anomaly>>,
    registry: FeatureRegistry,
    job: Option<TrainingJob>,
    events: Option<Receiver<JobEvent>>,
    last_event: Option<JobEvent>,
    model: Option<TrainedModel>,
    forecast: Option<ForecastResult>,
    last_failure: Option<TrainingFailure>,
}

impl PipelineSession {
    /// Session training the additive reference model
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let controller = JobController::new(config.training.clone())?;
        Self::build(config, controller)
    }

    /// Session training a caller-supplied model
    pub fn with_model(config: PipelineConfig, model: Arc<dyn DemandModel>) -> Result<Self> {
        config.validate()?;
        let controller = JobController::with_model(config.training.clone(), model);
        Self::build(config, controller)
    }

    fn build(config: PipelineConfig, controller: JobController) -> Result<Self> {
        Ok(Self {
            detector: AnomalyDetector::new(&config.anomaly)?,
            config,
            controller,
            stage: PipelineStage::AwaitingUpload,
            validation: None,
            anomalies: Arc::new(Vec::new()),
            registry: FeatureRegistry::default(),
            job: None,
            events: None,
            last_event: None,
            model: None,
            forecast: None,
            last_failure: None,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    fn set_stage(&mut self, stage: PipelineStage) {
        if self.stage != stage {
            tracing::info!(from = %self.stage, to = %stage, "Pipeline stage changed");
            self.stage = stage;
        }
    }

    fn require(&self, operation: &'static str, allowed: &[PipelineStage]) -> Result<()> {
        if allowed.contains(&self.stage) {
            Ok(())
        } else {
            Err(PipelineError::NotReady {
                operation,
                stage: self.stage,
            })
        }
    }

    /// Validate an uploaded table.
    ///
    /// A valid result advances to `AwaitingValidationReview` and recomputes
    /// the anomalies. An invalid one leaves the session in `AwaitingUpload`
    /// with the result's errors available for display. Re-uploading during
    /// review replaces the previous dataset.
    pub fn submit_upload(&mut self, table: &RawTable) -> Result<ValidationResult> {
        self.require(
            "submit_upload",
            &[
                PipelineStage::AwaitingUpload,
                PipelineStage::AwaitingValidationReview,
            ],
        )?;

        let result = validate(table);
        let summary = result.summary();
        tracing::info!(
            valid = summary.valid,
            usable_rows = summary.usable_rows,
            rejected_rows = summary.rejected_rows,
            "Upload validated"
        );

        if result.is_valid() {
            self.anomalies = Arc::new(self.detector.detect(result.dataset()));
            tracing::info!(anomalies = self.anomalies.len(), "Anomalies detected");
            self.validation = Some(result.clone());
            self.set_stage(PipelineStage::AwaitingValidationReview);
        } else {
            self.anomalies = Arc::new(Vec::new());
            self.validation = None;
            self.set_stage(PipelineStage::AwaitingUpload);
        }
        Ok(result)
    }

    /// Latest valid validation result
    pub fn validation(&self) -> Option<&ValidationResult> {
        self.validation.as_ref()
    }

    /// Validated dataset, once an upload was accepted
    pub fn dataset(&self) -> Option<&Dataset> {
        self.validation.as_ref().map(|v| v.dataset())
    }

    /// Anomalies of the current dataset, sorted by date then item
    pub fn list_anomalies(&self) -> Result<&[Anomaly]> {
        self.require("list_anomalies", &Self::after_upload())?;
        Ok(&self.anomalies)
    }

    /// Item by date waste percentages of the current dataset
    pub fn waste_heatmap(&self) -> Result<WasteHeatmap> {
        self.require("waste_heatmap", &Self::after_upload())?;
        let dataset = self.dataset().ok_or(PipelineError::NotReady {
            operation: "waste_heatmap",
            stage: self.stage,
        })?;
        Ok(waste_heatmap(dataset))
    }

    fn after_upload() -> [PipelineStage; 3] {
        [
            PipelineStage::AwaitingValidationReview,
            PipelineStage::AwaitingTraining,
            PipelineStage::Forecasting,
        ]
    }

    /// Accept the reviewed dataset. Anomalies are advisory and never block.
    pub fn confirm_validation(&mut self) -> Result<()> {
        self.require(
            "confirm_validation",
            &[PipelineStage::AwaitingValidationReview],
        )?;
        self.set_stage(PipelineStage::AwaitingTraining);
        Ok(())
    }

    pub fn list_features(&self) -> &[Feature] {
        self.registry.list()
    }

    /// Flip a feature. Fails with `Locked` while a training job runs.
    pub fn toggle_feature(&mut self, id: &str) -> Result<Feature> {
        self.poll();
        self.registry.toggle(id)
    }

    /// Start training on the validated dataset with a snapshot of the
    /// current features.
    ///
    /// Allowed in `AwaitingTraining`, and in `Forecasting` to retrain; the
    /// current model stays in place until the new job completes.
    pub fn start_training(&mut self) -> Result<JobId> {
        self.poll();
        self.require(
            "start_training",
            &[PipelineStage::AwaitingTraining, PipelineStage::Forecasting],
        )?;
        let dataset = self
            .dataset()
            .cloned()
            .ok_or(PipelineError::NotReady {
                operation: "start_training",
                stage: self.stage,
            })?;

        let job = self.controller.start(dataset, self.registry.snapshot())?;
        self.registry.bind(job.clone());
        self.events = Some(job.subscribe());
        self.last_event = None;
        self.last_failure = None;
        let id = job.id();
        self.job = Some(job);
        Ok(id)
    }

    /// Event stream of any job this session started
    pub fn subscribe_job(&self, id: JobId) -> Result<Receiver<JobEvent>> {
        self.controller.subscribe(id)
    }

    /// Cancel a job; terminal jobs are left alone and their status returned
    pub fn cancel_job(&mut self, id: JobId) -> Result<JobStatus> {
        let status = self.controller.cancel(id)?;
        self.poll();
        Ok(status)
    }

    /// The most recently started job
    pub fn job(&self) -> Option<&TrainingJob> {
        self.job.as_ref()
    }

    /// Last event received from the followed job
    pub fn last_event(&self) -> Option<&JobEvent> {
        self.last_event.as_ref()
    }

    /// Drain pending job events without blocking and apply a terminal
    /// outcome if one arrived. Returns the latest job status.
    pub fn poll(&mut self) -> Option<JobStatus> {
        let mut terminal = None;
        if let Some(events) = &self.events {
            loop {
                match events.try_recv() {
                    Ok(event) => {
                        if event.is_terminal() {
                            terminal = Some(event.status);
                        }
                        self.last_event = Some(event);
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        // Closed without a terminal event in the buffer
                        terminal = terminal.or_else(|| {
                            self.job
                                .as_ref()
                                .map(|job| job.status())
                                .filter(|status| status.is_terminal())
                        });
                        break;
                    }
                }
            }
        }

        if let Some(status) = terminal {
            self.apply_outcome(status);
        }
        self.job.as_ref().map(|job| job.status())
    }

    /// Block until the followed job is terminal and apply its outcome
    pub fn wait_for_training(&mut self) -> Result<JobStatus> {
        let job = self.job.clone().ok_or(PipelineError::NotReady {
            operation: "wait_for_training",
            stage: self.stage,
        })?;
        let status = job.wait();
        self.poll();
        Ok(status)
    }

    fn apply_outcome(&mut self, status: JobStatus) {
        self.events = None;
        self.registry.unbind();
        let Some(job) = self.job.clone() else {
            return;
        };

        match status {
            JobStatus::Completed => match job.model() {
                Some(model) => {
                    tracing::info!(job = %job.id(), model = model.name(), "Model published");
                    self.model = Some(model);
                    self.forecast = None;
                    self.set_stage(PipelineStage::Forecasting);
                }
                None => {
                    self.last_failure = Some(TrainingFailure::Worker(
                        "completed without a model".to_string(),
                    ));
                }
            },
            JobStatus::Failed => {
                self.last_failure = job.failure().or_else(|| {
                    Some(TrainingFailure::Worker("failed without a reason".to_string()))
                });
            }
            JobStatus::Cancelled => {
                self.last_failure = Some(TrainingFailure::Cancelled);
            }
            JobStatus::Pending | JobStatus::Running => {}
        }

        if let Some(failure) = &self.last_failure {
            tracing::warn!(job = %job.id(), stage = %self.stage, reason = %failure, "Training did not complete");
        }
    }

    /// Reason the most recent training attempt did not complete
    pub fn last_failure(&self) -> Option<&TrainingFailure> {
        self.last_failure.as_ref()
    }

    /// Model of the last completed job
    pub fn model(&self) -> Option<&TrainedModel> {
        self.model.as_ref()
    }

    /// Daily forecast over `range` with the model's evaluation
    pub fn get_forecast(&mut self, range: DateRange) -> Result<ForecastResult> {
        self.forecast_query(&ForecastQuery::daily(range))
    }

    /// Forecast with explicit granularity and item filter
    pub fn forecast_query(&mut self, query: &ForecastQuery) -> Result<ForecastResult> {
        self.poll();
        self.require("get_forecast", &[PipelineStage::Forecasting])?;
        let not_ready = PipelineError::NotReady {
            operation: "get_forecast",
            stage: self.stage,
        };
        let (model, dataset) = match (self.model.as_ref(), self.dataset()) {
            (Some(model), Some(dataset)) => (model, dataset),
            _ => return Err(not_ready),
        };

        let result = build_forecast(model, dataset, query, &self.config.attribution)?;
        self.forecast = Some(result.clone());
        Ok(result)
    }

    /// Most recent forecast result
    pub fn last_forecast(&self) -> Option<&ForecastResult> {
        self.forecast.as_ref()
    }

    /// Return to `AwaitingUpload`, cancelling any running job and discarding
    /// every downstream artifact. Feature toggles are kept.
    pub fn restart(&mut self) {
        if let Some(job) = self.job.take() {
            job.cancel();
        }
        let pruned = self.controller.prune_finished();
        tracing::debug!(pruned, "Finished jobs released");
        self.registry.unbind();
        self.events = None;
        self.last_event = None;
        self.validation = None;
        self.anomalies = Arc::new(Vec::new());
        self.model = None;
        self.forecast = None;
        self.last_failure = None;
        self.set_stage(PipelineStage::AwaitingUpload);
    }
}

impl Drop for PipelineSession {
    fn drop(&mut self) {
        if let Some(job) = &self.job {
            job.cancel();
        }
    }
}
