//! Training job controller
//!
//! Runs one training job at a time on a background thread. The job slot is
//! guarded by a mutex held across the conflict check and the
//! `Pending -> Running` transition, so two concurrent `start` calls can never
//! both succeed.

use crate::config::TrainingConfig;
use crate::data::Dataset;
use crate::error::{PipelineError, Result, TrainingFailure};
use crate::features::FeatureSnapshot;
use crate::models::{AdditiveDemandModel, DemandModel, TrainedModel};
use crate::utils::train_test_split;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

pub mod job;

pub use job::{JobEvent, JobId, JobStatus, LogLine, TrainingJob};

/// Starts, tracks and cancels training jobs for one session
#[derive(Debug)]
pub struct JobController {
    config: TrainingConfig,
    model: Arc<dyn DemandModel>,
    next_id: AtomicU64,
    active: Mutex<Option<TrainingJob>>,
    /// Every job started since the last `prune_finished`
    history: Mutex<BTreeMap<JobId, TrainingJob>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl JobController {
    /// Controller training the additive reference model
    pub fn new(config: TrainingConfig) -> Result<Self> {
        let model = AdditiveDemandModel::from_config(&config)?;
        Ok(Self::with_model(config, Arc::new(model)))
    }

    /// Controller training a caller-supplied model
    pub fn with_model(config: TrainingConfig, model: Arc<dyn DemandModel>) -> Self {
        Self {
            config,
            model,
            next_id: AtomicU64::new(1),
            active: Mutex::new(None),
            history: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Start a job on a background thread and return at once.
    ///
    /// Fails with `Conflict` while another job is running.
    pub fn start(&self, dataset: Dataset, features: FeatureSnapshot) -> Result<TrainingJob> {
        let mut active = lock(&self.active);
        if let Some(current) = active.as_ref() {
            if !current.status().is_terminal() {
                return Err(PipelineError::Conflict {
                    running: current.id(),
                });
            }
        }

        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let job = TrainingJob::new(id, dataset, features);
        job.mark_running();
        *active = Some(job.clone());
        lock(&self.history).insert(id, job.clone());

        let worker = Worker {
            job: job.clone(),
            model: Arc::clone(&self.model),
            config: self.config.clone(),
        };
        let spawned = thread::Builder::new()
            .name(format!("prepcast-{}", id))
            .spawn(move || worker.run());

        if let Err(err) = spawned {
            job.fail(TrainingFailure::Worker(err.to_string()));
            return Err(PipelineError::Training(TrainingFailure::Worker(
                err.to_string(),
            )));
        }

        tracing::info!(job = %id, records = job.dataset().len(), "Training job started");
        Ok(job)
    }

    /// Look up a job started by this controller
    pub fn job(&self, id: JobId) -> Result<TrainingJob> {
        lock(&self.history)
            .get(&id)
            .cloned()
            .ok_or(PipelineError::UnknownJob(id))
    }

    /// The job currently holding the slot, if it is still running
    pub fn running_job(&self) -> Option<TrainingJob> {
        lock(&self.active)
            .as_ref()
            .filter(|job| !job.status().is_terminal())
            .cloned()
    }

    /// Event stream for a job
    pub fn subscribe(&self, id: JobId) -> Result<Receiver<JobEvent>> {
        Ok(self.job(id)?.subscribe())
    }

    /// Cancel a job. Terminal jobs are left alone and their status returned.
    pub fn cancel(&self, id: JobId) -> Result<JobStatus> {
        Ok(self.job(id)?.cancel())
    }

    /// Forget terminal jobs, releasing their datasets. Returns how many were
    /// dropped.
    pub fn prune_finished(&self) -> usize {
        let mut history = lock(&self.history);
        let before = history.len();
        history.retain(|_, job| !job.status().is_terminal());
        before - history.len()
    }
}

struct Worker {
    job: TrainingJob,
    model: Arc<dyn DemandModel>,
    config: TrainingConfig,
}

impl Worker {
    fn run(self) {
        let _span = tracing::info_span!("training_job", job = %self.job.id()).entered();
        if let Err(failure) = self.train() {
            self.job.fail(failure);
        }
    }

    fn train(&self) -> std::result::Result<(), TrainingFailure> {
        let features = self.job.features().clone();
        let enabled: Vec<&str> = features.enabled().map(|f| f.id.as_str()).collect();
        self.job.log(format!(
            "[INFO] Training {} on {} records with features [{}]",
            self.model.name(),
            self.job.dataset().len(),
            enabled.join(", ")
        ));

        let (train, holdout) = train_test_split(self.job.dataset(), self.config.holdout_ratio)
            .map_err(|err| TrainingFailure::Degenerate(err.to_string()))?;
        if train.len() < self.config.min_records {
            return Err(TrainingFailure::InsufficientData {
                available: train.len(),
                required: self.config.min_records,
            });
        }
        self.job.log(format!(
            "[INFO] Split into {} training and {} hold-out records",
            train.len(),
            holdout.len()
        ));

        let mut fit = self.model.begin_fit(&train, &features)?;
        let total = fit.total_steps().max(1);
        let delay = self.config.step_delay();

        for step in 1..=total {
            if self.job.is_cancel_requested() {
                return Ok(());
            }
            let report = fit.step()?;
            let progress = (step * 99 / total) as u8;
            let message = format!("[INFO] Iteration {}: Loss = {:.4}", step, report.loss);
            if !self.job.report_progress(progress, message) {
                // Cancelled while stepping
                return Ok(());
            }
            if !delay.is_zero() {
                thread::sleep(delay);
            }
        }

        if self.job.is_cancel_requested() {
            return Ok(());
        }
        let trained = fit.finish()?;
        let model = TrainedModel::new(
            self.job.id(),
            trained,
            features,
            Dataset::new(train),
            Dataset::new(holdout),
        );
        self.job.complete(model);
        Ok(())
    }
}
