//! Training job state and event stream
//!
//! Every status change, progress update and log line is applied under one
//! mutex and forwarded to subscribers while that mutex is held. Subscribers
//! therefore see events in order, and nothing arrives after the terminal
//! event: its senders are dropped in the same critical section, which closes
//! the channels.

use crate::data::Dataset;
use crate::error::TrainingFailure;
use crate::features::FeatureSnapshot;
use crate::models::TrainedModel;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Session-unique training job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Lifecycle of a training job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// No further transitions happen after a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Timestamped line of the job's training log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl LogLine {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
        }
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.timestamp.format("%H:%M:%S%.3f"), self.message)
    }
}

/// One update delivered to job subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub log_line: Option<LogLine>,
}

impl JobEvent {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[derive(Debug)]
struct JobState {
    status: JobStatus,
    progress: u8,
    log: Vec<LogLine>,
    failure: Option<TrainingFailure>,
    model: Option<TrainedModel>,
    subscribers: Vec<Sender<JobEvent>>,
}

#[derive(Debug)]
struct JobShared {
    id: JobId,
    features: FeatureSnapshot,
    dataset: Dataset,
    cancel_requested: AtomicBool,
    state: Mutex<JobState>,
    finished: Condvar,
}

/// Handle to one training job; clones share the same job
#[derive(Debug, Clone)]
pub struct TrainingJob {
    shared: Arc<JobShared>,
}

impl TrainingJob {
    /// Create a `Pending` job bound to its dataset and feature snapshot
    pub(crate) fn new(id: JobId, dataset: Dataset, features: FeatureSnapshot) -> Self {
        Self {
            shared: Arc::new(JobShared {
                id,
                features,
                dataset,
                cancel_requested: AtomicBool::new(false),
                state: Mutex::new(JobState {
                    status: JobStatus::Pending,
                    progress: 0,
                    log: Vec::new(),
                    failure: None,
                    model: None,
                    subscribers: Vec::new(),
                }),
                finished: Condvar::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, JobState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> JobId {
        self.shared.id
    }

    pub fn status(&self) -> JobStatus {
        self.lock().status
    }

    /// Progress 0–100, never decreasing
    pub fn progress(&self) -> u8 {
        self.lock().progress
    }

    /// Copy of the log so far
    pub fn log_lines(&self) -> Vec<LogLine> {
        self.lock().log.clone()
    }

    /// Feature snapshot the job trains with
    pub fn features(&self) -> &FeatureSnapshot {
        &self.shared.features
    }

    pub fn dataset(&self) -> &Dataset {
        &self.shared.dataset
    }

    /// Reason the job failed, once `Failed`
    pub fn failure(&self) -> Option<TrainingFailure> {
        self.lock().failure.clone()
    }

    /// Trained model, once `Completed`
    pub fn model(&self) -> Option<TrainedModel> {
        self.lock().model.clone()
    }

    /// Cooperative stop flag polled by the worker between steps
    pub fn is_cancel_requested(&self) -> bool {
        self.shared.cancel_requested.load(Ordering::Acquire)
    }

    /// Open an event stream.
    ///
    /// The first event carries the current status and progress. A stream
    /// opened on a finished job yields only the terminal event and closes.
    pub fn subscribe(&self) -> Receiver<JobEvent> {
        let (tx, rx) = mpsc::channel();
        let mut state = self.lock();
        let current = JobEvent {
            job_id: self.id(),
            status: state.status,
            progress: state.progress,
            log_line: if state.status.is_terminal() {
                state.log.last().cloned()
            } else {
                None
            },
        };
        let _ = tx.send(current);
        if !state.status.is_terminal() {
            state.subscribers.push(tx);
        }
        rx
    }

    /// Request cancellation.
    ///
    /// A running job becomes `Cancelled` immediately. A job that already
    /// reached a terminal status is left alone and that status is returned.
    pub fn cancel(&self) -> JobStatus {
        let mut state = self.lock();
        if state.status != JobStatus::Running {
            return state.status;
        }
        self.shared.cancel_requested.store(true, Ordering::Release);
        self.finish(&mut state, JobStatus::Cancelled, "[WARN] Training cancelled");
        tracing::info!(job = %self.id(), "Training job cancelled");
        state.status
    }

    /// Block until the job reaches a terminal status
    pub fn wait(&self) -> JobStatus {
        let mut state = self.lock();
        while !state.status.is_terminal() {
            state = self
                .shared
                .finished
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.status
    }

    /// `Pending -> Running`; false if the job already left `Pending`
    pub(crate) fn mark_running(&self) -> bool {
        let mut state = self.lock();
        if state.status != JobStatus::Pending {
            return false;
        }
        state.status = JobStatus::Running;
        self.push_event(&mut state, None);
        true
    }

    /// Append a log line without moving progress
    pub(crate) fn log(&self, message: impl Into<String>) -> bool {
        let mut state = self.lock();
        if state.status != JobStatus::Running {
            return false;
        }
        let line = LogLine::new(message);
        tracing::debug!(job = %self.id(), "{}", line.message);
        state.log.push(line.clone());
        self.push_event(&mut state, Some(line));
        true
    }

    /// Raise progress and append a log line; false once the job left
    /// `Running` so the worker can stop
    pub(crate) fn report_progress(&self, progress: u8, message: impl Into<String>) -> bool {
        let mut state = self.lock();
        if state.status != JobStatus::Running {
            return false;
        }
        state.progress = state.progress.max(progress.min(99));
        let line = LogLine::new(message);
        tracing::debug!(job = %self.id(), progress = state.progress, "{}", line.message);
        state.log.push(line.clone());
        self.push_event(&mut state, Some(line));
        true
    }

    /// `Running -> Completed`, publishing the model. Returns the status that
    /// won if another transition got there first.
    pub(crate) fn complete(&self, model: TrainedModel) -> JobStatus {
        let mut state = self.lock();
        if state.status != JobStatus::Running {
            return state.status;
        }
        state.progress = 100;
        state.model = Some(model);
        self.finish(&mut state, JobStatus::Completed, "[INFO] Training complete");
        tracing::info!(job = %self.id(), "Training job completed");
        state.status
    }

    /// `Running -> Failed`, recording the reason
    pub(crate) fn fail(&self, failure: TrainingFailure) -> JobStatus {
        let mut state = self.lock();
        if state.status != JobStatus::Running {
            return state.status;
        }
        let message = format!("[ERROR] {}", failure);
        tracing::warn!(job = %self.id(), reason = %failure, "Training job failed");
        state.failure = Some(failure);
        self.finish(&mut state, JobStatus::Failed, message);
        state.status
    }

    fn finish(&self, state: &mut JobState, status: JobStatus, message: impl Into<String>) {
        state.status = status;
        let line = LogLine::new(message);
        state.log.push(line.clone());
        self.push_event(state, Some(line));
        // Dropping the senders closes every stream after the terminal event
        state.subscribers.clear();
        self.shared.finished.notify_all();
    }

    fn push_event(&self, state: &mut JobState, log_line: Option<LogLine>) {
        let event = JobEvent {
            job_id: self.id(),
            status: state.status,
            progress: state.progress,
            log_line,
        };
        state
            .subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}
