use chrono::NaiveDate;
use prepcast::config::TrainingConfig;
use prepcast::error::{PipelineError, TrainingFailure};
use prepcast::features::FeatureContext;
use prepcast::models::{DemandModel, FeatureRow, ModelFit, StepReport, TrainedDemandModel};
use prepcast::{Dataset, FeatureRegistry, JobController, JobEvent, JobStatus, Record};
use std::sync::{Arc, Barrier, Condvar, Mutex};
use std::thread;

fn dataset() -> Dataset {
    Dataset::new(
        (1..=10)
            .map(|day| {
                Record::new(
                    "Soup",
                    NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
                    30.0,
                    20.0 + (day % 4) as f64,
                )
            })
            .collect(),
    )
}

/// Blocks every fitting step until opened
#[derive(Debug, Default)]
struct Gate {
    open: Mutex<bool>,
    opened: Condvar,
}

impl Gate {
    fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.opened.notify_all();
    }

    fn pass(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.opened.wait(open).unwrap();
        }
    }
}

#[derive(Debug)]
struct GatedModel {
    gate: Arc<Gate>,
    steps: usize,
    fail_at: Option<usize>,
}

struct GatedFit {
    gate: Arc<Gate>,
    steps: usize,
    done: usize,
    fail_at: Option<usize>,
}

#[derive(Debug)]
struct ConstantModel {
    items: Vec<String>,
}

impl DemandModel for GatedModel {
    fn begin_fit(
        &self,
        _records: &[Record],
        _features: &prepcast::FeatureSnapshot,
    ) -> Result<Box<dyn ModelFit>, TrainingFailure> {
        Ok(Box::new(GatedFit {
            gate: Arc::clone(&self.gate),
            steps: self.steps,
            done: 0,
            fail_at: self.fail_at,
        }))
    }

    fn name(&self) -> &str {
        "gated"
    }
}

impl ModelFit for GatedFit {
    fn total_steps(&self) -> usize {
        self.steps
    }

    fn step(&mut self) -> Result<StepReport, TrainingFailure> {
        self.gate.pass();
        self.done += 1;
        if Some(self.done) == self.fail_at {
            return Err(TrainingFailure::Degenerate("loss is NaN".to_string()));
        }
        Ok(StepReport {
            loss: 1.0 / self.done as f64,
        })
    }

    fn finish(self: Box<Self>) -> Result<Arc<dyn TrainedDemandModel>, TrainingFailure> {
        Ok(Arc::new(ConstantModel {
            items: vec!["Soup".to_string()],
        }))
    }
}

impl TrainedDemandModel for ConstantModel {
    fn encode(&self, context: &FeatureContext<'_>) -> FeatureRow {
        FeatureRow {
            item: context.item.to_string(),
            categories: Vec::new(),
        }
    }

    fn predict_row(&self, _row: &FeatureRow) -> f64 {
        21.0
    }

    fn items(&self) -> &[String] {
        &self.items
    }

    fn name(&self) -> &str {
        "constant"
    }
}

fn gated_controller(gate: &Arc<Gate>, fail_at: Option<usize>) -> JobController {
    JobController::with_model(
        TrainingConfig::default(),
        Arc::new(GatedModel {
            gate: Arc::clone(gate),
            steps: 4,
            fail_at,
        }),
    )
}

#[test]
fn test_concurrent_start_yields_one_conflict() {
    let gate = Arc::new(Gate::default());
    let controller = gated_controller(&gate, None);
    let snapshot = FeatureRegistry::default().snapshot();
    let barrier = Barrier::new(2);

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    controller.start(dataset(), snapshot.clone())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let started: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(PipelineError::Conflict { .. })))
        .count();
    assert_eq!(started.len(), 1);
    assert_eq!(conflicts, 1);
    assert_eq!(started[0].status(), JobStatus::Running);

    gate.open();
    assert_eq!(started[0].wait(), JobStatus::Completed);
}

#[test]
fn test_new_job_allowed_after_terminal() {
    let gate = Arc::new(Gate::default());
    gate.open();
    let controller = gated_controller(&gate, None);
    let snapshot = FeatureRegistry::default().snapshot();

    let first = controller.start(dataset(), snapshot.clone()).unwrap();
    first.wait();
    let second = controller.start(dataset(), snapshot).unwrap();
    assert_ne!(first.id(), second.id());
    assert_eq!(second.wait(), JobStatus::Completed);
}

#[test]
fn test_cancel_running_job() {
    let gate = Arc::new(Gate::default());
    let controller = gated_controller(&gate, None);
    let job = controller
        .start(dataset(), FeatureRegistry::default().snapshot())
        .unwrap();
    let events = job.subscribe();

    assert_eq!(controller.cancel(job.id()).unwrap(), JobStatus::Cancelled);
    gate.open();
    assert_eq!(job.wait(), JobStatus::Cancelled);
    assert!(job.model().is_none());

    let events: Vec<JobEvent> = events.iter().collect();
    let last = events.last().unwrap();
    assert_eq!(last.status, JobStatus::Cancelled);
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
}

#[test]
fn test_cancel_on_terminal_job_is_noop() {
    let gate = Arc::new(Gate::default());
    gate.open();
    let controller = gated_controller(&gate, None);
    let job = controller
        .start(dataset(), FeatureRegistry::default().snapshot())
        .unwrap();
    assert_eq!(job.wait(), JobStatus::Completed);
    let log_len = job.log_lines().len();

    assert_eq!(controller.cancel(job.id()).unwrap(), JobStatus::Completed);
    assert_eq!(controller.cancel(job.id()).unwrap(), JobStatus::Completed);
    assert_eq!(job.status(), JobStatus::Completed);
    assert_eq!(job.log_lines().len(), log_len);
    assert!(job.model().is_some());
}

#[test]
fn test_failed_step_publishes_reason() {
    let gate = Arc::new(Gate::default());
    gate.open();
    let controller = gated_controller(&gate, Some(2));
    let job = controller
        .start(dataset(), FeatureRegistry::default().snapshot())
        .unwrap();

    assert_eq!(job.wait(), JobStatus::Failed);
    assert_eq!(
        job.failure(),
        Some(TrainingFailure::Degenerate("loss is NaN".to_string()))
    );
    assert!(job.model().is_none());
    assert_eq!(controller.cancel(job.id()).unwrap(), JobStatus::Failed);
}

#[test]
fn test_progress_events_are_ordered() {
    let gate = Arc::new(Gate::default());
    let controller = gated_controller(&gate, None);
    let job = controller
        .start(dataset(), FeatureRegistry::default().snapshot())
        .unwrap();
    let events = job.subscribe();
    gate.open();

    let events: Vec<JobEvent> = events.iter().collect();
    assert!(events.windows(2).all(|w| w[0].progress <= w[1].progress));
    let last = events.last().unwrap();
    assert_eq!(last.status, JobStatus::Completed);
    assert_eq!(last.progress, 100);
    assert!(events[..events.len() - 1].iter().all(|e| e.progress < 100));

    let iterations = job
        .log_lines()
        .iter()
        .filter(|line| line.message.starts_with("[INFO] Iteration"))
        .count();
    assert_eq!(iterations, 4);
}

#[test]
fn test_cancel_racing_completion_has_one_winner() {
    let controller = JobController::new(TrainingConfig {
        epochs: 3,
        ..TrainingConfig::default()
    })
    .unwrap();
    let snapshot = FeatureRegistry::default().snapshot();

    for _ in 0..25 {
        let job = controller.start(dataset(), snapshot.clone()).unwrap();
        let events = job.subscribe();
        let cancelled = job.cancel();
        let status = job.wait();

        assert_eq!(cancelled, status);
        match status {
            JobStatus::Completed => assert!(job.model().is_some()),
            JobStatus::Cancelled => assert!(job.model().is_none()),
            other => panic!("unexpected terminal status {:?}", other),
        }
        let terminal: Vec<JobStatus> = events
            .iter()
            .filter(|e| e.is_terminal())
            .map(|e| e.status)
            .collect();
        assert_eq!(terminal, vec![status]);
    }
}
