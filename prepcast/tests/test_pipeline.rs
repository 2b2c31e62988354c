use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use prepcast::config::TrainingConfig;
use prepcast::error::{PipelineError, TrainingFailure};
use prepcast::forecast::{ForecastQuery, Granularity};
use prepcast::synthetic::SyntheticGenerator;
use prepcast::{
    DateRange, JobStatus, PipelineConfig, PipelineSession, PipelineStage, RawTable,
};

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn table(days: u32) -> RawTable {
    SyntheticGenerator::new(start(), days).table().unwrap()
}

fn session_with(training: TrainingConfig) -> PipelineSession {
    PipelineSession::new(PipelineConfig {
        training,
        ..PipelineConfig::default()
    })
    .unwrap()
}

fn reviewed_session(training: TrainingConfig) -> PipelineSession {
    let mut session = session_with(training);
    assert!(session.submit_upload(&table(42)).unwrap().is_valid());
    session.confirm_validation().unwrap();
    session
}

fn range(from: &str, to: &str) -> DateRange {
    DateRange::new(from.parse().unwrap(), to.parse().unwrap()).unwrap()
}

#[test]
fn test_full_session_reaches_forecasting() {
    let mut session = session_with(TrainingConfig::default());
    assert_eq!(session.stage(), PipelineStage::AwaitingUpload);

    let validation = session.submit_upload(&table(42)).unwrap();
    assert!(validation.is_valid());
    assert_eq!(session.stage(), PipelineStage::AwaitingValidationReview);
    assert!(session.waste_heatmap().is_ok());

    session.confirm_validation().unwrap();
    assert_eq!(session.stage(), PipelineStage::AwaitingTraining);

    let job_id = session.start_training().unwrap();
    assert_eq!(session.wait_for_training().unwrap(), JobStatus::Completed);
    assert_eq!(session.stage(), PipelineStage::Forecasting);
    assert_eq!(session.model().unwrap().job_id(), job_id);
    assert!(session.last_failure().is_none());

    let forecast = session
        .get_forecast(range("2024-02-05", "2024-02-18"))
        .unwrap();
    assert_eq!(forecast.points.len(), 14);
    // Inside the dataset every day has actuals
    assert!(forecast.points[..7].iter().all(|p| p.actual.is_some()));
    // Past its end only predictions remain
    assert!(forecast.points[7..].iter().all(|p| p.actual.is_none()));
    assert!(forecast.points.iter().all(|p| p.predicted >= 0.0));
    assert!(forecast.metrics.mae.is_finite());
    assert_eq!(session.last_forecast(), Some(&forecast));
}

#[test]
fn test_disabled_feature_is_absent_from_impacts() {
    let mut session = reviewed_session(TrainingConfig::default());
    let weather = session.toggle_feature("weather").unwrap();
    assert!(!weather.enabled);

    session.start_training().unwrap();
    session.wait_for_training().unwrap();

    let forecast = session
        .get_forecast(range("2024-01-01", "2024-01-31"))
        .unwrap();
    let ids: Vec<&str> = forecast.impacts.iter().map(|i| i.feature.as_str()).collect();
    assert_eq!(ids, vec!["weekday"]);
}

#[test]
fn test_stages_cannot_be_skipped() {
    let mut session = session_with(TrainingConfig::default());

    assert!(matches!(
        session.confirm_validation(),
        Err(PipelineError::NotReady {
            stage: PipelineStage::AwaitingUpload,
            ..
        })
    ));
    assert!(matches!(
        session.start_training(),
        Err(PipelineError::NotReady { .. })
    ));
    assert!(matches!(
        session.get_forecast(range("2024-01-01", "2024-01-07")),
        Err(PipelineError::NotReady {
            operation: "get_forecast",
            ..
        })
    ));
    assert!(session.list_anomalies().is_err());

    session.submit_upload(&table(14)).unwrap();
    assert!(matches!(
        session.start_training(),
        Err(PipelineError::NotReady {
            stage: PipelineStage::AwaitingValidationReview,
            ..
        })
    ));
}

#[test]
fn test_confirm_carries_dataset_and_anomalies_forward() {
    let mut session = session_with(TrainingConfig::default());
    session.submit_upload(&table(28)).unwrap();
    let dataset = session.dataset().unwrap().clone();
    let anomalies = session.list_anomalies().unwrap().to_vec();

    session.confirm_validation().unwrap();

    assert!(session.dataset().unwrap().shares_records_with(&dataset));
    assert_eq!(session.list_anomalies().unwrap(), anomalies.as_slice());
}

#[test]
fn test_toggle_locked_while_training_runs() {
    let mut session = reviewed_session(TrainingConfig {
        step_delay_ms: 200,
        ..TrainingConfig::default()
    });
    let job_id = session.start_training().unwrap();

    let err = session.toggle_feature("menuType").unwrap_err();
    assert!(matches!(err, PipelineError::Locked { job, .. } if job == job_id));
    assert!(matches!(
        session.start_training(),
        Err(PipelineError::Conflict { running }) if running == job_id
    ));

    assert_eq!(session.cancel_job(job_id).unwrap(), JobStatus::Cancelled);
    assert_eq!(session.wait_for_training().unwrap(), JobStatus::Cancelled);
    assert_eq!(session.stage(), PipelineStage::AwaitingTraining);
    assert_eq!(session.last_failure(), Some(&TrainingFailure::Cancelled));
    assert!(session.model().is_none());

    // Unlocked once the job is terminal
    assert!(session.toggle_feature("menuType").unwrap().enabled);
    assert_eq!(session.cancel_job(job_id).unwrap(), JobStatus::Cancelled);
}

#[test]
fn test_failed_training_stays_awaiting_training() {
    let mut session = reviewed_session(TrainingConfig {
        min_records: 10_000,
        ..TrainingConfig::default()
    });
    session.start_training().unwrap();

    assert_eq!(session.wait_for_training().unwrap(), JobStatus::Failed);
    assert_eq!(session.stage(), PipelineStage::AwaitingTraining);
    assert!(matches!(
        session.last_failure(),
        Some(TrainingFailure::InsufficientData {
            required: 10_000,
            ..
        })
    ));

    // Retrying is the caller's decision
    assert!(session.start_training().is_ok());
    assert_eq!(session.wait_for_training().unwrap(), JobStatus::Failed);
}

#[test]
fn test_subscribe_job_stream_closes_after_terminal() {
    let mut session = reviewed_session(TrainingConfig::default());
    let job_id = session.start_training().unwrap();
    let events: Vec<_> = session.subscribe_job(job_id).unwrap().iter().collect();

    let last = events.last().unwrap();
    assert!(last.is_terminal());
    assert_eq!(last.job_id, job_id);
    assert_eq!(session.poll(), Some(JobStatus::Completed));
    assert_eq!(session.stage(), PipelineStage::Forecasting);
}

#[test]
fn test_retraining_replaces_model() {
    let mut session = reviewed_session(TrainingConfig::default());
    let first = session.start_training().unwrap();
    session.wait_for_training().unwrap();

    session.toggle_feature("eventFlag").unwrap();
    let second = session.start_training().unwrap();
    session.wait_for_training().unwrap();

    assert_ne!(first, second);
    let model = session.model().unwrap();
    assert_eq!(model.job_id(), second);
    assert!(model.features().is_enabled("eventFlag"));

    let weekly = session
        .forecast_query(
            &ForecastQuery::daily(range("2024-01-01", "2024-01-31"))
                .with_granularity(Granularity::Week)
                .for_item("Soup"),
        )
        .unwrap();
    let first_point = &weekly.points[0];
    assert_eq!(first_point.date.to_string(), "2024-01-01");
    assert_eq!(weekly.points.len(), 5);
}

#[test]
fn test_unknown_forecast_item() {
    let mut session = reviewed_session(TrainingConfig::default());
    session.start_training().unwrap();
    session.wait_for_training().unwrap();

    let query = ForecastQuery::daily(range("2024-01-01", "2024-01-07")).for_item("Pizza");
    assert!(matches!(
        session.forecast_query(&query),
        Err(PipelineError::NotFound { id }) if id == "Pizza"
    ));
}

#[test]
fn test_restart_discards_artifacts() {
    let mut session = reviewed_session(TrainingConfig::default());
    let job_id = session.start_training().unwrap();
    session.wait_for_training().unwrap();
    session.toggle_feature("menuType").unwrap();

    session.restart();

    // Finished jobs are released with the rest of the session's artifacts
    assert!(matches!(
        session.cancel_job(job_id),
        Err(PipelineError::UnknownJob(id)) if id == job_id
    ));

    assert_eq!(session.stage(), PipelineStage::AwaitingUpload);
    assert!(session.dataset().is_none());
    assert!(session.model().is_none());
    assert!(session.job().is_none());
    assert!(session.last_forecast().is_none());
    assert!(session.list_anomalies().is_err());
    // Feature toggles belong to the user, not the dataset
    assert!(session
        .list_features()
        .iter()
        .any(|f| f.id == "menuType" && f.enabled));
}

#[test]
fn test_invalid_reupload_returns_to_upload() {
    let mut session = session_with(TrainingConfig::default());
    session.submit_upload(&table(14)).unwrap();
    assert_eq!(session.stage(), PipelineStage::AwaitingValidationReview);

    let broken = RawTable::from_strings(&["Item", "Qty Sold"], &[&["Soup", "3"]]);
    let result = session.submit_upload(&broken).unwrap();

    assert!(!result.is_valid());
    assert_eq!(session.stage(), PipelineStage::AwaitingUpload);
    assert!(session.dataset().is_none());
}
