use chrono::NaiveDate;
use prepcast::config::TrainingConfig;
use prepcast::forecast::{ForecastQuery, Granularity};
use prepcast::synthetic::SyntheticGenerator;
use prepcast::{logging, DateRange, JobStatus, PipelineConfig, PipelineSession};
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init()?;

    println!("Prepcast: Guided Pipeline Example");
    println!("=================================\n");

    let config = PipelineConfig {
        training: TrainingConfig {
            step_delay_ms: 50,
            ..TrainingConfig::default()
        },
        ..PipelineConfig::default()
    };
    let mut session = PipelineSession::new(config)?;

    // 1. Upload
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).ok_or("invalid start date")?;
    let table = SyntheticGenerator::new(start, 56).with_seed(2024).table()?;
    let validation = session.submit_upload(&table)?;
    let summary = validation.summary();
    println!(
        "Upload: {} usable rows, {} rejected, {} oversold",
        summary.usable_rows, summary.rejected_rows, summary.oversold_rows
    );

    // 2. Review anomalies
    let anomalies = session.list_anomalies()?;
    println!("\nAnomalies ({}):", anomalies.len());
    for anomaly in anomalies.iter().take(10) {
        println!("  {:?} {}: {}", anomaly.kind, anomaly.item, anomaly.explanation);
    }
    session.confirm_validation()?;

    // 3. Select features and train
    session.toggle_feature("menuType")?;
    println!("\nFeatures:");
    for feature in session.list_features() {
        println!(
            "  [{}] {} - {}",
            if feature.enabled { "x" } else { " " },
            feature.name,
            feature.description
        );
    }

    let job_id = session.start_training()?;
    println!("\nTraining {}...", job_id);
    loop {
        let status = session.poll();
        if let Some(event) = session.last_event() {
            if let Some(line) = &event.log_line {
                println!("  {:>3}% {}", event.progress, line.message);
            }
        }
        match status {
            Some(JobStatus::Running) | Some(JobStatus::Pending) => {
                std::thread::sleep(Duration::from_millis(100))
            }
            _ => break,
        }
    }
    session.wait_for_training()?;

    if let Some(failure) = session.last_failure() {
        println!("Training did not complete: {}", failure);
        return Ok(());
    }

    // 4. Forecast the four weeks after the upload
    let range = DateRange::new(
        NaiveDate::from_ymd_opt(2024, 2, 12).ok_or("invalid date")?,
        NaiveDate::from_ymd_opt(2024, 3, 10).ok_or("invalid date")?,
    )?;
    let forecast =
        session.forecast_query(&ForecastQuery::daily(range).with_granularity(Granularity::Week))?;

    println!("\nWeekly forecast:");
    for point in &forecast.points {
        match point.actual {
            Some(actual) => println!(
                "  {}  predicted {:>8.1}  actual {:>8.1}",
                point.date, point.predicted, actual
            ),
            None => println!("  {}  predicted {:>8.1}", point.date, point.predicted),
        }
    }

    println!("\n{}", forecast.metrics);
    println!("Feature impact:");
    for impact in &forecast.impacts {
        println!("  {:<10} {:.2}", impact.name, impact.impact);
    }

    Ok(())
}
