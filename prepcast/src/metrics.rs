//! Metrics for evaluating forecast performance

use crate::attribution::{attribute, FeatureImpact};
use crate::config::AttributionConfig;
use crate::data::Dataset;
use crate::error::{PipelineError, Result};
use crate::features::FeatureContext;
use crate::models::TrainedModel;
use serde::Serialize;
use statrs::statistics::Statistics;

/// Forecast accuracy over paired predictions and actuals
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    /// Mean Absolute Error
    pub mae: f64,
    /// Mean Absolute Percentage Error over non-zero actuals; `None` if every
    /// actual is zero
    pub mape: Option<f64>,
    /// Coefficient of determination; `None` when actuals have no variance
    pub r2: Option<f64>,
    /// Number of pairs evaluated
    pub count: usize,
    /// Pairs left out of MAPE because their actual was zero
    pub mape_skipped: usize,
}

impl std::fmt::Display for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Forecast Accuracy Metrics:")?;
        writeln!(f, "  MAE:   {:.4}", self.mae)?;
        match self.mape {
            Some(mape) => writeln!(f, "  MAPE:  {:.4}%", mape)?,
            None => writeln!(f, "  MAPE:  n/a")?,
        }
        match self.r2 {
            Some(r2) => writeln!(f, "  R2:    {:.4}", r2)?,
            None => writeln!(f, "  R2:    n/a")?,
        }
        Ok(())
    }
}

/// Evaluate forecast accuracy against actual values
pub fn compute_metrics(predicted: &[f64], actual: &[f64]) -> Result<Metrics> {
    if predicted.len() != actual.len() || predicted.is_empty() {
        return Err(PipelineError::Data(
            "Predicted and actual values must have the same non-zero length".to_string(),
        ));
    }
    if predicted.iter().chain(actual).any(|v| !v.is_finite()) {
        return Err(PipelineError::Data(
            "Predicted and actual values must be finite".to_string(),
        ));
    }

    let n = predicted.len() as f64;
    let mae = mean_absolute_error(predicted, actual);

    let (mape, mape_skipped) = mean_absolute_percentage_error(predicted, actual);
    if mape_skipped > 0 {
        tracing::warn!(
            skipped = mape_skipped,
            total = predicted.len(),
            "Zero actuals left out of MAPE"
        );
    }

    let mean_actual = actual.iter().mean();
    let ss_tot: f64 = actual.iter().map(|a| (a - mean_actual).powi(2)).sum();
    let ss_res: f64 = predicted
        .iter()
        .zip(actual)
        .map(|(p, a)| (a - p).powi(2))
        .sum();
    let r2 = if ss_tot <= 1e-12 * n {
        tracing::warn!("Actuals have no variance; R2 unavailable");
        None
    } else {
        Some(1.0 - ss_res / ss_tot)
    };

    Ok(Metrics {
        mae,
        mape,
        r2,
        count: predicted.len(),
        mape_skipped,
    })
}

/// `(1/n) Σ |predicted - actual|`; NaN for empty or mismatched input
pub fn mean_absolute_error(predicted: &[f64], actual: &[f64]) -> f64 {
    if predicted.len() != actual.len() || predicted.is_empty() {
        return f64::NAN;
    }
    predicted
        .iter()
        .zip(actual)
        .map(|(p, a)| (p - a).abs())
        .sum::<f64>()
        / predicted.len() as f64
}

/// MAPE in percent over the pairs with a non-zero actual, plus the number
/// of pairs skipped
pub fn mean_absolute_percentage_error(predicted: &[f64], actual: &[f64]) -> (Option<f64>, usize) {
    let terms: Vec<f64> = predicted
        .iter()
        .zip(actual)
        .filter(|&(_, &a)| a != 0.0)
        .map(|(&p, &a)| (p - a).abs() / a.abs())
        .collect();
    let skipped = predicted.len().min(actual.len()) - terms.len();

    if terms.is_empty() {
        return (None, skipped);
    }
    (Some(100.0 * terms.iter().sum::<f64>() / terms.len() as f64), skipped)
}

/// Accuracy and feature attribution of a trained model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub metrics: Metrics,
    /// Sorted by impact, highest first; enabled features only
    pub impacts: Vec<FeatureImpact>,
}

/// Evaluate a trained model on a set of records with known actuals
pub fn evaluate(
    model: &TrainedModel,
    evaluation_set: &Dataset,
    attribution: &AttributionConfig,
) -> Result<Evaluation> {
    if evaluation_set.is_empty() {
        return Err(PipelineError::Data("Evaluation set is empty".to_string()));
    }

    let rows: Vec<_> = evaluation_set
        .iter()
        .map(|record| model.model().encode(&FeatureContext::from(record)))
        .collect();
    let predicted: Vec<f64> = rows.iter().map(|row| model.model().predict_row(row)).collect();
    let actual: Vec<f64> = evaluation_set.iter().map(|r| r.quantity_sold).collect();

    let metrics = compute_metrics(&predicted, &actual)?;
    let impacts = attribute(model, &rows, &actual, attribution);

    tracing::info!(
        count = metrics.count,
        mae = metrics.mae,
        "Evaluated trained model"
    );
    Ok(Evaluation { metrics, impacts })
}
