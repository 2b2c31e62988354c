//! Feature impact attribution
//!
//! Two methods are available. The additive method measures the variance of
//! each feature's contribution across the evaluation rows. Permutation
//! importance shuffles one feature column at a time and measures how much the
//! absolute error grows. Either way the raw scores are clamped to be
//! non-negative and divided by the largest, so impacts lie in `[0, 1]`.

use crate::config::{AttributionConfig, AttributionMethod};
use crate::metrics::mean_absolute_error;
use crate::models::{FeatureRow, TrainedDemandModel, TrainedModel};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use statrs::statistics::Statistics;

/// Relative impact of one enabled feature
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImpact {
    /// Feature id
    pub feature: String,
    /// Display name
    pub name: String,
    /// Impact in `[0, 1]`
    pub impact: f64,
}

/// Impacts of the model's enabled features, highest first.
///
/// `rows` must be encoded by the model and paired with `actual`. Features
/// with equal impact keep catalog order.
pub fn attribute(
    model: &TrainedModel,
    rows: &[FeatureRow],
    actual: &[f64],
    config: &AttributionConfig,
) -> Vec<FeatureImpact> {
    let enabled: Vec<_> = model.features().enabled().collect();
    if enabled.is_empty() {
        return Vec::new();
    }

    let raw = match config.method {
        AttributionMethod::Additive => additive_scores(model.model(), rows).unwrap_or_else(|| {
            tracing::debug!("Model is not additive, using permutation importance");
            permutation_scores(model.model(), rows, actual, config)
        }),
        AttributionMethod::Permutation => permutation_scores(model.model(), rows, actual, config),
    };

    let mut impacts: Vec<FeatureImpact> = enabled
        .iter()
        .zip(normalize(&raw, enabled.len()))
        .map(|(feature, impact)| FeatureImpact {
            feature: feature.id.clone(),
            name: feature.name.clone(),
            impact,
        })
        .collect();
    impacts.sort_by(|a, b| b.impact.total_cmp(&a.impact));
    impacts
}

/// Population variance of each feature's contribution; `None` when the
/// model does not decompose
pub fn additive_scores(model: &dyn TrainedDemandModel, rows: &[FeatureRow]) -> Option<Vec<f64>> {
    let contributions: Vec<Vec<f64>> = rows
        .iter()
        .map(|row| model.contributions(row))
        .collect::<Option<_>>()?;
    let width = rows.first().map(|r| r.categories.len()).unwrap_or(0);

    Some(
        (0..width)
            .map(|j| {
                let column: Vec<f64> = contributions
                    .iter()
                    .map(|c| c.get(j).copied().unwrap_or(0.0))
                    .collect();
                if column.len() < 2 {
                    0.0
                } else {
                    column.iter().population_variance()
                }
            })
            .collect(),
    )
}

/// Mean increase in MAE over `permutation_rounds` shuffles of each feature
/// column, seeded from the configuration
pub fn permutation_scores(
    model: &dyn TrainedDemandModel,
    rows: &[FeatureRow],
    actual: &[f64],
    config: &AttributionConfig,
) -> Vec<f64> {
    let width = rows.first().map(|r| r.categories.len()).unwrap_or(0);
    if rows.len() < 2 {
        return vec![0.0; width];
    }

    let predict_all =
        |rows: &[FeatureRow]| -> Vec<f64> { rows.iter().map(|r| model.predict_row(r)).collect() };
    let baseline = mean_absolute_error(&predict_all(rows), actual);
    let mut rng = StdRng::seed_from_u64(config.seed);
    let rounds = config.permutation_rounds.max(1);

    (0..width)
        .map(|j| {
            let mut column: Vec<Option<String>> =
                rows.iter().map(|r| r.categories[j].clone()).collect();
            let mut shuffled = rows.to_vec();
            let total: f64 = (0..rounds)
                .map(|_| {
                    column.shuffle(&mut rng);
                    for (row, category) in shuffled.iter_mut().zip(&column) {
                        row.categories[j] = category.clone();
                    }
                    mean_absolute_error(&predict_all(&shuffled), actual) - baseline
                })
                .sum();
            total / rounds as f64
        })
        .collect()
}

/// Clamp to non-negative and scale so the largest score is 1
fn normalize(raw: &[f64], width: usize) -> Vec<f64> {
    let clamped: Vec<f64> = (0..width)
        .map(|j| raw.get(j).copied().filter(|v| v.is_finite()).unwrap_or(0.0).max(0.0))
        .collect();
    let max = clamped.iter().copied().fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return vec![0.0; width];
    }
    clamped.into_iter().map(|v| v / max).collect()
}
