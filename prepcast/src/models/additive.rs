//! Additive demand model
//!
//! `sold ≈ base(item) + Σ effect_f(category_f)`. Item bases are mean sales per
//! item. Category effects are fitted by backfitting, one pass over all
//! enabled features per step, each effect being the shrunken mean residual of
//! its category.

use crate::config::TrainingConfig;
use crate::data::Record;
use crate::error::{PipelineError, Result, TrainingFailure};
use crate::features::{FeatureContext, FeatureKind, FeatureSnapshot};
use crate::models::{
    DemandModel, FeatureRow, ModelFit, StepReport, TrainedDemandModel,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Additive model definition
#[derive(Debug, Clone)]
pub struct AdditiveDemandModel {
    /// Name of the model
    name: String,
    /// Backfitting passes
    epochs: usize,
    /// Pseudo-count added to every category
    shrinkage: f64,
}

impl AdditiveDemandModel {
    /// Create a new additive model
    pub fn new(epochs: usize, shrinkage: f64) -> Result<Self> {
        if epochs == 0 {
            return Err(PipelineError::InvalidParameter(
                "Epochs must be positive".to_string(),
            ));
        }
        if !(shrinkage >= 0.0) {
            return Err(PipelineError::InvalidParameter(
                "Shrinkage must be non-negative".to_string(),
            ));
        }

        Ok(Self {
            name: format!("Additive Demand (epochs={}, shrinkage={})", epochs, shrinkage),
            epochs,
            shrinkage,
        })
    }

    pub fn from_config(config: &TrainingConfig) -> Result<Self> {
        Self::new(config.epochs, config.shrinkage)
    }
}

impl DemandModel for AdditiveDemandModel {
    fn begin_fit(
        &self,
        records: &[Record],
        features: &FeatureSnapshot,
    ) -> std::result::Result<Box<dyn ModelFit>, TrainingFailure> {
        let kinds: Vec<FeatureKind> = features.enabled().map(|f| f.kind).collect();

        let mut totals: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for record in records {
            let entry = totals.entry(record.item.clone()).or_insert((0.0, 0));
            entry.0 += record.quantity_sold;
            entry.1 += 1;
        }
        let bases: BTreeMap<String, f64> = totals
            .into_iter()
            .map(|(item, (sum, count))| (item, sum / count as f64))
            .collect();

        let global_mean = if records.is_empty() {
            0.0
        } else {
            records.iter().map(|r| r.quantity_sold).sum::<f64>() / records.len() as f64
        };

        let rows = records
            .iter()
            .map(|record| {
                let context = FeatureContext::from(record);
                encode_with(&kinds, &context)
            })
            .collect();
        let targets = records.iter().map(|r| r.quantity_sold).collect();

        Ok(Box::new(AdditiveFit {
            name: self.name.clone(),
            epochs: self.epochs,
            shrinkage: self.shrinkage,
            kinds: kinds.clone(),
            bases,
            global_mean,
            effects: vec![BTreeMap::new(); kinds.len()],
            rows,
            targets,
        }))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn encode_with(kinds: &[FeatureKind], context: &FeatureContext<'_>) -> FeatureRow {
    FeatureRow {
        item: context.item.to_string(),
        categories: kinds.iter().map(|kind| kind.category(context)).collect(),
    }
}

fn effect_of(effects: &BTreeMap<String, f64>, category: &Option<String>) -> f64 {
    category
        .as_ref()
        .and_then(|c| effects.get(c))
        .copied()
        .unwrap_or(0.0)
}

struct AdditiveFit {
    name: String,
    epochs: usize,
    shrinkage: f64,
    kinds: Vec<FeatureKind>,
    bases: BTreeMap<String, f64>,
    global_mean: f64,
    effects: Vec<BTreeMap<String, f64>>,
    rows: Vec<FeatureRow>,
    targets: Vec<f64>,
}

impl AdditiveFit {
    fn base(&self, item: &str) -> f64 {
        self.bases.get(item).copied().unwrap_or(self.global_mean)
    }

    fn raw_prediction(&self, row: &FeatureRow, skip: Option<usize>) -> f64 {
        let effects: f64 = self
            .effects
            .iter()
            .zip(&row.categories)
            .enumerate()
            .filter(|(j, _)| Some(*j) != skip)
            .map(|(_, (effects, category))| effect_of(effects, category))
            .sum();
        self.base(&row.item) + effects
    }

    fn loss(&self) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        let sse: f64 = self
            .rows
            .iter()
            .zip(&self.targets)
            .map(|(row, y)| (y - self.raw_prediction(row, None)).powi(2))
            .sum();
        sse / self.rows.len() as f64
    }
}

impl ModelFit for AdditiveFit {
    fn total_steps(&self) -> usize {
        self.epochs
    }

    fn step(&mut self) -> std::result::Result<StepReport, TrainingFailure> {
        for j in 0..self.kinds.len() {
            let mut sums: BTreeMap<String, (f64, f64)> = BTreeMap::new();
            for (row, y) in self.rows.iter().zip(&self.targets) {
                if let Some(category) = &row.categories[j] {
                    let residual = y - self.raw_prediction(row, Some(j));
                    let entry = sums.entry(category.clone()).or_insert((0.0, 0.0));
                    entry.0 += residual;
                    entry.1 += 1.0;
                }
            }
            let shrinkage = self.shrinkage;
            self.effects[j] = sums
                .into_iter()
                .map(|(category, (sum, count))| (category, sum / (count + shrinkage)))
                .collect();
        }

        let loss = self.loss();
        if !loss.is_finite() {
            return Err(TrainingFailure::Degenerate(format!(
                "training loss is {}",
                loss
            )));
        }
        Ok(StepReport { loss })
    }

    fn finish(self: Box<Self>) -> std::result::Result<Arc<dyn TrainedDemandModel>, TrainingFailure> {
        let fit = *self;
        Ok(Arc::new(TrainedAdditiveModel {
            name: fit.name,
            items: fit.bases.keys().cloned().collect(),
            kinds: fit.kinds,
            bases: fit.bases,
            global_mean: fit.global_mean,
            effects: fit.effects,
        }))
    }
}

/// Fitted additive model
#[derive(Debug, Clone)]
pub struct TrainedAdditiveModel {
    name: String,
    items: Vec<String>,
    kinds: Vec<FeatureKind>,
    bases: BTreeMap<String, f64>,
    global_mean: f64,
    effects: Vec<BTreeMap<String, f64>>,
}

impl TrainedAdditiveModel {
    /// Fitted effect for one feature category
    pub fn effect(&self, feature_index: usize, category: &str) -> Option<f64> {
        self.effects.get(feature_index)?.get(category).copied()
    }

    pub fn base(&self, item: &str) -> f64 {
        self.bases.get(item).copied().unwrap_or(self.global_mean)
    }
}

impl TrainedDemandModel for TrainedAdditiveModel {
    fn encode(&self, context: &FeatureContext<'_>) -> FeatureRow {
        encode_with(&self.kinds, context)
    }

    fn predict_row(&self, row: &FeatureRow) -> f64 {
        let effects: f64 = self
            .effects
            .iter()
            .zip(&row.categories)
            .map(|(effects, category)| effect_of(effects, category))
            .sum();
        (self.base(&row.item) + effects).max(0.0)
    }

    fn contributions(&self, row: &FeatureRow) -> Option<Vec<f64>> {
        Some(
            self.effects
                .iter()
                .zip(&row.categories)
                .map(|(effects, category)| effect_of(effects, category))
                .collect(),
        )
    }

    fn items(&self) -> &[String] {
        &self.items
    }

    fn name(&self) -> &str {
        &self.name
    }
}
