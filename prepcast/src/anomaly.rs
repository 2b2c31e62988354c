//! Anomaly detection over item/date grouped records
//!
//! Records sharing an item and date are aggregated first (summed prepped and
//! sold quantities). Every rule then runs against each group on its own. The
//! output is sorted by date, then item, then kind, so repeated runs on the
//! same dataset return identical sequences.

use crate::config::AnomalyConfig;
use crate::data::Dataset;
use crate::error::{PipelineError, Result};
use chrono::NaiveDate;
use prep_math::RunningStats;
use serde::Serialize;
use std::collections::BTreeMap;

/// Rule that raised an anomaly. Ordered for tie-breaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum AnomalyKind {
    /// Nothing sold although something was prepped
    ZeroSales,
    /// Waste ratio above the configured threshold
    HighWaste,
    /// Waste ratio far from the item's trailing mean
    OutlierSpike,
}

/// One detected irregularity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    pub item: String,
    pub date: NaiveDate,
    pub kind: AnomalyKind,
    /// Source rows of the aggregated records
    pub rows: Vec<usize>,
    pub waste_ratio: Option<f64>,
    pub explanation: String,
}

#[derive(Debug, Default)]
struct Group {
    prepped: f64,
    sold: f64,
    rows: Vec<usize>,
    weather: Option<String>,
}

impl Group {
    fn waste_ratio(&self) -> Option<f64> {
        prep_math::waste_ratio(self.prepped, self.sold)
    }
}

/// Rule-based anomaly detector
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    high_waste_ratio: f64,
    outlier_std_devs: f64,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        let config = AnomalyConfig::default();
        Self {
            high_waste_ratio: config.high_waste_ratio,
            outlier_std_devs: config.outlier_std_devs,
        }
    }
}

impl AnomalyDetector {
    /// Create a detector from configured thresholds
    pub fn new(config: &AnomalyConfig) -> Result<Self> {
        if !(0.0..=1.0).contains(&config.high_waste_ratio) {
            return Err(PipelineError::InvalidParameter(
                "high_waste_ratio must be between 0 and 1".to_string(),
            ));
        }
        if !(config.outlier_std_devs > 0.0) {
            return Err(PipelineError::InvalidParameter(
                "outlier_std_devs must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            high_waste_ratio: config.high_waste_ratio,
            outlier_std_devs: config.outlier_std_devs,
        })
    }

    /// Scan a dataset. Never mutates it.
    pub fn detect(&self, dataset: &Dataset) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();
        let mut trailing: BTreeMap<&str, RunningStats> = BTreeMap::new();

        // (item, date) ordering walks each item's history oldest first
        for ((item, date), group) in group_records(dataset) {
            let ratio = group.waste_ratio();
            let mut raise = |kind: AnomalyKind, explanation: String| {
                anomalies.push(Anomaly {
                    item: item.to_string(),
                    date,
                    kind,
                    rows: group.rows.clone(),
                    waste_ratio: ratio,
                    explanation,
                });
            };

            if group.prepped > 0.0 && group.sold == 0.0 {
                let context = group
                    .weather
                    .as_ref()
                    .map(|w| format!(" ({})", w))
                    .unwrap_or_default();
                raise(
                    AnomalyKind::ZeroSales,
                    format!("0 sold on {}{}", date, context),
                );
            }

            let Some(ratio) = ratio else {
                continue;
            };

            if ratio > self.high_waste_ratio {
                raise(
                    AnomalyKind::HighWaste,
                    format!("{:.0}% waste on {}", ratio * 100.0, date),
                );
            }

            let history = trailing.entry(item).or_default();
            if let (Some(z), Some(mean)) = (history.z_score(ratio), history.mean()) {
                if z > self.outlier_std_devs {
                    let explanation = if z.is_finite() {
                        format!(
                            "{:.0}% waste on {} is {:.1} standard deviations from the usual {:.0}%",
                            ratio * 100.0,
                            date,
                            z,
                            mean * 100.0
                        )
                    } else {
                        format!(
                            "{:.0}% waste on {} breaks from a steady {:.0}%",
                            ratio * 100.0,
                            date,
                            mean * 100.0
                        )
                    };
                    raise(AnomalyKind::OutlierSpike, explanation);
                }
            }
            if let Err(err) = history.push(ratio) {
                tracing::debug!(item, %date, error = %err, "Waste ratio left out of trailing stats");
            }
        }

        anomalies.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then_with(|| a.item.cmp(&b.item))
                .then_with(|| a.kind.cmp(&b.kind))
        });

        tracing::debug!(count = anomalies.len(), "Anomaly scan finished");
        anomalies
    }
}

/// Detect anomalies with the default thresholds
pub fn detect(dataset: &Dataset) -> Vec<Anomaly> {
    AnomalyDetector::default().detect(dataset)
}

fn group_records(dataset: &Dataset) -> BTreeMap<(&str, NaiveDate), Group> {
    let mut groups: BTreeMap<(&str, NaiveDate), Group> = BTreeMap::new();
    for record in dataset {
        let group = groups
            .entry((record.item.as_str(), record.date))
            .or_default();
        group.prepped += record.quantity_prepped;
        group.sold += record.quantity_sold;
        group.rows.push(record.source_row);
        if group.weather.is_none() {
            group.weather = record.weather.clone();
        }
    }
    groups
}

/// Item × date matrix of waste percentages
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WasteHeatmap {
    pub items: Vec<String>,
    pub dates: Vec<NaiveDate>,
    /// `cells[item][date]` in percent; `None` without prepped quantity
    pub cells: Vec<Vec<Option<f64>>>,
}

impl WasteHeatmap {
    pub fn cell(&self, item: &str, date: NaiveDate) -> Option<f64> {
        let row = self.items.iter().position(|i| i == item)?;
        let col = self.dates.iter().position(|d| *d == date)?;
        self.cells[row][col]
    }
}

/// Build the waste heat map shown next to the anomaly list
pub fn waste_heatmap(dataset: &Dataset) -> WasteHeatmap {
    let items = dataset.items();
    let dates = dataset.dates();
    let groups = group_records(dataset);

    let cells = items
        .iter()
        .map(|item| {
            dates
                .iter()
                .map(|date| {
                    groups
                        .get(&(item.as_str(), *date))
                        .and_then(Group::waste_ratio)
                        .map(|ratio| ratio * 100.0)
                })
                .collect()
        })
        .collect();

    WasteHeatmap {
        items,
        dates,
        cells,
    }
}
