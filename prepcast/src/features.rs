//! Selectable forecast features
//!
//! The registry is the user-editable catalog. A training job never reads it
//! directly: it receives a [`FeatureSnapshot`], an immutable copy taken when
//! the job starts.

use crate::data::Record;
use crate::error::{PipelineError, Result};
use crate::training::{JobStatus, TrainingJob};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::sync::Arc;

/// How a feature turns an observation into a category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    /// `WeatherOpt` value; unknown when absent
    Weather,
    /// Day of week of the record date
    Weekday,
    /// `MenuType` value, `regular` when absent
    MenuType,
    /// Whether an `Event` was recorded
    EventFlag,
}

impl FeatureKind {
    /// Category key for an observation, `None` when it cannot be known
    pub fn category(&self, context: &FeatureContext<'_>) -> Option<String> {
        match self {
            FeatureKind::Weather => context.weather.map(|w| w.to_lowercase()),
            FeatureKind::Weekday => Some(context.date.weekday().to_string()),
            FeatureKind::MenuType => Some(
                context
                    .menu_type
                    .map(|m| m.to_lowercase())
                    .unwrap_or_else(|| "regular".to_string()),
            ),
            FeatureKind::EventFlag => {
                let flagged = context.event.is_some_and(|e| {
                    !matches!(
                        e.trim().to_lowercase().as_str(),
                        "" | "no" | "none" | "false" | "0"
                    )
                });
                Some(if flagged { "event" } else { "none" }.to_string())
            }
        }
    }
}

/// The observable attributes of one item on one date
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureContext<'a> {
    pub item: &'a str,
    pub date: NaiveDate,
    pub weather: Option<&'a str>,
    pub menu_type: Option<&'a str>,
    pub event: Option<&'a str>,
}

impl<'a> FeatureContext<'a> {
    /// Context for a date with no recorded observation
    pub fn future(item: &'a str, date: NaiveDate) -> Self {
        Self {
            item,
            date,
            weather: None,
            menu_type: None,
            event: None,
        }
    }
}

impl<'a> From<&'a Record> for FeatureContext<'a> {
    fn from(record: &'a Record) -> Self {
        Self {
            item: &record.item,
            date: record.date,
            weather: record.weather.as_deref(),
            menu_type: record.menu_type.as_deref(),
            event: record.event.as_deref(),
        }
    }
}

/// One selectable feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feature {
    pub id: String,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub kind: FeatureKind,
}

impl Feature {
    pub fn new(id: &str, name: &str, description: &str, enabled: bool, kind: FeatureKind) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            enabled,
            kind,
        }
    }
}

/// The catalog offered by the forecast studio
pub fn default_catalog() -> Vec<Feature> {
    vec![
        Feature::new(
            "weather",
            "Weather",
            "Include weather conditions in the forecast",
            true,
            FeatureKind::Weather,
        ),
        Feature::new(
            "weekday",
            "Weekday",
            "Consider day of week patterns",
            true,
            FeatureKind::Weekday,
        ),
        Feature::new(
            "menuType",
            "Menu Type",
            "Account for special menu days",
            false,
            FeatureKind::MenuType,
        ),
        Feature::new(
            "eventFlag",
            "Events",
            "Include school/corporate events",
            false,
            FeatureKind::EventFlag,
        ),
    ]
}

/// Immutable copy of the feature set bound to one training job
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSnapshot {
    features: Arc<Vec<Feature>>,
}

impl FeatureSnapshot {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            features: Arc::new(features),
        }
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Enabled features in catalog order
    pub fn enabled(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter().filter(|f| f.enabled)
    }

    pub fn get(&self, id: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.id == id)
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.get(id).is_some_and(|f| f.enabled)
    }
}

/// User-editable feature catalog
#[derive(Debug, Clone)]
pub struct FeatureRegistry {
    features: Vec<Feature>,
    bound_job: Option<TrainingJob>,
}

impl Default for FeatureRegistry {
    fn default() -> Self {
        Self::new(default_catalog())
    }
}

impl FeatureRegistry {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            features,
            bound_job: None,
        }
    }

    /// Features in catalog order
    pub fn list(&self) -> &[Feature] {
        &self.features
    }

    /// Flip a feature's `enabled` flag.
    ///
    /// Fails with `Locked` while the bound training job is running; the
    /// job's snapshot stays authoritative either way.
    pub fn toggle(&mut self, id: &str) -> Result<Feature> {
        if let Some(job) = &self.bound_job {
            if job.status() == JobStatus::Running {
                return Err(PipelineError::Locked {
                    feature: id.to_string(),
                    job: job.id(),
                });
            }
        }

        let feature = self
            .features
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| PipelineError::NotFound { id: id.to_string() })?;
        feature.enabled = !feature.enabled;
        tracing::info!(feature = %feature.id, enabled = feature.enabled, "Feature toggled");
        Ok(feature.clone())
    }

    /// Copy the current state for a new training job
    pub fn snapshot(&self) -> FeatureSnapshot {
        FeatureSnapshot::new(self.features.clone())
    }

    /// Lock toggling for as long as `job` is running
    pub fn bind(&mut self, job: TrainingJob) {
        self.bound_job = Some(job);
    }

    /// Drop the job binding
    pub fn unbind(&mut self) {
        self.bound_job = None;
    }
}
