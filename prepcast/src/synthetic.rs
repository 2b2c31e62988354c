//! Synthetic prep/sales tables for demos and tests
//!
//! Sales follow a per-item base demand scaled by weekday and weather, with
//! Gaussian noise. Prep quantities run a little above demand. A small share of
//! days gets a waste spike where most of the prepped food goes unsold.

use crate::data::{Cell, Dataset, RawTable};
use crate::error::{PipelineError, Result};
use crate::validation::{
    validate, COLUMN_DATE, COLUMN_EVENT, COLUMN_ITEM, COLUMN_MENU_TYPE, COLUMN_QTY_PREPPED,
    COLUMN_QTY_SOLD, COLUMN_WEATHER,
};
use chrono::{Datelike, Days, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

const WEATHER: [(&str, f64); 4] = [
    ("Sunny", 1.15),
    ("Cloudy", 1.0),
    ("Rain", 0.8),
    ("Snow", 0.65),
];

/// Seeded generator of upload-shaped tables
#[derive(Debug, Clone)]
pub struct SyntheticGenerator {
    items: Vec<(String, f64)>,
    start: NaiveDate,
    days: u32,
    seed: u64,
    noise: f64,
    spike_probability: f64,
}

impl SyntheticGenerator {
    /// Four cafeteria items over `days` consecutive days from `start`
    pub fn new(start: NaiveDate, days: u32) -> Self {
        Self {
            items: vec![
                ("Soup".to_string(), 40.0),
                ("Salad".to_string(), 30.0),
                ("Pasta".to_string(), 55.0),
                ("Sandwich".to_string(), 35.0),
            ],
            start,
            days,
            seed: 42,
            noise: 0.08,
            spike_probability: 0.03,
        }
    }

    /// Replace the items and their base daily demand
    pub fn with_items(mut self, items: &[(&str, f64)]) -> Self {
        self.items = items
            .iter()
            .map(|(name, base)| (name.to_string(), *base))
            .collect();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Relative standard deviation of daily demand
    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }

    pub fn with_spike_probability(mut self, probability: f64) -> Self {
        self.spike_probability = probability;
        self
    }

    /// Generate a table with the required columns plus `MenuType` and `Event`
    pub fn table(&self) -> Result<RawTable> {
        if self.items.iter().any(|(_, base)| !(*base > 0.0)) {
            return Err(PipelineError::InvalidParameter(
                "Base demand must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.spike_probability) {
            return Err(PipelineError::InvalidParameter(
                "Spike probability must be between 0 and 1".to_string(),
            ));
        }
        if !(self.noise >= 0.0 && self.noise.is_finite()) {
            return Err(PipelineError::InvalidParameter(format!(
                "Noise must be a finite non-negative standard deviation, got {}",
                self.noise
            )));
        }
        let noise = Normal::new(1.0, self.noise)
            .map_err(|err| PipelineError::InvalidParameter(err.to_string()))?;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let headers = [
            COLUMN_ITEM,
            COLUMN_QTY_PREPPED,
            COLUMN_QTY_SOLD,
            COLUMN_DATE,
            COLUMN_WEATHER,
            COLUMN_MENU_TYPE,
            COLUMN_EVENT,
        ]
        .iter()
        .map(|h| h.to_string())
        .collect();

        let mut rows = Vec::with_capacity(self.items.len() * self.days as usize);
        for offset in 0..self.days {
            let date = self
                .start
                .checked_add_days(Days::new(offset as u64))
                .ok_or_else(|| PipelineError::InvalidParameter("Date out of range".to_string()))?;
            let (weather, weather_factor) = *WEATHER.choose(&mut rng).unwrap_or(&WEATHER[1]);
            let special_menu = rng.gen_bool(0.1);
            let event = rng.gen_bool(0.05);

            for (item, base) in &self.items {
                let mut demand = base * weekday_factor(date.weekday()) * weather_factor;
                if special_menu {
                    demand *= 1.2;
                }
                if event {
                    demand *= 1.4;
                }
                let sold = (demand * noise.sample(&mut rng)).max(0.0).round();
                let prepped = (demand * rng.gen_range(1.05..1.3)).round().max(sold);
                let sold = if rng.gen_bool(self.spike_probability) {
                    (prepped * rng.gen_range(0.0..0.15)).round()
                } else {
                    sold
                };

                rows.push(vec![
                    Cell::Text(item.clone()),
                    Cell::Number(prepped),
                    Cell::Number(sold),
                    Cell::Text(date.format("%Y-%m-%d").to_string()),
                    Cell::Text(weather.to_string()),
                    if special_menu {
                        Cell::Text("Special".to_string())
                    } else {
                        Cell::Empty
                    },
                    if event {
                        Cell::Text("Yes".to_string())
                    } else {
                        Cell::Empty
                    },
                ]);
            }
        }

        tracing::debug!(rows = rows.len(), seed = self.seed, "Generated synthetic table");
        Ok(RawTable::new(headers, rows))
    }

    /// Generate and validate a table
    pub fn dataset(&self) -> Result<Dataset> {
        let result = validate(&self.table()?);
        match result.column_errors().first() {
            Some(err) => Err(err.clone().into()),
            None => Ok(result.dataset().clone()),
        }
    }
}

fn weekday_factor(weekday: Weekday) -> f64 {
    match weekday {
        Weekday::Mon => 0.85,
        Weekday::Tue | Weekday::Wed => 1.0,
        Weekday::Thu => 1.05,
        Weekday::Fri => 1.25,
        Weekday::Sat => 0.7,
        Weekday::Sun => 0.6,
    }
}
