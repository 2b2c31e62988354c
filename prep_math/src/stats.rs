//! Running statistics for trailing-window rules

use crate::{MathError, Result};

/// Deviations at or below this are treated as no deviation at all
const DEVIATION_EPSILON: f64 = 1e-9;

/// Online mean/variance accumulator (Welford).
///
/// Used for trailing statistics where every observation is compared against
/// everything seen before it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observation
    pub fn push(&mut self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(MathError::InvalidInput(format!(
                "Observation must be finite, got {}",
                value
            )));
        }

        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        Ok(())
    }

    /// Number of observations seen
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Mean of the observations, `None` when empty
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// Sample variance, `None` with fewer than two observations
    pub fn sample_variance(&self) -> Option<f64> {
        (self.count >= 2).then(|| (self.m2 / (self.count - 1) as f64).max(0.0))
    }

    /// Sample standard deviation, `None` with fewer than two observations
    pub fn sample_std_dev(&self) -> Option<f64> {
        self.sample_variance().map(f64::sqrt)
    }

    /// Distance of `value` from the mean in standard deviations.
    ///
    /// `None` with fewer than two observations. Against a history with no
    /// spread any deviation is infinitely many standard deviations away, and
    /// matching the history is zero.
    pub fn z_score(&self, value: f64) -> Option<f64> {
        let mean = self.mean()?;
        let std_dev = self.sample_std_dev()?;
        let deviation = (value - mean).abs();
        if std_dev <= 1e-12 {
            return Some(if deviation > DEVIATION_EPSILON {
                f64::INFINITY
            } else {
                0.0
            });
        }
        Some(deviation / std_dev)
    }
}
