//! Guarded ratio helpers

/// `numerator / denominator`, `None` when the denominator is zero or the
/// result is not finite
pub fn safe_ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        return None;
    }
    let ratio = numerator / denominator;
    ratio.is_finite().then_some(ratio)
}

/// Share of prepared quantity that went unsold.
///
/// `(prepped - sold) / prepped`; undefined when nothing was prepped. Negative
/// when more was sold than prepped.
pub fn waste_ratio(prepped: f64, sold: f64) -> Option<f64> {
    if prepped <= 0.0 {
        return None;
    }
    safe_ratio(prepped - sold, prepped)
}
