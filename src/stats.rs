//! Descriptive statistics shared by every stage.
//!
//! All helpers tolerate empty input and zero denominators by returning a
//! neutral value instead of `NaN`.

use serde::{Deserialize, Serialize};

/// Arithmetic mean, `0.0` for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance, `0.0` for fewer than two values.
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Largest value, `0.0` for an empty slice.
pub fn max(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
        .unwrap_or(0.0)
}

/// Smallest value, `0.0` for an empty slice.
pub fn min(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))))
        .unwrap_or(0.0)
}

/// Percentile with linear interpolation between closest ranks.
///
/// `q` is in `[0, 100]`. Returns `0.0` for an empty slice.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    percentile_sorted(&sorted, q)
}

/// Same as [`percentile`] but for already sorted input.
pub fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Load factor: mean divided by peak, `0.0` when the peak is not positive.
pub fn load_factor(values: &[f64]) -> f64 {
    let peak = max(values);
    if peak > 0.0 { mean(values) / peak } else { 0.0 }
}

/// `numerator / denominator`, or `fallback` when the denominator is zero.
pub fn ratio_or(numerator: f64, denominator: f64, fallback: f64) -> f64 {
    if denominator.abs() > f64::EPSILON {
        numerator / denominator
    } else {
        fallback
    }
}

/// Least-squares slope of `values` against their index.
pub fn linear_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(values);
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    ratio_or(num, den, 0.0)
}

/// Aggregate statistics of a demand series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
    pub load_factor: f64,
    pub total: f64,
    pub count: usize,
}

impl SummaryStats {
    pub fn from_values(values: &[f64]) -> Self {
        Self {
            min: min(values),
            max: max(values),
            mean: mean(values),
            std: std_dev(values),
            load_factor: load_factor(values),
            total: values.iter().sum(),
            count: values.len(),
        }
    }
}
