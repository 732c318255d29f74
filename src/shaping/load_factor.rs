//! Peak-shaving / valley-filling transform that raises a fiscal year's load
//! factor while keeping its energy.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::decompose::smoothing::smooth3;
use crate::forecast::ForecastTable;
use crate::stats::{self, SummaryStats};

/// Highest load factor the transform will aim for.
pub const MAX_TARGET_LOAD_FACTOR: f64 = 0.95;

/// Percentile above which values are treated as peak.
const PEAK_PERCENTILE: f64 = 90.0;
/// Percentile below which values are treated as valley.
const VALLEY_PERCENTILE: f64 = 20.0;
/// Share of the excess over the peak threshold removed.
const SHAVE_FRACTION: f64 = 0.3;
/// Share of the shortfall under the valley threshold added.
const FILL_FRACTION: f64 = 0.3;
/// Relative gap between achieved and target mean that triggers the final correction.
const MEAN_TOLERANCE: f64 = 0.05;

/// Load-factor improvement request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadFactorImprovement {
    pub enabled: bool,
    /// Fiscal year by which the full improvement is reached.
    pub target_fiscal_year: i32,
    /// Relative load-factor increase in percent, within `(0, 50]`.
    pub improvement_percent: f64,
}

impl Default for LoadFactorImprovement {
    fn default() -> Self {
        Self {
            enabled: false,
            target_fiscal_year: 2030,
            improvement_percent: 10.0,
        }
    }
}

/// Smoothstep `3p² − 2p³` of `p` clamped to `[0, 1]`.
pub fn s_curve(p: f64) -> f64 {
    let p = p.clamp(0.0, 1.0);
    3.0 * p * p - 2.0 * p * p * p
}

/// Elapsed fraction of `[start_fy, target_fy]` at `fiscal_year`.
///
/// Years at or past the target give `1.0`; when the target equals the start
/// the ramp is a single step at the target year.
pub fn ramp_progress(fiscal_year: i32, start_fy: i32, target_fy: i32) -> f64 {
    if fiscal_year >= target_fy {
        return 1.0;
    }
    if target_fy <= start_fy {
        return 0.0;
    }
    (f64::from(fiscal_year - start_fy) / f64::from(target_fy - start_fy)).clamp(0.0, 1.0)
}

/// Load factor to aim for after applying `eased` (an S-curve weight) of
/// `improvement_percent`. Never below `current`, never above
/// [`MAX_TARGET_LOAD_FACTOR`] unless `current` already is.
pub fn target_load_factor(current: f64, improvement_percent: f64, eased: f64) -> f64 {
    let raised = current * (1.0 + improvement_percent / 100.0 * eased);
    raised.min(MAX_TARGET_LOAD_FACTOR).max(current)
}

/// Reshapes one year's values toward `target_lf`.
///
/// Peaks above the 90th percentile lose 30 % of their excess, valleys below
/// the 20th percentile gain 30 % of their shortfall, a 3-point pass smooths
/// the joins and the series is rescaled to its original energy. If the mean
/// still misses `target_lf × peak` by more than 5 %, every deviation from the
/// mean is scaled by one common factor, which moves the load factor onto the
/// target without changing energy. Values are finally held within
/// `[0.8 × original min, 1.1 × original peak]`.
///
/// The result never has a lower load factor than the input, never exceeds
/// [`MAX_TARGET_LOAD_FACTOR`] (unless the input already did) and carries the
/// same total.
pub fn reshape_year(values: &[f64], target_lf: f64) -> Vec<f64> {
    let original = SummaryStats::from_values(values);
    if values.len() < 3 || original.max <= 0.0 || original.total <= 0.0 {
        return values.to_vec();
    }
    let current_lf = original.load_factor;
    let target = target_lf.min(MAX_TARGET_LOAD_FACTOR).max(current_lf);
    if target - current_lf <= f64::EPSILON {
        return values.to_vec();
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let peak_threshold = stats::percentile_sorted(&sorted, PEAK_PERCENTILE);
    let valley_threshold = stats::percentile_sorted(&sorted, VALLEY_PERCENTILE);

    let shaped: Vec<f64> = values
        .iter()
        .map(|&v| {
            if v > peak_threshold {
                v - SHAVE_FRACTION * (v - peak_threshold)
            } else if v < valley_threshold {
                v + FILL_FRACTION * (valley_threshold - v)
            } else {
                v
            }
        })
        .collect();
    let mut out = conserve_energy(&smooth3(&shaped), original.total);

    let peak = stats::max(&out);
    let mean = stats::mean(&out);
    let target_mean = target * peak;
    if stats::ratio_or((mean - target_mean).abs(), target_mean, 0.0) > MEAN_TOLERANCE {
        out = set_load_factor(&out, target);
    }

    let lower = 0.8 * original.min;
    let upper = 1.1 * original.max;
    let clipped: Vec<f64> = out.iter().map(|v| v.clamp(lower, upper)).collect();
    out = conserve_energy(&clipped, original.total);

    if stats::load_factor(&out) > MAX_TARGET_LOAD_FACTOR {
        out = set_load_factor(&out, MAX_TARGET_LOAD_FACTOR);
    }
    if stats::load_factor(&out) < current_lf {
        debug!("reshaping lowered the load factor; keeping the original year");
        return values.to_vec();
    }
    out
}

/// Scales deviations from the mean so that mean / peak equals `lf`.
fn set_load_factor(values: &[f64], lf: f64) -> Vec<f64> {
    let mean = stats::mean(values);
    let peak = stats::max(values);
    if lf <= 0.0 || peak - mean <= f64::EPSILON {
        return values.to_vec();
    }
    let desired_peak = mean / lf;
    let k = (desired_peak - mean) / (peak - mean);
    values.iter().map(|v| mean + k * (v - mean)).collect()
}

fn conserve_energy(values: &[f64], total: f64) -> Vec<f64> {
    let current: f64 = values.iter().sum();
    let factor = stats::ratio_or(total, current, 1.0);
    values.iter().map(|v| v * factor).collect()
}

/// Outcome of reshaping one fiscal year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct YearReshape {
    pub fiscal_year: i32,
    pub progress: f64,
    pub load_factor_before: f64,
    pub target_load_factor: f64,
    pub load_factor_after: f64,
}

/// Applies the S-curve load-factor ramp to every fiscal year of `table`.
pub fn apply_improvement(
    table: &ForecastTable,
    improvement: &LoadFactorImprovement,
    start_fy: i32,
) -> (ForecastTable, Vec<YearReshape>) {
    if !improvement.enabled {
        return (table.clone(), Vec::new());
    }
    let mut values = table.values();
    let mut report = Vec::new();
    for (fy, idx) in table.indices_by_year() {
        let progress = ramp_progress(fy, start_fy, improvement.target_fiscal_year);
        if progress <= 0.0 {
            continue;
        }
        let year: Vec<f64> = idx.iter().map(|&i| values[i]).collect();
        let before = stats::load_factor(&year);
        let target = target_load_factor(before, improvement.improvement_percent, s_curve(progress));
        let reshaped = reshape_year(&year, target);
        let after = stats::load_factor(&reshaped);
        for (slot, v) in idx.iter().zip(reshaped) {
            values[*slot] = v;
        }
        info!(fy, progress, before, target, after, "load factor reshaped");
        report.push(YearReshape {
            fiscal_year: fy,
            progress,
            load_factor_before: before,
            target_load_factor: target,
            load_factor_after: after,
        });
    }
    (table.with_values(&values), report)
}
