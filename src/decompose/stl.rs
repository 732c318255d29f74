//! Seasonal-trend decomposition by LOESS, backed by `stlrs`.

use thiserror::Error;
use tracing::debug;

use crate::stats;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StlError {
    #[error("period must be at least 2, got {0}")]
    PeriodTooShort(usize),
    #[error("series of {len} points is shorter than two periods of {period}")]
    SeriesTooShort { len: usize, period: usize },
    #[error("{name} window must be odd and at least 3, got {value}")]
    BadWindow { name: &'static str, value: usize },
    #[error("series contains non-finite values")]
    NonFinite,
    #[error("decomposition failed: {0}")]
    Backend(String),
}

/// Additive decomposition `y = trend + seasonal + remainder`.
#[derive(Debug, Clone, PartialEq)]
pub struct StlComponents {
    pub trend: Vec<f64>,
    pub seasonal: Vec<f64>,
    pub remainder: Vec<f64>,
    /// Robustness weights from the last outer pass (all 1 when not robust).
    pub weights: Vec<f64>,
}

impl StlComponents {
    /// `var(seasonal) / (var(seasonal) + var(remainder))`, 0 when both vanish.
    pub fn seasonal_strength(&self) -> f64 {
        let s = stats::variance(&self.seasonal);
        let r = stats::variance(&self.remainder);
        stats::ratio_or(s, s + r, 0.0)
    }
}

/// Windows and iteration counts for one decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StlOptions {
    pub period: usize,
    pub seasonal: usize,
    pub trend: usize,
    pub robust: bool,
    pub inner_iterations: usize,
    pub outer_iterations: usize,
}

impl StlOptions {
    /// Non-robust options with the default trend window for `seasonal`.
    pub fn new(period: usize, seasonal: usize) -> Self {
        Self {
            period,
            seasonal,
            trend: default_trend_window(period, seasonal),
            robust: false,
            inner_iterations: 2,
            outer_iterations: 0,
        }
    }

    /// Outlier-robust fitting: one inner pass and 15 outer passes.
    pub fn robust(mut self) -> Self {
        self.robust = true;
        self.inner_iterations = 1;
        self.outer_iterations = 15;
        self
    }
}

/// Smallest odd integer `>= n`.
pub fn next_odd(n: usize) -> usize {
    if n % 2 == 0 { n + 1 } else { n }
}

/// Smallest odd integer not below `1.5 · period / (1 − 1.5 / seasonal)`.
pub fn default_trend_window(period: usize, seasonal: usize) -> usize {
    let raw = 1.5 * period as f64 / (1.0 - 1.5 / seasonal.max(3) as f64);
    next_odd(raw.ceil() as usize)
}

/// Decomposes `y` with the given options.
///
/// ```
/// use load_forecast::decompose::{StlOptions, decompose};
///
/// let series: Vec<f64> = (0..96)
///     .map(|i| 10.0 + (i as f64 * std::f64::consts::TAU / 24.0).sin())
///     .collect();
/// let parts = decompose(&series, &StlOptions::new(24, 7)).unwrap();
/// assert_eq!(parts.trend.len(), 96);
/// ```
///
/// # Errors
///
/// Fails on a period below 2, fewer than two full periods of data,
/// even or too-small windows, non-finite input, or a rejection by the
/// underlying fitter.
pub fn decompose(y: &[f64], options: &StlOptions) -> Result<StlComponents, StlError> {
    let p = options.period;
    if p < 2 {
        return Err(StlError::PeriodTooShort(p));
    }
    if y.len() < 2 * p {
        return Err(StlError::SeriesTooShort { len: y.len(), period: p });
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(StlError::NonFinite);
    }
    for (name, value) in [("seasonal", options.seasonal), ("trend", options.trend)] {
        if value < 3 || value % 2 == 0 {
            return Err(StlError::BadWindow { name, value });
        }
    }

    let series: Vec<f32> = y.iter().map(|v| *v as f32).collect();
    let fit = stlrs::params()
        .seasonal_length(options.seasonal)
        .trend_length(options.trend)
        .low_pass_length(next_odd(p))
        .inner_loops(options.inner_iterations.max(1))
        .outer_loops(options.outer_iterations)
        .robust(options.robust)
        .fit(&series, p)
        .map_err(|e| StlError::Backend(e.to_string()))?;
    debug!(period = p, robust = options.robust, "stl fit complete");

    let widen = |values: &[f32]| values.iter().map(|v| f64::from(*v)).collect::<Vec<_>>();
    let trend = widen(fit.trend());
    let seasonal = widen(fit.seasonal());
    // Recomputed in f64 so the components add back to the input exactly.
    let remainder = (0..y.len()).map(|i| y[i] - trend[i] - seasonal[i]).collect();
    Ok(StlComponents {
        trend,
        seasonal,
        remainder,
        weights: widen(fit.weights()),
    })
}
