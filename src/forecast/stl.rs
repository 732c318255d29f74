//! Seasonal-trend decomposition forecaster.
//!
//! The whole history is decomposed into trend, seasonal and remainder on an
//! hourly grid. The trend is extended with a growth rate that decays after
//! five years, the averaged seasonal cycle is tiled across the horizon with
//! a little noise, and the result is bounded, rescaled to the annual targets
//! and given a plausible daily silhouette.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDateTime};
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::timeline::{future_calendar, table_from_calendar};
use super::{ForecastTable, Frequency, round_values};
use crate::calendar::HolidayCalendar;
use crate::decompose::smoothing::{smooth_cycle, smooth3};
use crate::decompose::stl::{default_trend_window, next_odd};
use crate::decompose::{StlOptions, decompose};
use crate::error::{ComputationWarning, ConfigError, ForecastError};
use crate::ingest::{AnnualTargets, HistoricalDemand};
use crate::shaping::load_factor::LoadFactorImprovement;
use crate::shaping::{ConstraintSet, annual_rescale, apply_constraints};
use crate::stats::{self, SummaryStats};

pub const HOURS_PER_YEAR: usize = 8760;
/// Shortest usable history, roughly two years of hourly data.
pub const MIN_HISTORY_HOURS: i64 = 2 * 360 * 24;
/// Longest forecast horizon in fiscal years.
pub const MAX_HORIZON_YEARS: i32 = 30;

const MIN_SEASONAL_WINDOW: usize = 7;
const MAX_SEASONAL_WINDOW: usize = 21;
const DEFAULT_SEASONAL_WINDOW: usize = 13;
/// Coefficient of variation above which the history is pre-smoothed.
const PRESMOOTH_CV: f64 = 0.5;
/// Noise amplitude as a share of the historical standard deviation.
const NOISE_SHARE: f64 = 0.05;
/// Years of undamped trend growth.
const UNDAMPED_YEARS: f64 = 5.0;
const DAMPING_RATE: f64 = 0.1;
/// Upper clip bound widens by this share of p99 over the horizon.
const UPPER_BOUND_GROWTH: f64 = 0.5;
/// Width (hours) of the Gaussian kernel applied to the seasonal cycle.
const PATTERN_SIGMA: f64 = 1.0;

/// Caller-tunable decomposition settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StlSettings {
    pub period: Option<usize>,
    pub seasonal: Option<usize>,
    pub trend: Option<usize>,
    pub robust: bool,
    pub inner_iterations: usize,
    pub outer_iterations: usize,
}

impl Default for StlSettings {
    fn default() -> Self {
        Self {
            period: None,
            seasonal: None,
            trend: None,
            robust: true,
            inner_iterations: 2,
            outer_iterations: 5,
        }
    }
}

/// Parameters actually used for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StlParameters {
    pub period: usize,
    pub seasonal: usize,
    pub trend: usize,
}

/// Request for [`generate_stl_forecast`].
#[derive(Debug, Clone, Copy)]
pub struct StlRequest<'a> {
    pub start_fy: i32,
    pub end_fy: i32,
    pub frequency: Frequency,
    pub settings: &'a StlSettings,
    pub load_factor: &'a LoadFactorImprovement,
    pub constraints: &'a ConstraintSet,
    pub round_decimals: u32,
}

/// History and target shortfalls that stop a decomposition run, whatever
/// the configuration says.
pub fn data_reasons(history: &HistoricalDemand, targets: &AnnualTargets) -> Vec<ConfigError> {
    let mut reasons = Vec::new();
    if history.is_empty() {
        reasons.push(ConfigError::new("history", "insufficient history: no rows"));
    } else if history.span_hours() < MIN_HISTORY_HOURS {
        reasons.push(ConfigError::new(
            "history",
            format!(
                "insufficient history: {} hours, need at least {MIN_HISTORY_HOURS}",
                history.span_hours()
            ),
        ));
    }
    if targets.is_empty() {
        reasons.push(ConfigError::new("scenarios", "no annual demand targets"));
    }
    reasons
}

/// Checks that a run can start; every violated condition is reported.
///
/// # Errors
///
/// [`ForecastError::Configuration`] listing each reason.
pub fn preflight(
    history: &HistoricalDemand,
    targets: &AnnualTargets,
    request: &StlRequest<'_>,
) -> Result<(), ForecastError> {
    let mut reasons = data_reasons(history, targets);
    if request.start_fy >= request.end_fy {
        reasons.push(ConfigError::new(
            "forecast.end_fy",
            format!("must be greater than start_fy ({})", request.start_fy),
        ));
    } else if request.end_fy - request.start_fy > MAX_HORIZON_YEARS {
        reasons.push(ConfigError::new(
            "forecast.end_fy",
            format!("horizon exceeds {MAX_HORIZON_YEARS} years"),
        ));
    }
    let lf = request.load_factor;
    if lf.enabled {
        if lf.target_fiscal_year < request.start_fy {
            reasons.push(ConfigError::new(
                "load_factor.target_fiscal_year",
                "precedes forecast.start_fy",
            ));
        }
        if !(lf.improvement_percent > 0.0 && lf.improvement_percent <= 50.0) {
            reasons.push(ConfigError::new(
                "load_factor.improvement_percent",
                "must be in (0, 50]",
            ));
        }
    }
    if reasons.is_empty() {
        Ok(())
    } else {
        Err(ForecastError::Configuration(reasons))
    }
}

/// Picks period and smoothing windows for `samples` hourly points.
///
/// With three or more years the period is one year; otherwise a third of
/// the history, whole days only, at least one day. The seasonal window is
/// held odd within `[7, 21]`. A trend window that is not odd and strictly
/// above the period is corrected, never rejected.
pub fn optimize_stl_parameters(
    samples: usize,
    settings: &StlSettings,
) -> (StlParameters, Vec<ComputationWarning>) {
    let mut warnings = Vec::new();
    let period = settings.period.filter(|p| *p >= 2).unwrap_or_else(|| {
        if samples >= 3 * HOURS_PER_YEAR {
            HOURS_PER_YEAR
        } else {
            (samples / 3 / 24 * 24).max(24)
        }
    });
    let seasonal = next_odd(
        settings
            .seasonal
            .unwrap_or(DEFAULT_SEASONAL_WINDOW)
            .clamp(MIN_SEASONAL_WINDOW, MAX_SEASONAL_WINDOW),
    );
    let trend = match settings.trend {
        Some(requested) => {
            let mut corrected = requested;
            if corrected <= period {
                corrected = period + 1;
            }
            if corrected % 2 == 0 {
                corrected += 1;
            }
            if corrected != requested {
                warnings.push(ComputationWarning::TrendWindowCorrected {
                    requested,
                    corrected,
                    period,
                });
            }
            corrected
        }
        None => default_trend_window(period, seasonal),
    };
    (
        StlParameters {
            period,
            seasonal,
            trend,
        },
        warnings,
    )
}

/// Decomposition of the history plus derived diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct DecompositionResult {
    /// Timestamp of grid point 0.
    pub start: NaiveDateTime,
    pub trend: Vec<f64>,
    pub seasonal: Vec<f64>,
    pub residual: Vec<f64>,
    /// Trend slope per year.
    pub trend_growth_rate: f64,
    pub seasonal_strength: f64,
    pub noise_level: f64,
    pub quality_score: f64,
    /// One smoothed period of the seasonal component.
    pub seasonal_pattern: Vec<f64>,
    pub baseline_stats: SummaryStats,
    /// 1st and 99th percentile of the hourly history.
    pub p1: f64,
    pub p99: f64,
    pub parameters: StlParameters,
    pub presmoothed: bool,
    pub warnings: Vec<ComputationWarning>,
}

impl DecompositionResult {
    pub fn end(&self) -> NaiveDateTime {
        self.start + Duration::hours(self.trend.len().saturating_sub(1) as i64)
    }
}

/// History averaged into hourly buckets from the first observation, with
/// empty hours linearly interpolated.
pub fn hourly_grid(history: &HistoricalDemand) -> Option<(NaiveDateTime, Vec<f64>)> {
    let start = history.first_timestamp()?;
    let mut buckets: BTreeMap<usize, (f64, usize)> = BTreeMap::new();
    for r in history.records() {
        let idx = ((r.timestamp - start).num_minutes() / 60) as usize;
        let e = buckets.entry(idx).or_insert((0.0, 0));
        e.0 += r.demand;
        e.1 += 1;
    }
    let len = buckets.keys().next_back().map_or(0, |k| k + 1);
    let mut grid = vec![f64::NAN; len];
    for (i, (sum, n)) in &buckets {
        grid[*i] = sum / *n as f64;
    }
    let known: Vec<(usize, f64)> = buckets.iter().map(|(i, (s, n))| (*i, s / *n as f64)).collect();
    for pair in known.windows(2) {
        let ((a, va), (b, vb)) = (pair[0], pair[1]);
        for k in a + 1..b {
            grid[k] = va + (vb - va) * (k - a) as f64 / (b - a) as f64;
        }
    }
    Some((start, grid))
}

/// Runs the decomposition over the full history.
///
/// # Errors
///
/// [`ForecastError::Configuration`] when the history is empty or the
/// decomposition rejects the parameters.
pub fn perform_decomposition(
    history: &HistoricalDemand,
    settings: &StlSettings,
) -> Result<DecompositionResult, ForecastError> {
    let (start, grid) = hourly_grid(history)
        .ok_or_else(|| ForecastError::config("history", "insufficient history: no rows"))?;
    let (parameters, mut warnings) = optimize_stl_parameters(grid.len(), settings);
    for w in &warnings {
        warn!("{w}");
    }

    let baseline_stats = SummaryStats::from_values(&grid);
    let cv = stats::ratio_or(baseline_stats.std, baseline_stats.mean, 0.0);
    let presmoothed = cv > PRESMOOTH_CV;
    let series = if presmoothed {
        debug!(cv, "pre-smoothing noisy history");
        smooth3(&grid)
    } else {
        grid.clone()
    };

    let options = StlOptions {
        period: parameters.period,
        seasonal: parameters.seasonal,
        trend: parameters.trend,
        robust: settings.robust,
        inner_iterations: settings.inner_iterations.max(1),
        outer_iterations: if settings.robust {
            settings.outer_iterations.max(1)
        } else {
            0
        },
    };
    let parts = decompose(&series, &options)
        .map_err(|e| ForecastError::config("stl", e.to_string()))?;

    let trend_growth_rate = stats::linear_slope(&parts.trend) * HOURS_PER_YEAR as f64;
    let seasonal_strength = parts.seasonal_strength();
    let noise_level = stats::ratio_or(
        stats::variance(&parts.remainder),
        stats::variance(&series),
        0.0,
    );
    let quality_score = (seasonal_strength - noise_level).clamp(0.0, 1.0);

    let period = parameters.period;
    let mut cycle_sum = vec![0.0; period];
    let mut cycle_count = vec![0usize; period];
    for (i, s) in parts.seasonal.iter().enumerate() {
        cycle_sum[i % period] += s;
        cycle_count[i % period] += 1;
    }
    let raw_pattern: Vec<f64> = cycle_sum
        .iter()
        .zip(&cycle_count)
        .map(|(s, n)| stats::ratio_or(*s, *n as f64, 0.0))
        .collect();
    let (seasonal_pattern, fallback) = smooth_cycle(&raw_pattern, PATTERN_SIGMA);
    if let Some(w) = fallback {
        warn!("{w}");
        warnings.push(w);
    }

    info!(
        period,
        seasonal = parameters.seasonal,
        trend = parameters.trend,
        trend_growth_rate,
        seasonal_strength,
        noise_level,
        quality_score,
        "decomposition complete"
    );
    Ok(DecompositionResult {
        start,
        trend: parts.trend,
        seasonal: parts.seasonal,
        residual: parts.remainder,
        trend_growth_rate,
        seasonal_strength,
        noise_level,
        quality_score,
        seasonal_pattern,
        baseline_stats,
        p1: stats::percentile(&grid, 1.0),
        p99: stats::percentile(&grid, 99.0),
        parameters,
        presmoothed,
        warnings,
    })
}

/// Zero-mean normal sample via Box–Muller.
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }
    let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}

/// Daily-shape factor for an hour; 1 outside the night and evening bands.
pub fn hour_factor(hour: u32) -> f64 {
    match hour {
        0 => 0.7,
        1 => 0.65,
        2 | 3 => 0.6,
        4 => 0.65,
        5 => 0.8,
        18 => 1.1,
        19 => 1.3,
        20 => 1.25,
        21 => 1.15,
        _ => 1.0,
    }
}

/// Assembles the forecast from a decomposition.
///
/// The output is rescaled to `targets` before the hour-of-day correction,
/// so year totals drift slightly; [`generate_stl_forecast`] rescales again.
pub fn create_forecast(
    decomposition: &DecompositionResult,
    targets: &AnnualTargets,
    holidays: &HolidayCalendar,
    start_fy: i32,
    end_fy: i32,
    frequency: Frequency,
    rng: &mut StdRng,
) -> ForecastTable {
    let calendar = future_calendar(start_fy, end_fy, frequency, holidays);
    let last_trend = decomposition.trend.last().copied().unwrap_or(0.0);
    let growth_per_hour = decomposition.trend_growth_rate / HOURS_PER_YEAR as f64;
    let history_end = decomposition.end();
    let period = decomposition.seasonal_pattern.len().max(1) as i64;
    let noise_std = NOISE_SHARE * decomposition.baseline_stats.std;
    let lower = (0.8 * decomposition.p1).max(0.0);
    let last_slot = calendar.len().saturating_sub(1).max(1) as f64;

    let values: Vec<f64> = calendar
        .iter()
        .enumerate()
        .map(|(i, (ts, _))| {
            let hours_ahead = ((*ts - history_end).num_minutes() as f64 / 60.0).max(0.0);
            let years_ahead = hours_ahead / HOURS_PER_YEAR as f64;
            let damping = (-DAMPING_RATE * (years_ahead - UNDAMPED_YEARS).max(0.0)).exp();
            let trend = last_trend + growth_per_hour * hours_ahead * damping;

            let offset = (*ts - decomposition.start).num_hours().rem_euclid(period) as usize;
            let seasonal = decomposition.seasonal_pattern.get(offset).copied().unwrap_or(0.0);

            let progress = i as f64 / last_slot;
            let upper = decomposition.p99 * (1.0 + UPPER_BOUND_GROWTH * progress);
            let raw = trend + seasonal + gaussian_noise(rng, noise_std);
            raw.clamp(lower, upper.max(lower))
        })
        .collect();

    let table = annual_rescale(&table_from_calendar(&calendar, &values), targets);
    table.map_values(|r| r.demand * (0.9 + 0.2 * hour_factor(r.hour)))
}

/// Diagnostics recorded with an STL forecast.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StlDiagnostics {
    pub parameters: StlParameters,
    pub robust: bool,
    pub history_hours: usize,
    pub presmoothed: bool,
    pub trend_growth_rate: f64,
    pub seasonal_strength: f64,
    pub noise_level: f64,
    pub quality_score: f64,
    pub baseline_stats: SummaryStats,
}

/// Runs the full decomposition method: pre-flight, decomposition, forecast
/// assembly, monthly constraints and the closing annual rescale.
///
/// # Errors
///
/// [`ForecastError::Configuration`] from [`preflight`] or
/// [`perform_decomposition`]. Nothing is produced on failure.
pub fn generate_stl_forecast(
    history: &HistoricalDemand,
    targets: &AnnualTargets,
    holidays: &HolidayCalendar,
    request: &StlRequest<'_>,
    rng: &mut StdRng,
) -> Result<(ForecastTable, StlDiagnostics, Vec<ComputationWarning>), ForecastError> {
    preflight(history, targets, request)?;
    let decomposition = perform_decomposition(history, request.settings)?;
    let table = create_forecast(
        &decomposition,
        targets,
        holidays,
        request.start_fy,
        request.end_fy,
        request.frequency,
        rng,
    );
    let table = apply_constraints(&table, targets, request.constraints);
    let table = round_values(&table.map_values(|r| r.demand.max(0.0)), request.round_decimals);

    let diagnostics = StlDiagnostics {
        parameters: decomposition.parameters,
        robust: request.settings.robust,
        history_hours: decomposition.trend.len(),
        presmoothed: decomposition.presmoothed,
        trend_growth_rate: decomposition.trend_growth_rate,
        seasonal_strength: decomposition.seasonal_strength,
        noise_level: decomposition.noise_level,
        quality_score: decomposition.quality_score,
        baseline_stats: decomposition.baseline_stats,
    };
    Ok((table, diagnostics, decomposition.warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rand::SeedableRng;
    use std::f64::consts::TAU;

    fn history(days: i64) -> HistoricalDemand {
        let start = NaiveDate::from_ymd_opt(2021, 4, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let pairs = (0..days * 24).map(|h| {
            let daily = 20.0 * ((h % 24) as f64 / 24.0 * TAU).sin();
            let yearly = 30.0 * (h as f64 / 8760.0 * TAU).cos();
            (start + Duration::hours(h), 200.0 + 0.002 * h as f64 + daily + yearly)
        });
        HistoricalDemand::from_pairs(pairs, &HolidayCalendar::empty())
    }

    fn request<'a>(
        settings: &'a StlSettings,
        lf: &'a LoadFactorImprovement,
        constraints: &'a ConstraintSet,
    ) -> StlRequest<'a> {
        StlRequest {
            start_fy: 2025,
            end_fy: 2026,
            frequency: Frequency::Hourly,
            settings,
            load_factor: lf,
            constraints,
            round_decimals: 3,
        }
    }

    #[test]
    fn trend_window_is_corrected_to_odd_above_period() {
        for requested in [2, 24, 100, 8760, 8761, 9000] {
            let settings = StlSettings {
                period: Some(8760),
                trend: Some(requested),
                ..StlSettings::default()
            };
            let (p, warnings) = optimize_stl_parameters(30_000, &settings);
            assert!(p.trend > p.period && p.trend % 2 == 1, "{requested} -> {}", p.trend);
            assert_eq!(warnings.is_empty(), requested == 8761);
        }
    }

    #[test]
    fn period_and_seasonal_window_defaults() {
        let settings = StlSettings::default();
        assert_eq!(optimize_stl_parameters(3 * 8760, &settings).0.period, 8760);
        let short = optimize_stl_parameters(2 * 8760, &settings).0;
        assert_eq!(short.period, 5832);
        assert!((7..=21).contains(&short.seasonal) && short.seasonal % 2 == 1);
        let wide = StlSettings {
            seasonal: Some(40),
            ..StlSettings::default()
        };
        assert_eq!(optimize_stl_parameters(1000, &wide).0.seasonal, 21);
    }

    #[test]
    fn preflight_collects_every_reason() {
        let settings = StlSettings::default();
        let lf = LoadFactorImprovement {
            enabled: true,
            target_fiscal_year: 2020,
            improvement_percent: 75.0,
        };
        let none = ConstraintSet::default();
        let mut req = request(&settings, &lf, &none);
        req.end_fy = req.start_fy;
        let err = preflight(&history(365), &AnnualTargets::default(), &req).unwrap_err();
        let fields: Vec<&str> = err.reasons().iter().map(|r| r.field.as_str()).collect();
        assert!(err.to_string().contains("insufficient history"));
        assert_eq!(
            fields,
            vec![
                "history",
                "scenarios",
                "forecast.end_fy",
                "load_factor.target_fiscal_year",
                "load_factor.improvement_percent"
            ]
        );
    }

    #[test]
    fn spiky_history_is_smoothed_before_decomposition() {
        let start = NaiveDate::from_ymd_opt(2021, 4, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let spiky = HistoricalDemand::from_pairs(
            (0..60 * 24).map(|h| {
                let demand = if (18..22).contains(&(h % 24)) { 200.0 } else { 5.0 };
                (start + Duration::hours(h), demand)
            }),
            &HolidayCalendar::empty(),
        );
        let settings = StlSettings {
            robust: false,
            ..StlSettings::default()
        };
        let result = perform_decomposition(&spiky, &settings).unwrap();
        assert!(result.presmoothed);

        let (_, grid) = hourly_grid(&spiky).unwrap();
        let smoothed = smooth3(&grid);
        for i in 0..grid.len() {
            let sum = result.trend[i] + result.seasonal[i] + result.residual[i];
            assert!((sum - smoothed[i]).abs() < 1e-9, "hour {i}: {sum} vs {}", smoothed[i]);
        }
        assert_eq!(result.baseline_stats, SummaryStats::from_values(&grid));

        let calm = perform_decomposition(&history(60), &settings).unwrap();
        assert!(!calm.presmoothed);
    }

    #[test]
    fn hourly_grid_interpolates_gaps() {
        let start = NaiveDate::from_ymd_opt(2021, 4, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let hist = HistoricalDemand::from_pairs(
            [(start, 10.0), (start + Duration::hours(4), 30.0)],
            &HolidayCalendar::empty(),
        );
        let (_, grid) = hourly_grid(&hist).unwrap();
        assert_eq!(grid, vec![10.0, 15.0, 20.0, 25.0, 30.0]);
    }

    #[test]
    fn seeded_forecast_is_reproducible_and_meets_targets() {
        let hist = history(3 * 365);
        let targets = AnnualTargets::from_pairs([(2025, 2.0e6), (2026, 2.1e6)]);
        let settings = StlSettings {
            outer_iterations: 1,
            ..StlSettings::default()
        };
        let lf = LoadFactorImprovement::default();
        let none = ConstraintSet::default();
        let req = request(&settings, &lf, &none);
        let cal = HolidayCalendar::empty();

        let (a, diag, _) =
            generate_stl_forecast(&hist, &targets, &cal, &req, &mut StdRng::seed_from_u64(7))
                .unwrap();
        let (b, _, _) =
            generate_stl_forecast(&hist, &targets, &cal, &req, &mut StdRng::seed_from_u64(7))
                .unwrap();
        assert_eq!(a, b);
        assert_eq!(diag.parameters.period, 8760);
        assert!((0.0..=1.0).contains(&diag.quality_score));
        for (fy, target) in targets.iter() {
            let total = a.year_total(fy);
            assert!((total - target).abs() / target < 5e-3, "FY{fy}: {total}");
        }
        assert!(a.values().iter().all(|v| *v >= 0.0));
    }
}
