//! Annual and monthly rescaling of forecast tables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ComputationWarning, DataError};
use crate::forecast::ForecastTable;
use crate::ingest::{AnnualTargets, HistoricalDemand, MonthlyTemplate};
use crate::stats::{self, ratio_or};

/// Absolute load-factor gap below which a month is left alone.
pub const LOAD_FACTOR_TOLERANCE: f64 = 0.05;

/// Share sums further than this from 1 are reported when normalised.
const SHARE_SUM_TOLERANCE: f64 = 0.01;

/// Where a monthly constraint comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintSource {
    #[default]
    None,
    Template,
    Derived,
}

/// Monthly constraints resolved for one run, indexed by fiscal month - 1.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConstraintSet {
    pub monthly_share: Option<[f64; 12]>,
    pub monthly_load_factor: Option<[f64; 12]>,
}

impl ConstraintSet {
    pub fn is_empty(&self) -> bool {
        self.monthly_share.is_none() && self.monthly_load_factor.is_none()
    }
}

/// Scales each fiscal year with a target so its total matches the target.
///
/// Years whose current total is zero, and years without a target, are
/// returned unchanged.
pub fn annual_rescale(table: &ForecastTable, targets: &AnnualTargets) -> ForecastTable {
    let mut factors: BTreeMap<i32, f64> = BTreeMap::new();
    for fy in table.fiscal_years() {
        let Some(target) = targets.get(fy) else {
            continue;
        };
        let current = table.year_total(fy);
        if current > 0.0 {
            factors.insert(fy, target / current);
        }
    }
    table.map_values(|r| r.demand * factors.get(&r.fiscal_year).copied().unwrap_or(1.0))
}

/// Gives each `(fiscal_year, fiscal_month)` the energy
/// `annual_target × share[month]`.
pub fn apply_monthly_share(
    table: &ForecastTable,
    targets: &AnnualTargets,
    shares: &[f64; 12],
) -> ForecastTable {
    let values = table.values();
    let mut out = values.clone();
    for ((fy, fm), idx) in table.indices_by_month() {
        let Some(annual) = targets.get(fy) else {
            continue;
        };
        let share = shares[(fm - 1) as usize];
        let current: f64 = idx.iter().map(|&i| values[i]).sum();
        if current <= 0.0 {
            continue;
        }
        let factor = annual * share / current;
        for i in idx {
            out[i] = values[i] * factor;
        }
    }
    table.with_values(&out)
}

/// Scales months whose load factor misses the target by more than
/// [`LOAD_FACTOR_TOLERANCE`] by `target × peak / mean`.
pub fn apply_monthly_load_factor(table: &ForecastTable, load_factors: &[f64; 12]) -> ForecastTable {
    let values = table.values();
    let mut out = values.clone();
    for ((fy, fm), idx) in table.indices_by_month() {
        let month: Vec<f64> = idx.iter().map(|&i| values[i]).collect();
        let peak = stats::max(&month);
        let mean = stats::mean(&month);
        if peak <= 0.0 || mean <= 0.0 {
            continue;
        }
        let target = load_factors[(fm - 1) as usize];
        let current = mean / peak;
        if (current - target).abs() <= LOAD_FACTOR_TOLERANCE {
            continue;
        }
        let factor = target * peak / mean;
        debug!(fy, fm, current, target, factor, "monthly load factor correction");
        for i in idx {
            out[i] = values[i] * factor;
        }
    }
    table.with_values(&out)
}

/// Applies the monthly constraints in `set`, then restores every annual
/// target.
pub fn apply_constraints(
    table: &ForecastTable,
    targets: &AnnualTargets,
    set: &ConstraintSet,
) -> ForecastTable {
    let mut current = table.clone();
    if let Some(shares) = &set.monthly_share {
        current = apply_monthly_share(&current, targets, shares);
    }
    if let Some(lfs) = &set.monthly_load_factor {
        current = apply_monthly_load_factor(&current, lfs);
    }
    annual_rescale(&current, targets)
}

/// Per-month totals of every fiscal year in the history.
fn monthly_totals(history: &HistoricalDemand) -> BTreeMap<i32, [f64; 12]> {
    let mut totals: BTreeMap<i32, [f64; 12]> = BTreeMap::new();
    for r in history.records() {
        let f = r.features;
        totals.entry(f.fiscal_year).or_insert([0.0; 12])[(f.fiscal_month - 1) as usize] +=
            r.demand;
    }
    totals
}

/// Average share of annual energy per fiscal month across the history.
///
/// Only complete fiscal years are used when any exist. Months never seen
/// receive an equal part of the leftover share.
pub fn derive_monthly_shares(history: &HistoricalDemand) -> [f64; 12] {
    let complete = history.complete_fiscal_years();
    let totals = monthly_totals(history);
    let mut sums = [0.0; 12];
    let mut counts = [0usize; 12];
    for (fy, months) in &totals {
        if !complete.is_empty() && !complete.contains(fy) {
            continue;
        }
        let year: f64 = months.iter().sum();
        if year <= 0.0 {
            continue;
        }
        for (m, v) in months.iter().enumerate() {
            if *v > 0.0 {
                sums[m] += v / year;
                counts[m] += 1;
            }
        }
    }
    let mut shares = [0.0; 12];
    for m in 0..12 {
        shares[m] = ratio_or(sums[m], counts[m] as f64, 0.0);
    }
    let missing = counts.iter().filter(|c| **c == 0).count();
    if missing > 0 {
        let leftover = (1.0 - shares.iter().sum::<f64>()).max(0.0);
        let fill = if missing == 12 { 1.0 / 12.0 } else { leftover / missing as f64 };
        for m in 0..12 {
            if counts[m] == 0 {
                shares[m] = fill;
            }
        }
    }
    normalise(shares).0
}

/// Average load factor (mean/peak) per fiscal month across the history.
///
/// Months never seen take the average of the months that were.
pub fn derive_monthly_load_factors(history: &HistoricalDemand) -> [f64; 12] {
    let mut buckets: BTreeMap<(i32, u32), Vec<f64>> = BTreeMap::new();
    for r in history.records() {
        buckets
            .entry((r.features.fiscal_year, r.features.fiscal_month))
            .or_default()
            .push(r.demand);
    }
    let mut sums = [0.0; 12];
    let mut counts = [0usize; 12];
    for ((_, fm), values) in &buckets {
        let lf = stats::load_factor(values);
        if lf > 0.0 {
            sums[(fm - 1) as usize] += lf;
            counts[(fm - 1) as usize] += 1;
        }
    }
    let seen: Vec<f64> = (0..12)
        .filter(|m| counts[*m] > 0)
        .map(|m| sums[m] / counts[m] as f64)
        .collect();
    let fallback = if seen.is_empty() { 1.0 } else { stats::mean(&seen) };
    let mut lfs = [fallback; 12];
    for m in 0..12 {
        if counts[m] > 0 {
            lfs[m] = (sums[m] / counts[m] as f64).clamp(f64::EPSILON, 1.0);
        }
    }
    lfs
}

fn normalise(mut shares: [f64; 12]) -> ([f64; 12], f64) {
    let sum: f64 = shares.iter().sum();
    if sum > 0.0 {
        for s in &mut shares {
            *s /= sum;
        }
    } else {
        shares = [1.0 / 12.0; 12];
    }
    (shares, sum)
}

/// Resolves the monthly-share constraint for a run.
///
/// Template values win; missing months are filled from `derived` and the
/// result normalised to sum to one. An unusable template falls back to the
/// derived shares entirely.
pub fn resolve_monthly_share(
    source: ConstraintSource,
    template: Option<Result<MonthlyTemplate, DataError>>,
    derived: impl FnOnce() -> [f64; 12],
) -> (Option<[f64; 12]>, Vec<ComputationWarning>) {
    const NAME: &str = "monthly share";
    let mut warnings = Vec::new();
    let shares = match source {
        ConstraintSource::None => return (None, warnings),
        ConstraintSource::Derived => derived(),
        ConstraintSource::Template => match usable_template(template, |v| v >= 0.0) {
            Ok(tpl) => {
                let derived = derived();
                let missing = tpl.missing_months();
                if !missing.is_empty() {
                    warnings.push(ComputationWarning::ConstraintExtrapolated {
                        constraint: NAME,
                        months: missing,
                    });
                }
                let mut filled = [0.0; 12];
                for m in 0..12 {
                    filled[m] = tpl.values[m].unwrap_or(derived[m]);
                }
                let (shares, sum) = normalise(filled);
                if (sum - 1.0).abs() > SHARE_SUM_TOLERANCE {
                    warnings.push(ComputationWarning::SharesNormalised { sum });
                }
                shares
            }
            Err(reason) => {
                warnings.push(ComputationWarning::TemplateFallback {
                    constraint: NAME,
                    reason,
                });
                derived()
            }
        },
    };
    for w in &warnings {
        warn!("{w}");
    }
    (Some(shares), warnings)
}

/// Resolves the monthly load-factor constraint for a run.
///
/// Template values outside `(0, 1]` count as missing and are filled from
/// `derived`.
pub fn resolve_monthly_load_factor(
    source: ConstraintSource,
    template: Option<Result<MonthlyTemplate, DataError>>,
    derived: impl FnOnce() -> [f64; 12],
) -> (Option<[f64; 12]>, Vec<ComputationWarning>) {
    const NAME: &str = "monthly load factor";
    let mut warnings = Vec::new();
    let lfs = match source {
        ConstraintSource::None => return (None, warnings),
        ConstraintSource::Derived => derived(),
        ConstraintSource::Template => {
            match usable_template(template, |v| v > 0.0 && v <= 1.0) {
                Ok(tpl) => {
                    let derived = derived();
                    let missing = tpl.missing_months();
                    if !missing.is_empty() {
                        warnings.push(ComputationWarning::ConstraintExtrapolated {
                            constraint: NAME,
                            months: missing,
                        });
                    }
                    let mut filled = [0.0; 12];
                    for m in 0..12 {
                        filled[m] = tpl.values[m].unwrap_or(derived[m]);
                    }
                    filled
                }
                Err(reason) => {
                    warnings.push(ComputationWarning::TemplateFallback {
                        constraint: NAME,
                        reason,
                    });
                    derived()
                }
            }
        }
    };
    for w in &warnings {
        warn!("{w}");
    }
    (Some(lfs), warnings)
}

/// Drops out-of-range template values; fails when nothing usable remains.
fn usable_template(
    template: Option<Result<MonthlyTemplate, DataError>>,
    valid: impl Fn(f64) -> bool,
) -> Result<MonthlyTemplate, String> {
    let tpl = match template {
        Some(Ok(tpl)) => tpl,
        Some(Err(e)) => return Err(e.to_string()),
        None => return Err("no template supplied".to_string()),
    };
    let values = tpl.values.map(|v| v.filter(|x| valid(*x)));
    if values.iter().all(Option::is_none) || values.iter().flatten().all(|v| *v == 0.0) {
        return Err("template holds no usable values".to_string());
    }
    Ok(MonthlyTemplate { values })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::HolidayCalendar;
    use crate::forecast::{ForecastRow, ForecastTable};
    use chrono::{Duration, NaiveDate};

    /// Two fiscal months of hourly rows in FY2025 with a daily sawtooth.
    fn two_month_table() -> ForecastTable {
        let start = NaiveDate::from_ymd_opt(2024, 4, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let rows = (0..(61 * 24))
            .map(|h| {
                let ts = start + Duration::hours(h);
                let hour = (h % 24) as u32;
                ForecastRow {
                    timestamp: ts,
                    demand: 10.0 + hour as f64,
                    fiscal_year: 2025,
                    fiscal_month: if h < 30 * 24 { 1 } else { 2 },
                    hour,
                }
            })
            .collect();
        ForecastTable::new(rows)
    }

    #[test]
    fn annual_rescale_hits_target() {
        let table = two_month_table();
        let targets = AnnualTargets::from_pairs([(2025, 1_000_000.0)]);
        let out = annual_rescale(&table, &targets);
        assert!((out.year_total(2025) - 1_000_000.0).abs() < 1e-6);
    }

    #[test]
    fn annual_rescale_skips_zero_total_and_missing_targets() {
        let table = two_month_table().map_values(|_| 0.0);
        let targets = AnnualTargets::from_pairs([(2025, 100.0)]);
        assert_eq!(annual_rescale(&table, &targets), table);
        let table = two_month_table();
        assert_eq!(annual_rescale(&table, &AnnualTargets::default()), table);
    }

    #[test]
    fn monthly_share_sets_month_energy() {
        let table = two_month_table();
        let targets = AnnualTargets::from_pairs([(2025, 1000.0)]);
        let mut shares = [0.0; 12];
        shares[0] = 0.25;
        shares[1] = 0.75;
        let out = apply_monthly_share(&table, &targets, &shares);
        let groups = out.indices_by_month();
        let m1: f64 = groups[&(2025, 1)].iter().map(|&i| out.rows()[i].demand).sum();
        let m2: f64 = groups[&(2025, 2)].iter().map(|&i| out.rows()[i].demand).sum();
        assert!((m1 - 250.0).abs() < 1e-9);
        assert!((m2 - 750.0).abs() < 1e-9);
    }

    #[test]
    fn monthly_load_factor_respects_tolerance() {
        let table = two_month_table();
        // sawtooth 10..33: mean 21.5, peak 33, lf ~0.6515
        let mut lfs = [0.65; 12];
        lfs[1] = 0.5;
        let out = apply_monthly_load_factor(&table, &lfs);
        let groups = out.indices_by_month();
        let first = groups[&(2025, 1)][0];
        let second = groups[&(2025, 2)][0];
        assert_eq!(out.rows()[first].demand, table.rows()[first].demand);
        let expected = 0.5 * 33.0 / 21.5;
        assert!((out.rows()[second].demand / table.rows()[second].demand - expected).abs() < 1e-9);
    }

    #[test]
    fn constraints_always_restore_annual_total() {
        let table = two_month_table();
        let targets = AnnualTargets::from_pairs([(2025, 5000.0)]);
        let set = ConstraintSet {
            monthly_share: None,
            monthly_load_factor: Some([0.3; 12]),
        };
        let out = apply_constraints(&table, &targets, &set);
        assert!((out.year_total(2025) - 5000.0).abs() < 1e-6);
    }

    #[test]
    fn template_fallback_is_reported() {
        let (shares, warnings) = resolve_monthly_share(
            ConstraintSource::Template,
            Some(Err(DataError::EmptyHistory)),
            || [1.0 / 12.0; 12],
        );
        assert!(shares.is_some());
        assert!(matches!(
            warnings[0],
            ComputationWarning::TemplateFallback { .. }
        ));
    }

    #[test]
    fn partial_template_is_extrapolated_and_normalised() {
        let mut tpl = MonthlyTemplate::from_values([0.1; 12]);
        tpl.values[11] = None;
        let (shares, warnings) =
            resolve_monthly_share(ConstraintSource::Template, Some(Ok(tpl)), || [0.2; 12]);
        let shares = shares.unwrap();
        assert!((shares.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(shares[11] > shares[0]);
        assert!(warnings.iter().any(|w| matches!(w, ComputationWarning::ConstraintExtrapolated { months, .. } if months == &vec![12])));
        assert!(warnings.iter().any(|w| matches!(w, ComputationWarning::SharesNormalised { .. })));
    }

    #[test]
    fn invalid_load_factor_values_are_dropped() {
        let mut tpl = MonthlyTemplate::from_values([0.7; 12]);
        tpl.values[0] = Some(1.4);
        let (lfs, warnings) =
            resolve_monthly_load_factor(ConstraintSource::Template, Some(Ok(tpl)), || [0.6; 12]);
        let lfs = lfs.unwrap();
        assert_eq!(lfs[0], 0.6);
        assert_eq!(lfs[1], 0.7);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn derived_shares_sum_to_one() {
        let start = NaiveDate::from_ymd_opt(2022, 4, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let pairs = (0..(365 * 24)).map(|h| (start + Duration::hours(h), 1.0 + (h % 24) as f64));
        let history = HistoricalDemand::from_pairs(pairs, &HolidayCalendar::empty());
        let shares = derive_monthly_shares(&history);
        assert!((shares.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        // April has 30 days, May 31
        assert!(shares[1] > shares[0]);
        let lfs = derive_monthly_load_factors(&history);
        assert!(lfs.iter().all(|lf| (lf - 12.5 / 24.0).abs() < 1e-9));
    }
}
