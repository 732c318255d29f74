//! Base-year profile method.
//!
//! Each hour of a historical base year is expressed as a fraction of its
//! day's energy. Fractions are averaged per `(fiscal month, special day,
//! hour)` bucket and laid over the future calendar, then scaled so every
//! fiscal year meets its annual target.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use super::timeline::{future_calendar, table_from_calendar};
use super::{ForecastTable, Frequency, round_values};
use crate::calendar::fiscal::days_in_fiscal_year;
use crate::calendar::{CalendarFeatures, HolidayCalendar};
use crate::error::DataError;
use crate::ingest::{AnnualTargets, HistoricalDemand};
use crate::shaping::{ConstraintSet, apply_constraints};
use crate::stats;

/// Profile bucket: fiscal month (1 = April), special-day flag, hour of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ProfileKey {
    pub fiscal_month: u32,
    pub is_special_day: bool,
    pub hour: u32,
}

impl ProfileKey {
    pub fn of(features: &CalendarFeatures) -> Self {
        Self {
            fiscal_month: features.fiscal_month,
            is_special_day: features.is_special_day,
            hour: features.hour,
        }
    }
}

/// Hour-of-day fractions extracted from one fiscal year.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseYearProfile {
    pub base_year: i32,
    fractions: BTreeMap<ProfileKey, f64>,
    mean_fraction: f64,
    /// Days with positive energy that contributed.
    pub days_used: usize,
}

impl BaseYearProfile {
    pub fn get(&self, key: &ProfileKey) -> Option<f64> {
        self.fractions.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ProfileKey, &f64)> {
        self.fractions.iter()
    }

    pub fn len(&self) -> usize {
        self.fractions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fractions.is_empty()
    }

    /// Mean over every bucket; used for buckets the base year never saw.
    pub fn mean_fraction(&self) -> f64 {
        self.mean_fraction
    }

    /// Fraction for `key`, or [`Self::mean_fraction`] when the bucket is absent.
    pub fn fraction_or_mean(&self, key: &ProfileKey) -> f64 {
        self.get(key).unwrap_or(self.mean_fraction)
    }
}

/// Extracts the base-year profile.
///
/// Every fraction is clipped to `[0, 1]`. Sub-hourly history contributes one
/// fraction per sample, all landing in the sample's hour bucket.
///
/// # Errors
///
/// [`DataError::BaseYearMissing`] when the history holds no row for
/// `base_year`.
pub fn extract_base_profiles(
    history: &HistoricalDemand,
    base_year: i32,
) -> Result<BaseYearProfile, DataError> {
    let mut day_totals: HashMap<NaiveDate, f64> = HashMap::new();
    let mut rows = 0usize;
    for r in history.fiscal_year(base_year) {
        *day_totals.entry(r.timestamp.date()).or_default() += r.demand;
        rows += 1;
    }
    if rows == 0 {
        return Err(DataError::BaseYearMissing(base_year));
    }

    let mut sums: BTreeMap<ProfileKey, (f64, usize)> = BTreeMap::new();
    for r in history.fiscal_year(base_year) {
        let day_total = day_totals.get(&r.timestamp.date()).copied().unwrap_or(0.0);
        if day_total <= 0.0 {
            continue;
        }
        let entry = sums.entry(ProfileKey::of(&r.features)).or_insert((0.0, 0));
        entry.0 += r.demand / day_total;
        entry.1 += 1;
    }
    let fractions: BTreeMap<ProfileKey, f64> = sums
        .into_iter()
        .map(|(k, (sum, n))| (k, (sum / n as f64).clamp(0.0, 1.0)))
        .collect();
    let values: Vec<f64> = fractions.values().copied().collect();
    let mean_fraction = stats::mean(&values);
    let days_used = day_totals.values().filter(|t| **t > 0.0).count();
    debug!(base_year, rows, days_used, "base-year profile extracted");

    Ok(BaseYearProfile {
        base_year,
        fractions,
        mean_fraction,
        days_used,
    })
}

/// Diagnostics recorded with a base-profile forecast.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaseProfileDiagnostics {
    pub base_year: i32,
    pub profile_count: usize,
    pub days_used: usize,
    pub mean_fraction: f64,
}

/// Request for [`generate_base_profile_forecast`].
#[derive(Debug, Clone, Copy)]
pub struct BaseProfileRequest<'a> {
    pub base_year: i32,
    pub start_fy: i32,
    pub end_fy: i32,
    pub frequency: Frequency,
    pub constraints: &'a ConstraintSet,
    pub round_decimals: u32,
}

/// Generates a forecast from the base-year profile.
///
/// The provisional value of a slot is its bucket fraction times an average
/// day's share of the annual target, spread over the slots in that hour.
/// Daily slots sum the fractions of all 24 hours. Monthly constraints, if
/// any, are applied next, then every year is rescaled to its target, clipped
/// at zero and rounded. Years without a target are provisioned from the mean
/// of the supplied targets. The output depends only on the inputs.
///
/// # Errors
///
/// Propagates [`extract_base_profiles`] failures.
pub fn generate_base_profile_forecast(
    history: &HistoricalDemand,
    targets: &AnnualTargets,
    holidays: &HolidayCalendar,
    request: &BaseProfileRequest<'_>,
) -> Result<(ForecastTable, BaseProfileDiagnostics), DataError> {
    let profile = extract_base_profiles(history, request.base_year)?;
    let calendar = future_calendar(request.start_fy, request.end_fy, request.frequency, holidays);

    let known: Vec<f64> = targets.iter().map(|(_, t)| t).collect();
    let fallback_target = stats::mean(&known);
    let slots_per_hour = request.frequency.slots_per_hour();

    let provisional: Vec<f64> = calendar
        .iter()
        .map(|(_, f)| {
            let annual = targets.get(f.fiscal_year).unwrap_or(fallback_target);
            let daily = annual / days_in_fiscal_year(f.fiscal_year) as f64;
            let fraction = if request.frequency == Frequency::Daily {
                (0..24)
                    .map(|hour| profile.fraction_or_mean(&ProfileKey { hour, ..ProfileKey::of(f) }))
                    .sum()
            } else {
                profile.fraction_or_mean(&ProfileKey::of(f)) / slots_per_hour
            };
            fraction * daily
        })
        .collect();

    let table = table_from_calendar(&calendar, &provisional);
    let table = apply_constraints(&table, targets, request.constraints);
    let table = round_values(&table.map_values(|r| r.demand.max(0.0)), request.round_decimals);

    info!(
        base_year = request.base_year,
        rows = table.len(),
        profiles = profile.len(),
        "base-profile forecast generated"
    );
    Ok((
        table,
        BaseProfileDiagnostics {
            base_year: profile.base_year,
            profile_count: profile.len(),
            days_used: profile.days_used,
            mean_fraction: profile.mean_fraction(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    /// One fiscal year (FY2023) of hourly demand peaking at 18:00.
    fn history() -> HistoricalDemand {
        let start = NaiveDate::from_ymd_opt(2022, 4, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let pairs = (0..365 * 24).map(|h| {
            let ts = start + Duration::hours(h);
            let hour = h % 24;
            (ts, if hour == 18 { 300.0 } else { 100.0 })
        });
        HistoricalDemand::from_pairs(pairs, &HolidayCalendar::empty())
    }

    #[test]
    fn fractions_are_bounded_and_reflect_shape() {
        let profile = extract_base_profiles(&history(), 2023).unwrap();
        assert_eq!(profile.len(), 12 * 2 * 24);
        assert!(profile.iter().all(|(_, f)| (0.0..=1.0).contains(f)));
        let key = |hour| ProfileKey {
            fiscal_month: 1,
            is_special_day: false,
            hour,
        };
        let peak = profile.get(&key(18)).unwrap();
        let off = profile.get(&key(3)).unwrap();
        assert!((peak - 300.0 / 2600.0).abs() < 1e-12);
        assert!((off - 100.0 / 2600.0).abs() < 1e-12);
    }

    #[test]
    fn missing_base_year_is_a_data_error() {
        assert!(matches!(
            extract_base_profiles(&history(), 2019),
            Err(DataError::BaseYearMissing(2019))
        ));
    }

    #[test]
    fn forecast_meets_targets_at_every_frequency() {
        let hist = history();
        let targets = AnnualTargets::from_pairs([(2025, 1_000_000.0)]);
        let none = ConstraintSet::default();
        for frequency in [Frequency::QuarterHourly, Frequency::Hourly, Frequency::Daily] {
            let request = BaseProfileRequest {
                base_year: 2023,
                start_fy: 2025,
                end_fy: 2025,
                frequency,
                constraints: &none,
                round_decimals: 3,
            };
            let (table, diag) =
                generate_base_profile_forecast(&hist, &targets, &HolidayCalendar::empty(), &request)
                    .unwrap();
            let total = table.year_total(2025);
            assert!((total - 1_000_000.0).abs() / 1_000_000.0 < 1e-4, "{frequency}: {total}");
            assert!(table.values().iter().all(|v| *v >= 0.0));
            assert_eq!(diag.base_year, 2023);
        }
    }

    #[test]
    fn forecast_is_deterministic() {
        let hist = history();
        let targets = AnnualTargets::from_pairs([(2025, 5e6), (2026, 6e6)]);
        let none = ConstraintSet::default();
        let request = BaseProfileRequest {
            base_year: 2023,
            start_fy: 2025,
            end_fy: 2026,
            frequency: Frequency::Hourly,
            constraints: &none,
            round_decimals: 2,
        };
        let cal = HolidayCalendar::empty();
        let a = generate_base_profile_forecast(&hist, &targets, &cal, &request).unwrap();
        let b = generate_base_profile_forecast(&hist, &targets, &cal, &request).unwrap();
        assert_eq!(a.0, b.0);
    }
}
