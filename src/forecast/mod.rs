//! Forecast tables and the two generation paths.
//!
//! Every stage after generation takes a `&ForecastTable` and returns a new
//! table; nothing is mutated in place.

/// Hour-of-day profile extraction and scaling from one base fiscal year.
pub mod base_profile;
/// Seasonal-trend decomposition forecaster.
pub mod stl;
/// Future timestamp generation over fiscal-year ranges.
pub mod timeline;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::stats::SummaryStats;

/// Sampling interval of a generated forecast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frequency {
    #[serde(rename = "15min")]
    QuarterHourly,
    #[serde(rename = "30min")]
    HalfHourly,
    #[default]
    #[serde(rename = "hourly")]
    Hourly,
    #[serde(rename = "daily")]
    Daily,
}

impl Frequency {
    pub fn step(self) -> Duration {
        match self {
            Self::QuarterHourly => Duration::minutes(15),
            Self::HalfHourly => Duration::minutes(30),
            Self::Hourly => Duration::hours(1),
            Self::Daily => Duration::days(1),
        }
    }

    /// Samples per hour; fractional for daily output.
    pub fn slots_per_hour(self) -> f64 {
        60.0 / self.step().num_minutes() as f64
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::QuarterHourly => "15min",
            Self::HalfHourly => "30min",
            Self::Hourly => "hourly",
            Self::Daily => "daily",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Generation path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMethod {
    #[default]
    BaseProfile,
    Stl,
}

impl ForecastMethod {
    pub fn label(self) -> &'static str {
        match self {
            Self::BaseProfile => "base_profile",
            Self::Stl => "stl",
        }
    }
}

impl fmt::Display for ForecastMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One forecast sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastRow {
    pub timestamp: NaiveDateTime,
    /// Demand in kW.
    pub demand: f64,
    pub fiscal_year: i32,
    pub fiscal_month: u32,
    pub hour: u32,
}

/// Time-ordered forecast series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastTable {
    rows: Vec<ForecastRow>,
}

impl ForecastTable {
    pub fn new(rows: Vec<ForecastRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[ForecastRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.demand).collect()
    }

    /// Copy of this table carrying `values` as demand.
    ///
    /// `values` must have one entry per row; extra entries are ignored and
    /// missing ones keep the current demand.
    pub fn with_values(&self, values: &[f64]) -> Self {
        let rows = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, r)| ForecastRow {
                demand: values.get(i).copied().unwrap_or(r.demand),
                ..*r
            })
            .collect();
        Self { rows }
    }

    /// Copy with `f` applied to every demand value.
    pub fn map_values(&self, mut f: impl FnMut(&ForecastRow) -> f64) -> Self {
        let rows = self
            .rows
            .iter()
            .map(|r| ForecastRow {
                demand: f(r),
                ..*r
            })
            .collect();
        Self { rows }
    }

    pub fn fiscal_years(&self) -> BTreeSet<i32> {
        self.rows.iter().map(|r| r.fiscal_year).collect()
    }

    /// Row indices grouped by fiscal year.
    pub fn indices_by_year(&self) -> BTreeMap<i32, Vec<usize>> {
        let mut groups: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
        for (i, r) in self.rows.iter().enumerate() {
            groups.entry(r.fiscal_year).or_default().push(i);
        }
        groups
    }

    /// Row indices grouped by `(fiscal_year, fiscal_month)`.
    pub fn indices_by_month(&self) -> BTreeMap<(i32, u32), Vec<usize>> {
        let mut groups: BTreeMap<(i32, u32), Vec<usize>> = BTreeMap::new();
        for (i, r) in self.rows.iter().enumerate() {
            groups
                .entry((r.fiscal_year, r.fiscal_month))
                .or_default()
                .push(i);
        }
        groups
    }

    pub fn year_total(&self, fiscal_year: i32) -> f64 {
        self.rows
            .iter()
            .filter(|r| r.fiscal_year == fiscal_year)
            .map(|r| r.demand)
            .sum()
    }

    pub fn stats(&self) -> SummaryStats {
        SummaryStats::from_values(&self.values())
    }
}

/// Method-specific diagnostics carried into the metadata record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Diagnostics {
    BaseProfile(base_profile::BaseProfileDiagnostics),
    Stl(stl::StlDiagnostics),
}

/// Rounds every demand value to `decimals` places.
pub fn round_values(table: &ForecastTable, decimals: u32) -> ForecastTable {
    let scale = 10f64.powi(decimals.min(12) as i32);
    table.map_values(|r| (r.demand * scale).round() / scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(day: u32, hour: u32, demand: f64) -> ForecastRow {
        let ts = NaiveDate::from_ymd_opt(2024, 4, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap();
        ForecastRow {
            timestamp: ts,
            demand,
            fiscal_year: 2025,
            fiscal_month: 1,
            hour,
        }
    }

    #[test]
    fn with_values_leaves_original_untouched() {
        let table = ForecastTable::new(vec![row(1, 0, 1.0), row(1, 1, 2.0)]);
        let doubled = table.with_values(&[2.0, 4.0]);
        assert_eq!(table.values(), vec![1.0, 2.0]);
        assert_eq!(doubled.values(), vec![2.0, 4.0]);
        assert_eq!(doubled.rows()[1].hour, 1);
    }

    #[test]
    fn grouping_by_year_and_month() {
        let table = ForecastTable::new(vec![row(1, 0, 1.0), row(2, 0, 2.0)]);
        assert_eq!(table.indices_by_year()[&2025], vec![0, 1]);
        assert_eq!(table.indices_by_month()[&(2025, 1)].len(), 2);
        assert_eq!(table.year_total(2025), 3.0);
        assert_eq!(table.year_total(2026), 0.0);
    }

    #[test]
    fn rounding_to_decimals() {
        let table = ForecastTable::new(vec![row(1, 0, 1.23456)]);
        assert_eq!(round_values(&table, 2).values(), vec![1.23]);
        assert_eq!(round_values(&table, 0).values(), vec![1.0]);
    }

    #[test]
    fn frequency_slots() {
        assert_eq!(Frequency::QuarterHourly.slots_per_hour(), 4.0);
        assert_eq!(Frequency::Hourly.slots_per_hour(), 1.0);
        assert!((Frequency::Daily.slots_per_hour() - 1.0 / 24.0).abs() < 1e-12);
    }
}
