//! Advisory checks of a finished forecast against its targets and the
//! history it was built from.

use std::fmt;

use serde::Serialize;

use crate::forecast::ForecastTable;
use crate::ingest::AnnualTargets;
use crate::stats::{SummaryStats, ratio_or};

/// Annual totals further off than this (percent) are flagged.
pub const ANNUAL_TOLERANCE_PERCENT: f64 = 0.5;
/// Realism scores below this are flagged.
pub const LOW_REALISM_SCORE: f64 = 0.6;

/// Target check for one fiscal year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct YearCheck {
    pub fiscal_year: i32,
    pub target: f64,
    pub actual: f64,
    /// `|target − actual| / target`, in percent.
    pub error_percent: f64,
}

/// Outcome of validating one forecast.
///
/// Findings never block a run; they are carried with the result and
/// written into the metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub annual: Vec<YearCheck>,
    /// Forecast years that had no target to check against.
    pub missing_targets: Vec<i32>,
    /// Forecast statistic divided by the historical one.
    pub mean_ratio: f64,
    pub std_ratio: f64,
    pub max_ratio: f64,
    pub min_ratio: f64,
    pub negative_count: usize,
    pub zero_count: usize,
    /// Composite similarity to history in `[0, 1]`.
    pub realism_score: f64,
    pub flags: Vec<String>,
}

impl ValidationReport {
    /// Validates `forecast` against `targets` and the historical statistics.
    ///
    /// # Arguments
    ///
    /// * `forecast` - Finished forecast table
    /// * `targets` - Annual energy targets
    /// * `history` - Summary statistics of the historical series
    ///
    /// # Returns
    ///
    /// A report with every check filled in. Ratios against a zero historical
    /// statistic are reported as 1.
    pub fn from_forecast(
        forecast: &ForecastTable,
        targets: &AnnualTargets,
        history: &SummaryStats,
    ) -> Self {
        let mut annual = Vec::new();
        let mut missing_targets = Vec::new();
        for fy in forecast.fiscal_years() {
            match targets.get(fy) {
                Some(target) => {
                    let actual = forecast.year_total(fy);
                    annual.push(YearCheck {
                        fiscal_year: fy,
                        target,
                        actual,
                        error_percent: 100.0 * ratio_or((target - actual).abs(), target, 0.0),
                    });
                }
                None => missing_targets.push(fy),
            }
        }

        let values = forecast.values();
        let stats = SummaryStats::from_values(&values);
        let negative_count = values.iter().filter(|v| **v < 0.0).count();
        let zero_count = values.iter().filter(|v| **v == 0.0).count();
        let negative_fraction = ratio_or(negative_count as f64, values.len() as f64, 0.0);

        let mean_ratio = ratio_or(stats.mean, history.mean, 1.0);
        let std_ratio = ratio_or(stats.std, history.std, 1.0);
        let max_ratio = ratio_or(stats.max, history.max, 1.0);
        let min_ratio = ratio_or(stats.min, history.min, 1.0);

        let components = [
            1.0 - (mean_ratio - 1.0).abs(),
            1.0 - 0.5 * (std_ratio - 1.0).abs(),
            1.0 - negative_fraction,
        ];
        let realism_score = (components.iter().sum::<f64>() / 3.0).clamp(0.0, 1.0);

        let mut flags = Vec::new();
        for check in &annual {
            if check.error_percent > ANNUAL_TOLERANCE_PERCENT {
                flags.push(format!(
                    "FY{} total off target by {:.2}%",
                    check.fiscal_year, check.error_percent
                ));
            }
        }
        if !missing_targets.is_empty() {
            flags.push(format!("no target for fiscal years {missing_targets:?}"));
        }
        if negative_count > 0 {
            flags.push(format!("{negative_count} negative values"));
        }
        if zero_count > 0 {
            flags.push(format!("{zero_count} zero values"));
        }
        if realism_score < LOW_REALISM_SCORE {
            flags.push(format!("low realism score {realism_score:.3}"));
        }

        Self {
            annual,
            missing_targets,
            mean_ratio,
            std_ratio,
            max_ratio,
            min_ratio,
            negative_count,
            zero_count,
            realism_score,
            flags,
        }
    }

    /// Largest annual error in percent, 0 when nothing was checked.
    pub fn max_error_percent(&self) -> f64 {
        self.annual
            .iter()
            .map(|c| c.error_percent)
            .fold(0.0, f64::max)
    }

    /// True when nothing was flagged.
    pub fn is_clean(&self) -> bool {
        self.flags.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Validation Report ---")?;
        for c in &self.annual {
            writeln!(
                f,
                "FY{}:  target {:.0}  actual {:.0}  error {:.3}%",
                c.fiscal_year, c.target, c.actual, c.error_percent
            )?;
        }
        writeln!(f, "Mean ratio:        {:.3}", self.mean_ratio)?;
        writeln!(f, "Std ratio:         {:.3}", self.std_ratio)?;
        writeln!(f, "Max / min ratio:   {:.3} / {:.3}", self.max_ratio, self.min_ratio)?;
        writeln!(
            f,
            "Negative / zero:   {} / {}",
            self.negative_count, self.zero_count
        )?;
        write!(f, "Realism score:     {:.3}", self.realism_score)?;
        for flag in &self.flags {
            write!(f, "\n  ! {flag}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::ForecastRow;
    use chrono::NaiveDate;

    fn table(values: &[f64]) -> ForecastTable {
        let start = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        ForecastTable::new(
            values
                .iter()
                .enumerate()
                .map(|(i, v)| ForecastRow {
                    timestamp: start + chrono::Duration::hours(i as i64),
                    demand: *v,
                    fiscal_year: 2025,
                    fiscal_month: 1,
                    hour: (i % 24) as u32,
                })
                .collect(),
        )
    }

    #[test]
    fn identical_distribution_scores_one() {
        let values = [10.0, 20.0, 30.0, 40.0];
        let history = SummaryStats::from_values(&values);
        let targets = AnnualTargets::from_pairs([(2025, 100.0)]);
        let report = ValidationReport::from_forecast(&table(&values), &targets, &history);
        assert_eq!(report.realism_score, 1.0);
        assert_eq!(report.annual[0].error_percent, 0.0);
        assert!(report.is_clean(), "flags: {:?}", report.flags);
    }

    #[test]
    fn mismatches_are_flagged_not_fatal() {
        let history = SummaryStats::from_values(&[10.0, 20.0, 30.0, 40.0]);
        let targets = AnnualTargets::from_pairs([(2025, 200.0)]);
        let report = ValidationReport::from_forecast(&table(&[-5.0, 0.0, 60.0, 45.0]), &targets, &history);
        assert_eq!(report.negative_count, 1);
        assert_eq!(report.zero_count, 1);
        assert!((report.max_error_percent() - 50.0).abs() < 1e-9);
        assert!(report.flags.iter().any(|f| f.contains("FY2025")));
        assert!(report.realism_score < 1.0);
        assert!(report.to_string().contains("Realism score"));
    }

    #[test]
    fn zero_history_gives_neutral_ratios() {
        let report = ValidationReport::from_forecast(
            &table(&[1.0, 2.0]),
            &AnnualTargets::default(),
            &SummaryStats::default(),
        );
        assert_eq!(report.mean_ratio, 1.0);
        assert_eq!(report.missing_targets, vec![2025]);
    }
}
