//! Side-by-side comparison of persisted forecast profiles.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::calendar::HolidayCalendar;
use crate::error::DataError;
use crate::ingest::{HistoricalDemand, Normalizer};
use crate::io::import::read_table;
use crate::stats::SummaryStats;

/// A forecast CSV to compare.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileSource {
    pub label: String,
    pub path: PathBuf,
}

impl ProfileSource {
    /// Source labelled with the file stem.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = path
            .file_stem()
            .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().into_owned());
        Self { label, path }
    }
}

/// Energy, peak and load factor of one fiscal year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct YearSummary {
    pub fiscal_year: i32,
    pub energy: f64,
    pub peak: f64,
    pub load_factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSummary {
    pub overall: SummaryStats,
    pub years: Vec<YearSummary>,
}

impl ProfileSummary {
    pub fn from_demand(demand: &HistoricalDemand) -> Self {
        let years = demand
            .fiscal_years()
            .into_iter()
            .map(|fy| {
                let values: Vec<f64> = demand.fiscal_year(fy).map(|r| r.demand).collect();
                let s = SummaryStats::from_values(&values);
                YearSummary {
                    fiscal_year: fy,
                    energy: s.total,
                    peak: s.max,
                    load_factor: s.load_factor,
                }
            })
            .collect();
        Self {
            overall: demand.stats(),
            years,
        }
    }
}

/// Result for one compared profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ComparisonEntry {
    Loaded {
        label: String,
        summary: ProfileSummary,
    },
    Failed {
        label: String,
        reason: String,
    },
}

impl ComparisonEntry {
    pub fn label(&self) -> &str {
        match self {
            Self::Loaded { label, .. } | Self::Failed { label, .. } => label,
        }
    }
}

fn load_profile(source: &ProfileSource, normalizer: &Normalizer) -> Result<ProfileSummary, DataError> {
    let table = read_table(&source.path)?;
    let demand = normalizer.normalize(&table)?;
    Ok(ProfileSummary::from_demand(&demand))
}

/// Loads and summarises every source. A source that fails to load is
/// reported as [`ComparisonEntry::Failed`]; the rest still load.
pub fn compare_profiles(sources: &[ProfileSource]) -> Vec<ComparisonEntry> {
    let normalizer = Normalizer::new(Arc::new(HolidayCalendar::empty()));
    sources
        .iter()
        .map(|source| match load_profile(source, &normalizer) {
            Ok(summary) => ComparisonEntry::Loaded {
                label: source.label.clone(),
                summary,
            },
            Err(e) => {
                warn!(profile = %source.label, error = %e, "profile comparison entry failed");
                ComparisonEntry::Failed {
                    label: source.label.clone(),
                    reason: e.to_string(),
                }
            }
        })
        .collect()
}

/// Printable comparison table.
pub struct ComparisonReport<'a>(pub &'a [ComparisonEntry]);

impl fmt::Display for ComparisonReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Profile Comparison ---")?;
        writeln!(
            f,
            "{:<24} {:>6} {:>16} {:>12} {:>8}",
            "profile", "FY", "energy", "peak", "LF"
        )?;
        for entry in self.0 {
            match entry {
                ComparisonEntry::Loaded { label, summary } => {
                    for y in &summary.years {
                        writeln!(
                            f,
                            "{:<24} {:>6} {:>16.0} {:>12.2} {:>8.3}",
                            label, y.fiscal_year, y.energy, y.peak, y.load_factor
                        )?;
                    }
                }
                ComparisonEntry::Failed { label, reason } => {
                    writeln!(f, "{label:<24} FAILED: {reason}")?;
                }
            }
        }
        Ok(())
    }
}
