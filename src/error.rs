//! Error and warning taxonomy for the forecasting engine.
//!
//! Configuration problems stop a run before any computation, data problems
//! abort the failing stage, and [`ComputationWarning`]s record degraded but
//! completed work.

use std::fmt;
use std::io;

use thiserror::Error;

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"forecast.start_fy"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Problems with the input data itself.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("historical demand table is empty")]
    EmptyHistory,

    #[error("no usable rows remain after cleaning {table}")]
    NoValidRows { table: String },

    #[error("missing column in {table}: expected one of {expected}")]
    MissingColumn { table: String, expected: String },

    #[error("base fiscal year FY{0} has no historical rows")]
    BaseYearMissing(i32),

    #[error("no annual demand targets inside FY{start}..=FY{end}")]
    NoTargets { start: i32, end: i32 },

    #[error("holiday calendar: {0}")]
    Calendar(String),

    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Failure of a forecasting run.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("configuration rejected: {}", join_reasons(.0))]
    Configuration(Vec<ConfigError>),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("failed to persist forecast: {0}")]
    Persistence(#[from] io::Error),

    #[error("failed to serialise metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl ForecastError {
    /// Wraps a single configuration problem.
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration(vec![ConfigError::new(field, message)])
    }

    /// Configuration reasons, empty for other variants.
    pub fn reasons(&self) -> &[ConfigError] {
        match self {
            Self::Configuration(reasons) => reasons,
            Self::Data(_) | Self::Persistence(_) | Self::Metadata(_) => &[],
        }
    }
}

impl From<ConfigError> for ForecastError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(vec![err])
    }
}

fn join_reasons(reasons: &[ConfigError]) -> String {
    reasons
        .iter()
        .map(|r| format!("{}: {}", r.field, r.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// A stage completed with reduced quality.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComputationWarning {
    #[error("{constraint} template unusable ({reason}); using constraints derived from history")]
    TemplateFallback {
        constraint: &'static str,
        reason: String,
    },

    #[error("{constraint} template lacks fiscal months {months:?}; values extrapolated from history")]
    ConstraintExtrapolated {
        constraint: &'static str,
        months: Vec<u32>,
    },

    #[error("monthly shares summed to {sum:.4}; normalised to 1")]
    SharesNormalised { sum: f64 },

    #[error("Gaussian smoothing unavailable ({reason}); used moving average")]
    SmoothingFallback { reason: String },

    #[error("holiday calendar unavailable ({reason}); no holidays flagged")]
    CalendarDegraded { reason: String },

    #[error("STL trend window {requested} corrected to {corrected} (period {period})")]
    TrendWindowCorrected {
        requested: usize,
        corrected: usize,
        period: usize,
    },

    #[error("FY{fiscal_year} has no annual target; left unscaled")]
    MissingTarget { fiscal_year: i32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_lists_every_reason() {
        let err = ForecastError::Configuration(vec![
            ConfigError::new("history", "insufficient history"),
            ConfigError::new("forecast.end_fy", "must be > forecast.start_fy"),
        ]);
        let text = err.to_string();
        assert!(text.contains("insufficient history"));
        assert!(text.contains("forecast.end_fy"));
        assert_eq!(err.reasons().len(), 2);
    }

    #[test]
    fn data_error_has_no_config_reasons() {
        let err = ForecastError::from(DataError::EmptyHistory);
        assert!(err.reasons().is_empty());
        assert_eq!(err.to_string(), "historical demand table is empty");
    }
}
