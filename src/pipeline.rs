//! End-to-end forecast run: normalise history, generate, reshape, validate.
//!
//! A [`ForecastRunner`] owns the injected holiday calendar and a progress
//! sink. Every run is single-threaded and synchronous; the calendar is the
//! only state shared between runs and it is never mutated.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, warn};

use crate::calendar::HolidayCalendar;
use crate::config::ForecastConfig;
use crate::error::{ComputationWarning, ConfigError, DataError, ForecastError};
use crate::forecast::base_profile::{BaseProfileRequest, generate_base_profile_forecast};
use crate::forecast::stl::{self, StlRequest, generate_stl_forecast};
use crate::forecast::{Diagnostics, ForecastMethod, ForecastTable, Frequency, round_values};
use crate::ingest::{AnnualTargets, HistoricalDemand, MonthlyTemplate, Normalizer, RawTable};
use crate::io::export::{DEMAND_UNIT, ForecastMetadata, ForecastSink};
use crate::io::import::read_table;
use crate::shaping::constraints::{
    derive_monthly_load_factors, derive_monthly_shares, resolve_monthly_load_factor,
    resolve_monthly_share,
};
use crate::shaping::{ConstraintSet, YearReshape, apply_improvement};
use crate::stats::SummaryStats;
use crate::validation::ValidationReport;

/// Calendar years of history the holiday calendar covers before the
/// forecast start.
const CALENDAR_LOOKBACK_YEARS: i32 = 15;

/// Receives progress notifications. Fire-and-forget: nothing is returned
/// and a slow sink only slows the run down.
pub trait ProgressSink {
    fn report(&self, percent: u8, stage: &str);
}

impl<F: Fn(u8, &str)> ProgressSink for F {
    fn report(&self, percent: u8, stage: &str) {
        self(percent, stage);
    }
}

/// Emits progress as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, percent: u8, stage: &str) {
        info!(percent, stage, "progress");
    }
}

/// A monthly constraint table, in memory or still on disk.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateInput {
    Table(RawTable),
    Path(PathBuf),
}

impl TemplateInput {
    fn load(&self, name: &str) -> Result<MonthlyTemplate, DataError> {
        match self {
            Self::Table(table) => MonthlyTemplate::from_table(table, name),
            Self::Path(path) => MonthlyTemplate::from_table(&read_table(path)?, name),
        }
    }
}

/// Tables a run consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastInputs {
    pub history: RawTable,
    pub scenarios: RawTable,
    pub monthly_share: Option<TemplateInput>,
    pub monthly_load_factor: Option<TemplateInput>,
}

impl ForecastInputs {
    pub fn new(history: RawTable, scenarios: RawTable) -> Self {
        Self {
            history,
            scenarios,
            monthly_share: None,
            monthly_load_factor: None,
        }
    }

    /// Reads the history and target tables named in `config.inputs`.
    ///
    /// Template tables are only recorded here; they are read during the run
    /// so that an unreadable template degrades to derived constraints.
    ///
    /// # Errors
    ///
    /// A configuration error when a required path is not set, a data error
    /// when a file cannot be read.
    pub fn from_config(config: &ForecastConfig) -> Result<Self, ForecastError> {
        let inputs = &config.inputs;
        let mut missing = Vec::new();
        if inputs.history.is_none() {
            missing.push(ConfigError::new("inputs.history", "path not set"));
        }
        if inputs.scenarios.is_none() {
            missing.push(ConfigError::new("inputs.scenarios", "path not set"));
        }
        let (Some(history), Some(scenarios)) = (&inputs.history, &inputs.scenarios) else {
            return Err(ForecastError::Configuration(missing));
        };
        Ok(Self {
            history: read_table(history)?,
            scenarios: read_table(scenarios)?,
            monthly_share: inputs.monthly_share.clone().map(TemplateInput::Path),
            monthly_load_factor: inputs.monthly_load_factor.clone().map(TemplateInput::Path),
        })
    }
}

/// Finished forecast with everything recorded about its generation.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastOutcome {
    pub profile_id: String,
    pub method: ForecastMethod,
    pub generated_at: DateTime<Utc>,
    pub start_fy: i32,
    pub end_fy: i32,
    pub frequency: Frequency,
    pub table: ForecastTable,
    pub diagnostics: Diagnostics,
    pub reshaping: Vec<YearReshape>,
    pub validation: ValidationReport,
    pub warnings: Vec<ComputationWarning>,
}

impl ForecastOutcome {
    pub fn metadata(&self) -> ForecastMetadata {
        ForecastMetadata {
            profile_id: self.profile_id.clone(),
            method: self.method,
            generated_at: self.generated_at,
            start_fy: self.start_fy,
            end_fy: self.end_fy,
            frequency: self.frequency,
            columns: ForecastMetadata::output_columns(),
            unit: DEMAND_UNIT.to_string(),
            summary: SummaryStats::from_values(&self.table.values()),
            validation: self.validation.clone(),
            diagnostics: self.diagnostics.clone(),
            load_factor_reshaping: self.reshaping.clone(),
            warnings: self.warnings.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Hands the table and its metadata to `sink`.
///
/// # Errors
///
/// Whatever the sink reports.
pub fn persist(outcome: &ForecastOutcome, sink: &mut impl ForecastSink) -> Result<(), ForecastError> {
    sink.persist(&outcome.table, &outcome.metadata())
}

/// Runs forecasts against one holiday calendar.
#[derive(Debug, Clone)]
pub struct ForecastRunner<P = TracingProgress> {
    holidays: Arc<HolidayCalendar>,
    progress: P,
    calendar_warning: Option<ComputationWarning>,
}

impl ForecastRunner<TracingProgress> {
    pub fn new(holidays: Arc<HolidayCalendar>) -> Self {
        Self {
            holidays,
            progress: TracingProgress,
            calendar_warning: None,
        }
    }

    /// Builds the calendar described by `config.calendar`, covering the
    /// forecast horizon and the years of history before it. A calendar that
    /// cannot be built degrades to an empty one; the warning is carried into
    /// every outcome of this runner.
    pub fn from_config(config: &ForecastConfig) -> Self {
        let cal = &config.calendar;
        let (holidays, calendar_warning) = HolidayCalendar::build_or_empty(
            &cal.region,
            cal.subdivision.as_deref(),
            config.forecast.start_fy - CALENDAR_LOOKBACK_YEARS,
            config.forecast.end_fy,
            &cal.extra_holidays,
        );
        Self {
            holidays: Arc::new(holidays),
            progress: TracingProgress,
            calendar_warning,
        }
    }
}

impl<P: ProgressSink> ForecastRunner<P> {
    /// Same runner reporting progress to `progress`.
    pub fn with_progress<Q: ProgressSink>(self, progress: Q) -> ForecastRunner<Q> {
        ForecastRunner {
            holidays: self.holidays,
            progress,
            calendar_warning: self.calendar_warning,
        }
    }

    pub fn holidays(&self) -> &HolidayCalendar {
        &self.holidays
    }

    /// Runs one forecast.
    ///
    /// # Arguments
    ///
    /// * `config` - Validated or unvalidated configuration; it is validated
    ///   again here
    /// * `inputs` - History, targets and optional constraint templates
    ///
    /// # Returns
    ///
    /// The forecast, its diagnostics, its validation report and every
    /// warning raised on the way.
    ///
    /// # Errors
    ///
    /// `ForecastError::Configuration` listing every violated condition, or
    /// `ForecastError::Data` from the stage that failed. No partial output is
    /// returned.
    pub fn run(
        &self,
        config: &ForecastConfig,
        inputs: &ForecastInputs,
    ) -> Result<ForecastOutcome, ForecastError> {
        let errors = config.validate();
        if !errors.is_empty() {
            let mut reasons = match config.forecast.method {
                ForecastMethod::Stl => self.stl_data_reasons(config, inputs),
                ForecastMethod::BaseProfile => Vec::new(),
            };
            reasons.extend(errors);
            return Err(ForecastError::Configuration(reasons));
        }
        let f = &config.forecast;
        let mut warnings: Vec<ComputationWarning> = self.calendar_warning.iter().cloned().collect();

        self.progress.report(0, "normalising history");
        let normalizer = Normalizer::new(Arc::clone(&self.holidays));
        let history = normalizer.normalize(&inputs.history)?;

        self.progress.report(10, "loading targets");
        let targets = AnnualTargets::from_table(&inputs.scenarios)?.within(f.start_fy, f.end_fy);
        for fiscal_year in f.start_fy..=f.end_fy {
            if targets.get(fiscal_year).is_none() {
                let w = ComputationWarning::MissingTarget { fiscal_year };
                warn!("{w}");
                warnings.push(w);
            }
        }

        self.progress.report(20, "resolving constraints");
        let (constraints, constraint_warnings) = self.resolve_constraints(config, inputs, &history);
        warnings.extend(constraint_warnings);

        self.progress.report(30, f.method.label());
        let (table, diagnostics) = match f.method {
            ForecastMethod::BaseProfile => {
                if targets.is_empty() {
                    return Err(DataError::NoTargets {
                        start: f.start_fy,
                        end: f.end_fy,
                    }
                    .into());
                }
                let base_year = base_year(f.base_year, &history)?;
                let request = BaseProfileRequest {
                    base_year,
                    start_fy: f.start_fy,
                    end_fy: f.end_fy,
                    frequency: f.frequency,
                    constraints: &constraints,
                    round_decimals: config.output.round_decimals,
                };
                let (table, diag) =
                    generate_base_profile_forecast(&history, &targets, &self.holidays, &request)?;
                (table, Diagnostics::BaseProfile(diag))
            }
            ForecastMethod::Stl => {
                let request = StlRequest {
                    start_fy: f.start_fy,
                    end_fy: f.end_fy,
                    frequency: f.frequency,
                    settings: &config.stl,
                    load_factor: &config.load_factor,
                    constraints: &constraints,
                    round_decimals: config.output.round_decimals,
                };
                let mut rng = match f.seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_os_rng(),
                };
                let (table, diag, stl_warnings) =
                    generate_stl_forecast(&history, &targets, &self.holidays, &request, &mut rng)?;
                warnings.extend(stl_warnings);
                (table, Diagnostics::Stl(diag))
            }
        };

        self.progress.report(70, "reshaping load factor");
        let (table, reshaping) = apply_improvement(&table, &config.load_factor, f.start_fy);
        let table = if reshaping.is_empty() {
            table
        } else {
            round_values(&table, config.output.round_decimals)
        };

        self.progress.report(90, "validating");
        let history_stats = per_slot(history.stats(), f.frequency);
        let validation = ValidationReport::from_forecast(&table, &targets, &history_stats);
        if !validation.is_clean() {
            for flag in &validation.flags {
                warn!(profile = %f.profile_id, "validation: {flag}");
            }
        }

        self.progress.report(100, "done");
        info!(
            profile = %f.profile_id,
            method = %f.method,
            rows = table.len(),
            realism = validation.realism_score,
            warnings = warnings.len(),
            "forecast complete"
        );
        Ok(ForecastOutcome {
            profile_id: f.profile_id.trim().to_string(),
            method: f.method,
            generated_at: Utc::now(),
            start_fy: f.start_fy,
            end_fy: f.end_fy,
            frequency: f.frequency,
            table,
            diagnostics,
            reshaping,
            validation,
            warnings,
        })
    }

    /// History and target problems of an STL request whose configuration is
    /// already rejected, so the caller sees every reason at once.
    fn stl_data_reasons(
        &self,
        config: &ForecastConfig,
        inputs: &ForecastInputs,
    ) -> Vec<ConfigError> {
        let f = &config.forecast;
        let history = Normalizer::new(Arc::clone(&self.holidays)).normalize(&inputs.history);
        let targets = AnnualTargets::from_table(&inputs.scenarios);
        match (history, targets) {
            (Ok(history), Ok(targets)) => {
                stl::data_reasons(&history, &targets.within(f.start_fy, f.end_fy))
            }
            (history, targets) => {
                let mut reasons = Vec::new();
                if let Err(e) = history {
                    reasons.push(ConfigError::new(
                        "history",
                        format!("insufficient history: {e}"),
                    ));
                }
                if let Err(e) = targets {
                    reasons.push(ConfigError::new(
                        "scenarios",
                        format!("no annual demand targets: {e}"),
                    ));
                }
                reasons
            }
        }
    }

    fn resolve_constraints(
        &self,
        config: &ForecastConfig,
        inputs: &ForecastInputs,
        history: &HistoricalDemand,
    ) -> (ConstraintSet, Vec<ComputationWarning>) {
        let sources = &config.constraints;
        let (monthly_share, mut warnings) = resolve_monthly_share(
            sources.monthly_share,
            inputs.monthly_share.as_ref().map(|t| t.load("monthly share")),
            || derive_monthly_shares(history),
        );
        let (monthly_load_factor, lf_warnings) = resolve_monthly_load_factor(
            sources.monthly_load_factor,
            inputs
                .monthly_load_factor
                .as_ref()
                .map(|t| t.load("monthly load factor")),
            || derive_monthly_load_factors(history),
        );
        warnings.extend(lf_warnings);
        (
            ConstraintSet {
                monthly_share,
                monthly_load_factor,
            },
            warnings,
        )
    }
}

/// Requested base year, else the latest complete fiscal year of history.
fn base_year(requested: Option<i32>, history: &HistoricalDemand) -> Result<i32, DataError> {
    requested
        .or_else(|| history.latest_complete_fiscal_year())
        .ok_or(DataError::EmptyHistory)
}

/// Historical hourly statistics expressed per output slot, so they compare
/// with a forecast whose slots sum to annual energy.
fn per_slot(stats: SummaryStats, frequency: Frequency) -> SummaryStats {
    let k = 1.0 / frequency.slots_per_hour();
    SummaryStats {
        min: stats.min * k,
        max: stats.max * k,
        mean: stats.mean * k,
        std: stats.std * k,
        ..stats
    }
}

/// Reads a run's inputs from `config`, runs it and writes the result into
/// `config.output.directory`. Returns the outcome and the written paths.
///
/// # Errors
///
/// Any error of [`ForecastInputs::from_config`], [`ForecastRunner::run`] or
/// the directory sink.
pub fn run_to_directory(
    config: &ForecastConfig,
    out_dir: Option<&Path>,
) -> Result<(ForecastOutcome, Vec<PathBuf>), ForecastError> {
    let runner = ForecastRunner::from_config(config);
    let inputs = ForecastInputs::from_config(config)?;
    let outcome = runner.run(config, &inputs)?;
    let dir = out_dir.map_or_else(|| config.output.directory.clone(), Path::to_path_buf);
    let mut sink = crate::io::export::DirectorySink::new(dir);
    persist(&outcome, &mut sink)?;
    Ok((outcome, sink.written().to_vec()))
}
