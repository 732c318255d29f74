//! TOML-based forecast configuration and preset definitions.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::forecast::stl::{MAX_HORIZON_YEARS, StlSettings};
use crate::forecast::{ForecastMethod, Frequency};
use crate::shaping::{ConstraintSource, LoadFactorImprovement};

/// Largest accepted number of output decimals.
const MAX_ROUND_DECIMALS: u32 = 12;

/// Top-level forecast configuration parsed from TOML.
///
/// All fields have defaults matching the `base_profile` preset. Load from
/// TOML with [`ForecastConfig::from_toml_file`] or use
/// [`ForecastConfig::from_preset`] for a built-in setup.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForecastConfig {
    /// Method, horizon and output resolution.
    #[serde(default)]
    pub forecast: ForecastSection,
    /// Input file locations.
    #[serde(default)]
    pub inputs: InputsConfig,
    /// Monthly constraint sources.
    #[serde(default)]
    pub constraints: ConstraintsConfig,
    /// Load-factor improvement ramp.
    #[serde(default)]
    pub load_factor: LoadFactorImprovement,
    /// Decomposition settings for the `stl` method.
    #[serde(default)]
    pub stl: StlSettings,
    /// Holiday calendar selection.
    #[serde(default)]
    pub calendar: CalendarConfig,
    /// Output location and precision.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Method, horizon and output resolution.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForecastSection {
    /// `"base_profile"` or `"stl"`.
    pub method: ForecastMethod,
    /// Name of the persisted profile; used for output file names.
    pub profile_id: String,
    /// First forecast fiscal year (inclusive).
    pub start_fy: i32,
    /// Last forecast fiscal year (inclusive).
    pub end_fy: i32,
    /// Historical fiscal year the base profile is cut from. Defaults to the
    /// latest complete year in the history.
    pub base_year: Option<i32>,
    /// `"15min"`, `"30min"`, `"hourly"` or `"daily"`.
    pub frequency: Frequency,
    /// Noise seed for the `stl` method; absent means OS entropy.
    pub seed: Option<u64>,
}

impl Default for ForecastSection {
    fn default() -> Self {
        Self {
            method: ForecastMethod::BaseProfile,
            profile_id: "load_forecast".to_string(),
            start_fy: 2026,
            end_fy: 2030,
            base_year: None,
            frequency: Frequency::Hourly,
            seed: None,
        }
    }
}

/// Input file locations. Paths may be overridden on the command line.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputsConfig {
    /// Historical demand CSV.
    pub history: Option<PathBuf>,
    /// Annual demand targets CSV.
    pub scenarios: Option<PathBuf>,
    /// One-row monthly share template CSV.
    pub monthly_share: Option<PathBuf>,
    /// One-row monthly load-factor template CSV.
    pub monthly_load_factor: Option<PathBuf>,
}

/// Where each monthly constraint comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConstraintsConfig {
    pub monthly_share: ConstraintSource,
    pub monthly_load_factor: ConstraintSource,
}

/// Holiday calendar selection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CalendarConfig {
    /// `"IN"` or `"US"`.
    pub region: String,
    /// State or province code within the region.
    pub subdivision: Option<String>,
    /// Additional holiday dates (`YYYY-MM-DD`).
    pub extra_holidays: Vec<NaiveDate>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            region: "IN".to_string(),
            subdivision: None,
            extra_holidays: Vec::new(),
        }
    }
}

/// Output location and precision.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Directory receiving `<profile_id>.csv` and its metadata.
    pub directory: PathBuf,
    /// Decimal places of the demand column.
    pub round_decimals: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
            round_decimals: 3,
        }
    }
}

impl ForecastConfig {
    /// Base-profile method, no monthly constraints, no reshaping.
    pub fn base_profile() -> Self {
        Self::default()
    }

    /// Decomposition method with derived monthly shares and a fixed seed.
    pub fn stl() -> Self {
        Self {
            forecast: ForecastSection {
                method: ForecastMethod::Stl,
                profile_id: "stl_forecast".to_string(),
                seed: Some(42),
                ..ForecastSection::default()
            },
            constraints: ConstraintsConfig {
                monthly_share: ConstraintSource::Derived,
                monthly_load_factor: ConstraintSource::None,
            },
            ..Self::default()
        }
    }

    /// [`ForecastConfig::stl`] plus a 10% load-factor improvement reached
    /// by the final forecast year.
    pub fn stl_improved() -> Self {
        let base = Self::stl();
        Self {
            forecast: ForecastSection {
                profile_id: "stl_improved_forecast".to_string(),
                ..base.forecast.clone()
            },
            load_factor: LoadFactorImprovement {
                enabled: true,
                target_fiscal_year: base.forecast.end_fy,
                improvement_percent: 10.0,
            },
            ..base
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["base_profile", "stl", "stl_improved"];

    /// Loads a configuration from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "base_profile" => Ok(Self::base_profile()),
            "stl" => Ok(Self::stl()),
            "stl_improved" => Ok(Self::stl_improved()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Loads a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or parsed.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("config", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` on syntax errors, unknown fields or values of
    /// the wrong type.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid. Checks that need
    /// the input data (history length, target presence) run at forecast
    /// time instead.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let f = &self.forecast;

        let id = f.profile_id.trim();
        if id.is_empty() {
            errors.push(ConfigError::new("forecast.profile_id", "must not be empty"));
        } else if id.contains(['/', '\\']) || id == "." || id == ".." {
            errors.push(ConfigError::new(
                "forecast.profile_id",
                format!("must be a plain file name, got \"{id}\""),
            ));
        }
        if f.start_fy > f.end_fy {
            errors.push(ConfigError::new(
                "forecast.start_fy",
                "must be <= forecast.end_fy",
            ));
        } else if f.end_fy - f.start_fy > MAX_HORIZON_YEARS {
            errors.push(ConfigError::new(
                "forecast.end_fy",
                format!("horizon exceeds {MAX_HORIZON_YEARS} years"),
            ));
        }
        if f.method == ForecastMethod::Stl && f.start_fy == f.end_fy {
            errors.push(ConfigError::new(
                "forecast.end_fy",
                "must be > forecast.start_fy for the stl method",
            ));
        }
        if let Some(base) = f.base_year {
            if base >= f.start_fy {
                errors.push(ConfigError::new(
                    "forecast.base_year",
                    "must be < forecast.start_fy",
                ));
            }
        }

        let lf = &self.load_factor;
        if lf.enabled {
            if !(lf.improvement_percent > 0.0 && lf.improvement_percent <= 50.0) {
                errors.push(ConfigError::new(
                    "load_factor.improvement_percent",
                    format!("must be in (0, 50], got {}", lf.improvement_percent),
                ));
            }
            if lf.target_fiscal_year < f.start_fy {
                errors.push(ConfigError::new(
                    "load_factor.target_fiscal_year",
                    "must be >= forecast.start_fy",
                ));
            }
        }

        let stl = &self.stl;
        if stl.period.is_some_and(|p| p < 2) {
            errors.push(ConfigError::new("stl.period", "must be >= 2"));
        }
        if stl.seasonal.is_some_and(|s| s < 3) {
            errors.push(ConfigError::new("stl.seasonal", "must be >= 3"));
        }
        if stl.inner_iterations == 0 {
            errors.push(ConfigError::new("stl.inner_iterations", "must be > 0"));
        }

        let region = self.calendar.region.trim().to_ascii_uppercase();
        if region != "IN" && region != "US" {
            errors.push(ConfigError::new(
                "calendar.region",
                format!("must be \"IN\" or \"US\", got \"{}\"", self.calendar.region),
            ));
        }

        if self.output.round_decimals > MAX_ROUND_DECIMALS {
            errors.push(ConfigError::new(
                "output.round_decimals",
                format!("must be <= {MAX_ROUND_DECIMALS}"),
            ));
        }

        errors
    }
}
