//! Annual-target driven electricity load profile forecasting.

/// Fiscal calendar features and holiday calendars.
pub mod calendar;
pub mod cli;
/// Side-by-side comparison of persisted forecasts.
pub mod compare;
/// TOML configuration and presets.
pub mod config;
/// Smoothing kernels and seasonal-trend decomposition.
pub mod decompose;
pub mod error;
pub mod forecast;
/// Raw tables, history normalisation, targets and templates.
pub mod ingest;
pub mod io;
pub mod pipeline;
/// Monthly constraints and load-factor reshaping.
pub mod shaping;
pub mod stats;
pub mod validation;
