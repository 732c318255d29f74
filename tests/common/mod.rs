//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::f64::consts::TAU;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use load_forecast::config::ForecastConfig;
use load_forecast::forecast::ForecastMethod;
use load_forecast::ingest::RawTable;
use load_forecast::pipeline::ForecastInputs;

/// 1 April 00:00 of the calendar year a fiscal year starts in.
pub fn fiscal_year_start(fy: i32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(fy - 1, 4, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("valid fiscal year start")
}

/// Synthetic hourly demand for `first_fy..=last_fy`.
///
/// Daily cycle with an evening peak, lower weekends, a summer hump, a mild
/// upward trend and seeded noise. Values stay well above zero.
pub fn hourly_demand(first_fy: i32, last_fy: i32, seed: u64) -> Vec<(NaiveDateTime, f64)> {
    let start = fiscal_year_start(first_fy);
    let end = fiscal_year_start(last_fy + 1);
    let hours = (end - start).num_hours();
    let mut rng = StdRng::seed_from_u64(seed);
    (0..hours)
        .map(|h| {
            let ts = start + Duration::hours(h);
            let hour = (h % 24) as f64;
            let daily = 150.0 * ((hour - 13.0) / 24.0 * TAU).sin().max(-0.6)
                + if (18.0..=21.0).contains(&hour) { 120.0 } else { 0.0 };
            let weekend = matches!(ts.weekday(), Weekday::Sat | Weekday::Sun);
            let yearly = 200.0 * ((ts.ordinal() as f64 - 120.0) / 365.0 * TAU).cos();
            let trend = 0.004 * h as f64;
            let noise: f64 = rng.random_range(-20.0..20.0);
            let base = if weekend { 850.0 } else { 1000.0 };
            (ts, base + daily + yearly + trend + noise)
        })
        .collect()
}

/// History table with a combined `datetime` column and a `Demand` column.
pub fn history_table(first_fy: i32, last_fy: i32) -> RawTable {
    let rows = hourly_demand(first_fy, last_fy, 42)
        .into_iter()
        .map(|(ts, v)| vec![ts.format("%Y-%m-%d %H:%M:%S").to_string(), format!("{v:.3}")])
        .collect();
    RawTable::new(vec!["datetime".to_string(), "Demand".to_string()], rows)
}

/// `(Financial_Year, Total_Demand)` table.
pub fn scenario_table(targets: &[(i32, f64)]) -> RawTable {
    let rows = targets
        .iter()
        .map(|(fy, total)| vec![fy.to_string(), total.to_string()])
        .collect();
    RawTable::new(
        vec!["Financial_Year".to_string(), "Total_Demand".to_string()],
        rows,
    )
}

/// One-row monthly table with `Apr`..`Mar` headers.
pub fn monthly_table(values: [f64; 12]) -> RawTable {
    let headers = [
        "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec", "Jan", "Feb", "Mar",
    ];
    RawTable::new(
        headers.iter().map(|h| h.to_string()).collect(),
        vec![values.iter().map(|v| v.to_string()).collect()],
    )
}

/// Base-profile configuration for a single-year horizon.
pub fn base_profile_config(base_year: i32, start_fy: i32, end_fy: i32) -> ForecastConfig {
    let mut cfg = ForecastConfig::base_profile();
    cfg.forecast.base_year = Some(base_year);
    cfg.forecast.start_fy = start_fy;
    cfg.forecast.end_fy = end_fy;
    cfg
}

/// Seeded decomposition configuration.
pub fn stl_config(start_fy: i32, end_fy: i32, seed: u64) -> ForecastConfig {
    let mut cfg = ForecastConfig::stl();
    cfg.forecast.method = ForecastMethod::Stl;
    cfg.forecast.start_fy = start_fy;
    cfg.forecast.end_fy = end_fy;
    cfg.forecast.seed = Some(seed);
    cfg
}

/// Inputs for the standard three-year history (FY2021-FY2023).
pub fn three_year_inputs(targets: &[(i32, f64)]) -> ForecastInputs {
    ForecastInputs::new(history_table(2021, 2023), scenario_table(targets))
}

/// Writes `table` as CSV to `dir/name` and returns the path.
pub fn write_table(dir: &Path, name: &str, table: &RawTable) -> PathBuf {
    let path = dir.join(name);
    let mut wtr = csv::Writer::from_path(&path).expect("create csv");
    wtr.write_record(&table.headers).expect("write header");
    for row in &table.rows {
        wtr.write_record(row).expect("write row");
    }
    wtr.flush().expect("flush csv");
    path
}

/// Relative difference `|a - b| / b`.
pub fn rel_diff(a: f64, b: f64) -> f64 {
    (a - b).abs() / b
}
