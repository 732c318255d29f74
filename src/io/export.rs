//! Forecast table and metadata export, and the sinks that receive them.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::ForecastError;
use crate::forecast::{Diagnostics, ForecastMethod, ForecastTable, Frequency};
use crate::shaping::YearReshape;
use crate::stats::SummaryStats;
use crate::validation::ValidationReport;

/// Column header of the forecast CSV.
pub const HEADER: &str = "datetime,Demand,Date,Time,Fiscal_Year,Year,Hour";

/// Unit of the `Demand` column.
pub const DEMAND_UNIT: &str = "kW";

/// Everything recorded about a generated forecast besides the series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastMetadata {
    pub profile_id: String,
    pub method: ForecastMethod,
    pub generated_at: DateTime<Utc>,
    pub start_fy: i32,
    pub end_fy: i32,
    pub frequency: Frequency,
    pub columns: Vec<String>,
    pub unit: String,
    pub summary: SummaryStats,
    pub validation: ValidationReport,
    pub diagnostics: Diagnostics,
    pub load_factor_reshaping: Vec<YearReshape>,
    pub warnings: Vec<String>,
}

impl ForecastMetadata {
    /// Column list of [`HEADER`].
    pub fn output_columns() -> Vec<String> {
        HEADER.split(',').map(str::to_string).collect()
    }
}

/// Exports a forecast table to a CSV file at the given path.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(table: &ForecastTable, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_csv(table, io::BufWriter::new(file))
}

/// Writes a forecast table as CSV to any writer.
///
/// Demand is written with up to six decimals; the other columns are derived
/// from the row timestamp.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(table: &ForecastTable, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(HEADER.split(','))?;
    for r in table.rows() {
        wtr.write_record(&[
            r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            format_demand(r.demand),
            r.timestamp.format("%Y-%m-%d").to_string(),
            r.timestamp.format("%H:%M:%S").to_string(),
            r.fiscal_year.to_string(),
            r.timestamp.year().to_string(),
            r.hour.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn format_demand(v: f64) -> String {
    let s = format!("{v:.6}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-" { "0".to_string() } else { s.to_string() }
}

/// Writes the metadata record as pretty JSON.
///
/// # Errors
///
/// Returns the serialisation or write error.
pub fn write_metadata(metadata: &ForecastMetadata, writer: impl Write) -> serde_json::Result<()> {
    serde_json::to_writer_pretty(writer, metadata)
}

/// Destination for finished forecasts.
pub trait ForecastSink {
    /// Stores one forecast table with its metadata.
    ///
    /// # Errors
    ///
    /// Returns a persistence or serialisation error.
    fn persist(
        &mut self,
        table: &ForecastTable,
        metadata: &ForecastMetadata,
    ) -> Result<(), ForecastError>;
}

/// Writes `<profile_id>.csv` and `<profile_id>_metadata.json` into a
/// directory, creating it when needed.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: Vec::new(),
        }
    }

    pub fn table_path(&self, profile_id: &str) -> PathBuf {
        self.dir.join(format!("{profile_id}.csv"))
    }

    pub fn metadata_path(&self, profile_id: &str) -> PathBuf {
        self.dir.join(format!("{profile_id}_metadata.json"))
    }

    /// Files written so far.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl ForecastSink for DirectorySink {
    fn persist(
        &mut self,
        table: &ForecastTable,
        metadata: &ForecastMetadata,
    ) -> Result<(), ForecastError> {
        fs::create_dir_all(&self.dir)?;
        let table_path = self.table_path(&metadata.profile_id);
        export_csv(table, &table_path)?;

        let meta_path = self.metadata_path(&metadata.profile_id);
        let file = File::create(&meta_path)?;
        let mut buf = io::BufWriter::new(file);
        write_metadata(metadata, &mut buf)?;
        buf.flush()?;

        info!(
            table = %table_path.display(),
            metadata = %meta_path.display(),
            "forecast persisted"
        );
        self.written.push(table_path);
        self.written.push(meta_path);
        Ok(())
    }
}

/// Keeps serialised forecasts in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    /// `(profile_id, csv, metadata json)` per persisted forecast.
    pub entries: Vec<(String, String, String)>,
}

impl ForecastSink for MemorySink {
    fn persist(
        &mut self,
        table: &ForecastTable,
        metadata: &ForecastMetadata,
    ) -> Result<(), ForecastError> {
        let mut csv = Vec::new();
        write_csv(table, &mut csv)?;
        let json = serde_json::to_string_pretty(metadata)?;
        self.entries.push((
            metadata.profile_id.clone(),
            String::from_utf8_lossy(&csv).into_owned(),
            json,
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::ForecastRow;
    use chrono::NaiveDate;

    fn table() -> ForecastTable {
        let start = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap().and_hms_opt(22, 0, 0).unwrap();
        ForecastTable::new(
            (0..3)
                .map(|i| {
                    let ts = start + chrono::Duration::hours(i);
                    ForecastRow {
                        timestamp: ts,
                        demand: 100.5 + i as f64,
                        fiscal_year: crate::calendar::fiscal_year(&ts.date()),
                        fiscal_month: crate::calendar::fiscal_month(ts.date().month()),
                        hour: chrono::Timelike::hour(&ts),
                    }
                })
                .collect(),
        )
    }

    #[test]
    fn header_and_rows() {
        let mut buf = Vec::new();
        write_csv(&table(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], HEADER);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "2025-03-31 22:00:00,100.5,2025-03-31,22:00:00,2025,2025,22");
        // Fiscal year rolls over at midnight on 1 April.
        assert_eq!(lines[3], "2025-04-01 00:00:00,102.5,2025-04-01,00:00:00,2026,2025,0");
    }

    #[test]
    fn demand_formatting_trims_zeros() {
        assert_eq!(format_demand(12.0), "12");
        assert_eq!(format_demand(0.125), "0.125");
        assert_eq!(format_demand(0.0), "0");
    }

    #[test]
    fn deterministic_output() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        write_csv(&table(), &mut a).unwrap();
        write_csv(&table(), &mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn sink_paths_follow_profile_id() {
        let sink = DirectorySink::new("/tmp/out");
        assert_eq!(sink.table_path("p1"), PathBuf::from("/tmp/out/p1.csv"));
        assert_eq!(sink.metadata_path("p1"), PathBuf::from("/tmp/out/p1_metadata.json"));
        assert_eq!(ForecastMetadata::output_columns().len(), 7);
    }
}
