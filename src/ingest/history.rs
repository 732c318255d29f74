//! Normalisation of raw historical demand into the canonical record set.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{debug, info};

use super::table::{HISTORY_COLUMNS, RawTable};
use crate::calendar::fiscal::days_in_fiscal_year;
use crate::calendar::{CalendarFeatures, HolidayCalendar};
use crate::error::DataError;
use crate::stats::SummaryStats;

/// Share of a fiscal year's hours that must be present for it to count as complete.
const COMPLETE_YEAR_COVERAGE: f64 = 0.9;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y", "%d/%m/%Y"];

const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%H:%M:%S%.f"];

/// One cleaned historical observation with its derived calendar features.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemandRecord {
    pub timestamp: NaiveDateTime,
    pub demand: f64,
    pub features: CalendarFeatures,
}

/// Deduplicated, time-ordered historical demand.
#[derive(Debug, Clone, Default)]
pub struct HistoricalDemand {
    records: Vec<DemandRecord>,
    /// Rows rejected for unparseable timestamp or demand.
    pub dropped_rows: usize,
    /// Rows folded into an earlier row with the same timestamp.
    pub merged_duplicates: usize,
}

impl HistoricalDemand {
    /// Builds a record set directly from already clean `(timestamp, demand)`
    /// pairs. Duplicates are averaged and the result sorted.
    pub fn from_pairs(
        pairs: impl IntoIterator<Item = (NaiveDateTime, f64)>,
        holidays: &HolidayCalendar,
    ) -> Self {
        let mut buckets: BTreeMap<NaiveDateTime, (f64, usize)> = BTreeMap::new();
        let mut total = 0usize;
        for (ts, demand) in pairs {
            total += 1;
            let entry = buckets.entry(ts).or_insert((0.0, 0));
            entry.0 += demand.max(0.0);
            entry.1 += 1;
        }
        let records: Vec<DemandRecord> = buckets
            .into_iter()
            .map(|(timestamp, (sum, n))| DemandRecord {
                timestamp,
                demand: sum / n as f64,
                features: CalendarFeatures::derive(&timestamp, holidays),
            })
            .collect();
        let merged_duplicates = total - records.len();
        Self {
            records,
            dropped_rows: 0,
            merged_duplicates,
        }
    }

    pub fn records(&self) -> &[DemandRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.demand).collect()
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.records.first().map(|r| r.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.records.last().map(|r| r.timestamp)
    }

    /// Hours between the first and last observation, inclusive of both ends.
    pub fn span_hours(&self) -> i64 {
        match (self.first_timestamp(), self.last_timestamp()) {
            (Some(first), Some(last)) => (last - first).num_hours() + 1,
            _ => 0,
        }
    }

    /// Records belonging to one fiscal year.
    pub fn fiscal_year(&self, fy: i32) -> impl Iterator<Item = &DemandRecord> {
        self.records
            .iter()
            .filter(move |r| r.features.fiscal_year == fy)
    }

    /// Distinct fiscal years present, ascending.
    pub fn fiscal_years(&self) -> BTreeSet<i32> {
        self.records.iter().map(|r| r.features.fiscal_year).collect()
    }

    /// Fiscal years whose hourly coverage reaches 90 %.
    pub fn complete_fiscal_years(&self) -> Vec<i32> {
        let mut hours: BTreeMap<i32, BTreeSet<(NaiveDate, u32)>> = BTreeMap::new();
        for r in &self.records {
            hours
                .entry(r.features.fiscal_year)
                .or_default()
                .insert((r.timestamp.date(), r.features.hour));
        }
        hours
            .into_iter()
            .filter(|(fy, seen)| {
                let expected = days_in_fiscal_year(*fy) as f64 * 24.0;
                seen.len() as f64 >= COMPLETE_YEAR_COVERAGE * expected
            })
            .map(|(fy, _)| fy)
            .collect()
    }

    /// Latest complete fiscal year, falling back to the latest year present.
    pub fn latest_complete_fiscal_year(&self) -> Option<i32> {
        self.complete_fiscal_years()
            .last()
            .copied()
            .or_else(|| self.fiscal_years().last().copied())
    }

    pub fn stats(&self) -> SummaryStats {
        SummaryStats::from_values(&self.values())
    }
}

/// Turns raw demand tables into [`HistoricalDemand`].
///
/// Holds the holiday calendar injected at startup; the calendar is shared
/// read-only between runs.
#[derive(Debug, Clone)]
pub struct Normalizer {
    holidays: Arc<HolidayCalendar>,
}

/// Column indices resolved once per table.
#[derive(Debug, Clone, Copy)]
enum TimestampColumns {
    Combined(usize),
    Split { date: usize, time: Option<usize> },
}

impl Normalizer {
    pub fn new(holidays: Arc<HolidayCalendar>) -> Self {
        Self { holidays }
    }

    pub fn holidays(&self) -> &HolidayCalendar {
        &self.holidays
    }

    /// Cleans `table` into canonical records.
    ///
    /// Accepts either a combined timestamp column or separate date and time
    /// columns, and any demand alias. Rows with an unparseable timestamp or
    /// non-numeric demand are dropped, negative demand is clipped to zero and
    /// duplicate timestamps are averaged.
    ///
    /// # Errors
    ///
    /// `DataError::MissingColumn` when no timestamp or demand column can be
    /// found, `DataError::NoValidRows` when nothing survives cleaning.
    pub fn normalize(&self, table: &RawTable) -> Result<HistoricalDemand, DataError> {
        let [datetime_alias, date_alias, time_alias, demand_alias] = HISTORY_COLUMNS;

        let ts_cols = match (
            datetime_alias.resolve(table),
            date_alias.resolve(table),
            time_alias.resolve(table),
        ) {
            (Some(col), _, _) => TimestampColumns::Combined(col),
            (None, Some(date), time) => TimestampColumns::Split { date, time },
            (None, None, _) => {
                return Err(DataError::MissingColumn {
                    table: "historical demand".to_string(),
                    expected: format!(
                        "{} or {} (+ {})",
                        datetime_alias.expected(),
                        date_alias.expected(),
                        time_alias.expected()
                    ),
                });
            }
        };
        let demand_col = demand_alias
            .resolve(table)
            .ok_or_else(|| DataError::MissingColumn {
                table: "historical demand".to_string(),
                expected: demand_alias.expected(),
            })?;
        debug!(?ts_cols, demand_col, "resolved historical demand columns");

        let mut pairs = Vec::with_capacity(table.rows.len());
        let mut dropped = 0usize;
        for row in 0..table.rows.len() {
            let ts = match ts_cols {
                TimestampColumns::Combined(col) => table.cell(row, col).and_then(parse_datetime),
                TimestampColumns::Split { date, time } => {
                    let d = table.cell(row, date).and_then(parse_date);
                    let t = match time {
                        Some(col) => table.cell(row, col).and_then(parse_time),
                        None => NaiveTime::from_hms_opt(0, 0, 0),
                    };
                    d.zip(t).map(|(d, t)| d.and_time(t))
                }
            };
            let demand = table.cell(row, demand_col).and_then(parse_demand);
            match ts.zip(demand) {
                Some(pair) => pairs.push(pair),
                None => dropped += 1,
            }
        }

        if pairs.is_empty() {
            return Err(DataError::NoValidRows {
                table: "historical demand".to_string(),
            });
        }

        let mut history = HistoricalDemand::from_pairs(pairs, &self.holidays);
        history.dropped_rows = dropped;
        info!(
            rows = history.len(),
            dropped,
            merged = history.merged_duplicates,
            "historical demand normalised"
        );
        Ok(history)
    }
}

fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .or_else(|| parse_date(raw).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(raw, f).ok())
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    TIME_FORMATS
        .iter()
        .find_map(|f| NaiveTime::parse_from_str(raw, f).ok())
        .or_else(|| {
            // bare hour-of-day
            raw.parse::<u32>()
                .ok()
                .and_then(|h| NaiveTime::from_hms_opt(h, 0, 0))
        })
}

fn parse_demand(raw: &str) -> Option<f64> {
    raw.replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}
