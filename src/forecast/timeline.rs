use chrono::NaiveDateTime;

use super::{ForecastRow, ForecastTable, Frequency};
use crate::calendar::fiscal::fiscal_year_bounds;
use crate::calendar::{CalendarFeatures, HolidayCalendar};

/// Every timestamp from 1 April of `start_fy - 1` through the last slot of
/// 31 March of `end_fy`, spaced by `frequency`.
///
/// Returns an empty vector when `start_fy > end_fy`.
pub fn future_timestamps(start_fy: i32, end_fy: i32, frequency: Frequency) -> Vec<NaiveDateTime> {
    if start_fy > end_fy {
        return Vec::new();
    }
    let (Some((first_day, _)), Some((_, last_day))) =
        (fiscal_year_bounds(start_fy), fiscal_year_bounds(end_fy))
    else {
        return Vec::new();
    };
    let (Some(start), Some(end_exclusive)) = (
        first_day.and_hms_opt(0, 0, 0),
        last_day.succ_opt().and_then(|d| d.and_hms_opt(0, 0, 0)),
    ) else {
        return Vec::new();
    };

    let step = frequency.step();
    let mut out = Vec::new();
    let mut ts = start;
    while ts < end_exclusive {
        out.push(ts);
        ts += step;
    }
    out
}

/// Future timestamps paired with their calendar features.
pub fn future_calendar(
    start_fy: i32,
    end_fy: i32,
    frequency: Frequency,
    holidays: &HolidayCalendar,
) -> Vec<(NaiveDateTime, CalendarFeatures)> {
    future_timestamps(start_fy, end_fy, frequency)
        .into_iter()
        .map(|ts| (ts, CalendarFeatures::derive(&ts, holidays)))
        .collect()
}

/// Forecast table over `calendar` with demand taken from `values`.
pub fn table_from_calendar(
    calendar: &[(NaiveDateTime, CalendarFeatures)],
    values: &[f64],
) -> ForecastTable {
    let rows = calendar
        .iter()
        .zip(values)
        .map(|((ts, f), v)| ForecastRow {
            timestamp: *ts,
            demand: *v,
            fiscal_year: f.fiscal_year,
            fiscal_month: f.fiscal_month,
            hour: f.hour,
        })
        .collect();
    ForecastTable::new(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::fiscal_year;

    #[test]
    fn hourly_single_year_has_8760_slots() {
        let ts = future_timestamps(2025, 2025, Frequency::Hourly);
        assert_eq!(ts.len(), 8760);
        assert_eq!(ts[0].to_string(), "2024-04-01 00:00:00");
        assert_eq!(ts[ts.len() - 1].to_string(), "2025-03-31 23:00:00");
        assert!(ts.iter().all(|t| fiscal_year(&t.date()) == 2025));
    }

    #[test]
    fn leap_fiscal_year_and_sub_hourly() {
        assert_eq!(future_timestamps(2024, 2024, Frequency::Hourly).len(), 8784);
        assert_eq!(
            future_timestamps(2025, 2026, Frequency::QuarterHourly).len(),
            2 * 365 * 96
        );
        assert_eq!(future_timestamps(2025, 2025, Frequency::Daily).len(), 365);
    }

    #[test]
    fn inverted_range_is_empty() {
        assert!(future_timestamps(2026, 2025, Frequency::Hourly).is_empty());
    }
}
