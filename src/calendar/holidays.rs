use std::collections::BTreeSet;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use tracing::{debug, warn};

use crate::error::{ComputationWarning, DataError};

/// Widest year span a calendar may cover.
const MAX_YEAR_SPAN: i32 = 200;

/// Read-only set of holiday dates for one region/subdivision.
///
/// Built once and shared by reference; there is no way to add dates after
/// construction.
#[derive(Debug, Clone, Default)]
pub struct HolidayCalendar {
    label: String,
    dates: BTreeSet<NaiveDate>,
}

impl HolidayCalendar {
    /// Calendar that flags no holidays.
    pub fn empty() -> Self {
        Self {
            label: "none".to_string(),
            dates: BTreeSet::new(),
        }
    }

    /// Calendar holding exactly the given dates.
    pub fn from_dates(label: &str, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            label: label.to_string(),
            dates: dates.into_iter().collect(),
        }
    }

    /// Builds the calendar for `region`/`subdivision` across
    /// `first_year..=last_year`, merged with `extra` dates.
    ///
    /// # Errors
    ///
    /// Returns `DataError::Calendar` for an unknown region or subdivision or an
    /// invalid year range.
    pub fn build(
        region: &str,
        subdivision: Option<&str>,
        first_year: i32,
        last_year: i32,
        extra: &[NaiveDate],
    ) -> Result<Self, DataError> {
        if first_year > last_year {
            return Err(DataError::Calendar(format!(
                "year range {first_year}..={last_year} is empty"
            )));
        }
        if last_year - first_year > MAX_YEAR_SPAN {
            return Err(DataError::Calendar(format!(
                "year range {first_year}..={last_year} exceeds {MAX_YEAR_SPAN} years"
            )));
        }

        let region_upper = region.trim().to_ascii_uppercase();
        let sub_upper = subdivision.map(|s| s.trim().to_ascii_uppercase());
        let mut dates = BTreeSet::new();

        for year in first_year..=last_year {
            match region_upper.as_str() {
                "IN" => india(year, sub_upper.as_deref(), &mut dates)?,
                "US" => united_states(year, sub_upper.as_deref(), &mut dates)?,
                other => {
                    return Err(DataError::Calendar(format!(
                        "unsupported region \"{other}\" (expected IN or US)"
                    )));
                }
            }
        }
        dates.extend(extra.iter().copied());

        let label = match &sub_upper {
            Some(sub) => format!("{region_upper}-{sub}"),
            None => region_upper,
        };
        debug!(calendar = %label, holidays = dates.len(), "holiday calendar built");
        Ok(Self { label, dates })
    }

    /// Like [`HolidayCalendar::build`] but degrades to an empty calendar.
    ///
    /// The returned warning is `Some` when construction failed.
    pub fn build_or_empty(
        region: &str,
        subdivision: Option<&str>,
        first_year: i32,
        last_year: i32,
        extra: &[NaiveDate],
    ) -> (Self, Option<ComputationWarning>) {
        match Self::build(region, subdivision, first_year, last_year, extra) {
            Ok(calendar) => (calendar, None),
            Err(e) => {
                warn!("holiday calendar construction failed, continuing without holidays: {e}");
                let warning = ComputationWarning::CalendarDegraded {
                    reason: e.to_string(),
                };
                (Self::empty(), Some(warning))
            }
        }
    }

    pub fn is_holiday(&self, date: &NaiveDate) -> bool {
        self.dates.contains(date)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

fn ymd(year: i32, month: u32, day: u32) -> Result<NaiveDate, DataError> {
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| DataError::Calendar(format!("invalid date {year}-{month:02}-{day:02}")))
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u8) -> Result<NaiveDate, DataError> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n).ok_or_else(|| {
        DataError::Calendar(format!("no {weekday:?} #{n} in {year}-{month:02}"))
    })
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Result<NaiveDate, DataError> {
    let next_month = if month == 12 {
        ymd(year + 1, 1, 1)?
    } else {
        ymd(year, month + 1, 1)?
    };
    let mut day = next_month - Duration::days(1);
    while day.weekday() != weekday {
        day -= Duration::days(1);
    }
    Ok(day)
}

/// Moves a fixed-date holiday off the weekend: Saturday to Friday, Sunday to Monday.
fn observed(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

fn india(year: i32, subdivision: Option<&str>, dates: &mut BTreeSet<NaiveDate>) -> Result<(), DataError> {
    dates.insert(ymd(year, 1, 26)?); // Republic Day
    dates.insert(ymd(year, 8, 15)?); // Independence Day
    dates.insert(ymd(year, 10, 2)?); // Gandhi Jayanti
    dates.insert(ymd(year, 12, 25)?);

    match subdivision {
        None => {}
        Some("KL") => {
            dates.insert(ymd(year, 11, 1)?); // Kerala Piravi
        }
        Some("KA") => {
            dates.insert(ymd(year, 11, 1)?); // Kannada Rajyotsava
        }
        Some("MH") | Some("GJ") => {
            dates.insert(ymd(year, 5, 1)?); // state formation day
        }
        Some("TN") => {
            dates.insert(ymd(year, 1, 15)?); // Thai Pongal
        }
        Some(other) => {
            return Err(DataError::Calendar(format!(
                "unsupported IN subdivision \"{other}\""
            )));
        }
    }
    Ok(())
}

fn united_states(
    year: i32,
    subdivision: Option<&str>,
    dates: &mut BTreeSet<NaiveDate>,
) -> Result<(), DataError> {
    dates.insert(observed(ymd(year, 1, 1)?));
    dates.insert(nth_weekday(year, 1, Weekday::Mon, 3)?); // MLK Day
    dates.insert(nth_weekday(year, 2, Weekday::Mon, 3)?); // Washington's Birthday
    dates.insert(last_weekday(year, 5, Weekday::Mon)?); // Memorial Day
    if year >= 2021 {
        dates.insert(observed(ymd(year, 6, 19)?));
    }
    dates.insert(observed(ymd(year, 7, 4)?));
    dates.insert(nth_weekday(year, 9, Weekday::Mon, 1)?); // Labor Day
    dates.insert(nth_weekday(year, 10, Weekday::Mon, 2)?); // Columbus Day
    dates.insert(observed(ymd(year, 11, 11)?));
    dates.insert(nth_weekday(year, 11, Weekday::Thu, 4)?); // Thanksgiving
    dates.insert(observed(ymd(year, 12, 25)?));

    match subdivision {
        None => {}
        Some("CA") => {
            let thanksgiving = nth_weekday(year, 11, Weekday::Thu, 4)?;
            dates.insert(thanksgiving + Duration::days(1));
        }
        Some("TX") => {
            dates.insert(ymd(year, 3, 2)?); // Texas Independence Day
        }
        Some(other) => {
            return Err(DataError::Calendar(format!(
                "unsupported US subdivision \"{other}\""
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn india_national_holidays() {
        let cal = HolidayCalendar::build("IN", None, 2022, 2023, &[]).unwrap();
        assert!(cal.is_holiday(&date(2022, 8, 15)));
        assert!(cal.is_holiday(&date(2023, 1, 26)));
        assert!(!cal.is_holiday(&date(2023, 1, 27)));
        assert_eq!(cal.len(), 8);
        assert_eq!(cal.label(), "IN");
    }

    #[test]
    fn subdivision_adds_state_day() {
        let cal = HolidayCalendar::build("in", Some("kl"), 2023, 2023, &[]).unwrap();
        assert!(cal.is_holiday(&date(2023, 11, 1)));
        assert_eq!(cal.label(), "IN-KL");
    }

    #[test]
    fn us_floating_holidays() {
        let cal = HolidayCalendar::build("US", None, 2023, 2023, &[]).unwrap();
        assert!(cal.is_holiday(&date(2023, 11, 23))); // Thanksgiving
        assert!(cal.is_holiday(&date(2023, 5, 29))); // Memorial Day
        assert!(cal.is_holiday(&date(2023, 9, 4))); // Labor Day
        // 2023-07-04 is a Tuesday, no shift.
        assert!(cal.is_holiday(&date(2023, 7, 4)));
        // 2022-12-25 is a Sunday, observed Monday.
        let cal = HolidayCalendar::build("US", None, 2022, 2022, &[]).unwrap();
        assert!(cal.is_holiday(&date(2022, 12, 26)));
    }

    #[test]
    fn unknown_region_degrades_to_empty() {
        let extra = [date(2023, 3, 8)];
        let (cal, warning) = HolidayCalendar::build_or_empty("XX", None, 2022, 2023, &extra);
        assert!(warning.is_some());
        assert!(cal.is_empty());
        assert!(!cal.is_holiday(&date(2023, 3, 8)));
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(HolidayCalendar::build("IN", None, 2025, 2020, &[]).is_err());
    }
}
