use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};

use super::holidays::HolidayCalendar;

/// Calendar month in which a fiscal year begins.
pub const FISCAL_YEAR_START_MONTH: u32 = 4;

/// Short month labels in fiscal order (April first).
pub const FISCAL_MONTH_LABELS: [&str; 12] = [
    "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec", "Jan", "Feb", "Mar",
];

/// Fiscal year a date belongs to.
///
/// April through December of calendar year `Y` belong to `FY(Y+1)`; January
/// through March belong to `FY(Y)`.
///
/// ```
/// use chrono::NaiveDate;
/// use load_forecast::calendar::fiscal_year;
///
/// let apr = NaiveDate::from_ymd_opt(2021, 4, 1).unwrap();
/// let mar = NaiveDate::from_ymd_opt(2021, 3, 31).unwrap();
/// assert_eq!(fiscal_year(&apr), 2022);
/// assert_eq!(fiscal_year(&mar), 2021);
/// ```
pub fn fiscal_year(date: &impl Datelike) -> i32 {
    if date.month() >= FISCAL_YEAR_START_MONTH {
        date.year() + 1
    } else {
        date.year()
    }
}

/// Fiscal month of a calendar month: April is 1, March is 12.
pub fn fiscal_month(calendar_month: u32) -> u32 {
    (calendar_month + 12 - FISCAL_YEAR_START_MONTH) % 12 + 1
}

/// Calendar month of a fiscal month, inverse of [`fiscal_month`].
pub fn calendar_month(fiscal_month: u32) -> u32 {
    (fiscal_month + FISCAL_YEAR_START_MONTH - 2) % 12 + 1
}

/// First and last day of a fiscal year, both inclusive.
pub fn fiscal_year_bounds(fy: i32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(fy - 1, FISCAL_YEAR_START_MONTH, 1)?;
    let next = NaiveDate::from_ymd_opt(fy, FISCAL_YEAR_START_MONTH, 1)?;
    Some((first, next.pred_opt()?))
}

/// Number of days in a fiscal year (365 or 366).
pub fn days_in_fiscal_year(fy: i32) -> i64 {
    fiscal_year_bounds(fy).map_or(365, |(first, last)| (last - first).num_days() + 1)
}

/// Calendar attributes derived from one timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarFeatures {
    pub hour: u32,
    /// Day of week, Monday = 0.
    pub day_of_week: u32,
    pub month: u32,
    pub year: i32,
    pub fiscal_year: i32,
    pub fiscal_month: u32,
    pub is_weekend: bool,
    pub is_holiday: bool,
    /// Weekend or holiday.
    pub is_special_day: bool,
}

impl CalendarFeatures {
    /// Derives features for `timestamp`, consulting `holidays` for the date.
    pub fn derive(timestamp: &NaiveDateTime, holidays: &HolidayCalendar) -> Self {
        let date = timestamp.date();
        let is_weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
        let is_holiday = holidays.is_holiday(&date);
        Self {
            hour: timestamp.hour(),
            day_of_week: date.weekday().num_days_from_monday(),
            month: date.month(),
            year: date.year(),
            fiscal_year: fiscal_year(&date),
            fiscal_month: fiscal_month(date.month()),
            is_weekend,
            is_holiday,
            is_special_day: is_weekend || is_holiday,
        }
    }
}
