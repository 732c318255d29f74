//! Fiscal calendar arithmetic and holiday lookup.

/// April-start fiscal year and per-timestamp calendar features.
pub mod fiscal;
/// Immutable holiday calendars for supported regions.
pub mod holidays;

pub use fiscal::{CalendarFeatures, fiscal_month, fiscal_year};
pub use holidays::HolidayCalendar;
