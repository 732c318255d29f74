//! Input tables: raw cells, historical demand normalisation, annual targets
//! and monthly constraint templates.

pub mod history;
pub mod table;
pub mod targets;

pub use history::{DemandRecord, HistoricalDemand, Normalizer};
pub use table::RawTable;
pub use targets::{AnnualTargets, MonthlyTemplate};
