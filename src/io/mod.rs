//! CSV and JSON input/output.

pub mod export;
pub mod import;
