//! Numeric building blocks for the decomposition forecaster.

pub mod smoothing;
pub mod stl;

pub use stl::{StlComponents, StlError, StlOptions, decompose};
