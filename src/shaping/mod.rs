//! Post-generation transforms: monthly and annual constraints, and
//! load-factor reshaping.

pub mod constraints;
pub mod load_factor;

pub use constraints::{ConstraintSet, ConstraintSource, annual_rescale, apply_constraints};
pub use load_factor::{LoadFactorImprovement, YearReshape, apply_improvement};
