//! Regime fitting orchestration.
//!
//! Responsibilities:
//!
//! - seed piecewise fits from a least-squares breakpoint grid (`breakpoint_grid`)
//! - fit each candidate shape to standardized SM (`fitter`)
//! - score candidates with gated AIC and derive physical parameters (`selection`)
//! - tie both together per sample, memoized (`estimator`)

pub mod breakpoint_grid;
pub mod estimator;
pub mod fitter;
pub mod selection;

pub use breakpoint_grid::*;
pub use estimator::*;
pub use fitter::*;
pub use selection::*;
