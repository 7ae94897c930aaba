//! Domain types used throughout the estimator.
//!
//! This module defines:
//!
//! - the candidate regime shapes (`RegimeModel`) and their parameters (`ModelParams`)
//! - per-candidate fit outcomes (`FitOutcome`, `FitFailure`)
//! - estimator configuration and serializable summaries (`EstimatorConfig`, `RegimeSummary`)

pub mod types;

pub use types::*;
