//! `lac-regimes` library crate.
//!
//! Estimates land-atmosphere coupling regimes from paired soil moisture (SM) and
//! evaporative fraction (EF) samples. The binary (`lacr`) is a thin wrapper around
//! this library so that the estimator is testable without spawning processes.

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
