//! Reporting utilities: terminal formatting of estimator results.

pub mod format;

pub use format::*;
