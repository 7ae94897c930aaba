//! Model evaluation for the five regime shapes.
//!
//! Each shape is a pure function of standardized SM and its parameters. The
//! fitter works on flat parameter slices (what the solver iterates on), so
//! `eval_slice` bridges the typed `ModelParams` and the raw vectors.

use crate::domain::{ModelParams, RegimeModel};

/// `y0` everywhere.
pub fn flat(_x: f64, y0: f64) -> f64 {
    y0
}

pub fn linear(x: f64, intercept: f64, slope: f64) -> f64 {
    intercept + slope * x
}

/// Constant `y0` below `x0`, line of slope `k1` through `(x0, y0)` above it.
pub fn piecewise_linear_dt(x: f64, x0: f64, y0: f64, k1: f64) -> f64 {
    if x < x0 { y0 } else { k1 * x + y0 - k1 * x0 }
}

/// Line of slope `k1` through `(x0, y0)` below `x0`, constant `y0` above it.
pub fn piecewise_linear_tw(x: f64, x0: f64, y0: f64, k1: f64) -> f64 {
    if x < x0 { k1 * x + y0 - k1 * x0 } else { y0 }
}

/// Constant `y0` below `x0`, slope `k1` between `x0` and `x1`, constant above `x1`.
///
/// `x0 <= x1` is expected but not enforced here.
pub fn piecewise_linear_dtw(x: f64, x0: f64, x1: f64, y0: f64, k1: f64) -> f64 {
    if x < x0 {
        y0
    } else if x < x1 {
        k1 * (x - x0) + y0
    } else {
        k1 * (x1 - x0) + y0
    }
}

/// Predict EF at standardized SM `x`.
pub fn predict(params: &ModelParams, x: f64) -> f64 {
    match *params {
        ModelParams::Flat { y0 } => flat(x, y0),
        ModelParams::Linear { intercept, slope } => linear(x, intercept, slope),
        ModelParams::DryToTransitional { x0, y0, k1 } => piecewise_linear_dt(x, x0, y0, k1),
        ModelParams::TransitionalToWet { x0, y0, k1 } => piecewise_linear_tw(x, x0, y0, k1),
        ModelParams::DryToTransitionalToWet { x0, x1, y0, k1 } => {
            piecewise_linear_dtw(x, x0, x1, y0, k1)
        }
    }
}

/// Evaluate a model from a raw parameter slice laid out as `ModelParams::to_vec`.
///
/// # Panics
/// Panics if `p` is shorter than `model.param_count()`.
pub fn eval_slice(model: RegimeModel, x: f64, p: &[f64]) -> f64 {
    match model {
        RegimeModel::Flat => flat(x, p[0]),
        RegimeModel::Linear => linear(x, p[0], p[1]),
        RegimeModel::DryToTransitional => piecewise_linear_dt(x, p[0], p[1], p[2]),
        RegimeModel::TransitionalToWet => piecewise_linear_tw(x, p[0], p[1], p[2]),
        RegimeModel::DryToTransitionalToWet => piecewise_linear_dtw(x, p[0], p[1], p[2], p[3]),
    }
}

/// RSS form of the Akaike Information Criterion: `2k + n ln(RSS / n)`.
///
/// Assumes i.i.d. Gaussian residuals. `RSS = 0` gives `-inf`.
pub fn aic_from_rss(k: usize, n: usize, rss: f64) -> f64 {
    let n_f = n as f64;
    2.0 * k as f64 + n_f * (rss / n_f).ln()
}
