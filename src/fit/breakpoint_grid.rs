//! Breakpoint grid search.
//!
//! With the breakpoints held fixed, every piecewise shape is linear in its level
//! `y0` and slope `k1`. We scan a deterministic grid of breakpoints over the
//! sample range, solve `(y0, k1)` by least squares for each, and keep the lowest
//! RSS. The winner is the starting point of the nonlinear refinement, which
//! would otherwise wander off from a poor initial slope.

use nalgebra::{DMatrix, DVector};

use crate::domain::RegimeModel;
use crate::math::{linspace, max, min, solve_least_squares};

/// `steps` evenly spaced breakpoint candidates over `[min(x_std), max(x_std)]`.
pub fn breakpoint_values(x_std: &[f64], steps: usize) -> Vec<f64> {
    let (lo, hi) = (min(x_std), max(x_std));
    if !(lo.is_finite() && hi.is_finite()) || steps == 0 {
        return Vec::new();
    }
    linspace(lo, hi, steps)
}

/// One-breakpoint grid: `[x0]`.
pub fn single_breakpoint_grid(x_std: &[f64], steps: usize) -> Vec<Vec<f64>> {
    breakpoint_values(x_std, steps).into_iter().map(|b| vec![b]).collect()
}

/// Two-breakpoint grid: `[x0, x1]` with `x0 < x1`.
pub fn breakpoint_pair_grid(x_std: &[f64], steps: usize) -> Vec<Vec<f64>> {
    let values = breakpoint_values(x_std, steps);
    let mut out = Vec::new();
    for i in 0..values.len() {
        for j in (i + 1)..values.len() {
            out.push(vec![values[i], values[j]]);
        }
    }
    out
}

/// Regressor multiplying `k1` at `x`, given the breakpoints.
fn ramp(model: RegimeModel, x: f64, breakpoints: &[f64]) -> f64 {
    match (model, breakpoints) {
        (RegimeModel::DryToTransitional, [x0]) => (x - x0).max(0.0),
        (RegimeModel::TransitionalToWet, [x0]) => (x - x0).min(0.0),
        (RegimeModel::DryToTransitionalToWet, [x0, x1]) => x.clamp(*x0, *x1) - x0,
        _ => f64::NAN,
    }
}

/// Best grid point for a piecewise model as a full parameter vector
/// (breakpoints, then `y0`, then `k1`), with its RSS.
///
/// `None` when no grid point admits a finite least-squares solve.
pub fn best_grid_start(
    model: RegimeModel,
    grid: &[Vec<f64>],
    x_std: &[f64],
    y: &[f64],
) -> Option<(Vec<f64>, f64)> {
    let n = x_std.len().min(y.len());
    let y_vec = DVector::from_row_slice(&y[..n]);
    let mut best: Option<(Vec<f64>, f64)> = None;

    for breakpoints in grid {
        let design = DMatrix::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { ramp(model, x_std[i], breakpoints) });
        let Some(beta) = solve_least_squares(&design, &y_vec) else {
            continue;
        };
        let rss = (&y_vec - &design * &beta).norm_squared();
        if !rss.is_finite() {
            continue;
        }
        // Strict `<` keeps the first grid point on ties.
        if best.as_ref().is_none_or(|(_, best_rss)| rss < *best_rss) {
            let mut params = breakpoints.clone();
            params.extend([beta[0], beta[1]]);
            best = Some((params, rss));
        }
    }
    best
}
