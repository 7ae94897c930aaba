//! Low-level fitting routines for a single candidate shape.
//!
//! Given:
//! - standardized soil moisture `x_std`
//! - evaporative fraction `y`
//!
//! each routine returns a [`FitOutcome`]: fitted parameters, or the reason the fit
//! was abandoned. Failures are values, never errors; they turn into NaN parameter
//! vectors at the output boundary.
//!
//! Piecewise shapes are refined from several starting points: the fixed initial
//! guess, and the best point of a breakpoint grid solved by least squares (see
//! `breakpoint_grid`). The lowest-cost converged solve wins. Fitting order
//! matters for the two-breakpoint shape: it only runs when the one-breakpoint fits
//! give consistent breakpoints.

use tracing::debug;

use crate::domain::{EstimatorConfig, FitFailure, FitOutcome, ModelParams, RegimeModel};
use crate::fit::breakpoint_grid::{best_grid_start, breakpoint_pair_grid, single_breakpoint_grid};
use crate::math::{
    LmOutcome, Termination, levenberg_marquardt, linear_regression, linspace, max, mean, min, percentile,
};
use crate::models::{eval_slice, predict};

/// Flat model, solved iteratively from `y0 = mean(y)`.
pub fn fit_flat(x_std: &[f64], y: &[f64], config: &EstimatorConfig) -> FitOutcome {
    run_solver(RegimeModel::Flat, x_std, y, &[vec![mean(y)]], config)
}

/// Linear model, closed-form regression of `y` on `x_std`.
pub fn fit_linear(x_std: &[f64], y: &[f64]) -> FitOutcome {
    let lr = linear_regression(x_std, y);
    let params = ModelParams::Linear {
        intercept: lr.intercept,
        slope: lr.slope,
    };
    let outcome = if params.is_finite() {
        FitOutcome::Converged {
            params,
            evaluations: 0,
        }
    } else {
        FitOutcome::Failed {
            model: RegimeModel::Linear,
            reason: FitFailure::NonFinite,
        }
    };
    log_outcome(&outcome);
    outcome
}

/// One-breakpoint model (dry-to-transitional or transitional-to-wet).
///
/// Starts: breakpoint at `mean(x_std)`, level `mean(y)`, slope
/// `config.initial_slope`; and the best point of the breakpoint grid.
pub fn fit_one_breakpoint(
    model: RegimeModel,
    x_std: &[f64],
    y: &[f64],
    config: &EstimatorConfig,
) -> FitOutcome {
    debug_assert!(matches!(
        model,
        RegimeModel::DryToTransitional | RegimeModel::TransitionalToWet
    ));
    let mut starts = vec![vec![mean(x_std), mean(y), config.initial_slope]];
    let grid = single_breakpoint_grid(x_std, config.breakpoint_grid_steps);
    starts.extend(best_grid_start(model, &grid, x_std, y).map(|(p0, _)| p0));
    run_solver(model, x_std, y, &starts, config)
}

/// Two-breakpoint model seeded with the one-breakpoint estimates.
///
/// `wilt` comes from the dry-to-transitional fit and `crit` from the
/// transitional-to-wet fit. When `crit - wilt <= 0` (or either is NaN) the shapes
/// are inconsistent and no solve is attempted. Otherwise the solve starts from
/// `[wilt, crit, percentile(y), initial_slope]` and from the best grid pair.
pub fn fit_two_breakpoint(
    x_std: &[f64],
    y: &[f64],
    wilt: f64,
    crit: f64,
    config: &EstimatorConfig,
) -> FitOutcome {
    let model = RegimeModel::DryToTransitionalToWet;
    if !(crit - wilt > 0.0) {
        debug!(model = %model, wilt, crit, "skipping two-breakpoint fit: inconsistent seeds");
        return FitOutcome::Failed {
            model,
            reason: FitFailure::InconsistentSeeds,
        };
    }

    let mut starts = vec![vec![
        wilt,
        crit,
        percentile(y, config.floor_percentile),
        config.initial_slope,
    ]];
    let grid = breakpoint_pair_grid(x_std, config.breakpoint_grid_steps);
    starts.extend(best_grid_start(model, &grid, x_std, y).map(|(p0, _)| p0));
    reject_unordered_breakpoints(run_solver(model, x_std, y, &starts, config))
}

/// A converged two-breakpoint fit must keep `x0 <= x1`.
fn reject_unordered_breakpoints(outcome: FitOutcome) -> FitOutcome {
    match outcome {
        FitOutcome::Converged {
            params: ModelParams::DryToTransitionalToWet { x0, x1, .. },
            ..
        } if x0 > x1 => {
            let model = RegimeModel::DryToTransitionalToWet;
            debug!(model = %model, x0, x1, "rejecting two-breakpoint fit: breakpoints out of order");
            FitOutcome::Failed {
                model,
                reason: FitFailure::UnorderedBreakpoints,
            }
        }
        outcome => outcome,
    }
}

/// Refine every start with Levenberg–Marquardt and keep the lowest-cost converged
/// solve. Each start has its own evaluation budget.
///
/// When no start converges, the failure of the first start is reported.
fn run_solver(
    model: RegimeModel,
    x_std: &[f64],
    y: &[f64],
    starts: &[Vec<f64>],
    config: &EstimatorConfig,
) -> FitOutcome {
    let mut best: Option<LmOutcome> = None;
    let mut failure: Option<FitFailure> = None;

    for (start, p0) in starts.iter().enumerate() {
        let solved = levenberg_marquardt(|x, p| eval_slice(model, x, p), x_std, y, p0, &config.solver);
        debug!(
            model = %model,
            start,
            evaluations = solved.evaluations,
            termination = ?solved.termination,
            cost = solved.cost,
            "solver finished"
        );

        let usable = solved.converged && solved.params.iter().all(|v| v.is_finite());
        if !usable {
            let reason = if solved.converged || solved.termination == Termination::NonFinite {
                FitFailure::NonFinite
            } else {
                FitFailure::NotConverged
            };
            failure.get_or_insert(reason);
            continue;
        }
        if best.as_ref().is_none_or(|b| solved.cost < b.cost) {
            best = Some(solved);
        }
    }

    let outcome = match best.and_then(|solved| {
        ModelParams::from_slice(model, &solved.params).map(|params| (params, solved.evaluations))
    }) {
        Some((params, evaluations)) => FitOutcome::Converged {
            params,
            evaluations,
        },
        None => FitOutcome::Failed {
            model,
            reason: failure.unwrap_or(FitFailure::NotConverged),
        },
    };
    log_outcome(&outcome);
    outcome
}

fn log_outcome(outcome: &FitOutcome) {
    match outcome {
        FitOutcome::Converged { params, .. } => {
            debug!(model = %params.model(), params = ?params.to_vec(), "fit converged");
        }
        FitOutcome::Failed { model, reason } => {
            debug!(model = %model, reason = reason.describe(), "fit failed");
        }
    }
}

/// Evaluation grid: `n` evenly spaced points over `[min(x_std), max(x_std)]`.
pub fn prediction_grid(x_std: &[f64]) -> Vec<f64> {
    linspace(min(x_std), max(x_std), x_std.len())
}

/// Predicted EF for a candidate, on the evaluation grid.
///
/// The flat model is constant, so it is emitted directly.
pub fn predicted_values(params: &ModelParams, x_std: &[f64]) -> Vec<f64> {
    match params {
        ModelParams::Flat { y0 } => vec![*y0; x_std.len()],
        _ => prediction_grid(x_std).into_iter().map(|x| predict(params, x)).collect(),
    }
}

/// `y - predicted`, index by index.
pub fn residuals(y: &[f64], predicted: &[f64]) -> Vec<f64> {
    y.iter().zip(predicted).map(|(yi, pi)| yi - pi).collect()
}

pub fn sum_of_squares(residuals: &[f64]) -> f64 {
    residuals.iter().map(|r| r * r).sum()
}
