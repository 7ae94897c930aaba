//! Levenberg–Marquardt nonlinear least squares.
//!
//! Minimizes `Σ (y_i - f(x_i; p))^2` over the parameter vector `p` for a scalar
//! model `f`. The solver is deliberately small:
//!
//! - forward-difference Jacobian (the piecewise models have kinks, analytic
//!   derivatives buy nothing)
//! - each damped step solves the augmented system `[J; sqrt(λ)·D] δ = [r; 0]`
//!   with the SVD least-squares routine, so rank-deficient Jacobians are fine
//! - a bounded number of model evaluations
//!
//! The outcome always comes back as a value. A fit that exhausts its budget or
//! hits non-finite numbers reports `converged = false`; it never panics.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::math::solve_least_squares;

/// Damping above which no downhill step exists in floating point.
const MAX_DAMPING: f64 = 1e16;
const MIN_DAMPING: f64 = 1e-12;

/// Solver settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LmOptions {
    /// Maximum number of model evaluations over the whole sample.
    ///
    /// `None` means `200 * (k + 1)` for `k` parameters.
    pub max_evaluations: Option<usize>,
    /// Relative cost reduction below which the fit is considered converged.
    pub ftol: f64,
    /// Relative step size below which the fit is considered converged.
    pub xtol: f64,
    /// Cosine between residual and Jacobian columns below which the fit is converged.
    pub gtol: f64,
    /// Initial damping factor `λ`.
    pub initial_damping: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_evaluations: None,
            ftol: 1.49012e-8,
            xtol: 1.49012e-8,
            gtol: 1.49012e-8,
            initial_damping: 1e-3,
        }
    }
}

impl LmOptions {
    pub fn evaluation_budget(&self, n_params: usize) -> usize {
        self.max_evaluations.unwrap_or(200 * (n_params + 1))
    }
}

/// Why the solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    ExactFit,
    SmallCostReduction,
    SmallStep,
    SmallGradient,
    EvaluationBudget,
    NonFinite,
}

impl Termination {
    pub fn is_converged(self) -> bool {
        !matches!(self, Termination::EvaluationBudget | Termination::NonFinite)
    }
}

/// Solver result: final parameters plus a convergence flag.
#[derive(Debug, Clone)]
pub struct LmOutcome {
    pub params: Vec<f64>,
    /// Residual sum of squares at `params`.
    pub cost: f64,
    pub evaluations: usize,
    pub converged: bool,
    pub termination: Termination,
}

/// Fit `model(x, p)` to `(x, y)` starting from `p0`.
pub fn levenberg_marquardt<F>(model: F, x: &[f64], y: &[f64], p0: &[f64], opts: &LmOptions) -> LmOutcome
where
    F: Fn(f64, &[f64]) -> f64,
{
    let k = p0.len();
    let n = x.len().min(y.len());
    let budget = opts.evaluation_budget(k);

    let mut p = DVector::from_row_slice(p0);
    let mut evaluations = 0usize;

    let finish = |p: &DVector<f64>, cost: f64, evaluations: usize, termination: Termination| LmOutcome {
        params: p.iter().copied().collect(),
        cost,
        evaluations,
        converged: termination.is_converged(),
        termination,
    };

    if k == 0 || n == 0 || p.iter().any(|v| !v.is_finite()) {
        return finish(&p, f64::NAN, evaluations, Termination::NonFinite);
    }

    let y_vec = DVector::from_row_slice(&y[..n]);
    let residuals = |p: &DVector<f64>| -> DVector<f64> {
        let ps = p.as_slice();
        DVector::from_iterator(n, (0..n).map(|i| y[i] - model(x[i], ps)))
    };

    let mut r = residuals(&p);
    evaluations += 1;
    let mut cost = r.norm_squared();
    if !cost.is_finite() {
        return finish(&p, cost, evaluations, Termination::NonFinite);
    }

    let exact_tol = (f64::EPSILON * f64::EPSILON) * y_vec.norm_squared();
    let mut lambda = opts.initial_damping.max(MIN_DAMPING);

    loop {
        if cost <= exact_tol {
            return finish(&p, cost, evaluations, Termination::ExactFit);
        }
        if evaluations + k > budget {
            return finish(&p, cost, evaluations, Termination::EvaluationBudget);
        }

        let Some(jac) = jacobian(&model, x, n, &p) else {
            return finish(&p, cost, evaluations + k, Termination::NonFinite);
        };
        evaluations += k;

        if gradient_is_small(&jac, &r, opts.gtol) {
            return finish(&p, cost, evaluations, Termination::SmallGradient);
        }

        let scale: Vec<f64> = (0..k)
            .map(|j| jac.column(j).norm_squared().max(1e-12).sqrt())
            .collect();

        // Inner loop: increase damping until a step lowers the cost.
        loop {
            if evaluations >= budget {
                return finish(&p, cost, evaluations, Termination::EvaluationBudget);
            }

            let Some(delta) = damped_step(&jac, &r, &scale, lambda) else {
                lambda *= 10.0;
                if lambda > MAX_DAMPING {
                    return finish(&p, cost, evaluations, Termination::SmallStep);
                }
                continue;
            };

            let step_is_small = delta.norm() <= opts.xtol * (p.norm() + opts.xtol);
            let p_new = &p + &delta;
            let r_new = residuals(&p_new);
            evaluations += 1;
            let cost_new = r_new.norm_squared();

            if cost_new.is_finite() && cost_new < cost {
                let actual = (cost - cost_new) / cost;
                let predicted = (cost - (&r - &jac * &delta).norm_squared()) / cost;
                let lambda_used = lambda;

                p = p_new;
                r = r_new;
                cost = cost_new;
                lambda = (lambda / 10.0).max(MIN_DAMPING);

                if lambda_used <= 1.0 && actual <= opts.ftol && predicted.abs() <= opts.ftol {
                    return finish(&p, cost, evaluations, Termination::SmallCostReduction);
                }
                if step_is_small {
                    return finish(&p, cost, evaluations, Termination::SmallStep);
                }
                break;
            }

            if step_is_small {
                return finish(&p, cost, evaluations, Termination::SmallStep);
            }
            lambda *= 10.0;
            if lambda > MAX_DAMPING {
                return finish(&p, cost, evaluations, Termination::SmallStep);
            }
        }
    }
}

/// Forward-difference Jacobian of the model (not of the residuals).
fn jacobian<F>(model: &F, x: &[f64], n: usize, p: &DVector<f64>) -> Option<DMatrix<f64>>
where
    F: Fn(f64, &[f64]) -> f64,
{
    let k = p.len();
    let ps = p.as_slice();
    let base: Vec<f64> = (0..n).map(|i| model(x[i], ps)).collect();

    let mut jac = DMatrix::<f64>::zeros(n, k);
    let mut shifted = ps.to_vec();
    for j in 0..k {
        let h = f64::EPSILON.sqrt() * ps[j].abs().max(1.0);
        shifted[j] = ps[j] + h;
        for i in 0..n {
            jac[(i, j)] = (model(x[i], &shifted) - base[i]) / h;
        }
        shifted[j] = ps[j];
    }

    if jac.iter().all(|v| v.is_finite()) {
        Some(jac)
    } else {
        None
    }
}

fn gradient_is_small(jac: &DMatrix<f64>, r: &DVector<f64>, gtol: f64) -> bool {
    let r_norm = r.norm();
    if r_norm == 0.0 {
        return true;
    }
    let g = jac.transpose() * r;
    let mut worst: f64 = 0.0;
    for j in 0..jac.ncols() {
        let col_norm = jac.column(j).norm();
        if col_norm > 0.0 {
            worst = worst.max(g[j].abs() / (col_norm * r_norm));
        }
    }
    worst <= gtol
}

fn damped_step(jac: &DMatrix<f64>, r: &DVector<f64>, scale: &[f64], lambda: f64) -> Option<DVector<f64>> {
    let n = jac.nrows();
    let k = jac.ncols();
    let sqrt_lambda = lambda.sqrt();

    let mut a = DMatrix::<f64>::zeros(n + k, k);
    a.view_mut((0, 0), (n, k)).copy_from(jac);
    for j in 0..k {
        a[(n + j, j)] = sqrt_lambda * scale[j];
    }
    let mut b = DVector::<f64>::zeros(n + k);
    b.rows_mut(0, n).copy_from(r);

    solve_least_squares(&a, &b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(x: f64, p: &[f64]) -> f64 {
        p[0] + p[1] * x
    }

    #[test]
    fn recovers_linear_parameters() {
        let x: Vec<f64> = (0..20).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|&v| 0.3 + 1.7 * v).collect();
        let out = levenberg_marquardt(line, &x, &y, &[0.0, 0.0], &LmOptions::default());
        assert!(out.converged, "termination: {:?}", out.termination);
        assert!((out.params[0] - 0.3).abs() < 1e-6);
        assert!((out.params[1] - 1.7).abs() < 1e-6);
    }

    #[test]
    fn recovers_exponential_decay() {
        let model = |x: f64, p: &[f64]| p[0] * (-p[1] * x).exp();
        let x: Vec<f64> = (0..30).map(|i| i as f64 * 0.2).collect();
        let y: Vec<f64> = x.iter().map(|&v| 2.5 * (-0.8 * v).exp()).collect();
        let out = levenberg_marquardt(model, &x, &y, &[1.0, 0.3], &LmOptions::default());
        assert!(out.converged);
        assert!((out.params[0] - 2.5).abs() < 1e-5);
        assert!((out.params[1] - 0.8).abs() < 1e-5);
    }

    #[test]
    fn non_finite_start_is_reported() {
        let x = [0.0, 1.0, 2.0];
        let y = [1.0, 2.0, 3.0];
        let out = levenberg_marquardt(line, &x, &y, &[f64::NAN, 1.0], &LmOptions::default());
        assert!(!out.converged);
        assert_eq!(out.termination, Termination::NonFinite);
    }

    #[test]
    fn tiny_budget_reports_non_convergence() {
        let model = |x: f64, p: &[f64]| p[0] * (-p[1] * x).exp();
        let x: Vec<f64> = (0..30).map(|i| i as f64 * 0.2).collect();
        let y: Vec<f64> = x.iter().map(|&v| 2.5 * (-0.8 * v).exp()).collect();
        let opts = LmOptions {
            max_evaluations: Some(4),
            ..LmOptions::default()
        };
        let out = levenberg_marquardt(model, &x, &y, &[1.0, 0.3], &opts);
        assert!(!out.converged);
        assert_eq!(out.termination, Termination::EvaluationBudget);
        assert!(out.evaluations <= 4);
    }

    #[test]
    fn default_budget_scales_with_parameters() {
        let opts = LmOptions::default();
        assert_eq!(opts.evaluation_budget(1), 400);
        assert_eq!(opts.evaluation_budget(4), 1000);
    }
}
