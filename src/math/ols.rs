//! Linear least squares.
//!
//! Two flavours are needed by the estimator:
//!
//! - a general SVD solver for small dense systems (each damped Levenberg–Marquardt
//!   step is solved as an augmented least-squares problem)
//! - closed-form simple linear regression for the `linear` candidate
//!
//! Implementation choices:
//! - SVD handles tall and rank-deficient systems. A breakpoint pushed outside the
//!   data range makes the Jacobian columns collinear, and we still want the
//!   minimum-norm step instead of a failure.
//!   (Nalgebra's `QR::solve` is intended for square systems and will panic for
//!   non-square matrices.)

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    if x.nrows() != y.len() || x.ncols() == 0 {
        return None;
    }
    if x.iter().any(|v| !v.is_finite()) || y.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Intercept and slope of an ordinary least-squares line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearRegression {
    pub intercept: f64,
    pub slope: f64,
}

/// Regress `y` on `x` in closed form.
///
/// Degenerate input (empty, or constant `x`) yields NaN coefficients rather than an
/// error; callers treat NaN as "no fit".
pub fn linear_regression(x: &[f64], y: &[f64]) -> LinearRegression {
    let n = x.len().min(y.len());
    if n == 0 {
        return LinearRegression {
            intercept: f64::NAN,
            slope: f64::NAN,
        };
    }

    let n_f = n as f64;
    let x_bar = x[..n].iter().sum::<f64>() / n_f;
    let y_bar = y[..n].iter().sum::<f64>() / n_f;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (&xi, &yi) in x[..n].iter().zip(&y[..n]) {
        let dx = xi - x_bar;
        sxx += dx * dx;
        sxy += dx * (yi - y_bar);
    }

    let slope = if sxx > 0.0 { sxy / sxx } else { f64::NAN };
    LinearRegression {
        intercept: y_bar - slope * x_bar,
        slope,
    }
}
