//! `RegimeEstimator`: fits every candidate shape to one (SM, EF) sample and derives
//! the coupling regime.
//!
//! The estimator is immutable after construction. Fits are memoized with
//! `OnceLock`, so repeated accessor calls return identical values and each
//! nonlinear solve runs at most once per sample.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use tracing::debug;

use crate::domain::{
    AicScore, BestParams, CandidateSummary, EstimatorConfig, FitOutcome, ModelParams, RegimeModel, RegimeSummary,
    SampleStats, finite_or_none,
};
use crate::error::AppError;
use crate::fit::fitter::{
    fit_flat, fit_linear, fit_one_breakpoint, fit_two_breakpoint, predicted_values, residuals, sum_of_squares,
};
use crate::fit::selection::{
    best_params, gated_aics, resolved_slope, select_best, to_physical, transitional_fraction,
};
use crate::math::{max, mean, min, std_dev};

/// Land-atmosphere coupling regime estimator over a single sample.
#[derive(Debug)]
pub struct RegimeEstimator {
    x: Vec<f64>,
    x_std: Vec<f64>,
    y: Vec<f64>,
    x_mean: f64,
    x_sd: f64,
    x_max: f64,
    config: EstimatorConfig,
    fits: [OnceLock<FitOutcome>; 5],
}

impl RegimeEstimator {
    /// Build an estimator with the default configuration.
    ///
    /// `sm` and `ef` must have the same, non-zero length.
    pub fn new(sm: &[f64], ef: &[f64]) -> Result<Self, AppError> {
        Self::with_config(sm, ef, EstimatorConfig::default())
    }

    pub fn with_config(sm: &[f64], ef: &[f64], config: EstimatorConfig) -> Result<Self, AppError> {
        if sm.len() != ef.len() {
            return Err(AppError::new(
                2,
                format!("SM and EF lengths differ: {} vs {}.", sm.len(), ef.len()),
            ));
        }
        if sm.is_empty() {
            return Err(AppError::new(3, "Empty sample: nothing to estimate."));
        }

        let x_mean = mean(sm);
        let x_sd = std_dev(sm);
        let x_std = sm.iter().map(|v| (v - x_mean) / x_sd).collect();

        Ok(Self {
            x: sm.to_vec(),
            x_std,
            y: ef.to_vec(),
            x_mean,
            x_sd,
            x_max: max(sm),
            config,
            fits: Default::default(),
        })
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn sm(&self) -> &[f64] {
        &self.x
    }

    pub fn ef(&self) -> &[f64] {
        &self.y
    }

    /// Standardized soil moisture, `(sm - mean) / std`.
    pub fn sm_std(&self) -> &[f64] {
        &self.x_std
    }

    /// Memoized fit outcome of one candidate.
    pub fn fit_outcome(&self, model: RegimeModel) -> &FitOutcome {
        self.fits[model.code() as usize].get_or_init(|| self.compute_fit(model))
    }

    fn compute_fit(&self, model: RegimeModel) -> FitOutcome {
        let (x, y, config) = (&self.x_std, &self.y, &self.config);
        match model {
            RegimeModel::Flat => fit_flat(x, y, config),
            RegimeModel::Linear => fit_linear(x, y),
            RegimeModel::DryToTransitional | RegimeModel::TransitionalToWet => {
                fit_one_breakpoint(model, x, y, config)
            }
            RegimeModel::DryToTransitionalToWet => {
                let wilt = self.fit(RegimeModel::DryToTransitional).to_vec()[0];
                let crit = self.fit(RegimeModel::TransitionalToWet).to_vec()[0];
                fit_two_breakpoint(x, y, wilt, crit, config)
            }
        }
    }

    /// Fitted parameters in standardized space (all NaN when the fit failed).
    pub fn fit(&self, model: RegimeModel) -> ModelParams {
        self.fit_outcome(model).params()
    }

    /// Predicted EF on an evenly spaced grid over the standardized SM range.
    pub fn predicted(&self, model: RegimeModel) -> Vec<f64> {
        predicted_values(&self.fit(model), &self.x_std)
    }

    pub fn residuals(&self, model: RegimeModel) -> Vec<f64> {
        residuals(&self.y, &self.predicted(model))
    }

    /// Residual sum of squares.
    ///
    /// An all-NaN two-breakpoint residual vector is replaced by the
    /// `skipped_rss` sentinel so that its AIC stays comparable.
    pub fn rss(&self, model: RegimeModel) -> f64 {
        let res = self.residuals(model);
        if model == RegimeModel::DryToTransitionalToWet && res.iter().all(|r| r.is_nan()) {
            return self.config.skipped_rss;
        }
        sum_of_squares(&res)
    }

    pub fn all_fits(&self) -> BTreeMap<RegimeModel, ModelParams> {
        RegimeModel::ALL.into_iter().map(|m| (m, self.fit(m))).collect()
    }

    /// Gated AIC scores per candidate.
    pub fn aic_scores(&self) -> BTreeMap<RegimeModel, AicScore> {
        gated_aics(self.len(), &self.config, |m| self.rss(m))
    }

    /// AIC per candidate; candidates removed by the gates carry `suppressed_aic`.
    pub fn all_aics(&self) -> BTreeMap<RegimeModel, f64> {
        self.aic_scores()
            .into_iter()
            .map(|(m, score)| (m, score.or_sentinel(self.config.suppressed_aic)))
            .collect()
    }

    /// Minimum-AIC model.
    ///
    /// Fails when no candidate has a comparable (non-NaN) AIC.
    pub fn best_model(&self) -> Result<RegimeModel, AppError> {
        let aics = self.aic_scores();
        let best = select_best(&aics).ok_or_else(|| {
            AppError::new(4, "No candidate model has a finite AIC; cannot select a regime.")
        })?;
        debug!(best = %best, aic = ?aics[&best].value(), "selected regime model");
        Ok(best)
    }

    pub fn best_model_code(&self) -> Result<u8, AppError> {
        self.best_model().map(RegimeModel::code)
    }

    /// Wilting point, critical point and slope of the best model, standardized.
    pub fn best_model_params(&self) -> BestParams {
        match self.best_model() {
            Ok(best) => best_params(&self.fit(best)),
            Err(_) => BestParams::NAN,
        }
    }

    /// Wilting point in physical SM units, or NaN.
    pub fn wilting_point(&self) -> f64 {
        self.physical(self.best_model_params().wilt)
    }

    /// Critical point in physical SM units, or NaN.
    pub fn critical_point(&self) -> f64 {
        self.physical(self.best_model_params().crit)
    }

    /// dEF/dSM (per standardized SM unit) when a wilting or critical point exists.
    pub fn slope(&self) -> f64 {
        resolved_slope(self.best_model_params().slope, self.wilting_point(), self.critical_point())
    }

    /// Percentage of the sample inside the transitional regime.
    pub fn transitional_fraction(&self) -> f64 {
        match self.best_model() {
            Ok(best) => transitional_fraction(best, &self.best_model_params(), &self.x_std),
            Err(_) => f64::NAN,
        }
    }

    fn physical(&self, value_std: f64) -> f64 {
        to_physical(value_std, self.x_mean, self.x_sd, self.x_max)
    }

    pub fn stats(&self) -> SampleStats {
        SampleStats {
            n_points: self.len(),
            sm_min: min(&self.x),
            sm_max: self.x_max,
            sm_mean: self.x_mean,
            sm_std: self.x_sd,
            ef_min: min(&self.y),
            ef_max: max(&self.y),
            period_start: None,
            period_end: None,
        }
    }

    /// Collect every derived quantity in one serializable value.
    pub fn summary(&self) -> RegimeSummary {
        let aics = self.aic_scores();
        let best = select_best(&aics);
        let candidates = RegimeModel::ALL
            .into_iter()
            .map(|model| {
                let outcome = self.fit_outcome(model);
                let score = aics[&model];
                CandidateSummary {
                    model,
                    converged: outcome.is_converged(),
                    failure: outcome.failure(),
                    params: outcome.params().to_vec().into_iter().map(finite_or_none).collect(),
                    rss: if score.is_gated() { None } else { finite_or_none(self.rss(model)) },
                    aic: finite_or_none(score.or_sentinel(self.config.suppressed_aic)),
                    gated: score.is_gated(),
                }
            })
            .collect();

        RegimeSummary {
            tool: "lacr".to_string(),
            best_model: best,
            best_model_code: best.map(RegimeModel::code),
            wilting_point: finite_or_none(self.wilting_point()),
            critical_point: finite_or_none(self.critical_point()),
            slope: finite_or_none(self.slope()),
            transitional_fraction: finite_or_none(self.transitional_fraction()),
            candidates,
            stats: self.stats(),
            config: self.config.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::linspace;
    use crate::models::piecewise_linear_dtw;

    /// Evenly spaced SM over `[lo, hi]` and its standardized counterpart.
    fn sm_grid(lo: f64, hi: f64, n: usize) -> (Vec<f64>, Vec<f64>) {
        let sm = linspace(lo, hi, n);
        let m = mean(&sm);
        let s = std_dev(&sm);
        let z = sm.iter().map(|v| (v - m) / s).collect();
        (sm, z)
    }

    fn dtw_sample(lo: f64, hi: f64, n: usize) -> (Vec<f64>, Vec<f64>) {
        let (sm, z) = sm_grid(lo, hi, n);
        let ef = z.iter().map(|&v: &f64| piecewise_linear_dtw(v, -1.0, 1.0, 0.2, 0.3)).collect();
        (sm, ef)
    }

    fn bits(v: &[f64]) -> Vec<u64> {
        v.iter().map(|x| x.to_bits()).collect()
    }

    #[test]
    fn length_mismatch_is_fatal() {
        let err = RegimeEstimator::new(&[0.1, 0.2], &[0.3]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        let err = RegimeEstimator::new(&[], &[]).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn output_lengths_match_sample() {
        let (sm, ef) = dtw_sample(0.05, 0.45, 40);
        let est = RegimeEstimator::new(&sm, &ef).unwrap();
        for model in RegimeModel::ALL {
            assert_eq!(est.predicted(model).len(), sm.len());
            assert_eq!(est.residuals(model).len(), sm.len());
        }
    }

    #[test]
    fn flat_prediction_is_constant_and_rss_non_negative() {
        let (sm, ef) = dtw_sample(0.05, 0.45, 40);
        let est = RegimeEstimator::new(&sm, &ef).unwrap();
        let pred = est.predicted(RegimeModel::Flat);
        assert!(pred.iter().all(|&v| v == pred[0]));
        assert!(est.rss(RegimeModel::Flat) >= 0.0);
    }

    #[test]
    fn near_constant_ef_selects_flat() {
        let (sm, _) = sm_grid(0.05, 0.45, 100);
        let ef: Vec<f64> = (0..100).map(|i| if i % 2 == 0 { 0.301 } else { 0.299 }).collect();
        let est = RegimeEstimator::new(&sm, &ef).unwrap();

        assert_eq!(est.best_model().unwrap(), RegimeModel::Flat);
        assert_eq!(est.best_model_code().unwrap(), 0);
        assert!(est.aic_scores()[&RegimeModel::DryToTransitional].is_gated());
        let aics = est.all_aics();
        assert_eq!(aics[&RegimeModel::DryToTransitional], 1e6);
        assert_eq!(aics[&RegimeModel::TransitionalToWet], 1e6);
        assert_eq!(aics[&RegimeModel::DryToTransitionalToWet], 1e6);
        assert!(est.wilting_point().is_nan());
        assert!(est.critical_point().is_nan());
        assert!(est.slope().is_nan());
        assert!(est.transitional_fraction().is_nan());
    }

    #[test]
    fn exact_two_breakpoint_sample_recovers_breakpoints() {
        let (sm, ef) = dtw_sample(0.05, 0.45, 121);
        let est = RegimeEstimator::new(&sm, &ef).unwrap();

        assert_eq!(est.best_model().unwrap(), RegimeModel::DryToTransitionalToWet);
        assert_eq!(est.best_model_code().unwrap(), 4);

        let m = mean(&sm);
        let s = std_dev(&sm);
        let wilt_true = m - s;
        let crit_true = m + s;
        let tol = 0.02 * s;
        assert!((est.wilting_point() - wilt_true).abs() < tol, "wilt={}", est.wilting_point());
        assert!((est.critical_point() - crit_true).abs() < tol, "crit={}", est.critical_point());
        assert!((est.slope() - 0.3).abs() < 0.01, "slope={}", est.slope());

        let frac = est.transitional_fraction();
        assert!((0.0..=100.0).contains(&frac));
        let p = est.best_model_params();
        let inside = est.sm_std().iter().filter(|&&v| v > p.wilt && v < p.crit).count();
        assert_eq!(frac, 100.0 * inside as f64 / sm.len() as f64);
    }

    #[test]
    fn two_breakpoint_sample_built_from_a_wide_standardized_range() {
        // Standardized SM spanning [-3, 3] mapped to physical units; the estimator
        // re-standardizes with the sample's own mean and std.
        let n = 121;
        let z = linspace(-3.0, 3.0, n);
        let sm: Vec<f64> = z.iter().map(|v| 0.25 + 0.05 * v).collect();
        let ef: Vec<f64> = z.iter().map(|&v| piecewise_linear_dtw(v, -1.0, 1.0, 0.2, 0.3)).collect();
        let est = RegimeEstimator::new(&sm, &ef).unwrap();

        assert_eq!(est.best_model().unwrap(), RegimeModel::DryToTransitionalToWet);
        assert!((est.wilting_point() - 0.20).abs() < 0.002, "wilt={}", est.wilting_point());
        assert!((est.critical_point() - 0.30).abs() < 0.002, "crit={}", est.critical_point());
        // EF per unit of the estimator's standardized SM.
        let expected_slope = 0.3 * std_dev(&z);
        assert!((est.slope() - expected_slope).abs() < 0.01, "slope={}", est.slope());
    }

    #[test]
    fn two_breakpoint_sample_selected_across_sample_sizes() {
        for n in [30, 50, 80, 150, 300] {
            let (sm, ef) = dtw_sample(0.05, 0.45, n);
            let est = RegimeEstimator::new(&sm, &ef).unwrap();
            assert_eq!(
                est.best_model().unwrap(),
                RegimeModel::DryToTransitionalToWet,
                "n={n}"
            );
        }
    }

    #[test]
    fn rss_decreases_with_complexity_on_piecewise_data() {
        let (sm, ef) = dtw_sample(0.05, 0.45, 121);
        let est = RegimeEstimator::new(&sm, &ef).unwrap();
        let tol = 1e-9;
        let flat = est.rss(RegimeModel::Flat);
        let linear = est.rss(RegimeModel::Linear);
        let one_bp = est
            .rss(RegimeModel::DryToTransitional)
            .min(est.rss(RegimeModel::TransitionalToWet));
        let two_bp = est.rss(RegimeModel::DryToTransitionalToWet);
        assert!(flat + tol >= linear, "flat={flat} linear={linear}");
        assert!(linear + tol >= one_bp, "linear={linear} one_bp={one_bp}");
        assert!(one_bp + tol >= two_bp, "one_bp={one_bp} two_bp={two_bp}");
    }

    #[test]
    fn breakpoints_outside_physical_range_are_rejected() {
        // Negative SM: every breakpoint maps to a value <= 0.
        let (sm, ef) = dtw_sample(-2.0, -1.0, 121);
        let est = RegimeEstimator::new(&sm, &ef).unwrap();

        assert_eq!(est.best_model().unwrap(), RegimeModel::DryToTransitionalToWet);
        let p = est.best_model_params();
        assert!(p.wilt.is_finite() && p.crit.is_finite());
        assert!(est.wilting_point().is_nan());
        assert!(est.critical_point().is_nan());
        assert!(est.slope().is_nan());
    }

    #[test]
    fn failed_single_breakpoint_fits_skip_two_breakpoint_fit() {
        let (sm, ef) = dtw_sample(0.05, 0.45, 60);
        let mut config = EstimatorConfig::default();
        // Too small a budget for any iterative fit.
        config.solver.max_evaluations = Some(1);
        let est = RegimeEstimator::with_config(&sm, &ef, config).unwrap();

        let dtw = est.fit(RegimeModel::DryToTransitionalToWet).to_vec();
        assert_eq!(dtw.len(), 4);
        assert!(dtw.iter().all(|v| v.is_nan()));
        assert_eq!(
            est.fit_outcome(RegimeModel::DryToTransitionalToWet).failure(),
            Some(crate::domain::FitFailure::InconsistentSeeds)
        );
        assert_eq!(est.rss(RegimeModel::DryToTransitionalToWet), 1e13);
        assert!(est.rss(RegimeModel::DryToTransitional).is_nan());
    }

    #[test]
    fn accessors_are_idempotent() {
        let (sm, ef) = dtw_sample(0.05, 0.45, 80);
        let est = RegimeEstimator::new(&sm, &ef).unwrap();
        for model in RegimeModel::ALL {
            assert_eq!(bits(&est.fit(model).to_vec()), bits(&est.fit(model).to_vec()));
            assert_eq!(bits(&est.predicted(model)), bits(&est.predicted(model)));
            assert_eq!(est.rss(model).to_bits(), est.rss(model).to_bits());
        }
        assert_eq!(est.best_model().unwrap(), est.best_model().unwrap());
        assert_eq!(est.wilting_point().to_bits(), est.wilting_point().to_bits());
        assert_eq!(est.critical_point().to_bits(), est.critical_point().to_bits());
        assert_eq!(est.slope().to_bits(), est.slope().to_bits());
        assert_eq!(
            est.transitional_fraction().to_bits(),
            est.transitional_fraction().to_bits()
        );
    }

    #[test]
    fn all_nan_sample_has_no_best_model() {
        let sm = [0.1, 0.2, 0.3];
        let ef = [f64::NAN, f64::NAN, f64::NAN];
        let est = RegimeEstimator::new(&sm, &ef).unwrap();
        let err = est.best_model().unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(est.wilting_point().is_nan());
        assert!(est.slope().is_nan());
        assert!(est.transitional_fraction().is_nan());
        assert!(est.summary().best_model.is_none());
    }

    #[test]
    fn summary_reports_every_candidate() {
        let (sm, ef) = dtw_sample(0.05, 0.45, 121);
        let est = RegimeEstimator::new(&sm, &ef).unwrap();
        let summary = est.summary();
        assert_eq!(summary.candidates.len(), 5);
        assert_eq!(summary.best_model, Some(RegimeModel::DryToTransitionalToWet));
        assert_eq!(summary.best_model_code, Some(4));
        assert_eq!(summary.stats.n_points, 121);
        assert!(summary.wilting_point.is_some());
        for (c, model) in summary.candidates.iter().zip(RegimeModel::ALL) {
            assert_eq!(c.model, model);
            assert_eq!(c.params.len(), model.param_count());
        }
    }
}
