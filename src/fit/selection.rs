//! Model selection (flat → linear → one breakpoint → two breakpoints) using AIC
//! with significance gates, and derivation of the physical regime parameters.
//!
//! For each evaluated candidate we compute:
//! - RSS against the grid prediction
//! - AIC = 2k + n * ln(RSS/n)
//!
//! Selection rules:
//! 1. Flat (k=1) and linear (k=2) are always scored.
//! 2. One-breakpoint shapes (k=3) are scored only if linear beats flat by more
//!    than the margin; otherwise they are gated out.
//! 3. The two-breakpoint shape (k=4) is scored only if a one-breakpoint shape
//!    beats linear by more than the margin; otherwise it is gated out.
//! 4. The best model is the minimum scored AIC. NaN and gated candidates never win;
//!    ties go to the simpler model.

use std::collections::BTreeMap;

use tracing::debug;

use crate::domain::{AicScore, BestParams, EstimatorConfig, ModelParams, RegimeModel};
use crate::models::aic_from_rss;

/// Score all candidates, computing RSS only for those that pass the gates.
///
/// `rss` is called at most once per model.
pub fn gated_aics<F>(n: usize, config: &EstimatorConfig, mut rss: F) -> BTreeMap<RegimeModel, AicScore>
where
    F: FnMut(RegimeModel) -> f64,
{
    let aic = |model: RegimeModel, rss: f64| aic_from_rss(model.param_count(), n, rss);
    let margin = config.aic_margin;

    let aic_flat = aic(RegimeModel::Flat, rss(RegimeModel::Flat));
    let aic_linear = aic(RegimeModel::Linear, rss(RegimeModel::Linear));

    let (dt, tw, dtw) = if beats(aic_linear, aic_flat, margin) {
        let aic_dt = aic(RegimeModel::DryToTransitional, rss(RegimeModel::DryToTransitional));
        let aic_tw = aic(RegimeModel::TransitionalToWet, rss(RegimeModel::TransitionalToWet));
        let dtw = if beats(aic_dt, aic_linear, margin) || beats(aic_tw, aic_linear, margin) {
            AicScore::Scored(aic(
                RegimeModel::DryToTransitionalToWet,
                rss(RegimeModel::DryToTransitionalToWet),
            ))
        } else {
            debug!(aic_dt, aic_tw, aic_linear, "two-breakpoint model gated out");
            AicScore::Gated
        };
        (AicScore::Scored(aic_dt), AicScore::Scored(aic_tw), dtw)
    } else {
        debug!(aic_linear, aic_flat, "breakpoint models gated out");
        (AicScore::Gated, AicScore::Gated, AicScore::Gated)
    };

    BTreeMap::from([
        (RegimeModel::Flat, AicScore::Scored(aic_flat)),
        (RegimeModel::Linear, AicScore::Scored(aic_linear)),
        (RegimeModel::DryToTransitional, dt),
        (RegimeModel::TransitionalToWet, tw),
        (RegimeModel::DryToTransitionalToWet, dtw),
    ])
}

/// `candidate` improves on `baseline` by more than `margin` AIC units.
///
/// NaN on either side never counts as an improvement.
pub fn beats(candidate: f64, baseline: f64, margin: f64) -> bool {
    baseline - candidate > margin
}

/// Minimum-AIC model among scored candidates, ignoring NaN. Ties resolve to the
/// simpler model.
///
/// Returns `None` when no scored candidate has a non-NaN AIC.
pub fn select_best(aics: &BTreeMap<RegimeModel, AicScore>) -> Option<RegimeModel> {
    let mut best: Option<(RegimeModel, f64)> = None;
    for (&model, score) in aics {
        let Some(aic) = score.value().filter(|v| !v.is_nan()) else {
            continue;
        };
        match best {
            Some((_, best_aic)) if aic >= best_aic => {}
            _ => best = Some((model, aic)),
        }
    }
    best.map(|(model, _)| model)
}

/// Standardized breakpoints and slope carried by the selected model's parameters.
pub fn best_params(params: &ModelParams) -> BestParams {
    match *params {
        ModelParams::Flat { .. } => BestParams::NAN,
        ModelParams::Linear { slope, .. } => BestParams {
            wilt: f64::NAN,
            crit: f64::NAN,
            slope,
        },
        ModelParams::DryToTransitional { x0, k1, .. } => BestParams {
            wilt: x0,
            crit: f64::NAN,
            slope: k1,
        },
        ModelParams::TransitionalToWet { x0, k1, .. } => BestParams {
            wilt: f64::NAN,
            crit: x0,
            slope: k1,
        },
        ModelParams::DryToTransitionalToWet { x0, x1, k1, .. } => BestParams {
            wilt: x0,
            crit: x1,
            slope: k1,
        },
    }
}

/// Map a standardized SM value to physical units, keeping it only inside `(0, sm_max)`.
pub fn to_physical(value_std: f64, sm_mean: f64, sm_std: f64, sm_max: f64) -> f64 {
    let value = sm_mean + sm_std * value_std;
    if value > 0.0 && value < sm_max {
        value
    } else {
        f64::NAN
    }
}

/// The slope is only meaningful when a wilting or critical point was resolved.
pub fn resolved_slope(slope: f64, wilting_point: f64, critical_point: f64) -> f64 {
    if wilting_point.is_nan() && critical_point.is_nan() {
        f64::NAN
    } else {
        slope
    }
}

/// Percentage of samples strictly inside the transitional interval of `best`.
///
/// NaN for flat and linear, which have no transitional interval.
pub fn transitional_fraction(best: RegimeModel, params: &BestParams, x_std: &[f64]) -> f64 {
    if matches!(best, RegimeModel::Flat | RegimeModel::Linear) || x_std.is_empty() {
        return f64::NAN;
    }
    let count = x_std
        .iter()
        .filter(|&&x| match best {
            RegimeModel::DryToTransitional => x > params.wilt,
            RegimeModel::TransitionalToWet => x < params.crit,
            _ => x > params.wilt && x < params.crit,
        })
        .count();
    100.0 * count as f64 / x_std.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(values: [AicScore; 5]) -> BTreeMap<RegimeModel, AicScore> {
        RegimeModel::ALL.into_iter().zip(values).collect()
    }

    #[test]
    fn gates_suppress_breakpoint_models_when_linear_is_not_significant() {
        let config = EstimatorConfig::default();
        let mut called = Vec::new();
        // RSS chosen so that linear improves on flat by less than 2 AIC units.
        let aics = gated_aics(100, &config, |m| {
            called.push(m);
            match m {
                RegimeModel::Flat => 1.0,
                _ => 0.99,
            }
        });
        assert_eq!(called, vec![RegimeModel::Flat, RegimeModel::Linear]);
        assert!(aics[&RegimeModel::DryToTransitional].is_gated());
        assert!(aics[&RegimeModel::TransitionalToWet].is_gated());
        assert!(aics[&RegimeModel::DryToTransitionalToWet].is_gated());
        assert_eq!(aics[&RegimeModel::DryToTransitionalToWet].or_sentinel(1e6), 1e6);
        assert_eq!(select_best(&aics), Some(RegimeModel::Flat));
    }

    #[test]
    fn gates_open_in_sequence() {
        let config = EstimatorConfig::default();
        let aics = gated_aics(100, &config, |m| match m {
            RegimeModel::Flat => 1.0,
            RegimeModel::Linear => 0.5,
            RegimeModel::DryToTransitional => 0.2,
            RegimeModel::TransitionalToWet => 0.45,
            RegimeModel::DryToTransitionalToWet => 0.01,
        });
        assert!(aics.values().all(|v| !v.is_gated()));
        assert_eq!(select_best(&aics), Some(RegimeModel::DryToTransitionalToWet));
    }

    #[test]
    fn two_breakpoint_gated_when_single_breakpoints_do_not_help() {
        let config = EstimatorConfig::default();
        let mut called = Vec::new();
        let aics = gated_aics(100, &config, |m| {
            called.push(m);
            match m {
                RegimeModel::Flat => 1.0,
                _ => 0.5,
            }
        });
        assert!(!called.contains(&RegimeModel::DryToTransitionalToWet));
        assert!(aics[&RegimeModel::DryToTransitionalToWet].is_gated());
        assert_eq!(select_best(&aics), Some(RegimeModel::Linear));
    }

    #[test]
    fn nan_gate_inputs_never_pass() {
        assert!(!beats(f64::NAN, 10.0, 2.0));
        assert!(!beats(5.0, f64::NAN, 2.0));
        assert!(!beats(9.0, 10.0, 2.0));
        assert!(!beats(8.0, 10.0, 2.0));
        assert!(beats(7.9, 10.0, 2.0));
        assert!(!beats(12.0, 10.0, 2.0));
    }

    #[test]
    fn select_best_ignores_nan_and_gated_candidates() {
        use AicScore::{Gated, Scored};

        let aics = table([Scored(10.0), Scored(f64::NAN), Scored(3.0), Scored(f64::NAN), Gated]);
        assert_eq!(select_best(&aics), Some(RegimeModel::DryToTransitional));

        let aics = table([Scored(f64::NAN); 5]);
        assert_eq!(select_best(&aics), None);

        // Gated candidates never win, even when nothing else is comparable.
        let aics = table([Scored(f64::NAN), Scored(f64::NAN), Gated, Gated, Gated]);
        assert_eq!(select_best(&aics), None);

        let aics = table([Scored(f64::NEG_INFINITY), Scored(f64::NEG_INFINITY), Gated, Gated, Gated]);
        assert_eq!(select_best(&aics), Some(RegimeModel::Flat));
    }

    #[test]
    fn scored_aic_equal_to_the_sentinel_value_stays_eligible() {
        use AicScore::{Gated, Scored};

        let aics = table([Scored(f64::NAN), Scored(1e6), Gated, Gated, Gated]);
        assert_eq!(select_best(&aics), Some(RegimeModel::Linear));
    }

    #[test]
    fn best_params_by_model() {
        let p = best_params(&ModelParams::TransitionalToWet {
            x0: 0.4,
            y0: 0.6,
            k1: 0.2,
        });
        assert!(p.wilt.is_nan());
        assert_eq!(p.crit, 0.4);
        assert_eq!(p.slope, 0.2);

        let p = best_params(&ModelParams::Linear {
            intercept: 0.5,
            slope: 0.1,
        });
        assert!(p.wilt.is_nan() && p.crit.is_nan());
        assert_eq!(p.slope, 0.1);

        let p = best_params(&ModelParams::Flat { y0: 0.3 });
        assert!(p.wilt.is_nan() && p.crit.is_nan() && p.slope.is_nan());
    }

    #[test]
    fn physical_conversion_rejects_out_of_range() {
        assert!((to_physical(-1.0, 0.25, 0.1, 0.45) - 0.15).abs() < 1e-12);
        assert!(to_physical(-3.0, 0.25, 0.1, 0.45).is_nan()); // <= 0
        assert!(to_physical(2.0, 0.25, 0.1, 0.45).is_nan()); // >= max
        assert!(to_physical(f64::NAN, 0.25, 0.1, 0.45).is_nan());
    }

    #[test]
    fn slope_requires_a_resolved_breakpoint() {
        assert!(resolved_slope(0.3, f64::NAN, f64::NAN).is_nan());
        assert_eq!(resolved_slope(0.3, 0.1, f64::NAN), 0.3);
        assert_eq!(resolved_slope(0.3, f64::NAN, 0.2), 0.3);
    }

    #[test]
    fn transitional_fraction_counts_strictly_inside() {
        let x_std = [-2.0, -1.5, -1.0, -0.5, 0.0, 0.5, 1.0, 1.5, 2.0, 2.5];
        let params = BestParams {
            wilt: -1.0,
            crit: 0.6,
            slope: 0.3,
        };
        // -0.5, 0.0, 0.5 are strictly inside (-1.0, 0.6).
        let f = transitional_fraction(RegimeModel::DryToTransitionalToWet, &params, &x_std);
        assert_eq!(f, 30.0);

        let f = transitional_fraction(RegimeModel::DryToTransitional, &params, &x_std);
        assert_eq!(f, 70.0);
        let f = transitional_fraction(RegimeModel::TransitionalToWet, &params, &x_std);
        assert_eq!(f, 60.0);

        assert!(transitional_fraction(RegimeModel::Linear, &params, &x_std).is_nan());
        assert!(transitional_fraction(RegimeModel::Flat, &params, &x_std).is_nan());
    }
}
