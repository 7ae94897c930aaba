//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting and selection
//! - exported to JSON
//! - reloaded later for reporting or comparisons

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::math::LmOptions;

/// Candidate regime shape relating soil moisture (SM) to evaporative fraction (EF).
///
/// Declaration order is the complexity order and matches [`RegimeModel::code`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum RegimeModel {
    /// EF independent of SM.
    Flat,
    /// EF linear in SM over the whole range.
    Linear,
    /// Flat below the wilting point, linear above it.
    DryToTransitional,
    /// Linear below the critical point, flat above it.
    TransitionalToWet,
    /// Flat, then linear between wilting and critical point, then flat.
    DryToTransitionalToWet,
}

impl RegimeModel {
    pub const ALL: [RegimeModel; 5] = [
        RegimeModel::Flat,
        RegimeModel::Linear,
        RegimeModel::DryToTransitional,
        RegimeModel::TransitionalToWet,
        RegimeModel::DryToTransitionalToWet,
    ];

    /// Canonical name used in reports and serialized output.
    pub fn name(self) -> &'static str {
        match self {
            RegimeModel::Flat => "flat",
            RegimeModel::Linear => "linear",
            RegimeModel::DryToTransitional => "dry-to-transitional",
            RegimeModel::TransitionalToWet => "transitional-to-wet",
            RegimeModel::DryToTransitionalToWet => "dry-to-transitional-to-wet",
        }
    }

    /// Integer code of the regime (flat=0 ... dry-to-transitional-to-wet=4).
    pub fn code(self) -> u8 {
        match self {
            RegimeModel::Flat => 0,
            RegimeModel::Linear => 1,
            RegimeModel::DryToTransitional => 2,
            RegimeModel::TransitionalToWet => 3,
            RegimeModel::DryToTransitionalToWet => 4,
        }
    }

    /// Number of fitted parameters, used as `k` in the AIC.
    pub fn param_count(self) -> usize {
        match self {
            RegimeModel::Flat => 1,
            RegimeModel::Linear => 2,
            RegimeModel::DryToTransitional | RegimeModel::TransitionalToWet => 3,
            RegimeModel::DryToTransitionalToWet => 4,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.code() == code)
    }
}

impl std::fmt::Display for RegimeModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameter vector of a candidate model, in standardized SM space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModelParams {
    Flat { y0: f64 },
    Linear { intercept: f64, slope: f64 },
    DryToTransitional { x0: f64, y0: f64, k1: f64 },
    TransitionalToWet { x0: f64, y0: f64, k1: f64 },
    DryToTransitionalToWet { x0: f64, x1: f64, y0: f64, k1: f64 },
}

impl ModelParams {
    pub fn model(&self) -> RegimeModel {
        match self {
            ModelParams::Flat { .. } => RegimeModel::Flat,
            ModelParams::Linear { .. } => RegimeModel::Linear,
            ModelParams::DryToTransitional { .. } => RegimeModel::DryToTransitional,
            ModelParams::TransitionalToWet { .. } => RegimeModel::TransitionalToWet,
            ModelParams::DryToTransitionalToWet { .. } => RegimeModel::DryToTransitionalToWet,
        }
    }

    /// The all-NaN vector of the right arity, used for failed or skipped fits.
    pub fn nan(model: RegimeModel) -> Self {
        let n = f64::NAN;
        match model {
            RegimeModel::Flat => ModelParams::Flat { y0: n },
            RegimeModel::Linear => ModelParams::Linear {
                intercept: n,
                slope: n,
            },
            RegimeModel::DryToTransitional => ModelParams::DryToTransitional { x0: n, y0: n, k1: n },
            RegimeModel::TransitionalToWet => ModelParams::TransitionalToWet { x0: n, y0: n, k1: n },
            RegimeModel::DryToTransitionalToWet => ModelParams::DryToTransitionalToWet {
                x0: n,
                x1: n,
                y0: n,
                k1: n,
            },
        }
    }

    /// Build from a flat parameter slice (`None` on arity mismatch).
    ///
    /// Ordering follows [`ModelParams::to_vec`]:
    /// - flat: `[y0]`
    /// - linear: `[intercept, slope]`
    /// - one breakpoint: `[x0, y0, k1]`
    /// - two breakpoints: `[x0, x1, y0, k1]`
    pub fn from_slice(model: RegimeModel, p: &[f64]) -> Option<Self> {
        if p.len() != model.param_count() {
            return None;
        }
        let params = match model {
            RegimeModel::Flat => ModelParams::Flat { y0: p[0] },
            RegimeModel::Linear => ModelParams::Linear {
                intercept: p[0],
                slope: p[1],
            },
            RegimeModel::DryToTransitional => ModelParams::DryToTransitional {
                x0: p[0],
                y0: p[1],
                k1: p[2],
            },
            RegimeModel::TransitionalToWet => ModelParams::TransitionalToWet {
                x0: p[0],
                y0: p[1],
                k1: p[2],
            },
            RegimeModel::DryToTransitionalToWet => ModelParams::DryToTransitionalToWet {
                x0: p[0],
                x1: p[1],
                y0: p[2],
                k1: p[3],
            },
        };
        Some(params)
    }

    pub fn to_vec(&self) -> Vec<f64> {
        match *self {
            ModelParams::Flat { y0 } => vec![y0],
            ModelParams::Linear { intercept, slope } => vec![intercept, slope],
            ModelParams::DryToTransitional { x0, y0, k1 }
            | ModelParams::TransitionalToWet { x0, y0, k1 } => vec![x0, y0, k1],
            ModelParams::DryToTransitionalToWet { x0, x1, y0, k1 } => vec![x0, x1, y0, k1],
        }
    }

    pub fn is_finite(&self) -> bool {
        self.to_vec().iter().all(|v| v.is_finite())
    }
}

/// Why a candidate fit produced no usable parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FitFailure {
    /// The solver exhausted its evaluation budget.
    NotConverged,
    /// The sample or the solver produced non-finite values.
    NonFinite,
    /// The one-breakpoint seeds satisfy `crit - wilt <= 0`, so no solve was attempted.
    InconsistentSeeds,
    /// The two-breakpoint solve ended with the wilting breakpoint above the critical one.
    UnorderedBreakpoints,
}

impl FitFailure {
    pub fn describe(self) -> &'static str {
        match self {
            FitFailure::NotConverged => "solver did not converge",
            FitFailure::NonFinite => "non-finite values during fit",
            FitFailure::InconsistentSeeds => "single-breakpoint seeds have crit <= wilt",
            FitFailure::UnorderedBreakpoints => "fitted breakpoints are out of order",
        }
    }
}

/// Result of fitting a single candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FitOutcome {
    Converged {
        params: ModelParams,
        evaluations: usize,
    },
    Failed {
        model: RegimeModel,
        reason: FitFailure,
    },
}

impl FitOutcome {
    pub fn model(&self) -> RegimeModel {
        match self {
            FitOutcome::Converged { params, .. } => params.model(),
            FitOutcome::Failed { model, .. } => *model,
        }
    }

    /// Fitted parameters, or the all-NaN vector when the fit failed.
    pub fn params(&self) -> ModelParams {
        match self {
            FitOutcome::Converged { params, .. } => *params,
            FitOutcome::Failed { model, .. } => ModelParams::nan(*model),
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, FitOutcome::Converged { .. })
    }

    pub fn failure(&self) -> Option<FitFailure> {
        match self {
            FitOutcome::Converged { .. } => None,
            FitOutcome::Failed { reason, .. } => Some(*reason),
        }
    }
}

/// AIC of one candidate: scored, or removed by a significance gate.
///
/// Gated candidates are never eligible for selection. They only become the
/// suppressed-AIC sentinel when reported.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AicScore {
    Scored(f64),
    Gated,
}

impl AicScore {
    /// The score, `None` when gated.
    pub fn value(self) -> Option<f64> {
        match self {
            AicScore::Scored(aic) => Some(aic),
            AicScore::Gated => None,
        }
    }

    /// The score, with `sentinel` standing in for gated candidates.
    pub fn or_sentinel(self, sentinel: f64) -> f64 {
        self.value().unwrap_or(sentinel)
    }

    pub fn is_gated(self) -> bool {
        self == AicScore::Gated
    }
}

/// Breakpoints and slope of the selected model, in standardized SM space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestParams {
    pub wilt: f64,
    pub crit: f64,
    pub slope: f64,
}

impl BestParams {
    pub const NAN: BestParams = BestParams {
        wilt: f64::NAN,
        crit: f64::NAN,
        slope: f64::NAN,
    };
}

/// Tunables of the regime estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// AIC units a richer model must gain over the simpler baseline to be considered.
    pub aic_margin: f64,
    /// AIC assigned to candidates removed by the significance gates.
    pub suppressed_aic: f64,
    /// RSS assigned to a two-breakpoint fit whose residuals are all NaN.
    pub skipped_rss: f64,
    /// Initial slope guess for the piecewise fits.
    pub initial_slope: f64,
    /// Percentile of EF used as the plateau seed of the two-breakpoint fit.
    pub floor_percentile: f64,
    /// Breakpoint candidates per axis of the grid that seeds the piecewise fits.
    #[serde(default = "default_breakpoint_grid_steps")]
    pub breakpoint_grid_steps: usize,
    pub solver: LmOptions,
}

fn default_breakpoint_grid_steps() -> usize {
    25
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            aic_margin: 2.0,
            suppressed_aic: 1e6,
            skipped_rss: 1e13,
            initial_slope: 0.01,
            floor_percentile: 20.0,
            breakpoint_grid_steps: default_breakpoint_grid_steps(),
            solver: LmOptions::default(),
        }
    }
}

/// Summary stats about a (SM, EF) sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleStats {
    pub n_points: usize,
    pub sm_min: f64,
    pub sm_max: f64,
    pub sm_mean: f64,
    /// Population standard deviation (used for standardization).
    pub sm_std: f64,
    pub ef_min: f64,
    pub ef_max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_start: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_end: Option<NaiveDate>,
}

/// Per-candidate diagnostics in a [`RegimeSummary`].
///
/// Non-finite values are stored as `None` so the summary survives a JSON round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub model: RegimeModel,
    pub converged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FitFailure>,
    pub params: Vec<Option<f64>>,
    pub rss: Option<f64>,
    /// Gated candidates carry the suppressed-AIC sentinel here.
    pub aic: Option<f64>,
    /// Removed by a significance gate (never scored).
    #[serde(default)]
    pub gated: bool,
}

/// Everything the estimator derives for one sample (saved as JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeSummary {
    pub tool: String,
    pub best_model: Option<RegimeModel>,
    pub best_model_code: Option<u8>,
    /// Physical SM units.
    pub wilting_point: Option<f64>,
    /// Physical SM units.
    pub critical_point: Option<f64>,
    pub slope: Option<f64>,
    /// Percentage of samples in the transitional regime.
    pub transitional_fraction: Option<f64>,
    pub candidates: Vec<CandidateSummary>,
    pub stats: SampleStats,
    pub config: EstimatorConfig,
}

/// Map NaN and infinities to `None`.
pub fn finite_or_none(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}
