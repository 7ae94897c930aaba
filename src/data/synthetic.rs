//! Seeded synthetic (SM, EF) samples drawn from one of the regime shapes.
//!
//! SM is evenly spaced over a physical range; EF is the chosen shape evaluated in
//! standardized SM space plus Gaussian noise. The same seed always yields the same
//! sample.

use chrono::{Duration, NaiveDate};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{ModelParams, RegimeModel};
use crate::error::AppError;
use crate::math::{linspace, standardize};
use crate::models::predict;

/// Generation settings.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// True shape, parameters in standardized SM space.
    pub params: ModelParams,
    pub n: usize,
    pub sm_min: f64,
    pub sm_max: f64,
    /// Standard deviation of the additive EF noise.
    pub noise_sd: f64,
    pub seed: u64,
    /// Observations are stamped daily from this date.
    pub start_date: NaiveDate,
}

impl SyntheticConfig {
    pub fn new(params: ModelParams) -> Self {
        Self {
            params,
            n: 200,
            sm_min: 0.05,
            sm_max: 0.45,
            noise_sd: 0.02,
            seed: 42,
            start_date: NaiveDate::from_ymd_opt(2000, 6, 1).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticSample {
    pub sm: Vec<f64>,
    pub ef: Vec<f64>,
    pub dates: Vec<NaiveDate>,
    pub truth: ModelParams,
}

/// Representative parameters for each shape (standardized SM).
pub fn default_params(model: RegimeModel) -> ModelParams {
    match model {
        RegimeModel::Flat => ModelParams::Flat { y0: 0.4 },
        RegimeModel::Linear => ModelParams::Linear {
            intercept: 0.4,
            slope: 0.1,
        },
        RegimeModel::DryToTransitional => ModelParams::DryToTransitional {
            x0: -0.5,
            y0: 0.15,
            k1: 0.2,
        },
        RegimeModel::TransitionalToWet => ModelParams::TransitionalToWet {
            x0: 0.5,
            y0: 0.7,
            k1: 0.2,
        },
        RegimeModel::DryToTransitionalToWet => ModelParams::DryToTransitionalToWet {
            x0: -1.0,
            x1: 1.0,
            y0: 0.15,
            k1: 0.25,
        },
    }
}

pub fn generate_regime_sample(config: &SyntheticConfig) -> Result<SyntheticSample, AppError> {
    if config.n < 2 {
        return Err(AppError::new(2, "Sample size must be >= 2."));
    }
    if !(config.sm_min.is_finite() && config.sm_max.is_finite() && config.sm_max > config.sm_min) {
        return Err(AppError::new(2, "Invalid SM range for sample generation."));
    }
    if !(config.noise_sd.is_finite() && config.noise_sd >= 0.0) {
        return Err(AppError::new(2, "Noise standard deviation must be finite and >= 0."));
    }
    if !config.params.is_finite() {
        return Err(AppError::new(2, "Synthetic model parameters must be finite."));
    }

    let normal = Normal::new(0.0, config.noise_sd)
        .map_err(|e| AppError::new(2, format!("Noise distribution error: {e}")))?;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let sm = linspace(config.sm_min, config.sm_max, config.n);
    let ef = standardize(&sm)
        .into_iter()
        .map(|z| predict(&config.params, z) + normal.sample(&mut rng))
        .collect();
    let dates = (0..config.n)
        .map(|i| config.start_date + Duration::days(i as i64))
        .collect();

    Ok(SyntheticSample {
        sm,
        ef,
        dates,
        truth: config.params,
    })
}
