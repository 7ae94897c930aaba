//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and installs logging
//! - loads or generates a sample
//! - runs the regime estimator
//! - prints reports and writes optional exports

use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, EstimatorArgs, FitArgs, OutputArgs, ShowArgs, SimulateArgs};
use crate::data::{SyntheticConfig, default_params};
use crate::domain::{EstimatorConfig, ModelParams};
use crate::error::AppError;
use crate::io::ingest::ColumnSpec;
use crate::math::LmOptions;

pub mod pipeline;

/// Entry point for the `lacr` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Simulate(args) => handle_simulate(args),
        Command::Show(args) => handle_show(args),
    }
}

/// Log to stderr. `-v`/`-q` override `RUST_LOG`; the fallback level is `warn`.
fn init_logging(verbose: u8, quiet: bool) {
    let filter = match (quiet, verbose) {
        (true, _) => EnvFilter::new("error"),
        (false, 0) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        (false, 1) => EnvFilter::new("debug"),
        (false, _) => EnvFilter::new("trace"),
    };
    // A subscriber may already be installed when embedded; keep the existing one.
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init();
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = estimator_config_from_args(&args.estimator)?;
    let columns = ColumnSpec {
        sm: args.sm_col,
        ef: args.ef_col,
        date: args.date_col,
        latent_heat: args.lh_col,
        sensible_heat: args.sh_col,
    };
    let out = pipeline::run_csv(&args.csv, &columns, &config)?;

    if !out.ingest.row_errors.is_empty() {
        eprint!("{}", crate::report::format_row_errors(&out.ingest.row_errors, 10));
    }
    finish(&out.run, &args.output)
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let config = estimator_config_from_args(&args.estimator)?;
    let params = match &args.params {
        Some(values) => ModelParams::from_slice(args.model, values).ok_or_else(|| {
            AppError::new(
                2,
                format!(
                    "`--params` for {} needs {} values, got {}.",
                    args.model,
                    args.model.param_count(),
                    values.len()
                ),
            )
        })?,
        None => default_params(args.model),
    };
    let synthetic = SyntheticConfig {
        n: args.n,
        sm_min: args.sm_min,
        sm_max: args.sm_max,
        noise_sd: args.noise,
        seed: args.seed,
        ..SyntheticConfig::new(params)
    };

    let out = pipeline::run_synthetic(&synthetic, &config)?;
    if let Some(path) = &args.write_csv {
        crate::io::export::write_sample_csv(path, &out.sample.dates, &out.sample.sm, &out.sample.ef)?;
    }

    println!(
        "True model: {} {:?}",
        out.sample.truth.model(),
        out.sample.truth.to_vec()
    );
    finish(&out.run, &args.output)
}

fn handle_show(args: ShowArgs) -> Result<(), AppError> {
    let summary = crate::io::summary::read_summary_json(&args.summary)?;
    println!("{}", crate::report::format_summary(&summary));
    Ok(())
}

/// Print the report, write exports, and fail when no regime could be selected.
fn finish(run: &pipeline::RunOutput, output: &OutputArgs) -> Result<(), AppError> {
    println!("{}", crate::report::format_summary(&run.summary));

    if let Some(path) = &output.export_summary {
        crate::io::summary::write_summary_json(path, &run.summary)?;
    }

    let best = run.estimator.best_model();
    if let Some(path) = &output.export_fitted {
        match &best {
            Ok(model) => crate::io::export::write_fitted_csv(path, &run.estimator, *model)?,
            Err(_) => warn!(path = %path.display(), "no best model; fitted export skipped"),
        }
    }

    best.map(|_| ())
}

/// Map CLI estimator flags into a validated `EstimatorConfig`.
pub fn estimator_config_from_args(args: &EstimatorArgs) -> Result<EstimatorConfig, AppError> {
    if !(args.aic_margin.is_finite() && args.aic_margin >= 0.0) {
        return Err(AppError::new(2, "`--aic-margin` must be finite and >= 0."));
    }
    if !(0.0..=100.0).contains(&args.floor_percentile) {
        return Err(AppError::new(2, "`--floor-percentile` must be within [0, 100]."));
    }
    if !args.initial_slope.is_finite() {
        return Err(AppError::new(2, "`--initial-slope` must be finite."));
    }
    if !(args.tolerance.is_finite() && args.tolerance > 0.0) {
        return Err(AppError::new(2, "`--tolerance` must be finite and > 0."));
    }
    if args.grid_steps < 2 {
        return Err(AppError::new(2, "`--grid-steps` must be >= 2."));
    }
    if args.max_evaluations == Some(0) {
        return Err(AppError::new(2, "`--max-evaluations` must be > 0."));
    }

    let defaults = EstimatorConfig::default();
    Ok(EstimatorConfig {
        aic_margin: args.aic_margin,
        floor_percentile: args.floor_percentile,
        initial_slope: args.initial_slope,
        breakpoint_grid_steps: args.grid_steps,
        solver: LmOptions {
            max_evaluations: args.max_evaluations,
            ftol: args.tolerance,
            xtol: args.tolerance,
            ..defaults.solver
        },
        ..defaults
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> EstimatorArgs {
        EstimatorArgs {
            aic_margin: 2.0,
            floor_percentile: 20.0,
            initial_slope: 0.01,
            grid_steps: 25,
            max_evaluations: None,
            tolerance: 1.49012e-8,
        }
    }

    #[test]
    fn default_flags_match_default_config() {
        let config = estimator_config_from_args(&args()).unwrap();
        let defaults = EstimatorConfig::default();
        assert_eq!(config.aic_margin, defaults.aic_margin);
        assert_eq!(config.suppressed_aic, 1e6);
        assert_eq!(config.skipped_rss, 1e13);
        assert_eq!(config.breakpoint_grid_steps, defaults.breakpoint_grid_steps);
        assert_eq!(config.solver, defaults.solver);
    }

    #[test]
    fn flags_override_solver_settings() {
        let config = estimator_config_from_args(&EstimatorArgs {
            max_evaluations: Some(50),
            tolerance: 1e-10,
            ..args()
        })
        .unwrap();
        assert_eq!(config.solver.max_evaluations, Some(50));
        assert_eq!(config.solver.ftol, 1e-10);
        assert_eq!(config.solver.xtol, 1e-10);
    }

    #[test]
    fn invalid_flags_are_rejected() {
        for bad in [
            EstimatorArgs { aic_margin: -1.0, ..args() },
            EstimatorArgs { floor_percentile: 120.0, ..args() },
            EstimatorArgs { tolerance: 0.0, ..args() },
            EstimatorArgs { grid_steps: 1, ..args() },
            EstimatorArgs { max_evaluations: Some(0), ..args() },
        ] {
            assert_eq!(estimator_config_from_args(&bad).unwrap_err().exit_code(), 2);
        }
    }
}
