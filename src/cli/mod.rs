//! Command-line parsing for the coupling-regime estimator.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! modeling/math code; `app` maps these types into library configuration.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::domain::RegimeModel;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "lacr", version, about = "Land-atmosphere coupling regime estimator (SM vs EF)")]
pub struct Cli {
    /// More log output on stderr (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Estimate the coupling regime of an (SM, EF) CSV and print diagnostics.
    Fit(FitArgs),
    /// Generate a seeded synthetic sample from one regime shape and estimate it.
    Simulate(SimulateArgs),
    /// Print a previously exported summary JSON.
    Show(ShowArgs),
}

/// Options for fitting a CSV sample.
#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Input CSV with a header row.
    #[arg(long, value_name = "FILE")]
    pub csv: PathBuf,

    /// Soil-moisture column.
    #[arg(long, default_value = "sm")]
    pub sm_col: String,

    /// Evaporative-fraction column.
    #[arg(long, default_value = "ef")]
    pub ef_col: String,

    /// Optional date column (YYYY-MM-DD).
    #[arg(long, default_value = "date")]
    pub date_col: String,

    /// Latent heat flux column, used when the EF column is absent.
    #[arg(long, default_value = "lh")]
    pub lh_col: String,

    /// Sensible heat flux column, used when the EF column is absent.
    #[arg(long, default_value = "sh")]
    pub sh_col: String,

    #[command(flatten)]
    pub output: OutputArgs,

    #[command(flatten)]
    pub estimator: EstimatorArgs,
}

/// Options for synthetic runs.
#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// Shape to draw the sample from.
    #[arg(long, value_enum, default_value_t = RegimeModel::DryToTransitionalToWet)]
    pub model: RegimeModel,

    /// Shape parameters in standardized SM space (comma separated, model order).
    ///
    /// Defaults to a representative set for the chosen model.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub params: Option<Vec<f64>>,

    /// Number of observations.
    #[arg(short = 'n', long, default_value_t = 200)]
    pub n: usize,

    /// Random seed for the EF noise.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Lower end of the SM range.
    #[arg(long, default_value_t = 0.05)]
    pub sm_min: f64,

    /// Upper end of the SM range.
    #[arg(long, default_value_t = 0.45)]
    pub sm_max: f64,

    /// Standard deviation of the EF noise.
    #[arg(long, default_value_t = 0.02)]
    pub noise: f64,

    /// Write the generated sample to CSV (date,sm,ef).
    #[arg(long, value_name = "CSV")]
    pub write_csv: Option<PathBuf>,

    #[command(flatten)]
    pub output: OutputArgs,

    #[command(flatten)]
    pub estimator: EstimatorArgs,
}

/// Result exports shared by `fit` and `simulate`.
#[derive(Debug, Args, Clone)]
pub struct OutputArgs {
    /// Export the regime summary to JSON.
    #[arg(long, value_name = "JSON")]
    pub export_summary: Option<PathBuf>,

    /// Export per-observation fitted values of the best model to CSV.
    #[arg(long, value_name = "CSV")]
    pub export_fitted: Option<PathBuf>,
}

/// Estimator tuning.
#[derive(Debug, Args, Clone)]
pub struct EstimatorArgs {
    /// AIC units a richer model must improve on its baseline by.
    #[arg(long, default_value_t = 2.0)]
    pub aic_margin: f64,

    /// Percentile of EF used as the floor seed of the two-breakpoint fit.
    #[arg(long, default_value_t = 20.0)]
    pub floor_percentile: f64,

    /// Initial slope guess for breakpoint fits.
    #[arg(long, default_value_t = 0.01)]
    pub initial_slope: f64,

    /// Breakpoint candidates per axis of the grid seeding the piecewise fits.
    #[arg(long, default_value_t = 25)]
    pub grid_steps: usize,

    /// Solver evaluation budget per start (default: 200 * (parameters + 1)).
    #[arg(long)]
    pub max_evaluations: Option<usize>,

    /// Relative tolerance on cost reduction and step size.
    #[arg(long, default_value_t = 1.49012e-8)]
    pub tolerance: f64,
}

/// Options for printing a saved summary.
#[derive(Debug, Parser)]
pub struct ShowArgs {
    /// Summary JSON produced by `--export-summary`.
    #[arg(long, value_name = "JSON")]
    pub summary: PathBuf,
}
