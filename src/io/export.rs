//! Export per-observation fitted values to CSV.
//!
//! The export is meant to be easy to consume in spreadsheets or downstream scripts.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::NaiveDate;

use crate::domain::RegimeModel;
use crate::error::AppError;
use crate::fit::RegimeEstimator;

/// Write `index,sm,sm_std,ef,ef_fit,residual` for `model` (one row per observation).
///
/// `ef_fit` is the grid prediction at the same index, as used for RSS.
pub fn write_fitted_csv(path: &Path, estimator: &RegimeEstimator, model: RegimeModel) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display())))?;
    write_fitted(file, estimator, model)
}

fn write_fitted<W: Write>(out: W, estimator: &RegimeEstimator, model: RegimeModel) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_writer(out);
    writer
        .write_record(["index", "sm", "sm_std", "ef", "ef_fit", "residual"])
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV header: {e}")))?;

    let predicted = estimator.predicted(model);
    let residuals = estimator.residuals(model);
    let rows = estimator
        .sm()
        .iter()
        .zip(estimator.sm_std())
        .zip(estimator.ef())
        .zip(predicted.iter().zip(&residuals))
        .enumerate();

    for (i, (((sm, sm_std), ef), (fit, res))) in rows {
        writer
            .write_record([
                i.to_string(),
                format!("{sm:.6}"),
                format!("{sm_std:.6}"),
                format!("{ef:.6}"),
                format_value(*fit),
                format_value(*res),
            ])
            .map_err(|e| AppError::new(2, format!("Failed to write export CSV row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush export CSV: {e}")))?;
    Ok(())
}

/// Write a raw sample as `date,sm,ef` (readable back by `load_sample`).
pub fn write_sample_csv(path: &Path, dates: &[NaiveDate], sm: &[f64], ef: &[f64]) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create sample CSV '{}': {e}", path.display())))?;
    let mut writer = csv::Writer::from_writer(file);
    writer
        .write_record(["date", "sm", "ef"])
        .map_err(|e| AppError::new(2, format!("Failed to write sample CSV header: {e}")))?;
    for ((date, sm), ef) in dates.iter().zip(sm).zip(ef) {
        writer
            .write_record([date.to_string(), format!("{sm:.8}"), format!("{ef:.8}")])
            .map_err(|e| AppError::new(2, format!("Failed to write sample CSV row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush sample CSV: {e}")))?;
    Ok(())
}

/// Empty cell for NaN so spreadsheets read it as missing.
fn format_value(v: f64) -> String {
    if v.is_nan() { String::new() } else { format!("{v:.6}") }
}
