//! Read/write regime summary JSON files.
//!
//! A summary is the portable result of one estimator run: the selected regime,
//! its physical parameters, every candidate's diagnostics and the configuration
//! used. The schema is `domain::RegimeSummary`.

use std::fs::File;
use std::path::Path;

use crate::domain::RegimeSummary;
use crate::error::AppError;

/// Write a summary JSON file.
pub fn write_summary_json(path: &Path, summary: &RegimeSummary) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create summary JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, summary)
        .map_err(|e| AppError::new(2, format!("Failed to write summary JSON: {e}")))?;
    Ok(())
}

/// Read a summary JSON file.
pub fn read_summary_json(path: &Path) -> Result<RegimeSummary, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open summary JSON '{}': {e}", path.display())))?;
    let summary: RegimeSummary =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid summary JSON: {e}")))?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RegimeModel;
    use crate::fit::RegimeEstimator;
    use crate::math::linspace;

    #[test]
    fn summary_survives_a_file_roundtrip() {
        let sm = linspace(0.05, 0.45, 50);
        let ef: Vec<f64> = sm.iter().map(|v| 0.1 + 1.5 * v).collect();
        let summary = RegimeEstimator::new(&sm, &ef).unwrap().summary();

        let path = std::env::temp_dir().join(format!("lacr-summary-{}.json", std::process::id()));
        write_summary_json(&path, &summary).unwrap();
        let back = read_summary_json(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(back.best_model, summary.best_model);
        assert_eq!(back.best_model_code, summary.best_model_code);
        assert_eq!(back.candidates.len(), 5);
        assert_eq!(back.stats.n_points, 50);
        assert_eq!(back.config.aic_margin, 2.0);
        for (a, b) in back.candidates.iter().zip(&summary.candidates) {
            assert_eq!(a.model, b.model);
            assert_eq!(a.params.len(), b.params.len());
            assert_eq!(a.aic.is_some(), b.aic.is_some());
        }
        assert!(back.candidates.iter().any(|c| c.model == RegimeModel::Linear && c.converged));
    }

    #[test]
    fn invalid_json_is_an_input_error() {
        let path = std::env::temp_dir().join(format!("lacr-bad-{}.json", std::process::id()));
        std::fs::write(&path, "{ not json").unwrap();
        let err = read_summary_json(&path).unwrap_err();
        let _ = std::fs::remove_file(&path);
        assert_eq!(err.exit_code(), 2);
    }
}
