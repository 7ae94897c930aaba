//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the math/fitting code stays clean and testable
//! - output changes are localized

use crate::domain::{CandidateSummary, RegimeSummary};
use crate::io::ingest::RowError;

/// Format the full run summary (sample stats + candidate diagnostics + regime).
pub fn format_summary(summary: &RegimeSummary) -> String {
    let mut out = String::new();

    out.push_str("=== lacr - Land-Atmosphere Coupling Regime ===\n");
    let s = &summary.stats;
    out.push_str(&format!(
        "Sample: n={} | SM=[{:.4}, {:.4}] mean={:.4} std={:.4} | EF=[{:.4}, {:.4}]\n",
        s.n_points, s.sm_min, s.sm_max, s.sm_mean, s.sm_std, s.ef_min, s.ef_max
    ));
    if let (Some(start), Some(end)) = (s.period_start, s.period_end) {
        out.push_str(&format!("Period: {start} .. {end}\n"));
    }

    out.push_str("\nModel diagnostics:\n");
    out.push_str(&format!(
        "  {:<28} {:>2} {:>14} {:>14}  {}\n",
        "model", "k", "RSS", "AIC", "params"
    ));
    for c in &summary.candidates {
        let chosen = if Some(c.model) == summary.best_model { "*" } else { " " };
        out.push_str(
            format!(
                "{chosen} {:<28} {:>2} {:>14} {:>14}  {}\n",
                c.model.name(),
                c.model.param_count(),
                fmt_opt(c.rss, 6),
                fmt_aic(c),
                fmt_params(c),
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out.push_str("\nRegime:\n");
    match (summary.best_model, summary.best_model_code) {
        (Some(model), Some(code)) => out.push_str(&format!("- best model: {model} (code={code})\n")),
        _ => out.push_str("- best model: none (no comparable AIC)\n"),
    }
    out.push_str(&format!("- wilting point : {}\n", fmt_opt(summary.wilting_point, 4)));
    out.push_str(&format!("- critical point: {}\n", fmt_opt(summary.critical_point, 4)));
    out.push_str(&format!("- slope         : {}\n", fmt_opt(summary.slope, 4)));
    out.push_str(&format!(
        "- transitional  : {}\n",
        summary
            .transitional_fraction
            .map(|f| format!("{f:.1}%"))
            .unwrap_or_else(|| "NaN".to_string())
    ));

    out
}

/// Short listing of skipped CSV rows (first `max` only).
pub fn format_row_errors(errors: &[RowError], max: usize) -> String {
    let mut out = format!("Skipped rows: {}\n", errors.len());
    for e in errors.iter().take(max) {
        out.push_str(&format!("  line {}: {}\n", e.line, e.message));
    }
    if errors.len() > max {
        out.push_str(&format!("  ... and {} more\n", errors.len() - max));
    }
    out
}

fn fmt_aic(c: &CandidateSummary) -> String {
    if c.gated { "gated".to_string() } else { fmt_opt(c.aic, 3) }
}

fn fmt_params(c: &CandidateSummary) -> String {
    if let Some(failure) = c.failure {
        return format!("({})", failure.describe());
    }
    let parts: Vec<String> = c
        .params
        .iter()
        .map(|p| p.map(|v| format!("{v:.4}")).unwrap_or_else(|| "NaN".to_string()))
        .collect();
    format!("[{}]", parts.join(", "))
}

fn fmt_opt(v: Option<f64>, decimals: usize) -> String {
    match v {
        Some(v) => format!("{v:.decimals$}"),
        None => "NaN".to_string(),
    }
}
