//! CSV ingest and normalization.
//!
//! Turns a tabular (SM, EF) time series into two aligned `f64` vectors that are
//! safe to hand to the estimator:
//! - **Header-based schema**: columns are found by (case-insensitive) name
//! - **Row-level validation**: rows with missing or non-finite values are skipped
//!   and reported, never silently kept
//! - **EF from fluxes**: when the EF column is absent but `lh`/`sh` exist, EF is
//!   derived per row as `LH / (LH + SH)`

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use csv::StringRecord;

use crate::error::AppError;

/// Column names to read.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub sm: String,
    pub ef: String,
    pub date: String,
    pub latent_heat: String,
    pub sensible_heat: String,
}

impl Default for ColumnSpec {
    fn default() -> Self {
        Self {
            sm: "sm".to_string(),
            ef: "ef".to_string(),
            date: "date".to_string(),
            latent_heat: "lh".to_string(),
            sensible_heat: "sh".to_string(),
        }
    }
}

/// Where the EF values came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EfSource {
    Column,
    Fluxes,
}

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Ingest output: aligned samples + row diagnostics.
#[derive(Debug, Clone)]
pub struct IngestedSample {
    pub source: PathBuf,
    pub sm: Vec<f64>,
    pub ef: Vec<f64>,
    /// Per-row date when the file has a date column.
    pub dates: Vec<Option<NaiveDate>>,
    pub ef_source: EfSource,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

impl IngestedSample {
    pub fn rows_used(&self) -> usize {
        self.sm.len()
    }

    /// First and last valid date, when any row carried one.
    pub fn period(&self) -> Option<(NaiveDate, NaiveDate)> {
        let mut dates = self.dates.iter().flatten().copied();
        let first = dates.next()?;
        let (start, end) = dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d)));
        Some((start, end))
    }
}

/// `LH / (LH + SH)`, or `None` when the ratio is undefined or non-finite.
pub fn evaporative_fraction(latent_heat: f64, sensible_heat: f64) -> Option<f64> {
    let total = latent_heat + sensible_heat;
    if total == 0.0 {
        return None;
    }
    let ef = latent_heat / total;
    ef.is_finite().then_some(ef)
}

/// Load an (SM, EF) sample from a CSV file.
pub fn load_sample(path: &Path, columns: &ColumnSpec) -> Result<IngestedSample, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;
    let mut sample = read_sample(file, columns)?;
    sample.source = path.to_path_buf();
    Ok(sample)
}

/// Parse an (SM, EF) sample from any CSV reader.
pub fn read_sample<R: Read>(reader: R, columns: &ColumnSpec) -> Result<IngestedSample, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    let layout = resolve_layout(&header_map, columns)?;

    let mut sm = Vec::new();
    let mut ef = Vec::new();
    let mut dates = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match parse_row(&record, &layout) {
            Ok(row) => {
                sm.push(row.sm);
                ef.push(row.ef);
                dates.push(row.date);
            }
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    if sm.is_empty() {
        return Err(AppError::new(3, "No valid (SM, EF) rows remain after validation."));
    }

    Ok(IngestedSample {
        source: PathBuf::new(),
        sm,
        ef,
        dates,
        ef_source: layout.ef_source(),
        row_errors,
        rows_read,
    })
}

/// Resolved column positions.
#[derive(Debug, Clone, Copy)]
struct Layout {
    sm: usize,
    ef: EfColumns,
    date: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
enum EfColumns {
    Direct(usize),
    Fluxes { lh: usize, sh: usize },
}

impl Layout {
    fn ef_source(&self) -> EfSource {
        match self.ef {
            EfColumns::Direct(_) => EfSource::Column,
            EfColumns::Fluxes { .. } => EfSource::Fluxes,
        }
    }
}

struct SampleRow {
    sm: f64,
    ef: f64,
    date: Option<NaiveDate>,
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn resolve_layout(header_map: &HashMap<String, usize>, columns: &ColumnSpec) -> Result<Layout, AppError> {
    let lookup = |name: &str| header_map.get(&normalize_header_name(name)).copied();

    let sm = lookup(&columns.sm)
        .ok_or_else(|| AppError::new(2, format!("Missing required column: `{}`", columns.sm)))?;

    let ef = match (
        lookup(&columns.ef),
        lookup(&columns.latent_heat),
        lookup(&columns.sensible_heat),
    ) {
        (Some(idx), _, _) => EfColumns::Direct(idx),
        (None, Some(lh), Some(sh)) => EfColumns::Fluxes { lh, sh },
        _ => {
            return Err(AppError::new(
                2,
                format!(
                    "Missing EF: need a `{}` column, or both `{}` and `{}` flux columns.",
                    columns.ef, columns.latent_heat, columns.sensible_heat
                ),
            ));
        }
    };

    Ok(Layout {
        sm,
        ef,
        date: lookup(&columns.date),
    })
}

fn parse_row(record: &StringRecord, layout: &Layout) -> Result<SampleRow, String> {
    let sm = parse_finite(get_field(record, layout.sm), "sm")?;

    let ef = match layout.ef {
        EfColumns::Direct(idx) => parse_finite(get_field(record, idx), "ef")?,
        EfColumns::Fluxes { lh, sh } => {
            let lh = parse_finite(get_field(record, lh), "lh")?;
            let sh = parse_finite(get_field(record, sh), "sh")?;
            evaporative_fraction(lh, sh).ok_or_else(|| "EF undefined (LH + SH = 0).".to_string())?
        }
    };

    let date = match layout.date.and_then(|idx| get_field(record, idx)) {
        Some(s) => Some(parse_date(s)?),
        None => None,
    };

    Ok(SampleRow { sm, ef, date })
}

fn get_field(record: &StringRecord, idx: usize) -> Option<&str> {
    record.get(idx).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_finite(s: Option<&str>, name: &str) -> Result<f64, String> {
    let s = s.ok_or_else(|| format!("Missing `{name}` value."))?;
    let v = s
        .parse::<f64>()
        .map_err(|_| format!("Invalid `{name}` value '{s}'."))?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(format!("Non-finite `{name}` value."))
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    const FMTS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"];
    for fmt in FMTS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d);
        }
    }
    Err(format!("Invalid date '{s}'. Expected YYYY-MM-DD, YYYY/MM/DD or DD/MM/YYYY."))
}
