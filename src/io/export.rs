//! Exports.
//!
//! - fit results to JSON (one document per run, every family included)
//! - posterior chains to CSV, one column per free parameter
//! - atmosphere tables, passbands and photometry to CSV, in the same schemas
//!   `ingest` reads, so simulated inputs can be fed straight back to `wdfit fit`

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::atmosphere::AtmosphereTable;
use crate::domain::{Axis, Family, FitRequest, FitResult, FitResults, Observation};
use crate::error::AppError;

/// Top-level layout of a results JSON file.
#[derive(Debug, Serialize)]
pub struct ResultsFile<'a> {
    pub tool: &'static str,
    pub version: &'static str,
    pub generated_at: DateTime<Utc>,
    pub request: &'a FitRequest,
    /// Converged family with the lowest chi-square, if any.
    pub best: Option<Family>,
    pub results: &'a FitResults,
}

fn create(path: &Path, what: &str) -> Result<File, AppError> {
    File::create(path).map_err(|e| AppError::new(2, format!("Failed to create {what} '{}': {e}", path.display())))
}

fn csv_error(what: &str) -> impl Fn(csv::Error) -> AppError + '_ {
    move |e| AppError::new(2, format!("Failed to write {what} CSV: {e}"))
}

/// Write every family's result plus the request that produced it.
pub fn write_results_json(path: &Path, request: &FitRequest, results: &FitResults) -> Result<(), AppError> {
    let file = create(path, "results JSON")?;
    let doc = ResultsFile {
        tool: "wdfit",
        version: env!("CARGO_PKG_VERSION"),
        generated_at: Utc::now(),
        request,
        best: results.best().map(|r| r.family),
        results,
    };
    serde_json::to_writer_pretty(file, &doc)
        .map_err(|e| AppError::new(2, format!("Failed to write results JSON: {e}")))?;
    log::info!("wrote results to {}", path.display());
    Ok(())
}

/// Write the retained samples of an ensemble fit.
pub fn write_chain_csv(path: &Path, result: &FitResult) -> Result<(), AppError> {
    let chain = result.chain.as_ref().ok_or_else(|| {
        AppError::new(2, format!("The {} fit carries no sample chain.", result.family))
    })?;

    let mut writer = csv::Writer::from_writer(create(path, "chain CSV")?);
    let err = csv_error("chain");
    writer.write_record(&result.labels).map_err(&err)?;
    for sample in chain {
        writer
            .write_record(sample.iter().map(|v| format!("{v:.10}")))
            .map_err(&err)?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush chain CSV: {e}")))?;
    Ok(())
}

/// Write an atmosphere table as `logg,Mbol,Teff,<filters>,<quantities>`.
pub fn write_atmosphere_csv(path: &Path, table: &AtmosphereTable) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_writer(create(path, "atmosphere CSV")?);
    let err = csv_error("atmosphere");

    let axes = [Axis::Logg, Axis::Mbol, Axis::Teff];
    let names: Vec<&str> = axes
        .iter()
        .map(|a| a.column_name())
        .chain(table.filter_names())
        .chain(table.quantity_names())
        .collect();
    let columns: Vec<&[f64]> = names.iter().filter_map(|n| table.column(n)).collect();

    writer.write_record(&names).map_err(&err)?;
    for row in 0..table.len() {
        writer
            .write_record(columns.iter().map(|c| format_cell(c[row])))
            .map_err(&err)?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush atmosphere CSV: {e}")))?;
    Ok(())
}

/// Write `filter,wavelength` for every filter of `table` with a known wavelength.
pub fn write_passbands_csv(path: &Path, table: &AtmosphereTable) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_writer(create(path, "passband CSV")?);
    let err = csv_error("passband");
    writer.write_record(["filter", "wavelength"]).map_err(&err)?;
    for filter in table.filter_names() {
        if let Some(wl) = table.wavelength(filter) {
            writer.write_record([filter.to_string(), format!("{wl}")]).map_err(&err)?;
        }
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush passband CSV: {e}")))?;
    Ok(())
}

/// Write `filter,mag,mag_err`; absent bands get empty cells.
pub fn write_photometry_csv(path: &Path, observations: &[Observation]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_writer(create(path, "photometry CSV")?);
    let err = csv_error("photometry");
    writer.write_record(["filter", "mag", "mag_err"]).map_err(&err)?;
    for obs in observations {
        let (mag, mag_err) = obs
            .photometry
            .map(|p| (format!("{:.6}", p.mag), format!("{:.6}", p.err)))
            .unwrap_or_default();
        writer
            .write_record([obs.filter.as_str(), mag.as_str(), mag_err.as_str()])
            .map_err(&err)?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush photometry CSV: {e}")))?;
    Ok(())
}

fn format_cell(v: f64) -> String {
    if v.is_finite() { format!("{v}") } else { String::new() }
}
