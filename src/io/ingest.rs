//! CSV ingest.
//!
//! Four inputs are read here, all through the same lenient reader (flexible
//! record length, trimmed cells):
//!
//! - atmosphere tables: `logg,Mbol,Teff,<filter>...,[mass],[age],...`
//! - passbands: `filter,wavelength` (pivot wavelength in Å)
//! - filter extinction: `filter,logg,teff,rv,value` (`A_filter / E(B-V)`)
//! - photometry: `filter,mag,mag_err` (an empty `mag` marks a band as not observed)
//!
//! Axis and schema column names are matched case-insensitively; filter names
//! are kept exactly as written. Rows that cannot be parsed are skipped and
//! reported, never silently dropped.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;

use csv::StringRecord;

use crate::atmosphere::AtmosphereTable;
use crate::domain::{Family, Observation, Photometry};
use crate::error::AppError;
use crate::reddening::{ExtinctionPoint, TabulatedFilterExtinction};

/// Columns treated as physical quantities rather than magnitudes.
const QUANTITY_COLUMNS: [&str; 4] = ["mass", "age", "radius", "cooling_age"];

/// A row-level error encountered during ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Parsed payload plus bookkeeping about skipped rows.
#[derive(Debug, Clone)]
pub struct Ingested<T> {
    pub value: T,
    pub rows_read: usize,
    pub rows_used: usize,
    pub row_errors: Vec<RowError>,
}

impl<T> Ingested<T> {
    fn log_row_errors(&self, path: &Path) {
        for e in &self.row_errors {
            log::warn!("{}:{}: {}", path.display(), e.line, e.message);
        }
    }
}

fn open_reader(path: &Path, what: &str) -> Result<(csv::Reader<File>, StringRecord), AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open {what} CSV '{}': {e}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read {what} CSV headers: {e}")))?
        .clone();

    Ok((reader, headers))
}

fn normalize_header(name: &str) -> String {
    name.trim().trim_start_matches('\u{feff}').to_ascii_lowercase()
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(i, h)| (normalize_header(h), i))
        .collect()
}

fn require_columns(header_map: &HashMap<String, usize>, required: &[&str], what: &str) -> Result<(), AppError> {
    for name in required {
        if !header_map.contains_key(*name) {
            return Err(AppError::new(2, format!("Missing required {what} column: `{name}`")));
        }
    }
    Ok(())
}

fn get<'r>(record: &'r StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'r str> {
    header_map
        .get(name)
        .and_then(|&i| record.get(i))
        .filter(|s| !s.is_empty())
}

fn parse_required(record: &StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Result<f64, String> {
    let raw = get(record, header_map, name).ok_or_else(|| format!("Missing `{name}` value."))?;
    parse_f64(raw).ok_or_else(|| format!("Invalid `{name}` value '{raw}'."))
}

fn parse_f64(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Run `parse_row` over every record, collecting successes and row errors.
fn read_rows<T>(
    reader: &mut csv::Reader<File>,
    mut parse_row: impl FnMut(&StringRecord) -> Result<T, String>,
) -> (Vec<T>, usize, Vec<RowError>) {
    let mut rows = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // records() starts after the header; lines are 1-based.
        let line = idx + 2;
        rows_read += 1;
        let outcome = result
            .map_err(|e| format!("CSV parse error: {e}"))
            .and_then(|record| parse_row(&record));
        match outcome {
            Ok(row) => rows.push(row),
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }
    (rows, rows_read, row_errors)
}

/// Load one family's atmosphere table.
///
/// Every column other than the three axes is a filter magnitude, except the
/// known quantity columns (`mass`, `age`, ...). Blank or non-numeric filter
/// cells become NaN and are dropped when a surface is built.
pub fn load_atmosphere_table(path: &Path, family: Family) -> Result<Ingested<AtmosphereTable>, AppError> {
    let (mut reader, headers) = open_reader(path, "atmosphere")?;
    let header_map = build_header_map(&headers);
    require_columns(&header_map, &["logg", "mbol", "teff"], "atmosphere")?;

    let value_columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| !matches!(normalize_header(h).as_str(), "logg" | "mbol" | "teff"))
        .map(|(i, h)| (i, h.trim().trim_start_matches('\u{feff}').to_string()))
        .collect();
    if value_columns.is_empty() {
        return Err(AppError::new(2, format!("Atmosphere CSV '{}' has no filter columns.", path.display())));
    }

    let (rows, rows_read, row_errors) = read_rows(&mut reader, |record| {
        let logg = parse_required(record, &header_map, "logg")?;
        let mbol = parse_required(record, &header_map, "mbol")?;
        let teff = parse_required(record, &header_map, "teff")?;
        let values: Vec<f64> = value_columns
            .iter()
            .map(|(i, _)| record.get(*i).and_then(parse_f64).unwrap_or(f64::NAN))
            .collect();
        Ok((logg, mbol, teff, values))
    });

    if rows.is_empty() {
        return Err(AppError::new(3, format!("No valid rows in atmosphere CSV '{}'.", path.display())));
    }

    let logg = rows.iter().map(|r| r.0).collect();
    let mbol = rows.iter().map(|r| r.1).collect();
    let teff = rows.iter().map(|r| r.2).collect();
    let mut table = AtmosphereTable::new(family, logg, mbol, teff)?;
    for (col, (_, name)) in value_columns.iter().enumerate() {
        let values = rows.iter().map(|r| r.3[col]).collect();
        table = if QUANTITY_COLUMNS.contains(&name.to_ascii_lowercase().as_str()) {
            table.with_quantity(name.to_ascii_lowercase(), values)?
        } else {
            table.with_filter(name.clone(), values)?
        };
    }

    let ingested = Ingested {
        value: table,
        rows_read,
        rows_used: rows.len(),
        row_errors,
    };
    ingested.log_row_errors(path);
    log::info!(
        "loaded {family} atmosphere table from {} ({} of {} rows)",
        path.display(),
        ingested.rows_used,
        ingested.rows_read
    );
    Ok(ingested)
}

/// Load pivot wavelengths, keyed by filter name.
pub fn load_passbands(path: &Path) -> Result<Ingested<BTreeMap<String, f64>>, AppError> {
    let (mut reader, headers) = open_reader(path, "passband")?;
    let header_map = build_header_map(&headers);
    require_columns(&header_map, &["filter", "wavelength"], "passband")?;

    let (rows, rows_read, row_errors) = read_rows(&mut reader, |record| {
        let filter = get(record, &header_map, "filter").ok_or("Missing `filter` value.")?;
        let wavelength = parse_required(record, &header_map, "wavelength")?;
        if wavelength <= 0.0 {
            return Err(format!("Wavelength for '{filter}' must be > 0."));
        }
        Ok((filter.to_string(), wavelength))
    });
    if rows.is_empty() {
        return Err(AppError::new(3, format!("No valid rows in passband CSV '{}'.", path.display())));
    }

    let ingested = Ingested {
        rows_used: rows.len(),
        value: rows.into_iter().collect(),
        rows_read,
        row_errors,
    };
    ingested.log_row_errors(path);
    Ok(ingested)
}

/// Attach every known passband to the table's filters; unknown names are ignored.
pub fn apply_passbands(
    mut table: AtmosphereTable,
    passbands: &BTreeMap<String, f64>,
) -> Result<AtmosphereTable, AppError> {
    for (filter, wavelength) in passbands {
        if table.has_filter(filter) {
            table = table.with_wavelength(filter, *wavelength)?;
        } else {
            log::debug!("passband '{filter}' has no column in the {} table", table.family());
        }
    }
    Ok(table)
}

/// Load a tabulated per-filter extinction law.
pub fn load_filter_extinction(path: &Path) -> Result<Ingested<TabulatedFilterExtinction>, AppError> {
    let (mut reader, headers) = open_reader(path, "extinction")?;
    let header_map = build_header_map(&headers);
    require_columns(&header_map, &["filter", "logg", "teff", "rv", "value"], "extinction")?;

    let (rows, rows_read, row_errors) = read_rows(&mut reader, |record| {
        let filter = get(record, &header_map, "filter").ok_or("Missing `filter` value.")?;
        let point = ExtinctionPoint {
            logg: parse_required(record, &header_map, "logg")?,
            teff: parse_required(record, &header_map, "teff")?,
            rv: parse_required(record, &header_map, "rv")?,
            value: parse_required(record, &header_map, "value")?,
        };
        Ok((filter.to_string(), point))
    });
    if rows.is_empty() {
        return Err(AppError::new(3, format!("No valid rows in extinction CSV '{}'.", path.display())));
    }

    let mut by_filter: BTreeMap<String, Vec<ExtinctionPoint>> = BTreeMap::new();
    let rows_used = rows.len();
    for (filter, point) in rows {
        by_filter.entry(filter).or_default().push(point);
    }
    let mut law = TabulatedFilterExtinction::new();
    for (filter, points) in &by_filter {
        law = law.with_filter(filter.clone(), points)?;
    }

    let ingested = Ingested {
        value: law,
        rows_read,
        rows_used,
        row_errors,
    };
    ingested.log_row_errors(path);
    Ok(ingested)
}

/// Load observed photometry in file order.
pub fn load_photometry(path: &Path) -> Result<Ingested<Vec<Observation>>, AppError> {
    let (mut reader, headers) = open_reader(path, "photometry")?;
    let header_map = build_header_map(&headers);
    require_columns(&header_map, &["filter", "mag"], "photometry")?;
    if !header_map.contains_key("mag_err") && !header_map.contains_key("err") {
        return Err(AppError::new(2, "Missing required photometry column: `mag_err`"));
    }
    let err_column = if header_map.contains_key("mag_err") { "mag_err" } else { "err" };

    let (rows, rows_read, row_errors) = read_rows(&mut reader, |record| {
        let filter = get(record, &header_map, "filter").ok_or("Missing `filter` value.")?;
        let photometry = match get(record, &header_map, "mag") {
            None => None,
            Some(raw) => {
                let mag = parse_f64(raw).ok_or_else(|| format!("Invalid `mag` value '{raw}'."))?;
                let err = parse_required(record, &header_map, err_column)?;
                Some(Photometry { mag, err })
            }
        };
        Ok(Observation {
            filter: filter.to_string(),
            photometry,
        })
    });
    if rows.is_empty() {
        return Err(AppError::new(3, format!("No valid rows in photometry CSV '{}'.", path.display())));
    }

    let ingested = Ingested {
        rows_used: rows.len(),
        value: rows,
        rows_read,
        row_errors,
    };
    ingested.log_row_errors(path);
    Ok(ingested)
}
