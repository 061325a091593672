//! Tabulated atmosphere models for one family.

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::Serialize;

use crate::domain::{Axis, Family};
use crate::error::FitError;

#[derive(Debug, Clone, PartialEq)]
struct FilterColumn {
    name: String,
    /// Pivot wavelength in Å, when known.
    wavelength: Option<f64>,
    values: Vec<f64>,
}

/// What a named column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Axis,
    Filter,
    Quantity,
}

/// One entry of [`AtmosphereTable::parameters`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub kind: ColumnKind,
    pub min: f64,
    pub max: f64,
    pub wavelength: Option<f64>,
}

/// Samples of `(logg, Mbol, Teff) -> magnitude per filter` for one family.
///
/// Every column has one entry per sample. Non-finite entries are allowed here
/// and dropped when a surface is built.
#[derive(Debug, Clone, PartialEq)]
pub struct AtmosphereTable {
    family: Family,
    logg: Vec<f64>,
    mbol: Vec<f64>,
    teff: Vec<f64>,
    filters: Vec<FilterColumn>,
    quantities: BTreeMap<String, Vec<f64>>,
    fingerprint: u64,
}

impl AtmosphereTable {
    pub fn new(family: Family, logg: Vec<f64>, mbol: Vec<f64>, teff: Vec<f64>) -> Result<Self, FitError> {
        if logg.is_empty() {
            return Err(FitError::configuration(format!("{family} atmosphere table is empty")));
        }
        if logg.len() != mbol.len() || logg.len() != teff.len() {
            return Err(FitError::configuration(format!(
                "{family} atmosphere axes differ in length (logg {}, Mbol {}, Teff {})",
                logg.len(),
                mbol.len(),
                teff.len()
            )));
        }
        let mut table = Self {
            family,
            logg,
            mbol,
            teff,
            filters: Vec::new(),
            quantities: BTreeMap::new(),
            fingerprint: 0,
        };
        table.refresh_fingerprint();
        Ok(table)
    }

    pub fn with_filter(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self, FitError> {
        let name = name.into();
        self.check_new_column(&name, values.len())?;
        self.filters.push(FilterColumn {
            name,
            wavelength: None,
            values,
        });
        self.refresh_fingerprint();
        Ok(self)
    }

    /// Add a non-magnitude column (mass, age, ...).
    pub fn with_quantity(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self, FitError> {
        let name = name.into();
        self.check_new_column(&name, values.len())?;
        self.quantities.insert(name, values);
        self.refresh_fingerprint();
        Ok(self)
    }

    /// Attach a pivot wavelength (Å) to an existing filter column.
    pub fn with_wavelength(mut self, filter: &str, wavelength: f64) -> Result<Self, FitError> {
        if !(wavelength.is_finite() && wavelength > 0.0) {
            return Err(FitError::configuration(format!(
                "wavelength for '{filter}' must be finite and > 0 (got {wavelength})"
            )));
        }
        let column = self
            .filters
            .iter_mut()
            .find(|f| f.name == filter)
            .ok_or_else(|| FitError::configuration(format!("unknown filter '{filter}'")))?;
        column.wavelength = Some(wavelength);
        self.refresh_fingerprint();
        Ok(self)
    }

    fn check_new_column(&self, name: &str, len: usize) -> Result<(), FitError> {
        if len != self.len() {
            return Err(FitError::configuration(format!(
                "column '{name}' has {len} values, table has {}",
                self.len()
            )));
        }
        if self.column(name).is_some() {
            return Err(FitError::configuration(format!("duplicate column '{name}'")));
        }
        Ok(())
    }

    fn refresh_fingerprint(&mut self) {
        let mut h = DefaultHasher::new();
        self.family.hash(&mut h);
        for v in self.logg.iter().chain(&self.mbol).chain(&self.teff) {
            v.to_bits().hash(&mut h);
        }
        for f in &self.filters {
            f.name.hash(&mut h);
            f.wavelength.map(f64::to_bits).hash(&mut h);
            f.values.iter().for_each(|v| v.to_bits().hash(&mut h));
        }
        for (name, values) in &self.quantities {
            name.hash(&mut h);
            values.iter().for_each(|v| v.to_bits().hash(&mut h));
        }
        self.fingerprint = h.finish();
    }

    pub fn family(&self) -> Family {
        self.family
    }

    /// Content hash; two tables with different data never share cache entries.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub fn len(&self) -> usize {
        self.logg.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logg.is_empty()
    }

    pub fn axis(&self, axis: Axis) -> &[f64] {
        match axis {
            Axis::Logg => &self.logg,
            Axis::Mbol => &self.mbol,
            Axis::Teff => &self.teff,
        }
    }

    /// Resolve an axis, filter, or quantity column by name.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        match name {
            "logg" => Some(&self.logg),
            "Mbol" => Some(&self.mbol),
            "Teff" => Some(&self.teff),
            _ => self
                .filters
                .iter()
                .find(|f| f.name == name)
                .map(|f| f.values.as_slice())
                .or_else(|| self.quantities.get(name).map(Vec::as_slice)),
        }
    }

    pub fn filter_names(&self) -> impl Iterator<Item = &str> {
        self.filters.iter().map(|f| f.name.as_str())
    }

    pub fn has_filter(&self, name: &str) -> bool {
        self.filters.iter().any(|f| f.name == name)
    }

    pub fn wavelength(&self, filter: &str) -> Option<f64> {
        self.filters
            .iter()
            .find(|f| f.name == filter)
            .and_then(|f| f.wavelength)
    }

    pub fn quantity_names(&self) -> impl Iterator<Item = &str> {
        self.quantities.keys().map(String::as_str)
    }

    /// Every column with its finite value range.
    pub fn parameters(&self) -> Vec<ColumnInfo> {
        let info = |name: &str, kind, values: &[f64], wavelength| {
            let (min, max) = values
                .iter()
                .filter(|v| v.is_finite())
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
            ColumnInfo {
                name: name.to_string(),
                kind,
                min,
                max,
                wavelength,
            }
        };

        let axes = [Axis::Logg, Axis::Mbol, Axis::Teff]
            .into_iter()
            .map(|a| info(a.column_name(), ColumnKind::Axis, self.axis(a), None));
        let filters = self
            .filters
            .iter()
            .map(|f| info(&f.name, ColumnKind::Filter, &f.values, f.wavelength));
        let quantities = self
            .quantities
            .iter()
            .map(|(name, values)| info(name, ColumnKind::Quantity, values, None));

        axes.chain(filters).chain(quantities).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> AtmosphereTable {
        AtmosphereTable::new(Family::H, vec![7.0, 8.0], vec![10.0, 11.0], vec![12000.0, 9000.0])
            .unwrap()
            .with_filter("G3", vec![10.5, 11.6])
            .unwrap()
            .with_quantity("mass", vec![0.4, 0.6])
            .unwrap()
    }

    #[test]
    fn columns_resolve_by_name() {
        let t = small();
        assert_eq!(t.column("Teff"), Some(&[12000.0, 9000.0][..]));
        assert_eq!(t.column("G3"), Some(&[10.5, 11.6][..]));
        assert_eq!(t.column("mass"), Some(&[0.4, 0.6][..]));
        assert_eq!(t.column("NUV"), None);
    }

    #[test]
    fn duplicate_or_short_columns_are_rejected() {
        assert!(small().with_filter("G3", vec![1.0, 2.0]).is_err());
        assert!(small().with_filter("BP", vec![1.0]).is_err());
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = small();
        let b = small().with_wavelength("G3", 6218.0).unwrap();
        assert_eq!(a.fingerprint(), small().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn parameters_list_ranges() {
        let params = small().parameters();
        let teff = params.iter().find(|c| c.name == "Teff").unwrap();
        assert_eq!((teff.min, teff.max), (9000.0, 12000.0));
        assert_eq!(params.iter().filter(|c| c.kind == ColumnKind::Filter).count(), 1);
    }
}
