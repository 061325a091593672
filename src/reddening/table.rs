//! Per-filter extinction tabulated on a regular (logg, Teff, Rv) grid.

use std::collections::BTreeMap;

use crate::error::FitError;
use crate::reddening::FilterExtinction;

/// One row of a tabulated extinction file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtinctionPoint {
    pub logg: f64,
    pub teff: f64,
    pub rv: f64,
    /// A_filter / E(B-V).
    pub value: f64,
}

#[derive(Debug, Clone)]
struct FilterCube {
    logg: Vec<f64>,
    teff: Vec<f64>,
    rv: Vec<f64>,
    /// Row-major `[logg][teff][rv]`.
    values: Vec<f64>,
}

impl FilterCube {
    fn from_points(filter: &str, points: &[ExtinctionPoint]) -> Result<Self, FitError> {
        let logg = unique_sorted(points.iter().map(|p| p.logg));
        let teff = unique_sorted(points.iter().map(|p| p.teff));
        let rv = unique_sorted(points.iter().map(|p| p.rv));

        let size = logg.len() * teff.len() * rv.len();
        let mut values = vec![f64::NAN; size];
        for p in points {
            let (Some(i), Some(j), Some(k)) = (
                position(&logg, p.logg),
                position(&teff, p.teff),
                position(&rv, p.rv),
            ) else {
                return Err(FitError::configuration(format!(
                    "non-finite extinction coordinate for '{filter}'"
                )));
            };
            values[(i * teff.len() + j) * rv.len() + k] = p.value;
        }

        if values.iter().any(|v| !v.is_finite()) {
            return Err(FitError::configuration(format!(
                "extinction table for '{filter}' is not a complete regular (logg, Teff, Rv) grid"
            )));
        }

        Ok(Self {
            logg,
            teff,
            rv,
            values,
        })
    }

    fn at(&self, i: usize, j: usize, k: usize) -> f64 {
        self.values[(i * self.teff.len() + j) * self.rv.len() + k]
    }

    fn eval(&self, filter: &str, logg: f64, teff: f64, rv: f64) -> Result<f64, FitError> {
        let (i0, i1, ti) = bracket(&self.logg, logg, filter, "logg")?;
        let (j0, j1, tj) = bracket(&self.teff, teff, filter, "Teff")?;
        let (k0, k1, tk) = bracket(&self.rv, rv, filter, "Rv")?;

        let lerp = |a: f64, b: f64, t: f64| a + (b - a) * t;
        let along_rv = |i, j| lerp(self.at(i, j, k0), self.at(i, j, k1), tk);
        let along_teff = |i| lerp(along_rv(i, j0), along_rv(i, j1), tj);
        Ok(lerp(along_teff(i0), along_teff(i1), ti))
    }
}

fn unique_sorted(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut v: Vec<f64> = values.filter(|x| x.is_finite()).collect();
    v.sort_by(f64::total_cmp);
    v.dedup();
    v
}

fn position(axis: &[f64], v: f64) -> Option<usize> {
    axis.iter().position(|&a| a == v)
}

/// Lower/upper node indices and the fractional position between them.
fn bracket(axis: &[f64], v: f64, filter: &str, name: &str) -> Result<(usize, usize, f64), FitError> {
    let out_of_range = || {
        FitError::domain(format!(
            "{name} = {v} outside the extinction table for '{filter}' [{}, {}]",
            axis[0],
            axis[axis.len() - 1]
        ))
    };
    if axis.len() == 1 {
        return if v == axis[0] { Ok((0, 0, 0.0)) } else { Err(out_of_range()) };
    }
    if !(v >= axis[0] && v <= axis[axis.len() - 1]) {
        return Err(out_of_range());
    }
    let i = axis.partition_point(|&a| a <= v).saturating_sub(1).min(axis.len() - 2);
    Ok((i, i + 1, (v - axis[i]) / (axis[i + 1] - axis[i])))
}

/// Trilinear per-filter extinction law.
#[derive(Debug, Clone, Default)]
pub struct TabulatedFilterExtinction {
    cubes: BTreeMap<String, FilterCube>,
}

impl TabulatedFilterExtinction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: impl Into<String>, points: &[ExtinctionPoint]) -> Result<Self, FitError> {
        let filter = filter.into();
        if points.is_empty() {
            return Err(FitError::configuration(format!("no extinction points for '{filter}'")));
        }
        let cube = FilterCube::from_points(&filter, points)?;
        self.cubes.insert(filter, cube);
        Ok(self)
    }

    pub fn filters(&self) -> impl Iterator<Item = &str> {
        self.cubes.keys().map(String::as_str)
    }
}

impl FilterExtinction for TabulatedFilterExtinction {
    fn supports(&self, filter: &str) -> bool {
        self.cubes.contains_key(filter)
    }

    fn per_ebv(&self, filter: &str, logg: f64, teff: f64, rv: f64) -> Result<f64, FitError> {
        let cube = self
            .cubes
            .get(filter)
            .ok_or_else(|| FitError::configuration(format!("no extinction table for filter '{filter}'")))?;
        cube.eval(filter, logg, teff, rv)
    }
}
