//! Synthetic atmosphere grids and photometry.
//!
//! The grid is analytic so it can be regenerated anywhere without shipping
//! model tables:
//!
//! - luminosity from `Mbol`: `L = 10^(-0.4 (Mbol - 4.74))` (solar units)
//! - radius from `logg`: `R = 0.0127 * 10^(-(logg - 8) / 2)` (solar units)
//! - `Teff = 5772 * (L / R²)^¼`
//! - per-filter absolute magnitude = `Mbol` + a smooth bolometric correction in
//!   `log10(Teff / 10⁴)` and `logg`; the He family uses slightly different
//!   corrections so the two families are distinguishable
//!
//! Photometry is drawn from the same interpolators the fitter uses, with
//! optional Gaussian noise from a seeded RNG.

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::atmosphere::{AtmosphereGrid, AtmosphereTable, InterpolatorCache};
use crate::domain::{Axis, Family, InterpolationMethod, Observation};
use crate::error::FitError;
use crate::models::distance_modulus;
use crate::reddening::ExtinctionModel;

/// Passbands of the synthetic grid with their pivot wavelengths in Å.
pub const SYNTHETIC_FILTERS: [(&str, f64); 5] = [
    ("G3", 6218.0),
    ("G3_BP", 5110.0),
    ("G3_RP", 7769.0),
    ("FUV", 1535.0),
    ("NUV", 2301.0),
];

/// `(c0, c1, c2, c3)` in `M - Mbol = c0 + c1 t + c2 t² + c3 (logg - 8)`, `t = log10(Teff / 10⁴)`.
const H_CORRECTIONS: [[f64; 4]; 5] = [
    [0.30, 1.60, 0.80, 0.020],
    [0.25, 1.20, 0.90, 0.015],
    [0.45, 2.10, 0.70, 0.030],
    [0.00, -1.50, 3.00, -0.050],
    [0.10, -0.40, 2.00, -0.020],
];

const HE_CORRECTIONS: [[f64; 4]; 5] = [
    [0.33, 1.50, 0.70, 0.010],
    [0.29, 1.10, 0.85, 0.010],
    [0.47, 2.00, 0.60, 0.025],
    [0.12, -1.30, 2.60, -0.040],
    [0.18, -0.30, 1.80, -0.015],
];

/// Sampling of the synthetic `(logg, Mbol)` lattice.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    pub logg_min: f64,
    pub logg_max: f64,
    pub logg_step: f64,
    pub mbol_min: f64,
    pub mbol_max: f64,
    pub mbol_step: f64,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            logg_min: 7.0,
            logg_max: 9.5,
            logg_step: 0.25,
            mbol_min: 2.0,
            mbol_max: 18.0,
            mbol_step: 0.5,
        }
    }
}

impl GridSpec {
    fn validate(&self) -> Result<(), FitError> {
        let ok = [self.logg_min, self.logg_max, self.logg_step, self.mbol_min, self.mbol_max, self.mbol_step]
            .iter()
            .all(|v| v.is_finite())
            && self.logg_step > 0.0
            && self.mbol_step > 0.0
            && self.logg_max > self.logg_min
            && self.mbol_max > self.mbol_min;
        if ok {
            Ok(())
        } else {
            Err(FitError::configuration(format!("invalid synthetic grid spec {self:?}")))
        }
    }
}

fn lattice(min: f64, max: f64, step: f64) -> Vec<f64> {
    let n = ((max - min) / step + 1e-9).floor() as usize;
    (0..=n).map(|i| min + i as f64 * step).collect()
}

/// Effective temperature implied by `(Mbol, logg)`.
pub fn analytic_teff(mbol: f64, logg: f64) -> f64 {
    let luminosity = 10f64.powf(-0.4 * (mbol - 4.74));
    let radius = 0.0127 * 10f64.powf(-(logg - 8.0) / 2.0);
    5772.0 * (luminosity / (radius * radius)).powf(0.25)
}

/// Absolute magnitude of `SYNTHETIC_FILTERS[filter]` at `(Mbol, logg)`.
pub fn analytic_magnitude(family: Family, filter: usize, mbol: f64, logg: f64) -> f64 {
    let c = match family {
        Family::H => H_CORRECTIONS[filter],
        Family::He => HE_CORRECTIONS[filter],
    };
    let t = (analytic_teff(mbol, logg) / 1.0e4).log10();
    mbol + c[0] + c[1] * t + c[2] * t * t + c[3] * (logg - 8.0)
}

/// One family's table on the lattice, with pivot wavelengths and mass/age columns.
pub fn synthetic_table(family: Family, spec: &GridSpec) -> Result<AtmosphereTable, FitError> {
    spec.validate()?;

    let mut logg = Vec::new();
    let mut mbol = Vec::new();
    for &g in &lattice(spec.logg_min, spec.logg_max, spec.logg_step) {
        for &m in &lattice(spec.mbol_min, spec.mbol_max, spec.mbol_step) {
            logg.push(g);
            mbol.push(m);
        }
    }
    let teff = logg.iter().zip(&mbol).map(|(&g, &m)| analytic_teff(m, g)).collect();

    let mass = logg.iter().map(|g| 0.6 + 0.4 * (g - 8.0)).collect();
    let age = logg
        .iter()
        .zip(&mbol)
        .map(|(g, m)| 0.1 * 10f64.powf(0.25 * (m - 10.0)) * (1.0 + 0.2 * (g - 8.0)))
        .collect();

    let mut table = AtmosphereTable::new(family, logg.clone(), mbol.clone(), teff)?;
    for (k, (name, wavelength)) in SYNTHETIC_FILTERS.iter().enumerate() {
        let values = logg
            .iter()
            .zip(&mbol)
            .map(|(&g, &m)| analytic_magnitude(family, k, m, g))
            .collect();
        table = table.with_filter(*name, values)?.with_wavelength(name, *wavelength)?;
    }
    table.with_quantity("mass", mass)?.with_quantity("age", age)
}

/// Both families on `spec`, sharing `cache`.
pub fn synthetic_grid(spec: &GridSpec, cache: Arc<InterpolatorCache>) -> Result<AtmosphereGrid, FitError> {
    let mut grid = AtmosphereGrid::with_cache(cache);
    for family in Family::ALL {
        grid.insert(synthetic_table(family, spec)?);
    }
    Ok(grid)
}

/// A star to observe.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticStar {
    pub family: Family,
    pub mbol: f64,
    pub logg: f64,
    /// Parsec.
    pub distance: f64,
}

impl SyntheticStar {
    pub fn new(family: Family, mbol: f64, logg: f64, distance: f64) -> Self {
        Self {
            family,
            mbol,
            logg,
            distance,
        }
    }
}

/// Apparent magnitudes of `star` in `filters`, each with error `err`.
///
/// Magnitudes come from grid-spline surfaces on `(logg, Mbol)`, so a noise-free
/// observation is reproduced exactly by a fit with the same settings.
/// `extinction` must be bound to `filters`. With `noise_seed`, each magnitude is
/// perturbed by `N(0, err)`.
pub fn observe(
    grid: &AtmosphereGrid,
    star: &SyntheticStar,
    filters: &[&str],
    err: f64,
    extinction: Option<&ExtinctionModel>,
    noise_seed: Option<u64>,
) -> Result<Vec<Observation>, FitError> {
    if !(err.is_finite() && err > 0.0) {
        return Err(FitError::configuration(format!("photometric error must be > 0 (got {err})")));
    }
    if !(star.distance.is_finite() && star.distance > 0.0) {
        return Err(FitError::configuration(format!("distance must be > 0 (got {})", star.distance)));
    }

    let surface = |column: &str| {
        grid.interpolator(star.family, column, InterpolationMethod::GridSpline, Axis::Logg, Axis::Mbol)
    };

    let extinction = match extinction {
        Some(model) if !model.is_off() => {
            let teff = surface("Teff")?.eval(star.logg, star.mbol)?;
            model.extinction(star.logg, teff)?
        }
        _ => vec![0.0; filters.len()],
    };
    if extinction.len() != filters.len() {
        return Err(FitError::configuration(format!(
            "extinction bound to {} filter(s), observing {}",
            extinction.len(),
            filters.len()
        )));
    }

    let mu = distance_modulus(star.distance);
    let mut noise = match noise_seed {
        Some(seed) => {
            let normal = Normal::new(0.0, err)
                .map_err(|e| FitError::configuration(format!("noise distribution error: {e}")))?;
            Some((StdRng::seed_from_u64(seed), normal))
        }
        None => None,
    };

    filters
        .iter()
        .zip(&extinction)
        .map(|(filter, a)| -> Result<Observation, FitError> {
            let absolute = surface(filter)?.eval(star.logg, star.mbol)?;
            let jitter = noise
                .as_mut()
                .map_or(0.0, |(rng, normal)| normal.sample(rng));
            Ok(Observation::present(*filter, absolute + mu + a + jitter, err))
        })
        .collect()
}
