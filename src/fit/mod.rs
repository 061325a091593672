//! Fitting engine.
//!
//! - `fitter`: the per-session driver; one fit per atmosphere family
//! - `minimize`: local minimisation (Nelder–Mead / L-BFGS via argmin)
//! - `lsq`: bounded Levenberg–Marquardt with covariance
//! - `ensemble`: affine-invariant ensemble sampler
//! - `summary`: chain → best fit reduction

pub mod ensemble;
pub mod fitter;
pub mod lsq;
pub mod minimize;
pub mod summary;

pub use fitter::Fitter;

use crate::domain::FitStatus;

/// Common result shape every search strategy returns.
#[derive(Debug, Clone)]
pub struct SolverOutcome {
    pub x: Vec<f64>,
    pub status: FitStatus,
    pub iterations: u64,
    pub covariance: Option<Vec<Vec<f64>>>,
    pub uncertainties: Option<Vec<f64>>,
    pub chain: Option<Vec<Vec<f64>>>,
    /// Mean acceptance fraction (sampling only).
    pub acceptance: Option<f64>,
    pub message: String,
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use crate::atmosphere::InterpolatorCache;
    use crate::data::synthetic::{GridSpec, SyntheticStar, observe, synthetic_grid};
    use crate::domain::{Axis, Family, FitRequest, InterpolationMethod, Parameter};
    use crate::models::{ForwardModel, ModelSurfaces};
    use crate::reddening::ExtinctionModel;

    pub const FILTERS: [&str; 5] = ["G3", "G3_BP", "G3_RP", "FUV", "NUV"];

    /// Noise-free H star at 10 pc, modelled on `(logg, Mbol)` surfaces.
    pub fn model(mbol: f64, logg: f64, independent: &[Parameter], x0: &[f64]) -> ForwardModel {
        let grid = synthetic_grid(&GridSpec::default(), Arc::new(InterpolatorCache::new())).unwrap();
        let star = SyntheticStar::new(Family::H, mbol, logg, 10.0);
        let obs = observe(&grid, &star, &FILTERS, 0.05, None, None).unwrap();
        let mags: Vec<Option<f64>> = obs.iter().map(|o| o.photometry.map(|p| p.mag)).collect();
        let request = FitRequest::new(&FILTERS, &mags, &[0.05; 5], independent, x0)
            .unwrap()
            .with_logg(logg)
            .with_distance(10.0, 0.0);

        let surface = |column: &str| {
            grid.interpolator(Family::H, column, InterpolationMethod::GridSpline, Axis::Logg, Axis::Mbol)
                .unwrap()
        };
        let surfaces = ModelSurfaces {
            filters: FILTERS.iter().map(|f| surface(f)).collect(),
            teff: Some(surface("Teff")),
            mbol: None,
            quantities: Vec::new(),
        };
        ForwardModel::new(&request, surfaces, ExtinctionModel::Off { n_filters: FILTERS.len() }).unwrap()
    }
}
