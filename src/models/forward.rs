//! Forward model and objective.
//!
//! Parameter vector → predicted apparent magnitudes → residuals against the
//! observed photometry. Three objective shapes are exposed for the three fit
//! strategies:
//!
//! - [`ForwardModel::chi2`]: scalar χ² for local minimisation
//! - [`ForwardModel::residuals`]: σ-normalised residual vector for least squares
//! - [`ForwardModel::log_likelihood`]: `-χ²/2` with a uniform prior for sampling
//!
//! Absent filters are still predicted but never enter the residual vector.
//! The scalar objectives never return NaN: anything that fails to evaluate
//! (out of the grid, non-finite) maps to `+∞` χ² / `-∞` log-likelihood.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::{DerivedParams, FitRequest, Parameter, Photometry, PredictedMag};
use crate::error::FitError;
use crate::interp::Interpolator;
use crate::models::{DistanceSlot, LoggSlot, ParamLayout, Point, distance_modulus, distance_modulus_error};
use crate::reddening::ExtinctionModel;

/// Surfaces the forward model evaluates, all on `(logg, primary)` axes.
#[derive(Debug, Clone, Default)]
pub struct ModelSurfaces {
    /// One per requested filter, in request order.
    pub filters: Vec<Arc<Interpolator>>,
    /// Teff surface (needed when Mbol is primary).
    pub teff: Option<Arc<Interpolator>>,
    /// Mbol surface (needed when Teff is primary).
    pub mbol: Option<Arc<Interpolator>>,
    /// Extra quantities reported with the best fit.
    pub quantities: Vec<(String, Arc<Interpolator>)>,
}

impl ModelSurfaces {
    pub fn all(&self) -> Vec<Arc<Interpolator>> {
        self.filters
            .iter()
            .chain(self.teff.iter())
            .chain(self.mbol.iter())
            .chain(self.quantities.iter().map(|(_, s)| s))
            .cloned()
            .collect()
    }
}

/// Smallest distance (pc) a free-distance search may step to.
pub const MIN_DISTANCE: f64 = 1e-3;

#[derive(Debug)]
pub struct ForwardModel {
    layout: ParamLayout,
    filters: Vec<String>,
    observed: Vec<Option<Photometry>>,
    /// Effective σ per filter (photometric error combined with a fixed-distance error).
    sigma: Vec<f64>,
    surfaces: ModelSurfaces,
    extinction: ExtinctionModel,
    evaluations: AtomicU64,
}

impl ForwardModel {
    pub fn new(request: &FitRequest, surfaces: ModelSurfaces, extinction: ExtinctionModel) -> Result<Self, FitError> {
        let layout = ParamLayout::from_request(request)?;

        if surfaces.filters.len() != request.observations.len() {
            return Err(FitError::configuration(format!(
                "{} surface(s) for {} filter(s)",
                surfaces.filters.len(),
                request.observations.len()
            )));
        }
        if layout.primary() == Parameter::Mbol && extinction.needs_teff() && surfaces.teff.is_none() {
            return Err(FitError::configuration("filter-based extinction needs a Teff surface"));
        }

        let sigma_mu = match layout.distance() {
            DistanceSlot::Fixed { value, err } => distance_modulus_error(value, err),
            DistanceSlot::Free(_) => 0.0,
        };
        let sigma = request
            .observations
            .iter()
            .map(|o| o.photometry.map_or(f64::NAN, |p| p.err.hypot(sigma_mu)))
            .collect();

        Ok(Self {
            layout,
            filters: request.observations.iter().map(|o| o.filter.clone()).collect(),
            observed: request.observations.iter().map(|o| o.photometry).collect(),
            sigma,
            surfaces,
            extinction,
            evaluations: AtomicU64::new(0),
        })
    }

    pub fn layout(&self) -> &ParamLayout {
        &self.layout
    }

    pub fn ndim(&self) -> usize {
        self.layout.ndim()
    }

    pub fn filters(&self) -> &[String] {
        &self.filters
    }

    pub fn surfaces(&self) -> &ModelSurfaces {
        &self.surfaces
    }

    /// Per-parameter box on which every surface the objective reads is defined.
    ///
    /// Surfaces without a strict domain (RBF) leave their axes open; a free
    /// distance is bounded below by [`MIN_DISTANCE`].
    pub fn parameter_bounds(&self) -> Vec<(f64, f64)> {
        let open = (f64::NEG_INFINITY, f64::INFINITY);
        let teff = match self.layout.primary() {
            Parameter::Mbol if self.extinction.needs_teff() => self.surfaces.teff.as_ref(),
            _ => None,
        };

        let (mut x, mut y) = (open, open);
        for d in self.surfaces.filters.iter().chain(teff).filter_map(|s| s.domain()) {
            x = (x.0.max(d.x_min), x.1.min(d.x_max));
            y = (y.0.max(d.y_min), y.1.min(d.y_max));
        }

        let mut bounds = vec![open; self.ndim()];
        bounds[self.layout.primary_index()] = y;
        if let LoggSlot::Free(i) = self.layout.logg() {
            bounds[i] = x;
        }
        if let DistanceSlot::Free(i) = self.layout.distance() {
            bounds[i] = (MIN_DISTANCE, f64::INFINITY);
        }
        bounds
    }

    /// Filters with an observed magnitude.
    pub fn n_present(&self) -> usize {
        self.observed.iter().filter(|o| o.is_some()).count()
    }

    /// Degrees of freedom: observed filters minus free parameters.
    pub fn dof(&self) -> i64 {
        self.n_present() as i64 - self.ndim() as i64
    }

    /// Number of times the objective has been evaluated.
    pub fn evaluations(&self) -> u64 {
        self.evaluations.load(Ordering::Relaxed)
    }

    pub fn resolve(&self, params: &[f64]) -> Result<Point, FitError> {
        self.layout.point(params)
    }

    /// Teff at a resolved point, read from the Teff surface unless Teff is primary.
    pub fn teff_at(&self, point: &Point) -> Result<f64, FitError> {
        match self.layout.primary() {
            Parameter::Teff => Ok(point.primary),
            _ => self
                .surfaces
                .teff
                .as_ref()
                .ok_or_else(|| FitError::configuration("no Teff surface loaded"))?
                .eval(point.logg, point.primary),
        }
    }

    /// Mbol at a resolved point, read from the Mbol surface unless Mbol is primary.
    pub fn mbol_at(&self, point: &Point) -> Result<f64, FitError> {
        match self.layout.primary() {
            Parameter::Mbol => Ok(point.primary),
            _ => self
                .surfaces
                .mbol
                .as_ref()
                .ok_or_else(|| FitError::configuration("no Mbol surface loaded"))?
                .eval(point.logg, point.primary),
        }
    }

    /// Absolute magnitude in every requested filter.
    pub fn predict_absolute(&self, params: &[f64]) -> Result<Vec<f64>, FitError> {
        let point = self.resolve(params)?;
        self.absolute_at(&point)
    }

    fn absolute_at(&self, point: &Point) -> Result<Vec<f64>, FitError> {
        self.surfaces
            .filters
            .iter()
            .map(|s| s.eval(point.logg, point.primary))
            .collect()
    }

    /// Apparent magnitude in every requested filter, observed or not.
    pub fn predict_apparent(&self, params: &[f64]) -> Result<Vec<f64>, FitError> {
        let point = self.resolve(params)?;
        self.apparent_at(&point)
    }

    fn apparent_at(&self, point: &Point) -> Result<Vec<f64>, FitError> {
        let absolute = self.absolute_at(point)?;
        let mu = distance_modulus(point.distance);
        let teff = if self.extinction.needs_teff() {
            self.teff_at(point)?
        } else {
            f64::NAN
        };
        let extinction = self.extinction.extinction(point.logg, teff)?;

        Ok(absolute
            .iter()
            .zip(&extinction)
            .map(|(m, a)| m + mu + a)
            .collect())
    }

    /// `(predicted - observed) / σ` over observed filters only.
    pub fn residuals(&self, params: &[f64]) -> Result<Vec<f64>, FitError> {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        let predicted = self.predict_apparent(params)?;
        let residuals: Vec<f64> = predicted
            .iter()
            .zip(&self.observed)
            .zip(&self.sigma)
            .filter_map(|((m, obs), s)| obs.map(|o| (m - o.mag) / s))
            .collect();

        if residuals.iter().any(|r| !r.is_finite()) {
            return Err(FitError::domain("non-finite residual"));
        }
        Ok(residuals)
    }

    /// Sum of squared residuals; `+∞` where the model cannot be evaluated.
    pub fn chi2(&self, params: &[f64]) -> f64 {
        match self.residuals(params) {
            Ok(r) => {
                let chi2: f64 = r.iter().map(|v| v * v).sum();
                if chi2.is_finite() { chi2 } else { f64::INFINITY }
            }
            Err(_) => f64::INFINITY,
        }
    }

    /// `-χ²/2`, or `-∞` outside `prior_bounds` (inclusive) or the model domain.
    pub fn log_likelihood(&self, params: &[f64], prior_bounds: Option<&[(f64, f64)]>) -> f64 {
        if let Some(bounds) = prior_bounds {
            let inside = params.len() == bounds.len()
                && params
                    .iter()
                    .zip(bounds)
                    .all(|(v, (lo, hi))| *v >= *lo && *v <= *hi);
            if !inside {
                return f64::NEG_INFINITY;
            }
        }
        -0.5 * self.chi2(params)
    }

    /// Physical parameters and predicted magnitudes at `params`.
    pub fn derive(&self, params: &[f64]) -> Result<(DerivedParams, Vec<PredictedMag>), FitError> {
        let point = self.resolve(params)?;
        let mbol = self.mbol_at(&point)?;
        let teff = self.teff_at(&point)?;

        let mut quantities = BTreeMap::new();
        for (name, surface) in &self.surfaces.quantities {
            match surface.eval(point.logg, point.primary) {
                Ok(v) => {
                    quantities.insert(name.clone(), v);
                }
                Err(err) => log::warn!("{name} could not be evaluated at the best fit: {err}"),
            }
        }

        let apparent = self.apparent_at(&point)?;
        let predicted = self
            .filters
            .iter()
            .zip(&apparent)
            .zip(self.observed.iter().zip(&self.sigma))
            .map(|((filter, &predicted), (obs, &sigma))| PredictedMag {
                filter: filter.clone(),
                predicted,
                observed: obs.map(|o| o.mag),
                err: obs.map(|o| o.err),
                sigma: obs.map(|_| sigma),
            })
            .collect();

        Ok((
            DerivedParams {
                mbol,
                teff,
                logg: point.logg,
                distance: point.distance,
                quantities,
            },
            predicted,
        ))
    }
}
