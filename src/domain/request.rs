//! The explicit fit request.
//!
//! Every recognised option is a field here; `validate` checks all of them up
//! front so a malformed request fails before any interpolator is built.
//! `new` checks the shape only: the usable-filter count depends on whether
//! distance ends up free, which the builder setters may still change.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::{Distance, Family, FitMethod, InterpolationMethod, Observation, Parameter, Photometry, Reddening};
use crate::error::FitError;

/// Distance guess used when distance is free and the caller supplied none (pc).
pub const DEFAULT_DISTANCE_GUESS: f64 = 10.0;

/// Surface gravity assumed when logg is neither free nor given.
pub const DEFAULT_LOGG: f64 = 8.0;

/// Everything needed to run one fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitRequest {
    pub observations: Vec<Observation>,
    /// Free physical parameters, in the order they appear in the parameter vector.
    pub independent: Vec<Parameter>,
    /// Fixed surface gravity, used when `Logg` is not free.
    pub logg: f64,
    /// Fixed distance. `None` makes distance a free parameter appended last.
    pub distance: Option<Distance>,
    pub initial_guess: Vec<f64>,
    pub method: FitMethod,
    pub reddening: Option<Reddening>,
    /// Families to fit, each independently.
    pub atmospheres: Vec<Family>,
    pub interpolation: InterpolationMethod,
    /// Reuse cached interpolators; `false` forces a rebuild.
    pub reuse_interpolator: bool,
    /// Permit absent magnitudes.
    pub allow_none: bool,
}

impl FitRequest {
    /// Build a request from parallel filter / magnitude / error lists.
    ///
    /// A `None` magnitude marks the band as not observed; its error is ignored.
    /// Distance starts free; fix it with [`FitRequest::with_distance`].
    pub fn new(
        filters: &[&str],
        mags: &[Option<f64>],
        mag_errors: &[f64],
        independent: &[Parameter],
        initial_guess: &[f64],
    ) -> Result<Self, FitError> {
        if filters.len() != mags.len() || filters.len() != mag_errors.len() {
            return Err(FitError::configuration(format!(
                "filters ({}), mags ({}) and mag_errors ({}) must have the same length",
                filters.len(),
                mags.len(),
                mag_errors.len()
            )));
        }

        let observations = filters
            .iter()
            .zip(mags.iter().zip(mag_errors.iter()))
            .map(|(filter, (mag, err))| Observation {
                filter: filter.to_string(),
                photometry: mag.map(|mag| Photometry { mag, err: *err }),
            })
            .collect();

        let request = Self {
            observations,
            independent: independent.to_vec(),
            logg: DEFAULT_LOGG,
            distance: None,
            initial_guess: initial_guess.to_vec(),
            method: FitMethod::default(),
            reddening: None,
            atmospheres: Family::ALL.to_vec(),
            interpolation: InterpolationMethod::GridSpline,
            reuse_interpolator: true,
            allow_none: mags.iter().any(|m| m.is_none()),
        };
        request.validate_fields()?;
        Ok(request)
    }

    pub fn with_logg(mut self, logg: f64) -> Self {
        self.logg = logg;
        self
    }

    pub fn with_distance(mut self, value: f64, err: f64) -> Self {
        self.distance = Some(Distance { value, err });
        self
    }

    pub fn with_free_distance(mut self) -> Self {
        self.distance = None;
        self
    }

    pub fn with_method(mut self, method: FitMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_reddening(mut self, reddening: Reddening) -> Self {
        self.reddening = Some(reddening);
        self
    }

    pub fn with_atmospheres(mut self, atmospheres: &[Family]) -> Self {
        self.atmospheres = atmospheres.to_vec();
        self
    }

    pub fn with_interpolation(mut self, method: InterpolationMethod) -> Self {
        self.interpolation = method;
        self
    }

    pub fn with_reuse_interpolator(mut self, reuse: bool) -> Self {
        self.reuse_interpolator = reuse;
        self
    }

    pub fn with_allow_none(mut self, allow: bool) -> Self {
        self.allow_none = allow;
        self
    }

    /// The primary luminosity-like parameter (Mbol or Teff).
    pub fn primary(&self) -> Option<Parameter> {
        self.independent
            .iter()
            .copied()
            .find(|p| matches!(p, Parameter::Mbol | Parameter::Teff))
    }

    pub fn logg_is_free(&self) -> bool {
        self.independent.contains(&Parameter::Logg)
    }

    pub fn distance_is_free(&self) -> bool {
        self.distance.is_none()
    }

    /// Number of free parameters, including a free distance.
    pub fn ndim(&self) -> usize {
        self.independent.len() + usize::from(self.distance_is_free())
    }

    /// Initial guess with the default distance appended when the caller left it out.
    pub fn resolved_initial_guess(&self) -> Vec<f64> {
        let mut x0 = self.initial_guess.clone();
        if self.distance_is_free() && x0.len() == self.independent.len() {
            x0.push(DEFAULT_DISTANCE_GUESS);
        }
        x0
    }

    /// Observations with a measured magnitude.
    pub fn present(&self) -> impl Iterator<Item = (&str, Photometry)> {
        self.observations
            .iter()
            .filter_map(|o| o.photometry.map(|p| (o.filter.as_str(), p)))
    }

    pub fn filters(&self) -> Vec<&str> {
        self.observations.iter().map(|o| o.filter.as_str()).collect()
    }

    /// Check every invariant of the request.
    pub fn validate(&self) -> Result<(), FitError> {
        self.validate_fields()?;

        let n_present = self.present().count();
        if n_present < self.ndim() {
            return Err(FitError::insufficient_data(format!(
                "{n_present} usable filter(s) for {} free parameter(s)",
                self.ndim()
            )));
        }
        Ok(())
    }

    fn validate_fields(&self) -> Result<(), FitError> {
        self.validate_observations()?;
        self.validate_parameters()?;
        self.validate_physical()?;
        self.validate_method()?;
        self.validate_atmospheres()?;

        if self.present().next().is_none() {
            return Err(FitError::insufficient_data("every magnitude is absent"));
        }
        Ok(())
    }

    fn validate_observations(&self) -> Result<(), FitError> {
        if self.observations.is_empty() {
            return Err(FitError::configuration("no filters requested"));
        }

        let mut seen = HashSet::new();
        for obs in &self.observations {
            if obs.filter.trim().is_empty() {
                return Err(FitError::configuration("empty filter name"));
            }
            if !seen.insert(obs.filter.as_str()) {
                return Err(FitError::configuration(format!(
                    "filter '{}' requested more than once",
                    obs.filter
                )));
            }
            match obs.photometry {
                None if !self.allow_none => {
                    return Err(FitError::configuration(format!(
                        "magnitude for '{}' is absent but absent magnitudes are not allowed",
                        obs.filter
                    )));
                }
                None => {}
                Some(p) => {
                    if !p.mag.is_finite() {
                        return Err(FitError::configuration(format!(
                            "magnitude for '{}' is not finite",
                            obs.filter
                        )));
                    }
                    if !(p.err.is_finite() && p.err > 0.0) {
                        return Err(FitError::configuration(format!(
                            "magnitude error for '{}' must be finite and > 0 (got {})",
                            obs.filter, p.err
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn validate_parameters(&self) -> Result<(), FitError> {
        if self.independent.is_empty() {
            return Err(FitError::configuration("no independent parameters"));
        }
        let unique: HashSet<_> = self.independent.iter().collect();
        if unique.len() != self.independent.len() {
            return Err(FitError::configuration("independent parameters repeat"));
        }
        let n_primary = self
            .independent
            .iter()
            .filter(|p| matches!(p, Parameter::Mbol | Parameter::Teff))
            .count();
        if n_primary != 1 {
            return Err(FitError::configuration(
                "exactly one of Mbol or Teff must be an independent parameter",
            ));
        }

        let n = self.independent.len();
        let accepted = if self.distance_is_free() {
            self.initial_guess.len() == n || self.initial_guess.len() == n + 1
        } else {
            self.initial_guess.len() == n
        };
        if !accepted {
            return Err(FitError::invalid_parameter(format!(
                "initial guess has {} value(s) for {} independent parameter(s){}",
                self.initial_guess.len(),
                n,
                if self.distance_is_free() {
                    " plus an optional distance"
                } else {
                    ""
                }
            )));
        }
        if self.initial_guess.iter().any(|v| !v.is_finite()) {
            return Err(FitError::invalid_parameter("initial guess is not finite"));
        }
        Ok(())
    }

    fn validate_physical(&self) -> Result<(), FitError> {
        if !self.logg.is_finite() {
            return Err(FitError::configuration("fixed logg is not finite"));
        }
        if let Some(d) = self.distance {
            if !(d.value.is_finite() && d.value > 0.0) {
                return Err(FitError::configuration(format!(
                    "distance must be finite and > 0 (got {})",
                    d.value
                )));
            }
            if !(d.err.is_finite() && d.err >= 0.0) {
                return Err(FitError::configuration(format!(
                    "distance error must be finite and >= 0 (got {})",
                    d.err
                )));
            }
        }
        if let Some(r) = self.reddening {
            if !(r.rv.is_finite() && r.rv >= 0.0) {
                return Err(FitError::configuration(format!("invalid Rv {}", r.rv)));
            }
            if !(r.ebv.is_finite() && r.ebv >= 0.0) {
                return Err(FitError::configuration(format!("invalid E(B-V) {}", r.ebv)));
            }
        }
        Ok(())
    }

    fn validate_method(&self) -> Result<(), FitError> {
        let ndim = self.ndim();
        match &self.method {
            FitMethod::LocalMinimize(opts) => {
                if opts.max_iters == 0 {
                    return Err(FitError::configuration("max_iters must be > 0"));
                }
                if !(opts.tolerance.is_finite() && opts.tolerance > 0.0) {
                    return Err(FitError::configuration("tolerance must be finite and > 0"));
                }
            }
            FitMethod::LeastSquares(opts) => {
                if opts.max_iters == 0 {
                    return Err(FitError::configuration("max_iters must be > 0"));
                }
                if let Some(bounds) = &opts.bounds {
                    validate_bounds(bounds, ndim, "least-squares bounds")?;
                    let x0 = self.resolved_initial_guess();
                    if x0
                        .iter()
                        .zip(bounds.iter())
                        .any(|(x, (lo, hi))| x < lo || x > hi)
                    {
                        return Err(FitError::configuration(
                            "initial guess lies outside the least-squares bounds",
                        ));
                    }
                }
            }
            FitMethod::EnsembleSample(opts) => {
                if opts.nwalkers < 2 * ndim || opts.nwalkers % 2 != 0 {
                    return Err(FitError::configuration(format!(
                        "nwalkers must be even and >= 2 * ndim = {} (got {})",
                        2 * ndim,
                        opts.nwalkers
                    )));
                }
                if opts.nsteps == 0 || opts.nburn >= opts.nsteps {
                    return Err(FitError::configuration(format!(
                        "nburn ({}) must be smaller than nsteps ({})",
                        opts.nburn, opts.nsteps
                    )));
                }
                if let Some((lo, hi)) = opts.refine_bounds {
                    if !(0.0..=100.0).contains(&lo) || !(0.0..=100.0).contains(&hi) || lo >= hi {
                        return Err(FitError::configuration(format!(
                            "refine bounds must satisfy 0 <= lo < hi <= 100 (got [{lo}, {hi}])"
                        )));
                    }
                }
                if let Some(bounds) = &opts.prior_bounds {
                    validate_bounds(bounds, ndim, "prior bounds")?;
                }
                if !(opts.init_scatter.is_finite() && opts.init_scatter > 0.0) {
                    return Err(FitError::configuration("init_scatter must be finite and > 0"));
                }
                if !(opts.stretch.is_finite() && opts.stretch > 1.0) {
                    return Err(FitError::configuration("stretch scale must be > 1"));
                }
            }
        }
        Ok(())
    }

    fn validate_atmospheres(&self) -> Result<(), FitError> {
        if self.atmospheres.is_empty() {
            return Err(FitError::configuration("no atmosphere family requested"));
        }
        let unique: HashSet<_> = self.atmospheres.iter().collect();
        if unique.len() != self.atmospheres.len() {
            return Err(FitError::configuration("atmosphere families repeat"));
        }
        Ok(())
    }
}

fn validate_bounds(bounds: &[(f64, f64)], ndim: usize, what: &str) -> Result<(), FitError> {
    if bounds.len() != ndim {
        return Err(FitError::configuration(format!(
            "{what}: {} pair(s) for {ndim} parameter(s)",
            bounds.len()
        )));
    }
    if bounds.iter().any(|(lo, hi)| lo.is_nan() || hi.is_nan() || lo >= hi) {
        return Err(FitError::configuration(format!("{what}: every pair needs lo < hi")));
    }
    Ok(())
}
