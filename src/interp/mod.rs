//! Two-dimensional magnitude surfaces.
//!
//! An [`Interpolator`] captures one tabulated column (a filter magnitude or a
//! derived quantity) as a pure `(x, y) -> value` function. It owns no mutable
//! state after construction, so one instance is shared freely across fits and
//! threads.

pub mod grid;
pub mod rbf;
pub mod samples;
pub mod spline;

pub use grid::{GridDomain, GridSpline};
pub use rbf::RbfSurface;
pub use samples::{Sample, clean_samples};
pub use spline::CubicSpline;

use crate::atmosphere::InterpolatorKey;
use crate::domain::InterpolationMethod;
use crate::error::FitError;

#[derive(Debug, Clone)]
pub enum Surface {
    Grid(GridSpline),
    Rbf(RbfSurface),
}

#[derive(Debug, Clone)]
pub struct Interpolator {
    key: InterpolatorKey,
    surface: Surface,
}

impl Interpolator {
    /// Clean the raw columns and fit the surface selected by `key.method`.
    pub fn build(key: InterpolatorKey, xs: &[f64], ys: &[f64], zs: &[f64]) -> Result<Self, FitError> {
        let samples = clean_samples(xs, ys, zs)?;
        let dropped = xs.len() - samples.len();
        if dropped > 0 {
            log::debug!("{key}: {dropped} sample(s) dropped or merged before fitting");
        }

        let surface = match key.method {
            InterpolationMethod::GridSpline => Surface::Grid(GridSpline::new(&samples)?),
            InterpolationMethod::Rbf => Surface::Rbf(RbfSurface::new(&samples)?),
        };
        Ok(Self { key, surface })
    }

    pub fn key(&self) -> &InterpolatorKey {
        &self.key
    }

    pub fn method(&self) -> InterpolationMethod {
        self.key.method
    }

    /// Strict validity domain; `None` for surfaces that extrapolate.
    pub fn domain(&self) -> Option<GridDomain> {
        match &self.surface {
            Surface::Grid(g) => Some(g.domain()),
            Surface::Rbf(_) => None,
        }
    }

    pub fn eval(&self, x: f64, y: f64) -> Result<f64, FitError> {
        match &self.surface {
            Surface::Grid(g) => g.eval(x, y),
            Surface::Rbf(r) => r.eval(x, y),
        }
    }

    /// Evaluate over paired query arrays; fails on the first out-of-domain point.
    pub fn eval_many(&self, xs: &[f64], ys: &[f64]) -> Result<Vec<f64>, FitError> {
        if xs.len() != ys.len() {
            return Err(FitError::configuration("query arrays differ in length"));
        }
        xs.iter().zip(ys).map(|(&x, &y)| self.eval(x, y)).collect()
    }
}
