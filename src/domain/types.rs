//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - exported to JSON
//! - built from CLI flags without an intermediate option bag

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// White dwarf atmosphere family.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
pub enum Family {
    /// Hydrogen-rich (DA).
    #[serde(rename = "H")]
    #[value(name = "h", aliases = ["H", "da"])]
    H,
    /// Helium-rich (DB).
    #[serde(rename = "He")]
    #[value(name = "he", aliases = ["He", "db"])]
    He,
}

impl Family {
    pub const ALL: [Family; 2] = [Family::H, Family::He];

    pub fn display_name(self) -> &'static str {
        match self {
            Family::H => "H",
            Family::He => "He",
        }
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A coordinate an atmosphere surface can be indexed by.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
pub enum Axis {
    #[serde(rename = "logg")]
    #[value(name = "logg")]
    Logg,
    #[serde(rename = "Mbol")]
    #[value(name = "mbol", alias = "Mbol")]
    Mbol,
    #[serde(rename = "Teff")]
    #[value(name = "teff", alias = "Teff")]
    Teff,
}

impl Axis {
    /// Column name used for this axis in atmosphere tables.
    pub fn column_name(self) -> &'static str {
        match self {
            Axis::Logg => "logg",
            Axis::Mbol => "Mbol",
            Axis::Teff => "Teff",
        }
    }
}

/// How a per-filter magnitude surface is interpolated.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum InterpolationMethod {
    /// Row-wise natural cubic splines on a (semi-)regular grid. Fast; no extrapolation.
    GridSpline,
    /// Thin-plate radial basis functions. Handles scattered samples; extrapolates smoothly.
    Rbf,
}

/// A physical parameter that can be solved for.
///
/// Distance is not listed here: it is free exactly when the request carries no
/// fixed distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum Parameter {
    #[serde(rename = "Mbol")]
    #[value(name = "mbol", alias = "Mbol")]
    Mbol,
    #[serde(rename = "Teff")]
    #[value(name = "teff", alias = "Teff")]
    Teff,
    #[serde(rename = "logg")]
    #[value(name = "logg")]
    Logg,
}

impl Parameter {
    pub fn label(self) -> &'static str {
        match self {
            Parameter::Mbol => "Mbol",
            Parameter::Teff => "Teff",
            Parameter::Logg => "logg",
        }
    }

    /// Surface axis this parameter maps onto.
    pub fn axis(self) -> Axis {
        match self {
            Parameter::Mbol => Axis::Mbol,
            Parameter::Teff => Axis::Teff,
            Parameter::Logg => Axis::Logg,
        }
    }
}

/// Local minimisation algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum LocalAlgorithm {
    /// Gradient-free simplex search.
    NelderMead,
    /// Limited-memory BFGS with finite-difference gradients.
    Lbfgs,
}

/// Which extinction path is used when reddening is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExtinctionMode {
    /// Tabulated per-filter law evaluated at the source's (logg, Teff).
    Filter,
    /// Continuous law evaluated at each filter's pivot wavelength.
    Interpolated,
}

/// Options for [`FitMethod::LocalMinimize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalMinimizeOptions {
    pub algorithm: LocalAlgorithm,
    pub max_iters: u64,
    /// Simplex cost spread (Nelder-Mead) or gradient norm (L-BFGS) at which to stop.
    pub tolerance: f64,
}

impl Default for LocalMinimizeOptions {
    fn default() -> Self {
        Self {
            algorithm: LocalAlgorithm::NelderMead,
            max_iters: 2000,
            tolerance: 1e-10,
        }
    }
}

/// Options for [`FitMethod::LeastSquares`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeastSquaresOptions {
    /// Per-parameter `(lower, upper)` bounds, in layout order.
    pub bounds: Option<Vec<(f64, f64)>>,
    pub max_iters: usize,
    /// Relative reduction in cost below which we stop.
    pub ftol: f64,
    /// Relative step size below which we stop.
    pub xtol: f64,
    /// Gradient infinity-norm below which we stop.
    pub gtol: f64,
}

impl Default for LeastSquaresOptions {
    fn default() -> Self {
        Self {
            bounds: None,
            max_iters: 200,
            ftol: 1e-12,
            xtol: 1e-12,
            gtol: 1e-10,
        }
    }
}

/// Options for [`FitMethod::EnsembleSample`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleOptions {
    pub nwalkers: usize,
    pub nsteps: usize,
    /// Leading steps discarded as burn-in.
    pub nburn: usize,
    /// Percentile window `(lo, hi)` a retained sample must fall inside in every dimension.
    pub refine_bounds: Option<(f64, f64)>,
    /// Uniform prior bounds per parameter; log-likelihood is `-inf` outside.
    pub prior_bounds: Option<Vec<(f64, f64)>>,
    /// Initial walker scatter, relative to `max(|x0|, 1)`.
    pub init_scatter: f64,
    pub seed: u64,
    /// Evaluate walker proposals on the rayon pool.
    pub parallel: bool,
    /// Stretch-move scale `a`.
    pub stretch: f64,
}

impl Default for EnsembleOptions {
    fn default() -> Self {
        Self {
            nwalkers: 32,
            nsteps: 1000,
            nburn: 500,
            refine_bounds: None,
            prior_bounds: None,
            init_scatter: 1e-3,
            seed: 0,
            parallel: true,
            stretch: 2.0,
        }
    }
}

/// Search strategy for a fit. One handler per variant; all return the same result shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FitMethod {
    LocalMinimize(LocalMinimizeOptions),
    LeastSquares(LeastSquaresOptions),
    EnsembleSample(EnsembleOptions),
}

impl Default for FitMethod {
    fn default() -> Self {
        FitMethod::LocalMinimize(LocalMinimizeOptions::default())
    }
}

impl FitMethod {
    pub fn display_name(&self) -> &'static str {
        match self {
            FitMethod::LocalMinimize(opts) => match opts.algorithm {
                LocalAlgorithm::NelderMead => "minimize (Nelder-Mead)",
                LocalAlgorithm::Lbfgs => "minimize (L-BFGS)",
            },
            FitMethod::LeastSquares(_) => "least squares (Levenberg-Marquardt)",
            FitMethod::EnsembleSample(_) => "ensemble sampling",
        }
    }
}

/// Observed magnitude and its 1-sigma error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Photometry {
    pub mag: f64,
    pub err: f64,
}

/// One requested passband; `photometry` is `None` when the band was not observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub filter: String,
    pub photometry: Option<Photometry>,
}

impl Observation {
    pub fn present(filter: impl Into<String>, mag: f64, err: f64) -> Self {
        Self {
            filter: filter.into(),
            photometry: Some(Photometry { mag, err }),
        }
    }

    pub fn absent(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            photometry: None,
        }
    }
}

/// Fixed distance in parsec with its 1-sigma uncertainty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Distance {
    pub value: f64,
    pub err: f64,
}

/// Interstellar reddening applied to predicted magnitudes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reddening {
    pub rv: f64,
    pub ebv: f64,
    pub mode: ExtinctionMode,
}

impl Reddening {
    /// True when the reddening contributes nothing (rv or ebv is zero).
    pub fn is_null(&self) -> bool {
        self.rv == 0.0 || self.ebv == 0.0
    }
}
