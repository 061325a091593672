//! Interstellar extinction.
//!
//! Two laws feed the forward model:
//!
//! - [`FilterExtinction`]: per-filter `A/E(B-V)` as a function of the source's
//!   (logg, Teff) and Rv, e.g. [`TabulatedFilterExtinction`]
//! - [`WavelengthExtinction`]: continuous `A/E(B-V)` at any wavelength, e.g.
//!   [`Ccm89`], used for filters described only by a pivot wavelength
//!
//! [`ExtinctionModel`] binds one of them to a request's filters and E(B-V).

pub mod ccm89;
pub mod table;

use std::sync::Arc;

pub use ccm89::Ccm89;
pub use table::{ExtinctionPoint, TabulatedFilterExtinction};

use crate::domain::{ExtinctionMode, Reddening};
use crate::error::FitError;

/// Per-filter extinction per unit E(B-V).
pub trait FilterExtinction: Send + Sync + std::fmt::Debug {
    fn supports(&self, filter: &str) -> bool;

    fn per_ebv(&self, filter: &str, logg: f64, teff: f64, rv: f64) -> Result<f64, FitError>;
}

/// Extinction per unit E(B-V) at a wavelength in Å.
pub trait WavelengthExtinction: Send + Sync + std::fmt::Debug {
    fn per_ebv(&self, wavelength: f64, rv: f64) -> Result<f64, FitError>;
}

/// Extinction bound to an ordered filter list.
#[derive(Debug, Clone)]
pub enum ExtinctionModel {
    /// No reddening; every filter gets zero.
    Off { n_filters: usize },
    /// Tabulated law evaluated at the current (logg, Teff).
    Filter {
        law: Arc<dyn FilterExtinction>,
        filters: Vec<String>,
        rv: f64,
        ebv: f64,
    },
    /// Wavelength law evaluated once per filter at its pivot wavelength.
    Interpolated { extinction: Vec<f64> },
}

impl ExtinctionModel {
    /// Bind a request's reddening to `filters`.
    ///
    /// `wavelengths` must line up with `filters`; it is only consulted in
    /// interpolated mode.
    pub fn resolve(
        reddening: Option<&Reddening>,
        filters: &[String],
        wavelengths: &[Option<f64>],
        filter_law: Option<&Arc<dyn FilterExtinction>>,
        wavelength_law: &dyn WavelengthExtinction,
    ) -> Result<Self, FitError> {
        let Some(r) = reddening.filter(|r| !r.is_null()) else {
            return Ok(Self::Off {
                n_filters: filters.len(),
            });
        };

        match r.mode {
            ExtinctionMode::Filter => {
                let law = filter_law.ok_or_else(|| {
                    FitError::configuration("filter-based extinction requested but no extinction table is loaded")
                })?;
                if let Some(missing) = filters.iter().find(|f| !law.supports(f)) {
                    return Err(FitError::configuration(format!(
                        "no extinction table for filter '{missing}'"
                    )));
                }
                Ok(Self::Filter {
                    law: Arc::clone(law),
                    filters: filters.to_vec(),
                    rv: r.rv,
                    ebv: r.ebv,
                })
            }
            ExtinctionMode::Interpolated => {
                if wavelengths.len() != filters.len() {
                    return Err(FitError::configuration("one wavelength per filter is required"));
                }
                let extinction = filters
                    .iter()
                    .zip(wavelengths)
                    .map(|(f, wl)| -> Result<f64, FitError> {
                        let wl = wl.ok_or_else(|| {
                            FitError::configuration(format!("no pivot wavelength for filter '{f}'"))
                        })?;
                        Ok(wavelength_law.per_ebv(wl, r.rv)? * r.ebv)
                    })
                    .collect::<Result<Vec<_>, FitError>>()?;
                Ok(Self::Interpolated { extinction })
            }
        }
    }

    /// Whether `extinction` needs the current Teff.
    pub fn needs_teff(&self) -> bool {
        matches!(self, Self::Filter { .. })
    }

    pub fn is_off(&self) -> bool {
        matches!(self, Self::Off { .. })
    }

    /// Extinction in magnitudes for every bound filter, in order.
    pub fn extinction(&self, logg: f64, teff: f64) -> Result<Vec<f64>, FitError> {
        match self {
            Self::Off { n_filters } => Ok(vec![0.0; *n_filters]),
            Self::Filter {
                law,
                filters,
                rv,
                ebv,
            } => filters
                .iter()
                .map(|f| -> Result<f64, FitError> { Ok(law.per_ebv(f, logg, teff, *rv)? * ebv) })
                .collect(),
            Self::Interpolated { extinction } => Ok(extinction.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn null_reddening_is_identically_zero() {
        let r = Reddening {
            rv: 3.1,
            ebv: 0.0,
            mode: ExtinctionMode::Interpolated,
        };
        let m = ExtinctionModel::resolve(Some(&r), &names(&["G3", "NUV"]), &[None, None], None, &Ccm89).unwrap();
        assert!(m.is_off());
        assert_eq!(m.extinction(8.0, 10_000.0).unwrap(), vec![0.0, 0.0]);
    }

    #[test]
    fn interpolated_mode_scales_by_ebv() {
        let r = Reddening {
            rv: 3.1,
            ebv: 0.2,
            mode: ExtinctionMode::Interpolated,
        };
        let m = ExtinctionModel::resolve(Some(&r), &names(&["V"]), &[Some(1.0e4 / 1.82)], None, &Ccm89).unwrap();
        let a = m.extinction(8.0, 10_000.0).unwrap();
        assert!((a[0] - 0.62).abs() < 1e-12);
    }

    #[test]
    fn interpolated_mode_needs_wavelengths() {
        let r = Reddening {
            rv: 3.1,
            ebv: 0.2,
            mode: ExtinctionMode::Interpolated,
        };
        let err = ExtinctionModel::resolve(Some(&r), &names(&["X"]), &[None], None, &Ccm89).unwrap_err();
        assert!(matches!(err, FitError::Configuration { .. }));
    }

    #[test]
    fn filter_mode_needs_a_table() {
        let r = Reddening {
            rv: 3.1,
            ebv: 0.2,
            mode: ExtinctionMode::Filter,
        };
        let err = ExtinctionModel::resolve(Some(&r), &names(&["G3"]), &[None], None, &Ccm89).unwrap_err();
        assert!(matches!(err, FitError::Configuration { .. }));
    }
}
