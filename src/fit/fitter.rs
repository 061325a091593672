//! Fit driver.
//!
//! A [`Fitter`] is one fitting session: it owns the atmosphere grid handle, the
//! extinction laws, and the results of its most recent `fit` call.
//!
//! For each requested family the driver walks the phase machine
//! `Configured -> Evaluating -> Converged | Failed`:
//!
//! - configuration problems (bad request, unknown filter, missing extinction
//!   data) abort the whole call before any family is evaluated
//! - anything that goes wrong while evaluating one family (domain errors,
//!   non-convergence) is recorded in that family's result; the other families
//!   are still fitted

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::atmosphere::{AtmosphereGrid, ColumnInfo};
use crate::domain::{
    Axis, ExtinctionMode, Family, FitMethod, FitPhase, FitRequest, FitResult, FitResults, FitStatus, Parameter,
};
use crate::error::FitError;
use crate::fit::{SolverOutcome, ensemble, lsq, minimize};
use crate::interp::Interpolator;
use crate::models::{ForwardModel, ModelSurfaces};
use crate::reddening::{Ccm89, ExtinctionModel, FilterExtinction, WavelengthExtinction};

#[derive(Debug)]
pub struct Fitter {
    grid: Arc<AtmosphereGrid>,
    filter_extinction: Option<Arc<dyn FilterExtinction>>,
    wavelength_extinction: Arc<dyn WavelengthExtinction>,
    results: FitResults,
    phases: BTreeMap<Family, FitPhase>,
}

impl Fitter {
    pub fn new(grid: Arc<AtmosphereGrid>) -> Self {
        Self {
            grid,
            filter_extinction: None,
            wavelength_extinction: Arc::new(Ccm89),
            results: FitResults::default(),
            phases: BTreeMap::new(),
        }
    }

    pub fn with_filter_extinction(mut self, law: Arc<dyn FilterExtinction>) -> Self {
        self.filter_extinction = Some(law);
        self
    }

    pub fn with_wavelength_extinction(mut self, law: Arc<dyn WavelengthExtinction>) -> Self {
        self.wavelength_extinction = law;
        self
    }

    pub fn grid(&self) -> &Arc<AtmosphereGrid> {
        &self.grid
    }

    /// Results of the most recent `fit` call.
    pub fn results(&self) -> &FitResults {
        &self.results
    }

    /// Move the results out, leaving the session empty.
    pub fn take_results(&mut self) -> FitResults {
        self.phases.clear();
        std::mem::take(&mut self.results)
    }

    pub fn phase(&self, family: Family) -> Option<FitPhase> {
        self.phases.get(&family).copied()
    }

    /// Columns (axes, filters, quantities) available for a family.
    pub fn list_atmosphere_parameters(&self, family: Family) -> Result<Vec<ColumnInfo>, FitError> {
        Ok(self.grid.table(family)?.parameters())
    }

    /// Fit every requested family. Replaces the previous call's results.
    ///
    /// Only configuration-time errors are returned as `Err`; per-family
    /// failures appear as [`FitStatus::Failed`] entries.
    pub fn fit(&mut self, request: &FitRequest) -> Result<&FitResults, FitError> {
        request.validate()?;
        self.check_configuration(request)?;

        self.results = FitResults::default();
        self.phases = request
            .atmospheres
            .iter()
            .map(|&f| (f, FitPhase::Configured))
            .collect();

        for &family in &request.atmospheres {
            self.advance(family, FitPhase::Evaluating);
            log::debug!("{family}: fitting with {}", request.method.display_name());

            let result = self.fit_family(family, request).unwrap_or_else(|err| {
                FitResult::failed(family, labels_for(request), err.to_string())
            });

            match &result.status {
                FitStatus::Converged => {
                    self.advance(family, FitPhase::Converged);
                    log::info!(
                        "{family}: converged, chi2 = {:.4}, x = {:?}",
                        result.chi2,
                        result.x
                    );
                }
                FitStatus::Failed { reason } => {
                    self.advance(family, FitPhase::Failed);
                    log::warn!("{family}: fit failed: {reason}");
                }
            }
            self.results.insert(result);
        }

        Ok(&self.results)
    }

    fn advance(&mut self, family: Family, next: FitPhase) {
        let current = self.phases.get(&family).copied().unwrap_or(FitPhase::Configured);
        debug_assert!(current.can_advance_to(next), "{current:?} -> {next:?}");
        log::debug!("{family}: {current:?} -> {next:?}");
        self.phases.insert(family, next);
    }

    /// Everything that can be checked without evaluating the model.
    fn check_configuration(&self, request: &FitRequest) -> Result<(), FitError> {
        for &family in &request.atmospheres {
            let table = self.grid.table(family)?;
            for filter in request.filters() {
                if !table.has_filter(filter) {
                    return Err(FitError::configuration(format!(
                        "unknown filter '{filter}' for the {family} atmosphere"
                    )));
                }
            }

            let Some(reddening) = request.reddening.filter(|r| !r.is_null()) else {
                continue;
            };
            match reddening.mode {
                ExtinctionMode::Filter => {
                    let law = self.filter_extinction.as_ref().ok_or_else(|| {
                        FitError::configuration(
                            "filter-based extinction requested but no extinction table is loaded",
                        )
                    })?;
                    if let Some(filter) = request.filters().into_iter().find(|f| !law.supports(f)) {
                        return Err(FitError::configuration(format!(
                            "no extinction table for filter '{filter}'"
                        )));
                    }
                }
                ExtinctionMode::Interpolated => {
                    if let Some(filter) = request
                        .filters()
                        .into_iter()
                        .find(|f| table.wavelength(f).is_none())
                    {
                        return Err(FitError::configuration(format!(
                            "no pivot wavelength for filter '{filter}' in the {family} atmosphere"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn surface(&self, request: &FitRequest, family: Family, column: &str, y_axis: Axis) -> Result<Arc<Interpolator>, FitError> {
        if request.reuse_interpolator {
            self.grid
                .interpolator(family, column, request.interpolation, Axis::Logg, y_axis)
        } else {
            self.grid
                .interpolator_rebuilt(family, column, request.interpolation, Axis::Logg, y_axis)
        }
    }

    fn load_surfaces(&self, family: Family, request: &FitRequest) -> Result<ModelSurfaces, FitError> {
        let primary = request
            .primary()
            .ok_or_else(|| FitError::configuration("no primary parameter"))?;
        let y_axis = primary.axis();

        let filters = request
            .filters()
            .into_iter()
            .map(|f| self.surface(request, family, f, y_axis))
            .collect::<Result<Vec<_>, FitError>>()?;

        let (teff, mbol) = match primary {
            Parameter::Teff => (None, Some(self.surface(request, family, "Mbol", y_axis)?)),
            _ => (Some(self.surface(request, family, "Teff", y_axis)?), None),
        };

        let table = self.grid.table(family)?;
        let quantities = table
            .quantity_names()
            .filter_map(|name| match self.surface(request, family, name, y_axis) {
                Ok(s) => Some((name.to_string(), s)),
                Err(err) => {
                    log::warn!("{family}: skipping quantity '{name}': {err}");
                    None
                }
            })
            .collect();

        Ok(ModelSurfaces {
            filters,
            teff,
            mbol,
            quantities,
        })
    }

    fn fit_family(&self, family: Family, request: &FitRequest) -> Result<FitResult, FitError> {
        let surfaces = self.load_surfaces(family, request)?;

        let table = self.grid.table(family)?;
        let filters: Vec<String> = request.filters().iter().map(|f| f.to_string()).collect();
        let wavelengths: Vec<Option<f64>> = filters.iter().map(|f| table.wavelength(f)).collect();
        let extinction = ExtinctionModel::resolve(
            request.reddening.as_ref(),
            &filters,
            &wavelengths,
            self.filter_extinction.as_ref(),
            self.wavelength_extinction.as_ref(),
        )?;

        let model = ForwardModel::new(request, surfaces, extinction)?;
        let x0 = request.resolved_initial_guess();

        let outcome = match &request.method {
            FitMethod::LocalMinimize(opts) => minimize::run(&model, &x0, opts)?,
            FitMethod::LeastSquares(opts) => lsq::run(&model, &x0, opts)?,
            FitMethod::EnsembleSample(opts) => ensemble::run(&model, &x0, opts)?,
        };

        Ok(assemble(family, &model, outcome))
    }
}

fn labels_for(request: &FitRequest) -> Vec<String> {
    let mut labels: Vec<String> = request.independent.iter().map(|p| p.label().to_string()).collect();
    if request.distance_is_free() {
        labels.push(crate::models::DISTANCE_LABEL.to_string());
    }
    labels
}

fn assemble(family: Family, model: &ForwardModel, outcome: SolverOutcome) -> FitResult {
    let chi2 = model.chi2(&outcome.x);
    let dof = model.dof();
    let mut status = outcome.status;
    if status.is_converged() && !chi2.is_finite() {
        status = FitStatus::failed("best fit lies outside the model domain");
    }

    let (derived, predicted) = match model.derive(&outcome.x) {
        Ok((d, p)) => (Some(d), p),
        Err(err) => {
            log::warn!("{family}: could not derive physical parameters: {err}");
            (None, Vec::new())
        }
    };

    FitResult {
        family,
        status,
        x: outcome.x,
        labels: model.layout().labels().to_vec(),
        chi2,
        reduced_chi2: (dof > 0 && chi2.is_finite()).then(|| chi2 / dof as f64),
        dof,
        covariance: outcome.covariance,
        uncertainties: outcome.uncertainties,
        chain: outcome.chain,
        derived,
        predicted,
        iterations: outcome.iterations,
        evaluations: model.evaluations(),
        message: outcome.message,
        interpolators: model.surfaces().all(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atmosphere::InterpolatorCache;
    use crate::data::synthetic::{GridSpec, SyntheticStar, observe, synthetic_grid};
    use crate::domain::{EnsembleOptions, LeastSquaresOptions, Observation};

    const FILTERS: [&str; 5] = ["G3", "G3_BP", "G3_RP", "FUV", "NUV"];

    fn grid() -> Arc<AtmosphereGrid> {
        Arc::new(synthetic_grid(&GridSpec::default(), Arc::new(InterpolatorCache::new())).unwrap())
    }

    fn request_for(obs: &[Observation], independent: &[Parameter], x0: &[f64]) -> FitRequest {
        let mags: Vec<Option<f64>> = obs.iter().map(|o| o.photometry.map(|p| p.mag)).collect();
        let errs: Vec<f64> = obs.iter().map(|o| o.photometry.map_or(0.1, |p| p.err)).collect();
        FitRequest::new(&FILTERS, &mags, &errs, independent, x0).unwrap()
    }

    #[test]
    fn recovers_mbol_for_both_families() {
        let grid = grid();
        let star = SyntheticStar::new(Family::H, 10.4, 8.0, 20.0);
        let obs = observe(&grid, &star, &FILTERS, 0.05, None, None).unwrap();
        let req = request_for(&obs, &[Parameter::Mbol], &[11.0])
            .with_logg(8.0)
            .with_distance(20.0, 0.0);

        let mut fitter = Fitter::new(Arc::clone(&grid));
        let results = fitter.fit(&req).unwrap();
        let h = results.get(Family::H).unwrap();
        assert!(h.is_converged(), "{:?}", h.status);
        assert!((h.x[0] - 10.4).abs() < 1e-3, "{:?}", h.x);
        assert!(h.chi2 < 1e-6);
        assert_eq!(results.len(), 2);
        assert_eq!(fitter.phase(Family::H), Some(FitPhase::Converged));
    }

    #[test]
    fn least_squares_reports_covariance() {
        let grid = grid();
        let star = SyntheticStar::new(Family::He, 11.0, 8.25, 30.0);
        let obs = observe(&grid, &star, &FILTERS, 0.05, None, None).unwrap();
        let req = request_for(&obs, &[Parameter::Mbol, Parameter::Logg], &[10.5, 8.0])
            .with_distance(30.0, 0.0)
            .with_atmospheres(&[Family::He])
            .with_method(FitMethod::LeastSquares(LeastSquaresOptions::default()));

        let mut fitter = Fitter::new(grid);
        let r = fitter.fit(&req).unwrap().get(Family::He).unwrap().clone();
        assert!(r.is_converged(), "{:?}", r.status);
        assert!((r.x[0] - 11.0).abs() < 1e-3);
        assert!((r.x[1] - 8.25).abs() < 1e-3);
        let sigmas = r.uncertainties.unwrap();
        assert!(sigmas.iter().all(|s| s.is_finite() && *s > 0.0));
    }

    #[test]
    fn unknown_filter_fails_before_fitting() {
        let grid = grid();
        let req = FitRequest::new(&["G3", "Z"], &[Some(10.0), Some(10.0)], &[0.1, 0.1], &[Parameter::Mbol], &[10.0])
            .unwrap()
            .with_distance(10.0, 0.0);
        let mut fitter = Fitter::new(grid);
        let err = fitter.fit(&req).unwrap_err();
        assert!(matches!(err, FitError::Configuration { .. }));
        assert!(fitter.results().is_empty());
    }

    #[test]
    fn out_of_grid_logg_fails_each_family_without_aborting() {
        let grid = grid();
        let star = SyntheticStar::new(Family::H, 10.0, 8.0, 10.0);
        let obs = observe(&grid, &star, &FILTERS, 0.05, None, None).unwrap();
        // logg 9.6 is outside the grid for both families, so both fail but the
        // call itself still returns.
        let req = request_for(&obs, &[Parameter::Mbol], &[10.0])
            .with_logg(9.6)
            .with_distance(10.0, 0.0);
        let mut fitter = Fitter::new(grid);
        let results = fitter.fit(&req).unwrap();
        assert_eq!(results.failed().count(), 2);
        assert!(results.best().is_none());
        assert_eq!(fitter.phase(Family::He), Some(FitPhase::Failed));
    }

    #[test]
    fn ensemble_sampling_brackets_truth() {
        let grid = grid();
        let star = SyntheticStar::new(Family::H, 10.0, 8.0, 10.0);
        let obs = observe(&grid, &star, &FILTERS, 0.05, None, None).unwrap();
        let req = request_for(&obs, &[Parameter::Mbol], &[10.05])
            .with_logg(8.0)
            .with_distance(10.0, 0.0)
            .with_atmospheres(&[Family::H])
            .with_method(FitMethod::EnsembleSample(EnsembleOptions {
                nwalkers: 8,
                nsteps: 400,
                nburn: 200,
                init_scatter: 1e-2,
                seed: 7,
                ..EnsembleOptions::default()
            }));
        let mut fitter = Fitter::new(grid);
        let r = fitter.fit(&req).unwrap().get(Family::H).unwrap().clone();
        assert!(r.is_converged(), "{:?}", r.status);
        assert!((r.x[0] - 10.0).abs() < 0.05, "{:?}", r.x);
        assert_eq!(r.chain.as_ref().map(Vec::len), Some(8 * 200));
    }

    #[test]
    fn results_are_replaced_on_each_call() {
        let grid = grid();
        let star = SyntheticStar::new(Family::H, 10.0, 8.0, 10.0);
        let obs = observe(&grid, &star, &FILTERS, 0.05, None, None).unwrap();
        let base = request_for(&obs, &[Parameter::Mbol], &[10.2])
            .with_logg(8.0)
            .with_distance(10.0, 0.0);
        let mut fitter = Fitter::new(grid);
        fitter.fit(&base).unwrap();
        assert_eq!(fitter.results().len(), 2);
        fitter.fit(&base.clone().with_atmospheres(&[Family::He])).unwrap();
        assert_eq!(fitter.results().len(), 1);
        assert!(fitter.results().get(Family::H).is_none());
    }
}
