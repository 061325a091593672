mod common;

use std::sync::Arc;

use approx::assert_abs_diff_eq;
use common::{
    FILTERS, MAGS, TRUE_DISTANCE, TRUE_LOGG, TRUE_MBOL, assert_rel, linear_grid, linear_table, linear_table_rows,
    scenario_request,
};
use wd_photfit::atmosphere::{AtmosphereGrid, InterpolatorCache};
use wd_photfit::data::synthetic::analytic_teff;
use wd_photfit::domain::{
    EnsembleOptions, Family, FitMethod, FitPhase, FitRequest, FitStatus, InterpolationMethod, LeastSquaresOptions, LocalAlgorithm,
    LocalMinimizeOptions, Parameter,
};
use wd_photfit::fit::Fitter;

#[test]
fn mbol_only_fit_at_fixed_distance() {
    let req = scenario_request(&[Parameter::Mbol], &[10.0])
        .with_logg(TRUE_LOGG)
        .with_distance(TRUE_DISTANCE, 0.1);

    let mut fitter = Fitter::new(linear_grid());
    let results = fitter.fit(&req).unwrap();

    let h = results.get(Family::H).unwrap();
    assert!(h.is_converged(), "{:?}", h.status);
    assert_eq!(h.labels, vec!["Mbol"]);
    assert_rel(h.x[0], TRUE_MBOL, 1e-3);
    assert!(h.chi2 < 1e-6, "chi2 = {}", h.chi2);
    assert_eq!(h.dof, 4);

    let he = results.get(Family::He).unwrap();
    assert!(he.is_converged(), "{:?}", he.status);
    assert!(he.chi2 > h.chi2);
    assert_eq!(results.best().map(|r| r.family), Some(Family::H));
}

#[test]
fn one_family_fails_while_the_other_converges() {
    // The He grid starts at logg 8.5, so the fixed logg lies outside it.
    let grid = Arc::new(
        AtmosphereGrid::with_cache(Arc::new(InterpolatorCache::new()))
            .with_table(linear_table(Family::H))
            .with_table(linear_table_rows(Family::He, 6..=10)),
    );
    let req = scenario_request(&[Parameter::Mbol], &[10.0])
        .with_logg(TRUE_LOGG)
        .with_distance(TRUE_DISTANCE, 0.1);

    let mut fitter = Fitter::new(grid);
    let results = fitter.fit(&req).unwrap();
    assert_eq!(results.len(), 2);

    let h = results.get(Family::H).unwrap();
    assert_eq!(h.status, FitStatus::Converged);
    assert_rel(h.x[0], TRUE_MBOL, 1e-3);
    let he = results.get(Family::He).unwrap();
    assert!(matches!(he.status, FitStatus::Failed { .. }), "{:?}", he.status);
    assert_eq!(results.best().map(|r| r.family), Some(Family::H));

    assert_eq!(fitter.phase(Family::H), Some(FitPhase::Converged));
    assert_eq!(fitter.phase(Family::He), Some(FitPhase::Failed));
}

#[test]
fn mbol_and_logg_fit() {
    let req = scenario_request(&[Parameter::Mbol, Parameter::Logg], &[10.0, 7.5])
        .with_distance(TRUE_DISTANCE, 0.1)
        .with_atmospheres(&[Family::H]);

    let mut fitter = Fitter::new(linear_grid());
    let h = fitter.fit(&req).unwrap().get(Family::H).unwrap().clone();
    assert!(h.is_converged(), "{:?}", h.status);
    assert_rel(h.x[0], TRUE_MBOL, 1e-3);
    assert_rel(h.x[1], TRUE_LOGG, 1e-3);

    let derived = h.derived.as_ref().unwrap();
    assert_rel(derived.logg, TRUE_LOGG, 1e-3);
    assert_rel(derived.teff, analytic_teff(TRUE_MBOL, TRUE_LOGG), 1e-2);
    assert_abs_diff_eq!(derived.quantities["mass"], 0.6 + 0.4 * (TRUE_LOGG - 8.0), epsilon = 1e-3);
}

#[test]
fn two_bands_fix_mbol_and_logg_at_known_distance() {
    let req = FitRequest::new(
        &["G3", "NUV"],
        &[Some(MAGS[0]), Some(MAGS[4])],
        &[0.1, 0.1],
        &[Parameter::Mbol, Parameter::Logg],
        &[10.0, 7.6],
    )
    .unwrap()
    .with_distance(TRUE_DISTANCE, 0.1)
    .with_atmospheres(&[Family::H])
    .with_method(FitMethod::LeastSquares(LeastSquaresOptions::default()));

    let mut fitter = Fitter::new(linear_grid());
    let h = fitter.fit(&req).unwrap().get(Family::H).unwrap().clone();
    assert!(h.is_converged(), "{:?}", h.status);
    assert_eq!(h.dof, 0);
    assert_rel(h.x[0], TRUE_MBOL, 1e-3);
    assert_rel(h.x[1], TRUE_LOGG, 1e-3);
}

#[test]
fn free_distance_fit_recovers_distance() {
    let req = scenario_request(&[Parameter::Mbol, Parameter::Logg], &[10.0, 7.5]).with_atmospheres(&[Family::H]);
    assert!(req.distance_is_free());

    let mut fitter = Fitter::new(linear_grid());
    let h = fitter.fit(&req).unwrap().get(Family::H).unwrap().clone();
    assert!(h.is_converged(), "{:?}", h.status);
    assert_eq!(h.labels, vec!["Mbol", "logg", "distance"]);
    assert_rel(h.x[0], TRUE_MBOL, 1e-3);
    assert_rel(h.x[1], TRUE_LOGG, 1e-3);
    assert_rel(h.x[2], TRUE_DISTANCE, 1e-3);
    assert_rel(h.param("distance").unwrap(), TRUE_DISTANCE, 1e-3);
}

#[test]
fn least_squares_and_lbfgs_agree_with_simplex() {
    let base = scenario_request(&[Parameter::Mbol, Parameter::Logg], &[10.0, 7.6])
        .with_distance(TRUE_DISTANCE, 0.0)
        .with_atmospheres(&[Family::H]);

    let methods = [
        FitMethod::default(),
        FitMethod::LocalMinimize(LocalMinimizeOptions {
            algorithm: LocalAlgorithm::Lbfgs,
            max_iters: 200,
            tolerance: 1e-6,
        }),
        FitMethod::LeastSquares(LeastSquaresOptions::default()),
    ];

    let grid = linear_grid();
    for method in methods {
        let name = method.display_name();
        let req = base.clone().with_method(method);
        let mut fitter = Fitter::new(Arc::clone(&grid));
        let h = fitter.fit(&req).unwrap().get(Family::H).unwrap().clone();
        assert!(h.is_converged(), "{name}: {:?}", h.status);
        assert_rel(h.x[0], TRUE_MBOL, 1e-3);
        assert_rel(h.x[1], TRUE_LOGG, 1e-3);
    }
}

#[test]
fn least_squares_respects_bounds() {
    // Truth lies above the upper Mbol bound, so the solution sits on it.
    let req = scenario_request(&[Parameter::Mbol], &[9.0])
        .with_logg(TRUE_LOGG)
        .with_distance(TRUE_DISTANCE, 0.0)
        .with_atmospheres(&[Family::H])
        .with_method(FitMethod::LeastSquares(LeastSquaresOptions {
            bounds: Some(vec![(8.0, 9.5)]),
            ..LeastSquaresOptions::default()
        }));

    let mut fitter = Fitter::new(linear_grid());
    let h = fitter.fit(&req).unwrap().get(Family::H).unwrap().clone();
    assert!(h.x[0] <= 9.5 + 1e-9, "{:?}", h.x);
    assert!(h.x[0] > 9.4, "{:?}", h.x);
}

#[test]
fn absent_filter_matches_omitting_it() {
    let mut mags: Vec<Option<f64>> = MAGS.iter().copied().map(Some).collect();
    mags[3] = None;
    let with_absent = FitRequest::new(&FILTERS, &mags, &[0.1; 5], &[Parameter::Mbol], &[10.0])
        .unwrap()
        .with_logg(TRUE_LOGG)
        .with_distance(TRUE_DISTANCE, 0.1)
        .with_atmospheres(&[Family::H]);
    assert!(with_absent.allow_none);

    let filters = ["G3", "G3_BP", "G3_RP", "NUV"];
    let kept = [Some(MAGS[0]), Some(MAGS[1]), Some(MAGS[2]), Some(MAGS[4])];
    let omitted = FitRequest::new(&filters, &kept, &[0.1; 4], &[Parameter::Mbol], &[10.0])
        .unwrap()
        .with_logg(TRUE_LOGG)
        .with_distance(TRUE_DISTANCE, 0.1)
        .with_atmospheres(&[Family::H]);

    let grid = linear_grid();
    let a = Fitter::new(Arc::clone(&grid))
        .fit(&with_absent)
        .unwrap()
        .get(Family::H)
        .unwrap()
        .clone();
    let b = Fitter::new(grid).fit(&omitted).unwrap().get(Family::H).unwrap().clone();

    assert_abs_diff_eq!(a.x[0], b.x[0], epsilon = 1e-9);
    assert_abs_diff_eq!(a.chi2, b.chi2, epsilon = 1e-9);
    assert_eq!(a.dof, b.dof);

    // The absent band still gets a prediction, but no pull.
    let fuv = a.predicted.iter().find(|p| p.filter == "FUV").unwrap();
    assert!(fuv.observed.is_none());
    assert!(fuv.pull().is_none());
    assert_rel(fuv.predicted, MAGS[3], 1e-3);
}

#[test]
fn strict_request_rejects_absent_magnitude() {
    let mut mags: Vec<Option<f64>> = MAGS.iter().copied().map(Some).collect();
    mags[0] = None;
    let req = FitRequest::new(&FILTERS, &mags, &[0.1; 5], &[Parameter::Mbol], &[10.0])
        .unwrap()
        .with_distance(TRUE_DISTANCE, 0.0)
        .with_allow_none(false);
    assert!(req.validate().is_err());
    assert!(Fitter::new(linear_grid()).fit(&req).is_err());
}

#[test]
fn teff_as_primary_parameter() {
    let truth = analytic_teff(TRUE_MBOL, TRUE_LOGG);
    let req = scenario_request(&[Parameter::Teff], &[12_000.0])
        .with_logg(TRUE_LOGG)
        .with_distance(TRUE_DISTANCE, 0.0)
        .with_atmospheres(&[Family::H]);

    let mut fitter = Fitter::new(linear_grid());
    let h = fitter.fit(&req).unwrap().get(Family::H).unwrap().clone();
    assert!(h.is_converged(), "{:?}", h.status);
    assert_eq!(h.labels, vec!["Teff"]);
    assert_rel(h.x[0], truth, 2e-3);
    assert_abs_diff_eq!(h.derived.as_ref().unwrap().mbol, TRUE_MBOL, epsilon = 1e-2);
}

#[test]
fn rbf_surfaces_recover_the_same_answer() {
    let req = scenario_request(&[Parameter::Mbol, Parameter::Logg], &[10.0, 7.6])
        .with_distance(TRUE_DISTANCE, 0.0)
        .with_atmospheres(&[Family::H])
        .with_interpolation(InterpolationMethod::Rbf);

    let mut fitter = Fitter::new(linear_grid());
    let h = fitter.fit(&req).unwrap().get(Family::H).unwrap().clone();
    assert!(h.is_converged(), "{:?}", h.status);
    assert_rel(h.x[0], TRUE_MBOL, 1e-3);
    assert_rel(h.x[1], TRUE_LOGG, 1e-3);
}

#[test]
fn ensemble_posterior_is_centred_on_truth() {
    let req = scenario_request(&[Parameter::Mbol, Parameter::Logg], &[9.97, 7.51])
        .with_distance(TRUE_DISTANCE, 0.0)
        .with_atmospheres(&[Family::H])
        .with_method(FitMethod::EnsembleSample(EnsembleOptions {
            nwalkers: 16,
            nsteps: 600,
            nburn: 300,
            init_scatter: 1e-2,
            seed: 11,
            ..EnsembleOptions::default()
        }));

    let mut fitter = Fitter::new(linear_grid());
    let h = fitter.fit(&req).unwrap().get(Family::H).unwrap().clone();
    assert!(h.is_converged(), "{:?}", h.status);
    assert_eq!(fitter.phase(Family::H), Some(FitPhase::Converged));

    let chain = h.chain.as_ref().unwrap();
    assert_eq!(chain.len(), 16 * 300);
    assert!(chain.iter().all(|s| s.len() == 2));
    assert!((h.x[0] - TRUE_MBOL).abs() < 0.1, "{:?}", h.x);
    assert!((h.x[1] - TRUE_LOGG).abs() < 0.1, "{:?}", h.x);
    let sigmas = h.uncertainties.as_ref().unwrap();
    assert!(sigmas.iter().all(|s| s.is_finite() && *s > 0.0));
}
