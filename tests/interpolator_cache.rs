mod common;

use std::sync::Arc;

use common::{TRUE_DISTANCE, TRUE_LOGG, TRUE_MBOL, assert_rel, linear_grid, scenario_request};
use wd_photfit::atmosphere::InterpolatorCache;
use wd_photfit::domain::{Family, FitRequest, FitResult, Parameter};
use wd_photfit::fit::Fitter;

fn request() -> FitRequest {
    scenario_request(&[Parameter::Mbol], &[10.0])
        .with_logg(TRUE_LOGG)
        .with_distance(TRUE_DISTANCE, 0.0)
        .with_atmospheres(&[Family::H])
}

fn fit_h(fitter: &mut Fitter, req: &FitRequest) -> FitResult {
    fitter.fit(req).unwrap().get(Family::H).unwrap().clone()
}

#[test]
fn sessions_on_one_grid_share_interpolators() {
    let grid = linear_grid();
    let req = request();

    let first = fit_h(&mut Fitter::new(Arc::clone(&grid)), &req);
    // Five filters, the Teff surface and the mass quantity.
    assert_eq!(first.interpolators.len(), 7);
    let builds = grid.cache().build_count();
    assert_eq!(builds, 7);

    let second = fit_h(&mut Fitter::new(Arc::clone(&grid)), &req);
    assert_eq!(grid.cache().build_count(), builds);
    assert!(
        first
            .interpolators
            .iter()
            .zip(&second.interpolators)
            .all(|(a, b)| Arc::ptr_eq(a, b))
    );
    assert_eq!(first.x, second.x);
}

#[test]
fn rebuild_replaces_cached_interpolators() {
    let grid = linear_grid();
    let first = fit_h(&mut Fitter::new(Arc::clone(&grid)), &request());
    let builds = grid.cache().build_count();

    let rebuilt = fit_h(
        &mut Fitter::new(Arc::clone(&grid)),
        &request().with_reuse_interpolator(false),
    );
    assert_eq!(grid.cache().build_count(), builds + 7);
    assert!(
        first
            .interpolators
            .iter()
            .zip(&rebuilt.interpolators)
            .all(|(a, b)| !Arc::ptr_eq(a, b))
    );
    assert_rel(rebuilt.x[0], TRUE_MBOL, 1e-3);

    // The rebuilt surfaces are the ones handed out from now on.
    let after = fit_h(&mut Fitter::new(grid), &request());
    assert!(
        rebuilt
            .interpolators
            .iter()
            .zip(&after.interpolators)
            .all(|(a, b)| Arc::ptr_eq(a, b))
    );
}

#[test]
fn concurrent_sessions_build_each_surface_once() {
    let grid = linear_grid();
    let req = request();

    let results: Vec<FitResult> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let grid = Arc::clone(&grid);
                let req = &req;
                s.spawn(move || fit_h(&mut Fitter::new(grid), req))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(grid.cache().build_count(), 7);
    for r in &results {
        assert_rel(r.x[0], TRUE_MBOL, 1e-3);
        assert!(
            r.interpolators
                .iter()
                .zip(&results[0].interpolators)
                .all(|(a, b)| Arc::ptr_eq(a, b))
        );
    }
}

#[test]
fn global_cache_is_a_single_instance() {
    assert!(Arc::ptr_eq(&InterpolatorCache::global(), &InterpolatorCache::global()));
}
