#![allow(dead_code)]

use std::ops::RangeInclusive;
use std::sync::Arc;

use wd_photfit::atmosphere::{AtmosphereGrid, AtmosphereTable, InterpolatorCache};
use wd_photfit::data::synthetic::analytic_teff;
use wd_photfit::domain::{Family, FitRequest, Parameter};

pub const FILTERS: [&str; 5] = ["G3", "G3_BP", "G3_RP", "FUV", "NUV"];
pub const MAGS: [f64; 5] = [10.882, 10.853, 10.946, 11.301, 11.183];
pub const WAVELENGTHS: [f64; 5] = [6218.0, 5110.0, 7769.0, 1535.0, 2301.0];

pub const TRUE_MBOL: f64 = 9.962;
pub const TRUE_LOGG: f64 = 7.5;
pub const TRUE_DISTANCE: f64 = 10.0;

/// `dM/dlogg` per filter.
const LOGG_SLOPES: [f64; 5] = [0.10, -0.20, 0.30, 0.50, -0.40];
/// `dM/dMbol - 1` per filter.
const MBOL_SLOPES: [f64; 5] = [0.0, 0.15, -0.15, 0.30, -0.30];

/// Magnitudes linear in `(logg, Mbol)` that reproduce `MAGS` exactly at
/// `(TRUE_LOGG, TRUE_MBOL)` and 10 pc. The He table is offset so both
/// families fit, but differently well.
pub fn linear_table(family: Family) -> AtmosphereTable {
    linear_table_rows(family, 0..=10)
}

/// [`linear_table`] restricted to the logg rows `7.0 + 0.25 i` for `i` in `rows`.
pub fn linear_table_rows(family: Family, rows: RangeInclusive<usize>) -> AtmosphereTable {
    let offset = match family {
        Family::H => 0.0,
        Family::He => 0.3,
    };

    let mut logg = Vec::new();
    let mut mbol = Vec::new();
    for i in rows {
        for j in 0..=40 {
            logg.push(7.0 + 0.25 * i as f64);
            mbol.push(0.5 * j as f64);
        }
    }
    let teff = logg.iter().zip(&mbol).map(|(&g, &m)| analytic_teff(m, g)).collect();

    let mut table = AtmosphereTable::new(family, logg.clone(), mbol.clone(), teff).unwrap();
    for (k, filter) in FILTERS.iter().enumerate() {
        let a = MAGS[k] - TRUE_MBOL + offset;
        let values = logg
            .iter()
            .zip(&mbol)
            .map(|(g, m)| m + a + LOGG_SLOPES[k] * (g - TRUE_LOGG) + MBOL_SLOPES[k] * (m - TRUE_MBOL))
            .collect();
        table = table
            .with_filter(*filter, values)
            .unwrap()
            .with_wavelength(filter, WAVELENGTHS[k])
            .unwrap();
    }
    let mass = logg.iter().map(|g| 0.6 + 0.4 * (g - 8.0)).collect();
    table.with_quantity("mass", mass).unwrap()
}

/// Both linear tables behind a private cache.
pub fn linear_grid() -> Arc<AtmosphereGrid> {
    Arc::new(
        AtmosphereGrid::with_cache(Arc::new(InterpolatorCache::new()))
            .with_table(linear_table(Family::H))
            .with_table(linear_table(Family::He)),
    )
}

/// The five-band scenario with every magnitude present and error 0.1.
pub fn scenario_request(independent: &[Parameter], guess: &[f64]) -> FitRequest {
    let mags: Vec<Option<f64>> = MAGS.iter().copied().map(Some).collect();
    FitRequest::new(&FILTERS, &mags, &[0.1; 5], independent, guess).unwrap()
}

pub fn assert_rel(actual: f64, expected: f64, rtol: f64) {
    assert!(
        ((actual - expected) / expected).abs() <= rtol,
        "expected {expected} (rtol {rtol}), got {actual}"
    );
}
