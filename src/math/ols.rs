//! Dense least-squares solves.
//!
//! Used where a square system may be singular or a tall system must be solved
//! in the least-squares sense:
//!
//! - the RBF interpolation system, when LU fails
//! - Levenberg–Marquardt steps and the covariance `(JᵀJ)⁻¹`
//!
//! Everything goes through SVD. Nalgebra's `QR::solve` is intended for square
//! systems and panics on tall matrices.

use nalgebra::{DMatrix, DVector};

/// Solve `x β ≈ y` in the least-squares sense using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Progressively looser singular-value cutoffs.
    [1e-10, 1e-8, 1e-6]
        .into_iter()
        .filter_map(|eps| svd.solve(y, eps).ok())
        .find(|beta| beta.iter().all(|v| v.is_finite()))
}

/// Moore–Penrose inverse of a symmetric positive semi-definite matrix.
///
/// Singular values below `1e-12 · σ_max` are treated as zero so that
/// unconstrained directions do not blow up the covariance.
pub fn pseudo_inverse(m: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let sigma_max = m.clone().singular_values().max();
    if !(sigma_max.is_finite() && sigma_max > 0.0) {
        return None;
    }
    let inv = m.clone().pseudo_inverse(1e-12 * sigma_max).ok()?;
    inv.iter().all(|v| v.is_finite()).then_some(inv)
}
