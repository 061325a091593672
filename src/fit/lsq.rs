//! Bounded Levenberg–Marquardt on the σ-normalised residual vector.
//!
//! Each iteration solves
//!
//! ```text
//! (JᵀJ + λ D) δ = -Jᵀr,      D = diag(JᵀJ)
//! ```
//!
//! with a forward-difference Jacobian, projects `x + δ` onto the bounds, and
//! accepts the step only if the cost `½ rᵀr` decreases. λ is divided by 10 on
//! success and multiplied by 10 on rejection.
//!
//! Stopping rules (MINPACK style):
//!
//! - `gtol`: `‖Jᵀr‖∞ <= gtol`
//! - `ftol`: relative cost reduction of an accepted step `<= ftol`
//! - `xtol`: trial step `‖δ‖ <= xtol (‖x‖ + xtol)`
//!
//! The parameter covariance at the solution is `(JᵀJ)⁻¹`; residuals are
//! already divided by σ, so no extra scaling is applied.

use nalgebra::{DMatrix, DVector};

use crate::domain::{FitStatus, LeastSquaresOptions};
use crate::error::FitError;
use crate::fit::SolverOutcome;
use crate::math::{pseudo_inverse, solve_least_squares};
use crate::models::ForwardModel;

const LAMBDA_MAX: f64 = 1e16;
const LAMBDA_MIN: f64 = 1e-16;

fn project(x: &mut [f64], bounds: Option<&[(f64, f64)]>) {
    if let Some(bounds) = bounds {
        for (v, (lo, hi)) in x.iter_mut().zip(bounds) {
            *v = v.clamp(*lo, *hi);
        }
    }
}

fn cost(r: &[f64]) -> f64 {
    0.5 * r.iter().map(|v| v * v).sum::<f64>()
}

/// Forward-difference Jacobian of the residuals, `n_resid x n_param`.
///
/// A coordinate whose forward step leaves the bounds or the model domain is
/// differenced backwards instead.
pub fn jacobian(
    model: &ForwardModel,
    x: &[f64],
    r0: &[f64],
    bounds: Option<&[(f64, f64)]>,
) -> Result<DMatrix<f64>, FitError> {
    let mut jac = DMatrix::<f64>::zeros(r0.len(), x.len());
    for j in 0..x.len() {
        let h = f64::EPSILON.sqrt() * x[j].abs().max(1.0);
        let upper = bounds.map_or(f64::INFINITY, |b| b[j].1);

        let mut column = None;
        for step in [h, -h] {
            if x[j] + step > upper {
                continue;
            }
            let mut xp = x.to_vec();
            xp[j] += step;
            if let Ok(rp) = model.residuals(&xp) {
                column = Some((rp, step));
                break;
            }
        }
        let (rp, step) = column.ok_or_else(|| {
            FitError::domain(format!("cannot difference parameter {j} at {x:?}"))
        })?;
        for i in 0..r0.len() {
            jac[(i, j)] = (rp[i] - r0[i]) / step;
        }
    }
    Ok(jac)
}

/// Gauss–Newton covariance `(JᵀJ)⁻¹` and 1-σ uncertainties at `x`.
///
/// Returns `(None, None)` where the Jacobian cannot be formed.
pub fn gauss_newton_covariance(model: &ForwardModel, x: &[f64]) -> (Option<Vec<Vec<f64>>>, Option<Vec<f64>>) {
    let Ok(r) = model.residuals(x) else {
        return (None, None);
    };
    let Ok(jac) = jacobian(model, x, &r, None) else {
        return (None, None);
    };
    match pseudo_inverse(&(jac.transpose() * &jac)) {
        Some(cov) => {
            let sigmas = (0..cov.nrows()).map(|i| cov[(i, i)].max(0.0).sqrt()).collect();
            (Some(matrix_rows(&cov)), Some(sigmas))
        }
        None => (None, None),
    }
}

fn matrix_rows(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    m.row_iter().map(|row| row.iter().copied().collect()).collect()
}

pub fn run(model: &ForwardModel, x0: &[f64], opts: &LeastSquaresOptions) -> Result<SolverOutcome, FitError> {
    let bounds = opts.bounds.as_deref();
    let mut x = x0.to_vec();
    project(&mut x, bounds);

    let mut r = model
        .residuals(&x)
        .map_err(|e| FitError::domain(format!("initial guess cannot be evaluated: {e}")))?;
    let mut f = cost(&r);
    let mut lambda: Option<f64> = None;
    let mut iterations = 0u64;
    let mut status = FitStatus::failed(format!("no convergence in {} iterations", opts.max_iters));

    'outer: while iterations < opts.max_iters as u64 {
        let jac = jacobian(model, &x, &r, bounds)?;
        let jtj = jac.transpose() * &jac;
        let g = jac.transpose() * DVector::from_column_slice(&r);

        if g.amax() <= opts.gtol {
            status = FitStatus::Converged;
            break;
        }

        let diag: Vec<f64> = (0..jtj.nrows()).map(|i| jtj[(i, i)].max(1e-12)).collect();
        let mut lam = *lambda.get_or_insert_with(|| 1e-3 * diag.iter().cloned().fold(0.0, f64::max));

        // Raise λ until a step reduces the cost.
        loop {
            iterations += 1;
            let mut a = jtj.clone();
            for (i, d) in diag.iter().enumerate() {
                a[(i, i)] += lam * d;
            }
            let Some(delta) = solve_least_squares(&a, &(-&g)) else {
                status = FitStatus::failed("damped normal equations are singular");
                break 'outer;
            };

            let mut trial = x.clone();
            for (t, d) in trial.iter_mut().zip(delta.iter()) {
                *t += d;
            }
            project(&mut trial, bounds);

            let step_norm = trial
                .iter()
                .zip(&x)
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>()
                .sqrt();
            let x_norm = x.iter().map(|v| v * v).sum::<f64>().sqrt();

            let trial_r = model.residuals(&trial).ok();
            let trial_f = trial_r.as_deref().map_or(f64::INFINITY, cost);

            if trial_f < f {
                let reduction = f - trial_f;
                x = trial;
                r = trial_r.unwrap_or_default();
                let previous = f;
                f = trial_f;
                lambda = Some((lam / 10.0).max(LAMBDA_MIN));

                if reduction <= opts.ftol * previous || step_norm <= opts.xtol * (x_norm + opts.xtol) {
                    status = FitStatus::Converged;
                    break 'outer;
                }
                break;
            }

            if step_norm <= opts.xtol * (x_norm + opts.xtol) {
                status = FitStatus::Converged;
                break 'outer;
            }

            lam *= 10.0;
            if lam > LAMBDA_MAX {
                status = FitStatus::failed("damping parameter diverged");
                break 'outer;
            }
            if iterations >= opts.max_iters as u64 {
                break 'outer;
            }
        }
    }

    log::debug!("least squares finished after {iterations} iteration(s), cost {f:.6e}");
    let (covariance, uncertainties) = gauss_newton_covariance(model, &x);
    let message = match &status {
        FitStatus::Converged => format!("converged, cost {f:.6e}"),
        FitStatus::Failed { reason } => reason.clone(),
    };
    Ok(SolverOutcome {
        x,
        status,
        iterations,
        covariance,
        uncertainties,
        chain: None,
        acceptance: None,
        message,
    })
}
