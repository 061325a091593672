//! Deterministic local minimisation of χ² via argmin.
//!
//! - Nelder–Mead: gradient-free simplex search started around the initial guess
//! - L-BFGS: More–Thuente line search with central finite-difference gradients
//!
//! L-BFGS works on χ² extended past the grid edge: outside the parameter box
//! the cost is χ² at the nearest in-box point plus a stiff quadratic wall, so
//! an overlong trial step sees a finite cost and a gradient pointing back in.
//!
//! One start, no retries: landing in a different basin is surfaced to the
//! caller as-is.

use argmin::core::{CostFunction, Error, Executor, Gradient, State, TerminationReason};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::neldermead::NelderMead;
use argmin::solver::quasinewton::LBFGS;
use finitediff::FiniteDiff;

use crate::domain::{FitStatus, LocalAlgorithm, LocalMinimizeOptions};
use crate::error::FitError;
use crate::fit::SolverOutcome;
use crate::fit::lsq::gauss_newton_covariance;
use crate::models::ForwardModel;

const LBFGS_MEMORY: usize = 7;

/// Wall cost per squared box width of excursion.
const WALL_STIFFNESS: f64 = 1e6;

/// Bridges the forward model's χ² to argmin.
struct Chi2Problem<'a> {
    model: &'a ForwardModel,
    /// Box to extend χ² past; `None` leaves it infinite outside the grid.
    walls: Option<Vec<(f64, f64)>>,
}

impl Chi2Problem<'_> {
    fn objective(&self, params: &[f64]) -> f64 {
        let Some(walls) = &self.walls else {
            return self.model.chi2(params);
        };
        let inside = clamp_into(params, walls);
        let excursion: f64 = params
            .iter()
            .zip(&inside)
            .zip(walls)
            .map(|((p, c), (lo, hi))| {
                let width = if (hi - lo).is_finite() && hi > lo { hi - lo } else { 1.0 };
                ((p - c) / width).powi(2)
            })
            .sum();
        self.model.chi2(&inside) + WALL_STIFFNESS * excursion
    }
}

impl CostFunction for Chi2Problem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.objective(params))
    }
}

impl Gradient for Chi2Problem<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, params: &Self::Param) -> Result<Self::Gradient, Error> {
        let cost = |p: &Vec<f64>| self.objective(p);
        let mut grad = params.central_diff(&cost);
        if grad.iter().any(|g| !g.is_finite()) {
            // Central differences step over the grid edge; try one-sided.
            grad = params.forward_diff(&cost);
        }
        if grad.iter().any(|g| !g.is_finite()) {
            return Err(FitError::domain(format!("gradient is not finite at {params:?}")).into());
        }
        Ok(grad)
    }
}

/// Nearest point of the box; tolerates an empty or NaN-edged box.
fn clamp_into(params: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    params
        .iter()
        .zip(bounds)
        .map(|(v, (lo, hi))| v.max(*lo).min(*hi))
        .collect()
}

/// Initial simplex: `x0` plus one vertex per coordinate nudged by 5 %
/// (0.00025 for zero coordinates).
pub fn initial_simplex(x0: &[f64]) -> Vec<Vec<f64>> {
    let mut simplex = Vec::with_capacity(x0.len() + 1);
    simplex.push(x0.to_vec());
    for i in 0..x0.len() {
        let mut v = x0.to_vec();
        v[i] = if v[i] != 0.0 { v[i] * 1.05 } else { 0.00025 };
        simplex.push(v);
    }
    simplex
}

pub fn run(model: &ForwardModel, x0: &[f64], opts: &LocalMinimizeOptions) -> Result<SolverOutcome, FitError> {
    if !model.chi2(x0).is_finite() {
        return Err(FitError::domain(format!(
            "initial guess {x0:?} lies outside the model domain"
        )));
    }

    let state = match opts.algorithm {
        LocalAlgorithm::NelderMead => {
            let problem = Chi2Problem { model, walls: None };
            let solver = NelderMead::new(initial_simplex(x0))
                .with_sd_tolerance(opts.tolerance)
                .map_err(|e| FitError::configuration(e.to_string()))?;
            let result = Executor::new(problem, solver)
                .configure(|state| state.max_iters(opts.max_iters))
                .run()
                .map_err(|e| FitError::convergence(e.to_string()))?;
            LocalState::from_state(result.state())
        }
        LocalAlgorithm::Lbfgs => {
            let walls = model.parameter_bounds();
            let problem = Chi2Problem {
                model,
                walls: Some(walls.clone()),
            };
            let solver = LBFGS::new(MoreThuenteLineSearch::new(), LBFGS_MEMORY)
                .with_tolerance_grad(opts.tolerance)
                .map_err(|e| FitError::configuration(e.to_string()))?;
            let result = Executor::new(problem, solver)
                .configure(|state| state.param(x0.to_vec()).max_iters(opts.max_iters))
                .run()
                .map_err(|e| FitError::convergence(e.to_string()))?;
            let mut state = LocalState::from_state(result.state());
            // The wall's minimum sits on the box edge, never past it.
            state.best = state.best.map(|x| clamp_into(&x, &walls));
            state
        }
    };

    finish(model, state)
}

/// Solver-independent view of a finished argmin run.
struct LocalState {
    best: Option<Vec<f64>>,
    iterations: u64,
    reason: Option<TerminationReason>,
}

impl LocalState {
    fn from_state<S>(state: &S) -> Self
    where
        S: State<Param = Vec<f64>, Float = f64>,
    {
        Self {
            best: state.get_best_param().cloned(),
            iterations: state.get_iter(),
            reason: state.get_termination_reason().cloned(),
        }
    }
}

fn finish(model: &ForwardModel, state: LocalState) -> Result<SolverOutcome, FitError> {
    let x = state
        .best
        .ok_or_else(|| FitError::convergence("solver returned no parameters"))?;

    let status = match &state.reason {
        _ if !model.chi2(&x).is_finite() => FitStatus::failed("best point lies outside the model domain"),
        Some(TerminationReason::SolverConverged) | Some(TerminationReason::TargetCostReached) => {
            FitStatus::Converged
        }
        Some(reason) => FitStatus::failed(format!("solver stopped: {reason:?}")),
        None => FitStatus::failed("solver stopped without a termination reason"),
    };
    let message = match &state.reason {
        Some(reason) => format!("{reason:?}"),
        None => "not terminated".to_string(),
    };

    let (covariance, uncertainties) = gauss_newton_covariance(model, &x);
    Ok(SolverOutcome {
        x,
        status,
        iterations: state.iterations,
        covariance,
        uncertainties,
        chain: None,
        acceptance: None,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Parameter;
    use crate::fit::testing::model;

    #[test]
    fn simplex_nudges_each_coordinate() {
        let simplex = initial_simplex(&[10.0, 0.0]);
        assert_eq!(simplex, vec![vec![10.0, 0.0], vec![10.5, 0.0], vec![10.0, 0.00025]]);
    }

    #[test]
    fn nelder_mead_finds_the_minimum() {
        let m = model(10.2, 8.0, &[Parameter::Mbol], &[10.5]);
        let out = run(&m, &[10.5], &LocalMinimizeOptions::default()).unwrap();
        assert!(out.status.is_converged(), "{:?}", out.status);
        assert!((out.x[0] - 10.2).abs() < 1e-4, "{:?}", out.x);
        assert!(out.uncertainties.is_some_and(|s| s[0] > 0.0));
    }

    #[test]
    fn lbfgs_finds_the_minimum() {
        let m = model(10.2, 8.0, &[Parameter::Mbol, Parameter::Logg], &[10.4, 8.1]);
        let opts = LocalMinimizeOptions {
            algorithm: LocalAlgorithm::Lbfgs,
            max_iters: 200,
            tolerance: 1e-6,
        };
        let out = run(&m, &[10.4, 8.1], &opts).unwrap();
        assert!(out.status.is_converged(), "{:?}", out.status);
        assert!((out.x[0] - 10.2).abs() < 1e-3, "{:?}", out.x);
        assert!((out.x[1] - 8.0).abs() < 1e-3, "{:?}", out.x);
    }

    #[test]
    fn lbfgs_steep_first_step_stays_finite() {
        // Errors of 0.05 make the first gradient step overshoot the grid by far.
        let m = model(9.962, 7.5, &[Parameter::Mbol], &[10.0]);
        let opts = LocalMinimizeOptions {
            algorithm: LocalAlgorithm::Lbfgs,
            ..LocalMinimizeOptions::default()
        };
        let out = run(&m, &[10.0], &opts).unwrap();
        assert!(out.status.is_converged(), "{:?}", out.status);
        assert!((out.x[0] - 9.962).abs() < 1e-3, "{:?}", out.x);
    }

    #[test]
    fn walls_extend_chi2_past_the_grid() {
        let m = model(10.2, 8.0, &[Parameter::Mbol], &[10.5]);
        let (lo, hi) = m.parameter_bounds()[0];
        let walled = Chi2Problem {
            model: &m,
            walls: Some(vec![(lo, hi)]),
        };
        let bare = Chi2Problem { model: &m, walls: None };

        assert_eq!(walled.objective(&[10.5]), bare.objective(&[10.5]));
        assert_eq!(bare.objective(&[hi + 5.0]), f64::INFINITY);
        let edge = walled.objective(&[hi]);
        let past = walled.objective(&[hi + 5.0]);
        assert!(past.is_finite() && past > edge);

        let grad = walled.gradient(&vec![lo - 30.0]).unwrap();
        assert!(grad[0] < 0.0, "{grad:?}");
    }

    #[test]
    fn guess_outside_the_grid_is_a_domain_error() {
        let m = model(10.2, 8.0, &[Parameter::Mbol], &[30.0]);
        let err = run(&m, &[30.0], &LocalMinimizeOptions::default()).unwrap_err();
        assert!(matches!(err, FitError::Domain { .. }));
    }
}
