//! Affine-invariant ensemble sampler (Goodman & Weare 2010 stretch move).
//!
//! The ensemble is split into two halves; each half is updated against the
//! other, so the walkers of one half can be evaluated in parallel.
//!
//! Reproducibility: every random number is drawn sequentially from one seeded
//! `StdRng` before the parallel evaluation, so a seed yields the same chain
//! whatever the thread count or the `parallel` flag.
//!
//! Walkers that step outside the model domain or the prior bounds see a
//! log-likelihood of `-∞` and are simply never accepted there.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;

use crate::domain::{EnsembleOptions, FitStatus};
use crate::error::FitError;
use crate::fit::SolverOutcome;
use crate::fit::summary::summarize_chain;
use crate::models::ForwardModel;

/// Attempts per walker to find a finite starting log-likelihood.
const MAX_INIT_ROUNDS: usize = 100;

/// Acceptance fraction below which the sampler is considered stuck.
pub const MIN_ACCEPTANCE: f64 = 1e-3;

/// Full sampler output before summarising.
#[derive(Debug, Clone)]
pub struct Chain {
    pub ndim: usize,
    pub nwalkers: usize,
    /// `steps[s][w]` is walker `w` after step `s`.
    pub steps: Vec<Vec<Vec<f64>>>,
    pub log_prob: Vec<Vec<f64>>,
    pub accepted: usize,
}

impl Chain {
    pub fn acceptance_fraction(&self) -> f64 {
        let total = self.steps.len() * self.nwalkers;
        if total == 0 {
            0.0
        } else {
            self.accepted as f64 / total as f64
        }
    }

    /// Samples after discarding the first `nburn` steps.
    pub fn flat_samples(&self, nburn: usize) -> Vec<Vec<f64>> {
        self.steps.iter().skip(nburn).flatten().cloned().collect()
    }
}

struct Sampler<'a> {
    model: &'a ForwardModel,
    opts: &'a EnsembleOptions,
}

impl Sampler<'_> {
    fn log_prob(&self, x: &[f64]) -> f64 {
        self.model.log_likelihood(x, self.opts.prior_bounds.as_deref())
    }

    fn evaluate(&self, points: &[Vec<f64>]) -> Vec<f64> {
        if self.opts.parallel {
            points.par_iter().map(|p| self.log_prob(p)).collect()
        } else {
            points.iter().map(|p| self.log_prob(p)).collect()
        }
    }

    /// Gaussian ball around `x0` whose members all have finite log-likelihood.
    fn initial_walkers(&self, x0: &[f64], rng: &mut StdRng) -> Result<(Vec<Vec<f64>>, Vec<f64>), FitError> {
        let n = self.opts.nwalkers;
        let mut walkers = vec![Vec::new(); n];
        let mut log_prob = vec![f64::NEG_INFINITY; n];

        for _ in 0..MAX_INIT_ROUNDS {
            let pending: Vec<usize> = (0..n).filter(|&w| !log_prob[w].is_finite()).collect();
            if pending.is_empty() {
                return Ok((walkers, log_prob));
            }
            let proposals: Vec<Vec<f64>> = pending
                .iter()
                .map(|_| {
                    x0.iter()
                        .map(|&v| {
                            let z: f64 = StandardNormal.sample(rng);
                            v + z * self.opts.init_scatter * v.abs().max(1.0)
                        })
                        .collect()
                })
                .collect();
            let values = self.evaluate(&proposals);
            for ((w, p), lp) in pending.into_iter().zip(proposals).zip(values) {
                walkers[w] = p;
                log_prob[w] = lp;
            }
        }

        Err(FitError::convergence(format!(
            "could not place {} walker(s) at finite likelihood around {x0:?}",
            log_prob.iter().filter(|lp| !lp.is_finite()).count()
        )))
    }

    fn run(&self, x0: &[f64]) -> Result<Chain, FitError> {
        let ndim = x0.len();
        let n = self.opts.nwalkers;
        let half = n / 2;
        let a = self.opts.stretch;
        let mut rng = StdRng::seed_from_u64(self.opts.seed);

        let (mut walkers, mut log_prob) = self.initial_walkers(x0, &mut rng)?;
        let mut steps = Vec::with_capacity(self.opts.nsteps);
        let mut lp_steps = Vec::with_capacity(self.opts.nsteps);
        let mut accepted = 0usize;

        for _ in 0..self.opts.nsteps {
            for (active, other) in [(0..half, half..n), (half..n, 0..half)] {
                let mut proposals = Vec::with_capacity(half);
                let mut log_z = Vec::with_capacity(half);
                let mut log_u = Vec::with_capacity(half);

                for k in active.clone() {
                    let j = rng.gen_range(other.clone());
                    let u: f64 = rng.r#gen();
                    let z = ((a - 1.0) * u + 1.0).powi(2) / a;
                    let y: Vec<f64> = walkers[j]
                        .iter()
                        .zip(&walkers[k])
                        .map(|(xj, xk)| xj + z * (xk - xj))
                        .collect();
                    proposals.push(y);
                    log_z.push(z.ln());
                    log_u.push(rng.r#gen::<f64>().ln());
                }

                let values = self.evaluate(&proposals);
                for (i, k) in active.enumerate() {
                    let q = (ndim as f64 - 1.0) * log_z[i] + values[i] - log_prob[k];
                    if values[i].is_finite() && log_u[i] < q {
                        walkers[k] = std::mem::take(&mut proposals[i]);
                        log_prob[k] = values[i];
                        accepted += 1;
                    }
                }
            }
            steps.push(walkers.clone());
            lp_steps.push(log_prob.clone());
        }

        Ok(Chain {
            ndim,
            nwalkers: n,
            steps,
            log_prob: lp_steps,
            accepted,
        })
    }
}

/// Run the sampler from `x0` and return the raw chain.
pub fn sample(model: &ForwardModel, x0: &[f64], opts: &EnsembleOptions) -> Result<Chain, FitError> {
    if x0.iter().any(|v| !v.is_finite()) {
        return Err(FitError::convergence("initial guess is not finite"));
    }
    Sampler { model, opts }.run(x0)
}

pub fn run(model: &ForwardModel, x0: &[f64], opts: &EnsembleOptions) -> Result<SolverOutcome, FitError> {
    let chain = sample(model, x0, opts)?;
    let acceptance = chain.acceptance_fraction();
    log::debug!(
        "ensemble: {} walkers x {} steps, acceptance {:.3}",
        chain.nwalkers,
        chain.steps.len(),
        acceptance
    );

    let samples = chain.flat_samples(opts.nburn);
    let summary = summarize_chain(&samples, chain.ndim, opts.refine_bounds)?;

    let status = if acceptance < MIN_ACCEPTANCE {
        FitStatus::failed(format!("acceptance fraction {acceptance:.2e} is below {MIN_ACCEPTANCE:.0e}"))
    } else {
        FitStatus::Converged
    };

    Ok(SolverOutcome {
        x: summary.median,
        status,
        iterations: opts.nsteps as u64,
        covariance: Some(summary.covariance),
        uncertainties: Some(summary.uncertainties),
        message: format!(
            "{} retained sample(s), acceptance {acceptance:.3}",
            summary.retained.len()
        ),
        chain: Some(summary.retained),
        acceptance: Some(acceptance),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Parameter;
    use crate::fit::testing::model;

    fn opts(seed: u64, parallel: bool) -> EnsembleOptions {
        EnsembleOptions {
            nwalkers: 10,
            nsteps: 120,
            nburn: 60,
            init_scatter: 1e-2,
            seed,
            parallel,
            ..EnsembleOptions::default()
        }
    }

    #[test]
    fn seed_fixes_the_chain_regardless_of_threads() {
        let m = model(10.0, 8.0, &[Parameter::Mbol], &[10.0]);
        let serial = sample(&m, &[10.0], &opts(3, false)).unwrap();
        let parallel = sample(&m, &[10.0], &opts(3, true)).unwrap();
        assert_eq!(serial.steps, parallel.steps);
        assert_eq!(serial.accepted, parallel.accepted);

        let other = sample(&m, &[10.0], &opts(4, false)).unwrap();
        assert_ne!(serial.steps, other.steps);
    }

    #[test]
    fn run_keeps_post_burn_samples() {
        let m = model(10.0, 8.0, &[Parameter::Mbol], &[10.0]);
        let out = run(&m, &[10.0], &opts(1, true)).unwrap();
        assert!(out.status.is_converged(), "{:?}", out.status);
        assert_eq!(out.chain.as_ref().map(Vec::len), Some(10 * 60));
        let acceptance = out.acceptance.unwrap();
        assert!(acceptance > MIN_ACCEPTANCE && acceptance < 1.0);
        assert!((out.x[0] - 10.0).abs() < 0.05, "{:?}", out.x);
    }

    #[test]
    fn prior_bounds_confine_every_sample() {
        let m = model(10.0, 8.0, &[Parameter::Mbol], &[10.0]);
        let bounded = EnsembleOptions {
            prior_bounds: Some(vec![(9.99, 10.2)]),
            ..opts(5, true)
        };
        let chain = sample(&m, &[10.0], &bounded).unwrap();
        assert!(chain.flat_samples(0).iter().all(|s| (9.99..=10.2).contains(&s[0])));
    }

    #[test]
    fn unplaceable_walkers_are_an_error() {
        let m = model(10.0, 8.0, &[Parameter::Mbol], &[40.0]);
        let err = sample(&m, &[40.0], &opts(0, false)).unwrap_err();
        assert!(matches!(err, FitError::Convergence { .. }));
    }
}
