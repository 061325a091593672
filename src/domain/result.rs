//! Fit outputs.
//!
//! One [`FitResult`] per atmosphere family, collected in [`FitResults`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::Family;
use crate::interp::Interpolator;

/// Outcome of one family's fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FitStatus {
    Converged,
    Failed { reason: String },
}

impl FitStatus {
    pub fn failed(reason: impl Into<String>) -> Self {
        FitStatus::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, FitStatus::Converged)
    }
}

/// Per-family lifecycle: `Configured -> Evaluating -> Converged | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitPhase {
    Configured,
    Evaluating,
    Converged,
    Failed,
}

impl FitPhase {
    /// Whether moving to `next` is a legal transition.
    pub fn can_advance_to(self, next: FitPhase) -> bool {
        matches!(
            (self, next),
            (FitPhase::Configured, FitPhase::Evaluating)
                | (FitPhase::Configured, FitPhase::Failed)
                | (FitPhase::Evaluating, FitPhase::Converged)
                | (FitPhase::Evaluating, FitPhase::Failed)
        )
    }
}

/// Physical parameters recovered at the best-fit point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedParams {
    pub mbol: f64,
    pub teff: f64,
    pub logg: f64,
    /// Distance in pc (the fixed value when distance was not fitted).
    pub distance: f64,
    /// Extra tabulated quantities (e.g. mass, age) interpolated at the best fit.
    pub quantities: BTreeMap<String, f64>,
}

/// Predicted and observed magnitude for one filter at the best fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedMag {
    pub filter: String,
    pub predicted: f64,
    pub observed: Option<f64>,
    /// Photometric error as supplied.
    pub err: Option<f64>,
    /// σ the objective weighs this filter with: `err` combined in quadrature
    /// with the magnitude error of a fixed distance.
    #[serde(default)]
    pub sigma: Option<f64>,
}

impl PredictedMag {
    /// `(predicted - observed) / σ`, the objective's residual, when the filter was observed.
    pub fn pull(&self) -> Option<f64> {
        match (self.observed, self.sigma) {
            (Some(obs), Some(sigma)) if sigma > 0.0 => Some((self.predicted - obs) / sigma),
            _ => None,
        }
    }
}

/// Best-fit output for one atmosphere family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    pub family: Family,
    pub status: FitStatus,
    /// Best-fit parameter vector, in layout order (free distance last).
    pub x: Vec<f64>,
    pub labels: Vec<String>,
    pub chi2: f64,
    pub reduced_chi2: Option<f64>,
    pub dof: i64,
    pub covariance: Option<Vec<Vec<f64>>>,
    pub uncertainties: Option<Vec<f64>>,
    /// Retained post-burn-in samples (ensemble sampling only).
    pub chain: Option<Vec<Vec<f64>>>,
    pub derived: Option<DerivedParams>,
    pub predicted: Vec<PredictedMag>,
    pub iterations: u64,
    pub evaluations: u64,
    pub message: String,
    /// Interpolators the fit used, so callers can evaluate the same surfaces.
    #[serde(skip)]
    pub interpolators: Vec<Arc<Interpolator>>,
}

impl FitResult {
    /// A failed result carrying no best-fit information.
    pub fn failed(family: Family, labels: Vec<String>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            family,
            status: FitStatus::failed(reason.clone()),
            x: Vec::new(),
            labels,
            chi2: f64::INFINITY,
            reduced_chi2: None,
            dof: 0,
            covariance: None,
            uncertainties: None,
            chain: None,
            derived: None,
            predicted: Vec::new(),
            iterations: 0,
            evaluations: 0,
            message: reason,
            interpolators: Vec::new(),
        }
    }

    pub fn is_converged(&self) -> bool {
        self.status.is_converged()
    }

    /// Best-fit value for a labelled parameter.
    pub fn param(&self, label: &str) -> Option<f64> {
        self.labels
            .iter()
            .position(|l| l == label)
            .and_then(|i| self.x.get(i).copied())
    }
}

/// Results of one `fit` call, keyed by family.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FitResults {
    pub results: BTreeMap<Family, FitResult>,
}

impl FitResults {
    pub fn insert(&mut self, result: FitResult) {
        self.results.insert(result.family, result);
    }

    pub fn get(&self, family: Family) -> Option<&FitResult> {
        self.results.get(&family)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FitResult> {
        self.results.values()
    }

    pub fn converged(&self) -> impl Iterator<Item = &FitResult> {
        self.iter().filter(|r| r.is_converged())
    }

    pub fn failed(&self) -> impl Iterator<Item = &FitResult> {
        self.iter().filter(|r| !r.is_converged())
    }

    /// Converged family with the lowest chi-square. Ties go to the first family.
    pub fn best(&self) -> Option<&FitResult> {
        self.converged().fold(None, |best: Option<&FitResult>, r| match best {
            Some(b) if b.chi2 <= r.chi2 => Some(b),
            _ => Some(r),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converged(family: Family, chi2: f64) -> FitResult {
        let mut r = FitResult::failed(family, vec!["Mbol".into()], "");
        r.status = FitStatus::Converged;
        r.x = vec![10.0];
        r.chi2 = chi2;
        r
    }

    #[test]
    fn best_picks_lowest_chi2_among_converged() {
        let mut results = FitResults::default();
        results.insert(converged(Family::H, 4.0));
        results.insert(converged(Family::He, 2.0));
        assert_eq!(results.best().map(|r| r.family), Some(Family::He));
    }

    #[test]
    fn failed_results_are_never_best() {
        let mut results = FitResults::default();
        results.insert(FitResult::failed(Family::H, vec![], "boom"));
        results.insert(converged(Family::He, 100.0));
        assert_eq!(results.best().map(|r| r.family), Some(Family::He));
        assert_eq!(results.failed().count(), 1);
    }

    #[test]
    fn phase_transitions_are_one_way() {
        assert!(FitPhase::Configured.can_advance_to(FitPhase::Evaluating));
        assert!(FitPhase::Evaluating.can_advance_to(FitPhase::Converged));
        assert!(!FitPhase::Converged.can_advance_to(FitPhase::Evaluating));
        assert!(!FitPhase::Failed.can_advance_to(FitPhase::Converged));
    }

    #[test]
    fn param_looks_up_by_label() {
        let r = converged(Family::H, 1.0);
        assert_eq!(r.param("Mbol"), Some(10.0));
        assert_eq!(r.param("logg"), None);
    }
}
