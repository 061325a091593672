//! Reduce a sample chain to a best-fit point.
//!
//! - optional percentile trim (`refine_bounds`): a sample is kept only if every
//!   coordinate lies within the `[lo, hi]` percentiles of that coordinate
//! - best fit = per-coordinate median
//! - uncertainty = half the 16th–84th percentile width
//! - covariance = sample covariance of the retained samples

use crate::error::FitError;
use crate::math::{median_mut, percentile_sorted};

#[derive(Debug, Clone, PartialEq)]
pub struct ChainSummary {
    pub median: Vec<f64>,
    pub uncertainties: Vec<f64>,
    pub covariance: Vec<Vec<f64>>,
    pub retained: Vec<Vec<f64>>,
}

fn sorted_column(samples: &[Vec<f64>], d: usize) -> Vec<f64> {
    let mut col: Vec<f64> = samples.iter().map(|s| s[d]).collect();
    col.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    col
}

pub fn summarize_chain(
    samples: &[Vec<f64>],
    ndim: usize,
    refine_bounds: Option<(f64, f64)>,
) -> Result<ChainSummary, FitError> {
    if samples.is_empty() {
        return Err(FitError::convergence("no samples retained after burn-in"));
    }
    if samples.iter().any(|s| s.len() != ndim) {
        return Err(FitError::invalid_parameter("chain samples have inconsistent dimension"));
    }

    let retained: Vec<Vec<f64>> = match refine_bounds {
        None => samples.to_vec(),
        Some((lo, hi)) => {
            let limits = (0..ndim)
                .map(|d| {
                    let col = sorted_column(samples, d);
                    let lo = percentile_sorted(&col, lo);
                    let hi = percentile_sorted(&col, hi);
                    lo.zip(hi).ok_or_else(|| FitError::configuration("invalid refine bounds"))
                })
                .collect::<Result<Vec<_>, FitError>>()?;
            samples
                .iter()
                .filter(|s| s.iter().zip(&limits).all(|(v, (lo, hi))| v >= lo && v <= hi))
                .cloned()
                .collect()
        }
    };
    if retained.is_empty() {
        return Err(FitError::convergence("refine bounds rejected every sample"));
    }

    let mut median = Vec::with_capacity(ndim);
    let mut uncertainties = Vec::with_capacity(ndim);
    for d in 0..ndim {
        let mut col = sorted_column(&retained, d);
        let p16 = percentile_sorted(&col, 16.0).unwrap_or(f64::NAN);
        let p84 = percentile_sorted(&col, 84.0).unwrap_or(f64::NAN);
        uncertainties.push(0.5 * (p84 - p16));
        median.push(median_mut(&mut col).unwrap_or(f64::NAN));
    }

    let n = retained.len() as f64;
    let mean: Vec<f64> = (0..ndim)
        .map(|d| retained.iter().map(|s| s[d]).sum::<f64>() / n)
        .collect();
    let denom = (n - 1.0).max(1.0);
    let covariance = (0..ndim)
        .map(|i| {
            (0..ndim)
                .map(|j| {
                    retained
                        .iter()
                        .map(|s| (s[i] - mean[i]) * (s[j] - mean[j]))
                        .sum::<f64>()
                        / denom
                })
                .collect()
        })
        .collect();

    Ok(ChainSummary {
        median,
        uncertainties,
        covariance,
        retained,
    })
}
