//! Sample cleaning shared by every surface kind.

use std::collections::BTreeMap;

use crate::error::FitError;

/// One `(x, y) -> z` source sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Drop non-finite samples and merge duplicate coordinates.
///
/// Duplicates are matched bit-exactly on `(x, y)` (after folding `-0.0` into
/// `0.0`) and replaced by a single sample carrying the mean `z`. The output is
/// sorted by `(x, y)`, so the result does not depend on input order.
pub fn clean_samples(xs: &[f64], ys: &[f64], zs: &[f64]) -> Result<Vec<Sample>, FitError> {
    if xs.len() != ys.len() || xs.len() != zs.len() {
        return Err(FitError::configuration(format!(
            "sample columns differ in length ({}, {}, {})",
            xs.len(),
            ys.len(),
            zs.len()
        )));
    }

    let mut merged: BTreeMap<(u64, u64), (f64, f64, f64, usize)> = BTreeMap::new();
    for ((&x, &y), &z) in xs.iter().zip(ys).zip(zs) {
        if !(x.is_finite() && y.is_finite() && z.is_finite()) {
            continue;
        }
        let (x, y) = (x + 0.0, y + 0.0);
        let entry = merged
            .entry((order_key(x), order_key(y)))
            .or_insert((x, y, 0.0, 0));
        entry.2 += z;
        entry.3 += 1;
    }

    Ok(merged
        .into_values()
        .map(|(x, y, sum, n)| Sample {
            x,
            y,
            z: sum / n as f64,
        })
        .collect())
}

/// Map an `f64` onto a `u64` that sorts in the same order as the float.
fn order_key(v: f64) -> u64 {
    let bits = v.to_bits();
    if bits >> 63 == 1 { !bits } else { bits | (1 << 63) }
}
