//! Thin-plate radial basis function surface.
//!
//! ```text
//! s(p) = Σ w_i φ(|p - p_i|) + c0 + c1 x + c2 y,     φ(r) = r² ln r
//! ```
//!
//! Coordinates are rescaled to the unit box before solving so that axes with
//! very different ranges (logg vs Teff) weigh equally. The interpolant passes
//! through every sample and extends smoothly (asymptotically linearly) beyond
//! the sample hull.

use nalgebra::{DMatrix, DVector};

use crate::error::FitError;
use crate::interp::Sample;
use crate::math::solve_least_squares;

#[derive(Debug, Clone)]
pub struct RbfSurface {
    centers: Vec<(f64, f64)>,
    weights: Vec<f64>,
    /// Linear tail `[c0, c1, c2]`.
    poly: [f64; 3],
    offset: (f64, f64),
    scale: (f64, f64),
    bounds: (f64, f64, f64, f64),
}

fn thin_plate(r: f64) -> f64 {
    if r <= 0.0 { 0.0 } else { r * r * r.ln() }
}

impl RbfSurface {
    pub fn new(samples: &[Sample]) -> Result<Self, FitError> {
        let n = samples.len();
        if n < 3 {
            return Err(FitError::configuration(format!(
                "RBF surface needs at least 3 samples (found {n})"
            )));
        }

        let (x_min, x_max) = min_max(samples.iter().map(|s| s.x));
        let (y_min, y_max) = min_max(samples.iter().map(|s| s.y));
        let scale = (span(x_min, x_max), span(y_min, y_max));
        let offset = (x_min, y_min);

        let centers: Vec<(f64, f64)> = samples
            .iter()
            .map(|s| ((s.x - offset.0) / scale.0, (s.y - offset.1) / scale.1))
            .collect();

        if collinear(&centers) {
            return Err(FitError::configuration(
                "RBF samples are collinear; the linear tail is undetermined",
            ));
        }

        let m = n + 3;
        let mut a = DMatrix::<f64>::zeros(m, m);
        let mut b = DVector::<f64>::zeros(m);
        for (i, &(xi, yi)) in centers.iter().enumerate() {
            for (j, &(xj, yj)) in centers.iter().enumerate().skip(i + 1) {
                let phi = thin_plate((xi - xj).hypot(yi - yj));
                a[(i, j)] = phi;
                a[(j, i)] = phi;
            }
            a[(i, n)] = 1.0;
            a[(i, n + 1)] = xi;
            a[(i, n + 2)] = yi;
            a[(n, i)] = 1.0;
            a[(n + 1, i)] = xi;
            a[(n + 2, i)] = yi;
            b[i] = samples[i].z;
        }

        let solution = a
            .clone()
            .lu()
            .solve(&b)
            .filter(|s| s.iter().all(|v| v.is_finite()))
            .or_else(|| {
                log::debug!("RBF system is singular under LU; falling back to SVD");
                solve_least_squares(&a, &b)
            })
            .ok_or_else(|| FitError::configuration("RBF system could not be solved"))?;

        Ok(Self {
            centers,
            weights: solution.rows(0, n).iter().copied().collect(),
            poly: [solution[n], solution[n + 1], solution[n + 2]],
            offset,
            scale,
            bounds: (x_min, x_max, y_min, y_max),
        })
    }

    /// Bounding box of the source samples (not a validity limit).
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.bounds
    }

    pub fn eval(&self, x: f64, y: f64) -> Result<f64, FitError> {
        if !(x.is_finite() && y.is_finite()) {
            return Err(FitError::domain(format!("non-finite RBF query ({x}, {y})")));
        }
        let u = (x - self.offset.0) / self.scale.0;
        let v = (y - self.offset.1) / self.scale.1;

        let radial: f64 = self
            .centers
            .iter()
            .zip(&self.weights)
            .map(|(&(cx, cy), w)| w * thin_plate((u - cx).hypot(v - cy)))
            .sum();
        let value = radial + self.poly[0] + self.poly[1] * u + self.poly[2] * v;

        if value.is_finite() {
            Ok(value)
        } else {
            Err(FitError::domain(format!("RBF overflow at ({x}, {y})")))
        }
    }
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

fn span(lo: f64, hi: f64) -> f64 {
    if hi > lo { hi - lo } else { 1.0 }
}

fn collinear(points: &[(f64, f64)]) -> bool {
    let (x0, y0) = points[0];
    let Some(&(x1, y1)) = points
        .iter()
        .find(|&&(x, y)| (x - x0).abs() > 1e-12 || (y - y0).abs() > 1e-12)
    else {
        return true;
    };
    points.iter().all(|&(x, y)| {
        let cross = (x1 - x0) * (y - y0) - (y1 - y0) * (x - x0);
        cross.abs() < 1e-12
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::clean_samples;
    use approx::assert_abs_diff_eq;

    fn scattered() -> Vec<Sample> {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        let mut zs = Vec::new();
        for i in 0..7 {
            for j in 0..7 {
                // Jitter rows so the samples are not a regular grid.
                let x = 7.0 + 0.4 * i as f64 + 0.03 * (j % 3) as f64;
                let y = 1000.0 * j as f64 + 37.0 * (i % 2) as f64;
                xs.push(x);
                ys.push(y);
                zs.push((x - 8.0).powi(2) + y / 2000.0);
            }
        }
        clean_samples(&xs, &ys, &zs).unwrap()
    }

    #[test]
    fn interpolates_samples() {
        let samples = scattered();
        let rbf = RbfSurface::new(&samples).unwrap();
        for s in samples.iter().step_by(5) {
            assert_abs_diff_eq!(rbf.eval(s.x, s.y).unwrap(), s.z, epsilon = 1e-6);
        }
    }

    #[test]
    fn reproduces_planes_and_extrapolates_finitely() {
        let samples: Vec<Sample> = scattered()
            .into_iter()
            .map(|s| Sample { z: 2.0 + s.x - s.y / 1000.0, ..s })
            .collect();
        let rbf = RbfSurface::new(&samples).unwrap();
        assert_abs_diff_eq!(rbf.eval(8.1, 2500.0).unwrap(), 2.0 + 8.1 - 2.5, epsilon = 1e-6);
        let far = rbf.eval(20.0, -50_000.0).unwrap();
        assert!(far.is_finite());
    }

    #[test]
    fn collinear_samples_are_rejected() {
        let samples = clean_samples(&[0.0, 1.0, 2.0], &[0.0, 1.0, 2.0], &[1.0, 2.0, 3.0]).unwrap();
        assert!(matches!(RbfSurface::new(&samples), Err(FitError::Configuration { .. })));
    }

    #[test]
    fn nan_query_is_domain_error() {
        let rbf = RbfSurface::new(&scattered()).unwrap();
        assert!(matches!(rbf.eval(f64::NAN, 1.0), Err(FitError::Domain { .. })));
    }
}
