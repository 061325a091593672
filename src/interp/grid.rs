//! Grid-spline surface on a (semi-)regular grid.
//!
//! Samples are grouped into rows of equal `x`. Each row carries a natural cubic
//! spline along `y`; a query evaluates every row at `y` and splines the row
//! values across `x`. The surface never extrapolates: queries outside
//! [`GridDomain`] fail with [`FitError::Domain`].

use serde::{Deserialize, Serialize};

use crate::error::FitError;
use crate::interp::{CubicSpline, Sample};

/// Inclusive rectangle a grid surface is defined on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridDomain {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl GridDomain {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }
}

#[derive(Debug, Clone)]
pub struct GridSpline {
    row_x: Vec<f64>,
    rows: Vec<CubicSpline>,
    domain: GridDomain,
}

impl GridSpline {
    /// Build from cleaned samples (sorted by `(x, y)`, no duplicates).
    ///
    /// Rows left with fewer than two samples are skipped.
    pub fn new(samples: &[Sample]) -> Result<Self, FitError> {
        let mut row_x = Vec::new();
        let mut rows = Vec::new();

        for chunk in samples.chunk_by(|a, b| a.x == b.x) {
            if chunk.len() < 2 {
                log::debug!("grid row x={} has {} sample(s); skipped", chunk[0].x, chunk.len());
                continue;
            }
            let ys = chunk.iter().map(|s| s.y).collect();
            let zs = chunk.iter().map(|s| s.z).collect();
            row_x.push(chunk[0].x);
            rows.push(CubicSpline::new(ys, zs)?);
        }

        if rows.len() < 2 {
            return Err(FitError::configuration(format!(
                "grid spline needs at least 2 rows with 2+ samples (found {})",
                rows.len()
            )));
        }

        let y_min = rows.iter().map(CubicSpline::x_min).fold(f64::NEG_INFINITY, f64::max);
        let y_max = rows.iter().map(CubicSpline::x_max).fold(f64::INFINITY, f64::min);
        if y_min > y_max {
            return Err(FitError::configuration(
                "grid rows share no common y range; use the RBF method for scattered samples",
            ));
        }

        let domain = GridDomain {
            x_min: row_x[0],
            x_max: row_x[row_x.len() - 1],
            y_min,
            y_max,
        };

        Ok(Self {
            row_x,
            rows,
            domain,
        })
    }

    pub fn domain(&self) -> GridDomain {
        self.domain
    }

    pub fn eval(&self, x: f64, y: f64) -> Result<f64, FitError> {
        if !self.domain.contains(x, y) {
            return Err(FitError::domain(format!(
                "({x}, {y}) outside grid [{}, {}] x [{}, {}]",
                self.domain.x_min, self.domain.x_max, self.domain.y_min, self.domain.y_max
            )));
        }

        let column: Vec<f64> = self.rows.iter().map(|row| row.evaluate(y)).collect();
        let across = CubicSpline::new(self.row_x.clone(), column)?;
        Ok(across.evaluate(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::clean_samples;
    use approx::assert_abs_diff_eq;

    fn plane_grid() -> GridSpline {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        let mut zs = Vec::new();
        for i in 0..6 {
            for j in 0..9 {
                let x = 7.0 + 0.5 * i as f64;
                let y = 2.0 * j as f64;
                xs.push(x);
                ys.push(y);
                zs.push(1.0 + 0.3 * x - 0.8 * y);
            }
        }
        GridSpline::new(&clean_samples(&xs, &ys, &zs).unwrap()).unwrap()
    }

    #[test]
    fn reproduces_plane() {
        let g = plane_grid();
        assert_abs_diff_eq!(g.eval(7.3, 5.5).unwrap(), 1.0 + 0.3 * 7.3 - 0.8 * 5.5, epsilon = 1e-10);
    }

    #[test]
    fn edges_are_inclusive_and_outside_is_domain_error() {
        let g = plane_grid();
        let d = g.domain();
        assert!(g.eval(d.x_min, d.y_min).is_ok());
        assert!(g.eval(d.x_max, d.y_max).is_ok());
        assert!(g.eval(d.x_min + 1e-12, d.y_max - 1e-12).is_ok());
        assert!(matches!(g.eval(d.x_min - 1e-9, 4.0), Err(FitError::Domain { .. })));
        assert!(matches!(g.eval(8.0, d.y_max + 1e-9), Err(FitError::Domain { .. })));
        assert!(matches!(g.eval(f64::NAN, 4.0), Err(FitError::Domain { .. })));
    }

    #[test]
    fn ragged_rows_shrink_y_domain() {
        let xs = [0.0, 0.0, 0.0, 1.0, 1.0];
        let ys = [0.0, 1.0, 2.0, 0.5, 3.0];
        let zs = [0.0; 5];
        let g = GridSpline::new(&clean_samples(&xs, &ys, &zs).unwrap()).unwrap();
        assert_eq!(g.domain().y_min, 0.5);
        assert_eq!(g.domain().y_max, 2.0);
    }

    #[test]
    fn single_row_is_rejected() {
        let samples = clean_samples(&[1.0, 1.0], &[0.0, 1.0], &[0.0, 1.0]).unwrap();
        assert!(matches!(GridSpline::new(&samples), Err(FitError::Configuration { .. })));
    }
}
