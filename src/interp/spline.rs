//! Natural cubic spline in one dimension.
//!
//! Used along each row of a grid surface and again across rows.

use crate::error::FitError;

/// A natural cubic spline through strictly increasing knots.
///
/// With two knots the second derivatives vanish and the spline is linear.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// Second derivatives at each knot.
    y2s: Vec<f64>,
}

impl CubicSpline {
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> Result<Self, FitError> {
        if xs.len() != ys.len() {
            return Err(FitError::configuration("spline knots and values differ in length"));
        }
        if xs.len() < 2 {
            return Err(FitError::configuration("a spline needs at least 2 knots"));
        }
        if let Some(i) = (1..xs.len()).find(|&i| xs[i] <= xs[i - 1]) {
            return Err(FitError::configuration(format!(
                "spline knots must be strictly increasing (index {i})"
            )));
        }

        let n = xs.len();
        let mut y2s = vec![0.0; n];
        let mut u = vec![0.0; n - 1];

        // Tridiagonal forward sweep; natural boundary keeps y2[0] = y2[n-1] = 0.
        for i in 1..n - 1 {
            let sig = (xs[i] - xs[i - 1]) / (xs[i + 1] - xs[i - 1]);
            let p = sig * y2s[i - 1] + 2.0;
            y2s[i] = (sig - 1.0) / p;
            let slope = (ys[i + 1] - ys[i]) / (xs[i + 1] - xs[i])
                - (ys[i] - ys[i - 1]) / (xs[i] - xs[i - 1]);
            u[i] = (6.0 * slope / (xs[i + 1] - xs[i - 1]) - sig * u[i - 1]) / p;
        }

        for k in (0..n - 2).rev() {
            y2s[k + 1] = y2s[k + 1] * y2s[k + 2] + u[k + 1];
        }

        Ok(Self { xs, ys, y2s })
    }

    pub fn x_min(&self) -> f64 {
        self.xs[0]
    }

    pub fn x_max(&self) -> f64 {
        self.xs[self.xs.len() - 1]
    }

    pub fn contains(&self, x: f64) -> bool {
        x >= self.x_min() && x <= self.x_max()
    }

    /// Evaluate at `x`. Outside the knot range the boundary cubic is extended;
    /// callers that must not extrapolate check [`CubicSpline::contains`] first.
    pub fn evaluate(&self, x: f64) -> f64 {
        let n = self.xs.len();

        let mut lo = 0;
        let mut hi = n - 1;
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if self.xs[mid] > x {
                hi = mid;
            } else {
                lo = mid;
            }
        }

        let h = self.xs[hi] - self.xs[lo];
        let a = (self.xs[hi] - x) / h;
        let b = (x - self.xs[lo]) / h;

        a * self.ys[lo]
            + b * self.ys[hi]
            + ((a * a * a - a) * self.y2s[lo] + (b * b * b - b) * self.y2s[hi]) * h * h / 6.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn passes_through_knots() {
        let xs = vec![0.0, 1.0, 2.5, 4.0];
        let ys = vec![1.0, -1.0, 0.5, 2.0];
        let s = CubicSpline::new(xs.clone(), ys.clone()).unwrap();
        for (x, y) in xs.iter().zip(&ys) {
            assert_abs_diff_eq!(s.evaluate(*x), *y, epsilon = 1e-12);
        }
    }

    #[test]
    fn reproduces_lines_exactly() {
        let xs: Vec<f64> = (0..6).map(|i| i as f64 * 0.7).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 3.0 - 2.0 * x).collect();
        let s = CubicSpline::new(xs, ys).unwrap();
        assert_abs_diff_eq!(s.evaluate(1.234), 3.0 - 2.0 * 1.234, epsilon = 1e-12);
    }

    #[test]
    fn two_knots_is_linear() {
        let s = CubicSpline::new(vec![0.0, 2.0], vec![1.0, 5.0]).unwrap();
        assert_abs_diff_eq!(s.evaluate(0.5), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn rejects_unsorted_knots() {
        assert!(CubicSpline::new(vec![0.0, 0.0, 1.0], vec![1.0, 2.0, 3.0]).is_err());
        assert!(CubicSpline::new(vec![1.0], vec![1.0]).is_err());
    }
}
