//! Cardelli, Clayton & Mathis (1989) extinction law.

use crate::error::FitError;
use crate::reddening::WavelengthExtinction;

/// Analytic CCM89 law, valid for `0.3 <= 1/λ[µm] <= 10`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ccm89;

impl Ccm89 {
    /// `(a(x), b(x))` for inverse wavelength `x` in µm⁻¹.
    pub fn coefficients(x: f64) -> Result<(f64, f64), FitError> {
        if !(0.3..=10.0).contains(&x) {
            return Err(FitError::domain(format!(
                "CCM89 is defined for 0.3 <= 1/lambda <= 10 um^-1 (got {x:.4})"
            )));
        }

        let ab = if x < 1.1 {
            let p = x.powf(1.61);
            (0.574 * p, -0.527 * p)
        } else if x <= 3.3 {
            let y = x - 1.82;
            let a = poly(
                y,
                &[1.0, 0.17699, -0.50447, -0.02427, 0.72085, 0.01979, -0.77530, 0.32999],
            );
            let b = poly(
                y,
                &[0.0, 1.41338, 2.28305, 1.07233, -5.38434, -0.62251, 5.30260, -2.09002],
            );
            (a, b)
        } else if x <= 8.0 {
            let (fa, fb) = if x >= 5.9 {
                let d = x - 5.9;
                (
                    -0.04473 * d * d - 0.009779 * d * d * d,
                    0.2130 * d * d + 0.1207 * d * d * d,
                )
            } else {
                (0.0, 0.0)
            };
            let a = 1.752 - 0.316 * x - 0.104 / ((x - 4.67).powi(2) + 0.341) + fa;
            let b = -3.090 + 1.825 * x + 1.206 / ((x - 4.62).powi(2) + 0.263) + fb;
            (a, b)
        } else {
            let d = x - 8.0;
            (
                poly(d, &[-1.073, -0.628, 0.137, -0.070]),
                poly(d, &[13.670, 4.257, -0.420, 0.374]),
            )
        };
        Ok(ab)
    }
}

/// Horner evaluation of `Σ c_i t^i`.
fn poly(t: f64, coeffs: &[f64]) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * t + c)
}

impl WavelengthExtinction for Ccm89 {
    fn per_ebv(&self, wavelength: f64, rv: f64) -> Result<f64, FitError> {
        if !(wavelength.is_finite() && wavelength > 0.0) {
            return Err(FitError::domain(format!("invalid wavelength {wavelength} A")));
        }
        let (a, b) = Self::coefficients(1.0e4 / wavelength)?;
        Ok(rv * a + b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn v_band_reference_point_gives_rv() {
        let a_v = Ccm89.per_ebv(1.0e4 / 1.82, 3.1).unwrap();
        assert_relative_eq!(a_v, 3.1, epsilon = 1e-12);
    }

    #[test]
    fn uv_extinction_exceeds_optical() {
        let fuv = Ccm89.per_ebv(1535.0, 3.1).unwrap();
        let nuv = Ccm89.per_ebv(2301.0, 3.1).unwrap();
        let g = Ccm89.per_ebv(6218.0, 3.1).unwrap();
        assert!(fuv > g && nuv > g, "fuv {fuv} nuv {nuv} g {g}");
    }

    #[test]
    fn extinction_falls_toward_infrared() {
        let r = Ccm89.per_ebv(7769.0, 3.1).unwrap();
        let j = Ccm89.per_ebv(12500.0, 3.1).unwrap();
        assert!(j < r);
        assert!(j > 0.0);
    }

    #[test]
    fn out_of_range_is_domain_error() {
        assert!(matches!(Ccm89.per_ebv(500.0, 3.1), Err(FitError::Domain { .. })));
        assert!(matches!(Ccm89.per_ebv(50_000.0, 3.1), Err(FitError::Domain { .. })));
    }
}
