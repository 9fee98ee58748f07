//! Least-squares polynomial fitting
//!
//! Fits are computed in a normalized domain: the x range of the data is
//! mapped onto [-1, 1] before building the Vandermonde system, which keeps
//! quintic fits over pixel coordinates well conditioned.

use crate::error::{Error, Result};
use nalgebra::{DMatrix, DVector};

/// Polynomial `p(x) = sum c_k * u^k` with `u = (x - offset) * scale`.
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    coeffs: Vec<f64>,
    offset: f64,
    scale: f64,
}

impl Polynomial {
    /// Polynomial in plain `x` with the given ascending coefficients.
    pub fn new(coeffs: Vec<f64>) -> Self {
        Self {
            coeffs,
            offset: 0.0,
            scale: 1.0,
        }
    }

    /// Least-squares fit of `ys = p(xs)` with the given degree.
    ///
    /// The degree is reduced when there are fewer points than
    /// coefficients.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for empty or mismatched input
    /// and [`Error::Singular`] if the system cannot be solved.
    pub fn fit(xs: &[f64], ys: &[f64], degree: usize) -> Result<Self> {
        if xs.is_empty() || xs.len() != ys.len() {
            return Err(Error::InvalidParameter(format!(
                "cannot fit {} x values against {} y values",
                xs.len(),
                ys.len()
            )));
        }
        let degree = degree.min(xs.len() - 1);
        let (lo, hi) = xs
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
                (lo.min(x), hi.max(x))
            });
        let (offset, scale) = if hi > lo {
            ((hi + lo) / 2.0, 2.0 / (hi - lo))
        } else {
            (lo, 1.0)
        };
        // All x equal: only the constant term is identifiable.
        let degree = if hi > lo { degree } else { 0 };

        let n = xs.len();
        let a = DMatrix::from_fn(n, degree + 1, |r, c| ((xs[r] - offset) * scale).powi(c as i32));
        let b = DVector::from_column_slice(ys);
        let svd = a.svd(true, true);
        let sol = svd
            .solve(&b, 1e-12)
            .map_err(|e| Error::Singular(e.to_string()))?;
        if sol.iter().any(|c| !c.is_finite()) {
            return Err(Error::Singular("non-finite coefficients".into()));
        }
        Ok(Self {
            coeffs: sol.iter().copied().collect(),
            offset,
            scale,
        })
    }

    /// Degree of the polynomial.
    pub fn degree(&self) -> usize {
        self.coeffs.len().saturating_sub(1)
    }

    /// Coefficients in the normalized variable `u`.
    pub fn coeffs(&self) -> &[f64] {
        &self.coeffs
    }

    /// Evaluate at `x`.
    pub fn eval(&self, x: f64) -> f64 {
        let u = (x - self.offset) * self.scale;
        self.coeffs.iter().rev().fold(0.0, |acc, c| acc * u + c)
    }

    /// Derivative with respect to `x`.
    pub fn deriv(&self) -> Polynomial {
        let coeffs = if self.coeffs.len() <= 1 {
            vec![0.0]
        } else {
            self.coeffs
                .iter()
                .enumerate()
                .skip(1)
                .map(|(k, c)| k as f64 * c * self.scale)
                .collect()
        };
        Polynomial {
            coeffs,
            offset: self.offset,
            scale: self.scale,
        }
    }

    /// Definite integral over `[a, b]`.
    pub fn integrate(&self, a: f64, b: f64) -> f64 {
        let anti = |x: f64| {
            let u = (x - self.offset) * self.scale;
            let s: f64 = self
                .coeffs
                .iter()
                .enumerate()
                .map(|(k, c)| c * u.powi(k as i32 + 1) / (k as f64 + 1.0))
                .sum();
            s / self.scale
        };
        anti(b) - anti(a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_exact_quadratic() {
        let xs: Vec<f64> = (0..20).map(|i| 100.0 + 13.0 * i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 2.0 + 0.5 * x - 0.001 * x * x).collect();
        let p = Polynomial::fit(&xs, &ys, 2).unwrap();
        for (x, y) in xs.iter().zip(&ys) {
            assert!((p.eval(*x) - y).abs() < 1e-8);
        }
        let d = p.deriv();
        assert!((d.eval(200.0) - (0.5 - 0.4)).abs() < 1e-8);
    }

    #[test]
    fn test_integrate_matches_antiderivative() {
        let p = Polynomial::new(vec![1.0, 2.0, 3.0]);
        // x + x^2 + x^3 from 0 to 2
        assert!((p.integrate(0.0, 2.0) - 14.0).abs() < 1e-12);
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys: Vec<f64> = xs.iter().map(|x| 1.0 + 2.0 * x + 3.0 * x * x).collect();
        let q = Polynomial::fit(&xs, &ys, 2).unwrap();
        assert!((q.integrate(0.0, 2.0) - 14.0).abs() < 1e-9);
    }

    #[test]
    fn test_fit_degenerate_inputs() {
        assert!(Polynomial::fit(&[], &[], 2).is_err());
        assert!(Polynomial::fit(&[1.0, 2.0], &[1.0], 1).is_err());
        let p = Polynomial::fit(&[5.0, 5.0, 5.0], &[1.0, 2.0, 3.0], 5).unwrap();
        assert_eq!(p.degree(), 0);
        assert!((p.eval(5.0) - 2.0).abs() < 1e-12);
        let q = Polynomial::fit(&[0.0, 1.0], &[0.0, 2.0], 5).unwrap();
        assert_eq!(q.degree(), 1);
        assert!((q.eval(0.5) - 1.0).abs() < 1e-12);
    }
}
