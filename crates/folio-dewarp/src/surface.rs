//! Page surface model
//!
//! The page is a generalized cylinder `Z = g(X)` in the page frame. `g` is
//! a degree-13 polynomial in the normalized variable `u = ωX`:
//! `g(X) = h(ωX) / ω`, `h(u) = sum_{m=1..13} a_m u^m`, with the constant
//! term fixed at zero so the surface passes through the page-frame origin.
//! Two-page spreads use a split surface, one polynomial per side of the
//! seam `X = T`, both expressed in `X - T`.

use crate::camera::Camera;
use crate::newton::{SurfacePoint, solve_intersections};
use crate::params::Params;
use nalgebra::{Matrix3, Vector3};
use std::fmt::Debug;

/// Normalization factor of the surface polynomial
pub const OMEGA: f64 = 0.1;

/// Degree of the surface polynomial (number of free coefficients)
pub const DEGREE: usize = 13;

/// `g(X) = h(ωX) / ω` with `h(0) = 0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormPoly {
    coeffs: [f64; DEGREE],
}

impl Default for NormPoly {
    fn default() -> Self {
        Self {
            coeffs: [0.0; DEGREE],
        }
    }
}

impl NormPoly {
    /// Polynomial with coefficients `a_1..a_13`.
    pub fn new(coeffs: [f64; DEGREE]) -> Self {
        Self { coeffs }
    }

    /// Coefficients `a_1..a_13`.
    pub fn coeffs(&self) -> &[f64; DEGREE] {
        &self.coeffs
    }

    /// Evaluate `g(x)`.
    pub fn eval(&self, x: f64) -> f64 {
        let u = OMEGA * x;
        let h = self.coeffs.iter().rev().fold(0.0, |acc, a| (acc + a) * u);
        h / OMEGA
    }

    /// Evaluate `g'(x)`.
    pub fn deriv(&self, x: f64) -> f64 {
        let u = OMEGA * x;
        self.coeffs
            .iter()
            .enumerate()
            .rev()
            .fold(0.0, |acc, (k, a)| acc * u + (k + 1) as f64 * a)
    }

    /// `dg/da_m = ω^(m-1) x^m` for `m = 1..13`.
    pub fn coeff_gradient(&self, x: f64) -> [f64; DEGREE] {
        let mut out = [0.0; DEGREE];
        let u = OMEGA * x;
        let mut um = x;
        for o in out.iter_mut() {
            *o = um;
            um *= u;
        }
        out
    }
}

/// Fitted page surface
#[derive(Debug, Clone, PartialEq)]
pub enum Surface {
    /// One polynomial for the whole page
    Single(NormPoly),
    /// Two polynomials meeting at the seam `X = seam`
    Split {
        /// Seam position T
        seam: f64,
        /// Polynomial used for `X < T`
        lower: NormPoly,
        /// Polynomial used for `X >= T`
        upper: NormPoly,
    },
}

impl Surface {
    /// Flat surface `Z = 0`
    pub fn flat() -> Self {
        Surface::Single(NormPoly::default())
    }

    /// Whether the surface has a seam
    pub fn is_split(&self) -> bool {
        matches!(self, Surface::Split { .. })
    }

    /// Seam position (0 for single surfaces)
    pub fn seam(&self) -> f64 {
        match self {
            Surface::Single(_) => 0.0,
            Surface::Split { seam, .. } => *seam,
        }
    }

    /// Index of the polynomial that governs `x`.
    pub fn side(&self, x: f64) -> usize {
        match self {
            Surface::Single(_) => 0,
            Surface::Split { seam, .. } => usize::from(x >= *seam),
        }
    }

    fn poly(&self, x: f64) -> (&NormPoly, f64) {
        match self {
            Surface::Single(p) => (p, x),
            Surface::Split { seam, lower, upper } => {
                if x < *seam {
                    (lower, x - seam)
                } else {
                    (upper, x - seam)
                }
            }
        }
    }

    /// Evaluate `g(x)`.
    pub fn eval(&self, x: f64) -> f64 {
        let (p, u) = self.poly(x);
        p.eval(u)
    }

    /// Evaluate `g'(x)`.
    pub fn deriv(&self, x: f64) -> f64 {
        let (p, u) = self.poly(x);
        p.deriv(u)
    }

    /// `dg/da` for the polynomial that governs `x`.
    pub fn coeff_gradient(&self, x: f64) -> (usize, [f64; DEGREE]) {
        let (p, u) = self.poly(x);
        (self.side(x), p.coeff_gradient(u))
    }

    /// Relative misfit `|g(X) - Z| / max(|Z|, eps)` of a page-frame point.
    pub fn relative_error(&self, p: &Vector3<f64>) -> f64 {
        (self.eval(p.x) - p.z).abs() / p.z.abs().max(1e-6)
    }
}

/// Strategy for the page surface.
///
/// An implementation turns a parameter vector into a [`Surface`] and
/// intersects camera rays with it.
pub trait SurfaceModel: Debug + Send + Sync {
    /// Build the surface described by `params`.
    fn surface(&self, params: &Params) -> Surface;

    /// Intersect the rays of focal-plane points with `surface`.
    ///
    /// `warm` holds one warm start per point and is updated in place.
    fn intersect(
        &self,
        camera: &Camera,
        rotation: &Matrix3<f64>,
        surface: &Surface,
        points: &[Vector3<f64>],
        warm: &mut [f64],
    ) -> Vec<SurfacePoint> {
        solve_intersections(camera.f, rotation, surface, points, warm)
    }
}

/// Polynomial cylinder surface, split at the seam for two pages
#[derive(Debug, Clone, Copy, Default)]
pub struct PolynomialSurface;

impl SurfaceModel for PolynomialSurface {
    fn surface(&self, params: &Params) -> Surface {
        match params.coeffs.as_slice() {
            [only] => Surface::Single(NormPoly::new(*only)),
            [lower, upper, ..] => Surface::Split {
                seam: params.seam,
                lower: NormPoly::new(*lower),
                upper: NormPoly::new(*upper),
            },
            [] => Surface::flat(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cubic() -> NormPoly {
        let mut a = [0.0; DEGREE];
        a[0] = 0.3;
        a[1] = -0.02;
        a[2] = 0.001;
        NormPoly::new(a)
    }

    #[test]
    fn test_norm_poly_matches_expansion() {
        let p = cubic();
        let x = 37.0;
        // g(x) = a1 x + a2 ω x^2 + a3 ω^2 x^3
        let expected = 0.3 * x - 0.02 * OMEGA * x * x + 0.001 * OMEGA * OMEGA * x * x * x;
        assert!((p.eval(x) - expected).abs() < 1e-9);
        let d = 0.3 - 2.0 * 0.02 * OMEGA * x + 3.0 * 0.001 * OMEGA * OMEGA * x * x;
        assert!((p.deriv(x) - d).abs() < 1e-9);
        assert_eq!(p.eval(0.0), 0.0);
    }

    #[test]
    fn test_coeff_gradient_is_linear_part() {
        let p = cubic();
        let x = -12.5;
        let grad = p.coeff_gradient(x);
        let recon: f64 = grad.iter().zip(p.coeffs()).map(|(g, a)| g * a).sum();
        assert!((recon - p.eval(x)).abs() < 1e-9);
    }

    #[test]
    fn test_split_surface_sides() {
        let s = Surface::Split {
            seam: 10.0,
            lower: cubic(),
            upper: NormPoly::default(),
        };
        assert!(s.is_split());
        assert_eq!(s.side(9.0), 0);
        assert_eq!(s.side(10.0), 1);
        assert_eq!(s.eval(50.0), 0.0);
        assert!((s.eval(5.0) - cubic().eval(-5.0)).abs() < 1e-12);
        assert_eq!(s.eval(10.0), 0.0);
    }

    #[test]
    fn test_polynomial_surface_from_params() {
        let params = Params::initial(1, 3);
        let s = PolynomialSurface.surface(&params);
        assert!(!s.is_split());
        let params = Params::initial(2, 3);
        assert!(PolynomialSurface.surface(&params).is_split());
    }
}
