//! Projective transformations for images
//!
//! Projective (homography) transformations use 4-point correspondences to
//! define a perspective mapping:
//!
//! ```text
//! x' = (a*x + b*y + c) / (g*x + h*y + 1)
//! y' = (d*x + e*y + f) / (g*x + h*y + 1)
//! ```

use crate::remap::{BorderFill, Interpolation, RemapGrid, remap};
use crate::{TransformError, TransformResult};
use folio_core::Pix;
use nalgebra::{Matrix3, SMatrix, SVector};

/// A 2D point with floating-point coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
}

impl Point {
    /// Create a new point
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Projective transformation coefficients `[a, b, c, d, e, f, g, h]`
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectiveCoeffs {
    coeffs: [f64; 8],
}

impl Default for ProjectiveCoeffs {
    fn default() -> Self {
        Self {
            coeffs: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0],
        }
    }
}

impl ProjectiveCoeffs {
    /// Coefficients mapping each `src[i]` onto `dst[i]`.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::SingularMatrix`] when three of the points
    /// are collinear.
    pub fn from_four_points(src: [Point; 4], dst: [Point; 4]) -> TransformResult<Self> {
        if has_collinear_triple(&src) || has_collinear_triple(&dst) {
            return Err(TransformError::SingularMatrix);
        }
        let mut a = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();
        for i in 0..4 {
            let (x, y) = (src[i].x, src[i].y);
            let (u, v) = (dst[i].x, dst[i].y);
            let r = 2 * i;
            a[(r, 0)] = x;
            a[(r, 1)] = y;
            a[(r, 2)] = 1.0;
            a[(r, 6)] = -x * u;
            a[(r, 7)] = -y * u;
            b[r] = u;
            a[(r + 1, 3)] = x;
            a[(r + 1, 4)] = y;
            a[(r + 1, 5)] = 1.0;
            a[(r + 1, 6)] = -x * v;
            a[(r + 1, 7)] = -y * v;
            b[r + 1] = v;
        }
        let sol = a.lu().solve(&b).ok_or(TransformError::SingularMatrix)?;
        if sol.iter().any(|c| !c.is_finite()) {
            return Err(TransformError::SingularMatrix);
        }
        let mut coeffs = [0.0; 8];
        coeffs.copy_from_slice(sol.as_slice());
        Ok(Self { coeffs })
    }

    /// Raw coefficients
    pub fn coeffs(&self) -> &[f64; 8] {
        &self.coeffs
    }

    fn matrix(&self) -> Matrix3<f64> {
        let c = &self.coeffs;
        Matrix3::new(c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7], 1.0)
    }

    /// Map a point. Points on the horizon map to non-finite coordinates.
    pub fn transform_point(&self, pt: Point) -> Point {
        let c = &self.coeffs;
        let den = c[6] * pt.x + c[7] * pt.y + 1.0;
        Point::new(
            (c[0] * pt.x + c[1] * pt.y + c[2]) / den,
            (c[3] * pt.x + c[4] * pt.y + c[5]) / den,
        )
    }

    /// The inverse mapping.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::SingularMatrix`] if the transform is not
    /// invertible.
    pub fn inverse(&self) -> TransformResult<Self> {
        let inv = self
            .matrix()
            .try_inverse()
            .ok_or(TransformError::SingularMatrix)?;
        let s = inv[(2, 2)];
        if s.abs() < 1e-15 {
            return Err(TransformError::SingularMatrix);
        }
        let n = inv / s;
        Ok(Self {
            coeffs: [
                n[(0, 0)],
                n[(0, 1)],
                n[(0, 2)],
                n[(1, 0)],
                n[(1, 1)],
                n[(1, 2)],
                n[(2, 0)],
                n[(2, 1)],
            ],
        })
    }
}

fn has_collinear_triple(pts: &[Point; 4]) -> bool {
    let extent = pts
        .iter()
        .flat_map(|p| [p.x.abs(), p.y.abs()])
        .fold(1.0f64, f64::max);
    let tol = 1e-9 * extent * extent;
    (0..4).any(|skip| {
        let [p, q, r]: [Point; 3] = match skip {
            0 => [pts[1], pts[2], pts[3]],
            1 => [pts[0], pts[2], pts[3]],
            2 => [pts[0], pts[1], pts[3]],
            _ => [pts[0], pts[1], pts[2]],
        };
        ((q.x - p.x) * (r.y - p.y) - (q.y - p.y) * (r.x - p.x)).abs() <= tol
    })
}

/// Warp `pix` so that `src_pts` land on `dst_pts` in an output image of
/// `out_width` x `out_height`.
///
/// # Errors
///
/// Returns an error if the correspondence is degenerate or the output size
/// is zero.
pub fn projective_pta(
    pix: &Pix,
    src_pts: [Point; 4],
    dst_pts: [Point; 4],
    out_width: u32,
    out_height: u32,
    method: Interpolation,
    fill: BorderFill,
) -> TransformResult<Pix> {
    // Output pixels pull from the source, so map destination -> source.
    let back = ProjectiveCoeffs::from_four_points(dst_pts, src_pts)?;
    let grid = RemapGrid::from_fn(out_width, out_height, |c, r| {
        let p = back.transform_point(Point::new(c as f64, r as f64));
        (p.x, p.y)
    })?;
    remap(pix, &grid, method, fill)
}
