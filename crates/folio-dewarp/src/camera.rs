//! Pinhole camera and page rotation
//!
//! A pixel `(x, y)` corresponds to the focal-plane point
//! `P = (x - Ox, y - Oy, -f)`. Points along its ray are `t * P`; the page
//! frame is reached by shifting by `Of = (0, 0, f)` and rotating:
//! `XYZ(t) = R(theta) * (t * P - Of)`. A flat page facing the camera is the
//! plane `Z = 0`, hit at `t = -1`.

use crate::types::CameraConfig;
use nalgebra::{Matrix3, Rotation3, Vector3};
use std::f64::consts::TAU;

/// Camera resolved for one image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Focal length in pixels
    pub f: f64,
    /// Principal point x
    pub ox: f64,
    /// Principal point y
    pub oy: f64,
    /// RANSAC threshold multiplier
    pub mult: f64,
}

impl Camera {
    /// Resolve a [`CameraConfig`] for an image of the given size.
    pub fn from_config(config: &CameraConfig, width: u32, height: u32) -> Self {
        let (ox, oy) = config.principal_point(width, height);
        Self {
            f: config.focal_length,
            ox,
            oy,
            mult: config.threshold_mult(),
        }
    }

    /// The same camera seen from a crop whose origin is `(x0, y0)`.
    pub fn cropped(&self, x0: f64, y0: f64) -> Self {
        Self {
            ox: self.ox - x0,
            oy: self.oy - y0,
            ..*self
        }
    }

    /// Focal-plane point of a pixel.
    #[inline]
    pub fn focal_point(&self, x: f64, y: f64) -> Vector3<f64> {
        Vector3::new(x - self.ox, y - self.oy, -self.f)
    }

    /// Camera offset `Of`.
    #[inline]
    pub fn offset(&self) -> Vector3<f64> {
        Vector3::new(0.0, 0.0, self.f)
    }

    /// Project a page-frame point back into the image.
    ///
    /// Returns `None` for points at (or behind) the camera plane.
    pub fn project(&self, rotation: &Matrix3<f64>, xyz: &Vector3<f64>) -> Option<(f64, f64)> {
        let c = rotation.transpose() * xyz + self.offset();
        if c.z.abs() < 1e-12 || !c.z.is_finite() {
            return None;
        }
        let s = -self.f / c.z;
        Some((c.x * s + self.ox, c.y * s + self.oy))
    }

    /// Page-frame point of a pixel assuming a flat page facing the camera
    /// (`t = -1`), rotated by `rotation`.
    pub fn flat_point(&self, rotation: &Matrix3<f64>, x: f64, y: f64) -> Vector3<f64> {
        rotation * (-self.focal_point(x, y) - self.offset())
    }
}

/// Rotation matrix of an axis-angle vector.
pub fn rotation(theta: &[f64; 3]) -> Matrix3<f64> {
    Rotation3::from_scaled_axis(Vector3::from(*theta)).into_inner()
}

/// Rotation angle of an axis-angle vector, wrapped into `[0, pi]`.
pub fn rotation_angle(theta: &[f64; 3]) -> f64 {
    let a = Vector3::from(*theta).norm() % TAU;
    a.min(TAU - a)
}

/// Partial derivatives `dR/dtheta_k` of [`rotation`], in closed form.
///
/// Uses `dR/dθk = (θk [θ]x + [θ x (I - R) e_k]x) R / |θ|^2`, which reduces to
/// `[e_k]x` at the identity.
pub fn rotation_derivatives(theta: &[f64; 3]) -> [Matrix3<f64>; 3] {
    let v = Vector3::from(*theta);
    let n2 = v.norm_squared();
    if n2 < 1e-14 {
        return [
            Vector3::x().cross_matrix(),
            Vector3::y().cross_matrix(),
            Vector3::z().cross_matrix(),
        ];
    }
    let r = rotation(theta);
    let vx = v.cross_matrix();
    let i_minus_r = Matrix3::identity() - r;
    let mut out = [Matrix3::zeros(); 3];
    for (k, d) in out.iter_mut().enumerate() {
        let e = Vector3::ith(k, 1.0);
        let w = v.cross(&(i_minus_r * e));
        *d = (vx * v[k] + w.cross_matrix()) * r / n2;
    }
    out
}
