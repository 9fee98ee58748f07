//! Ray-surface intersection
//!
//! For a focal-plane point `P` the page-frame ray is
//! `X = t B - f R13`, `Y = t (R2 . P) - f R23`, `Z = t D - f R33` with
//! `B = R1 . P`, `D = R3 . P`. Newton iterations solve
//! `F(t) = Z(t) - g(X(t)) = 0` with `F'(t) = D - g'(X) B`.

use crate::surface::Surface;
use nalgebra::{Matrix3, Vector3};

const MAX_ITERATIONS: usize = 30;

/// Largest relative misfit accepted by [`is_plausible`]
pub const PLAUSIBLE_ERROR: f64 = 0.02;

/// Solution of one ray
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacePoint {
    /// Ray parameter (NaN when the solver failed)
    pub t: f64,
    /// Page-frame point
    pub xyz: Vector3<f64>,
}

impl SurfacePoint {
    fn failed() -> Self {
        Self {
            t: f64::NAN,
            xyz: Vector3::repeat(f64::NAN),
        }
    }

    /// Whether the solver produced a finite point
    pub fn is_finite(&self) -> bool {
        self.t.is_finite() && self.xyz.iter().all(|v| v.is_finite())
    }
}

/// Ray parameter where the ray meets the plane `Z = 0`.
pub fn flat_start(f: f64, rotation: &Matrix3<f64>, p: &Vector3<f64>) -> f64 {
    let d = rotation.row(2).transpose().dot(p);
    f * rotation[(2, 2)] / d
}

/// Intersect one ray with the surface, starting from `t0`.
pub fn intersect_ray(
    f: f64,
    rotation: &Matrix3<f64>,
    surface: &Surface,
    p: &Vector3<f64>,
    t0: f64,
) -> SurfacePoint {
    let b = rotation.row(0).transpose().dot(p);
    let d = rotation.row(2).transpose().dot(p);
    let (r13, r33) = (rotation[(0, 2)], rotation[(2, 2)]);

    let mut t = if t0.is_finite() {
        t0
    } else {
        flat_start(f, rotation, p)
    };
    if !t.is_finite() {
        return SurfacePoint::failed();
    }

    for _ in 0..MAX_ITERATIONS {
        let x = t * b - f * r13;
        let z = t * d - f * r33;
        let fv = z - surface.eval(x);
        let fd = d - surface.deriv(x) * b;
        let step = fv / fd;
        if !step.is_finite() {
            return SurfacePoint::failed();
        }
        t -= step;
        if step.abs() <= 1e-12 * t.abs().max(1.0) {
            break;
        }
    }

    let c = Vector3::new(t * p.x, t * p.y, t * p.z) - Vector3::new(0.0, 0.0, f);
    SurfacePoint {
        t,
        xyz: rotation * c,
    }
}

/// Intersect every ray; `warm` holds the warm starts and receives the new
/// solutions (non-finite entries start from the flat plane).
pub fn solve_intersections(
    f: f64,
    rotation: &Matrix3<f64>,
    surface: &Surface,
    points: &[Vector3<f64>],
    warm: &mut [f64],
) -> Vec<SurfacePoint> {
    points
        .iter()
        .zip(warm.iter_mut())
        .map(|(p, t0)| {
            let sp = intersect_ray(f, rotation, surface, p, *t0);
            *t0 = sp.t;
            sp
        })
        .collect()
}

/// Whether a solution lies on the surface, in front of the camera and
/// within a sane distance.
pub fn is_plausible(surface: &Surface, sp: &SurfacePoint) -> bool {
    sp.is_finite()
        && sp.t < 0.0
        && sp.xyz.z.abs() < 1e6
        && surface.relative_error(&sp.xyz) <= PLAUSIBLE_ERROR
}
