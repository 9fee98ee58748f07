//! Margin lines and the vanishing point of the page verticals
//!
//! Left and right text margins are straight vertical lines on the page.
//! Their images, fitted as `x = m y + b` through the line anchors, meet at
//! the vanishing point of the page's vertical direction, which gives a
//! closed-form first guess for the page rotation.

use crate::camera::Camera;
use crate::line::TextLine;
use crate::ransac::{RansacOptions, SideLine, SideLineEstimator, ransac};
use nalgebra::{Rotation3, Vector3};
use rand::rngs::StdRng;
use std::f64::consts::FRAC_PI_4;
use tracing::debug;

/// A margin fit counts only above this inlier fraction
pub const MIN_INLIER_FRACTION: f64 = 0.5;

/// Page margin side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Left margin (line starts)
    Left,
    /// Right margin (line ends)
    Right,
}

impl Side {
    /// Index used in parameter layouts (left 0, right 1)
    pub fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }
}

/// RANSAC fit of one margin
#[derive(Debug, Clone)]
pub struct SideFit {
    /// Which margin
    pub side: Side,
    /// Fitted line
    pub line: SideLine,
    /// Anchor points the fit ran on
    pub points: Vec<(f64, f64)>,
    /// Inlier flag per anchor
    pub inliers: Vec<bool>,
}

impl SideFit {
    /// Fraction of anchors that are inliers
    pub fn inlier_fraction(&self) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }
        self.inliers.iter().filter(|&&b| b).count() as f64 / self.points.len() as f64
    }

    /// Whether enough anchors agree with the fitted line
    pub fn is_convincing(&self) -> bool {
        self.inlier_fraction() > MIN_INLIER_FRACTION
    }

    /// The inlier anchors
    pub fn inlier_points(&self) -> Vec<(f64, f64)> {
        self.points
            .iter()
            .zip(&self.inliers)
            .filter_map(|(p, &b)| b.then_some(*p))
            .collect()
    }
}

/// Margin anchors of the lines: `left_mid` or `right_mid`.
pub fn anchors(lines: &[TextLine], side: Side) -> Vec<(f64, f64)> {
    lines
        .iter()
        .map(|l| match side {
            Side::Left => l.left_mid(),
            Side::Right => l.right_mid(),
        })
        .filter(|p| p.0.is_finite() && p.1.is_finite())
        .collect()
}

/// Fit one margin with RANSAC (3-point samples).
pub fn fit_side(
    lines: &[TextLine],
    side: Side,
    thresh: f64,
    rng: &mut StdRng,
) -> Option<SideFit> {
    let points = anchors(lines, side);
    let res = ransac::<SideLineEstimator>(&points, &RansacOptions::new(3, thresh), rng);
    let line = res.model?;
    Some(SideFit {
        side,
        line,
        points,
        inliers: res.inliers,
    })
}

/// Intersection of the two margin lines.
pub fn vanishing_point(left: &SideLine, right: &SideLine) -> Option<(f64, f64)> {
    left.intersect(right)
}

/// Rotation that turns the vanishing direction into the page's vertical.
///
/// Returns the axis-angle vector, or `None` when the required rotation is
/// larger than 45 degrees.
pub fn rotation_from_vanishing_point(camera: &Camera, vp: (f64, f64)) -> Option<[f64; 3]> {
    let v = camera.focal_point(vp.0, vp.1).normalize();
    if !v.iter().all(|c| c.is_finite()) {
        return None;
    }
    let target = if v.y < 0.0 {
        -Vector3::y()
    } else {
        Vector3::y()
    };
    let rot = Rotation3::rotation_between(&v, &target)?;
    let theta = rot.scaled_axis();
    (theta.norm() <= FRAC_PI_4).then(|| [theta.x, theta.y, theta.z])
}

/// Initial rotation estimated from a page's margins, if they converge.
///
/// Both margins must be convincing; a ragged margin gives no guess.
pub fn initial_rotation(
    camera: &Camera,
    lines: &[TextLine],
    ah: f64,
    rng: &mut StdRng,
) -> Option<[f64; 3]> {
    let thresh = ah / 5.0 * camera.mult;
    let left = fit_side(lines, Side::Left, thresh, rng)?;
    let right = fit_side(lines, Side::Right, thresh, rng)?;
    if !left.is_convincing() || !right.is_convincing() {
        debug!(
            left = left.inlier_fraction(),
            right = right.inlier_fraction(),
            "margin fit too weak for an initial rotation"
        );
        return None;
    }
    let vp = vanishing_point(&left.line, &right.line)?;
    rotation_from_vanishing_point(camera, vp)
}
