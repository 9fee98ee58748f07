//! Fine correction of the coarse output
//!
//! After the coarse remap the text lines are nearly straight. The residual
//! vertical wobble is measured along every long, level line, smoothed into
//! a cubic surface `s(x, y)` and removed by shifting pixels vertically by
//! at most one letter height. A perspective crop then makes the page
//! margins vertical.

use crate::line::TextLine;
use crate::ransac::{RansacOptions, SideLine, SideLineEstimator, ransac};
use crate::stats::{linspace, median};
use crate::vanishing::{Side, anchors};
use folio_core::Pix;
use folio_transform::{
    BorderFill, Interpolation, Point, ProjectiveCoeffs, RemapGrid, TransformResult, projective_pta,
};
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;

/// Minimum letters for a line to be measured
pub const MIN_FINE_LETTERS: usize = 10;

/// Largest line slope (radians) accepted for measurement
pub const MAX_FINE_ANGLE: f64 = 0.05;

/// Samples taken along every measured line
pub const FINE_SAMPLES: usize = 20;

/// Margin padding of the perspective crop, in letter heights
pub const CROP_PAD: f64 = 3.0;

const TERMS: usize = 10;

/// Vertical offset measured at one point of the coarse output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetSample {
    /// Image x
    pub x: f64,
    /// Image y of the fitted line at `x`
    pub y: f64,
    /// Median line height minus `y`
    pub offset: f64,
}

/// Offsets of every long, level line, sampled across the full width.
pub fn line_offsets(lines: &[TextLine], width: u32) -> Vec<OffsetSample> {
    let mut out = Vec::new();
    for line in lines {
        if line.len() < MIN_FINE_LETTERS || line.angle().abs() >= MAX_FINE_ANGLE {
            continue;
        }
        let Some(fit) = line.fit_line() else {
            continue;
        };
        let xs = linspace(0.0, width as f64, FINE_SAMPLES);
        let ys: Vec<f64> = xs.iter().map(|&x| fit.eval(x)).collect();
        let mid = median(&ys);
        out.extend(xs.into_iter().zip(ys).map(|(x, y)| OffsetSample {
            x,
            y,
            offset: mid - y,
        }));
    }
    out
}

/// Bivariate polynomial of total degree 3 over normalized coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct CubicSurface {
    coeffs: [f64; TERMS],
    sx: f64,
    sy: f64,
}

fn terms(u: f64, v: f64) -> [f64; TERMS] {
    [
        1.0,
        u,
        v,
        u * u,
        u * v,
        v * v,
        u * u * u,
        u * u * v,
        u * v * v,
        v * v * v,
    ]
}

impl CubicSurface {
    /// Least-squares fit of `offset` over `(x, y)`, with the offsets
    /// clipped to `±limit`. Coordinates are normalized by the image size.
    ///
    /// Returns `None` with fewer samples than coefficients or when the
    /// system cannot be solved.
    pub fn fit(samples: &[OffsetSample], limit: f64, width: u32, height: u32) -> Option<Self> {
        if samples.len() < TERMS {
            return None;
        }
        let sx = (width as f64).max(1.0);
        let sy = (height as f64).max(1.0);
        let a = DMatrix::from_fn(samples.len(), TERMS, |i, j| {
            terms(samples[i].x / sx, samples[i].y / sy)[j]
        });
        let b = DVector::from_iterator(
            samples.len(),
            samples.iter().map(|s| s.offset.clamp(-limit, limit)),
        );
        let sol = a.svd(true, true).solve(&b, 1e-10).ok()?;
        if sol.iter().any(|c| !c.is_finite()) {
            return None;
        }
        let mut coeffs = [0.0; TERMS];
        coeffs.copy_from_slice(sol.as_slice());
        Some(Self { coeffs, sx, sy })
    }

    /// Evaluate at image coordinates.
    pub fn eval(&self, x: f64, y: f64) -> f64 {
        terms(x / self.sx, y / self.sy)
            .iter()
            .zip(&self.coeffs)
            .map(|(t, c)| t * c)
            .sum()
    }
}

/// Bounded vertical shift field
#[derive(Debug, Clone, PartialEq)]
pub struct FineCorrection {
    surface: CubicSurface,
    limit: f64,
}

impl FineCorrection {
    /// Shift field `s(x, y)` clipped to `±limit`.
    pub fn new(surface: CubicSurface, limit: f64) -> Self {
        Self {
            surface,
            limit: limit.abs(),
        }
    }

    /// Vertical displacement at `(x, y)`, never larger than the limit.
    pub fn displacement(&self, x: f64, y: f64) -> f64 {
        let d = self.surface.eval(x, y);
        if d.is_finite() {
            d.clamp(-self.limit, self.limit)
        } else {
            0.0
        }
    }

    /// Grid in which destination `(x, y)` samples `(x, y - s(x, y))`.
    pub fn grid(&self, width: u32, height: u32) -> TransformResult<RemapGrid> {
        RemapGrid::from_fn(width, height, |c, r| {
            let (x, y) = (c as f64, r as f64);
            (x, y - self.displacement(x, y))
        })
    }

    /// Where a point of the coarse output lands after the shift.
    pub fn map_point(&self, x: f64, y: f64) -> (f64, f64) {
        let mut yd = y + self.displacement(x, y);
        for _ in 0..3 {
            yd = y + self.displacement(x, yd);
        }
        (x, yd)
    }
}

/// Perspective warp that makes the page margins vertical
#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveCrop {
    forward: ProjectiveCoeffs,
    src: [Point; 4],
    dst: [Point; 4],
    width: u32,
    height: u32,
    pad: f64,
}

fn fit_margin(lines: &[TextLine], side: Side, ah: f64, rng: &mut StdRng) -> Option<SideLine> {
    let points = anchors(lines, side);
    ransac::<SideLineEstimator>(&points, &RansacOptions::new(3, ah / 10.0), rng).model
}

impl PerspectiveCrop {
    /// Fit both margins of the lines longer than [`MIN_FINE_LETTERS`] and
    /// build the warp onto `[0, w] x [0, height]`.
    ///
    /// The control points are the margins at the top and bottom image
    /// rows, padded outward by [`CROP_PAD`] letter heights.
    pub fn estimate(
        lines: &[TextLine],
        width: u32,
        height: u32,
        ah: f64,
        rng: &mut StdRng,
    ) -> Option<Self> {
        let long: Vec<TextLine> = lines
            .iter()
            .filter(|l| l.len() > MIN_FINE_LETTERS)
            .cloned()
            .collect();
        let left = fit_margin(&long, Side::Left, ah, rng)?;
        let right = fit_margin(&long, Side::Right, ah, rng)?;
        let pad = CROP_PAD * ah;
        let h = height as f64;
        let src = [
            Point::new(left.x_at(0.0) - pad, 0.0),
            Point::new(right.x_at(0.0) + pad, 0.0),
            Point::new(right.x_at(h) + pad, h),
            Point::new(left.x_at(h) - pad, h),
        ];
        let w = src[1].x - src[0].x;
        if !w.is_finite() || w < 1.0 || w > 4.0 * width as f64 {
            return None;
        }
        let w_out = w.round() as u32;
        let dst = [
            Point::new(0.0, 0.0),
            Point::new(w, 0.0),
            Point::new(w, h),
            Point::new(0.0, h),
        ];
        let forward = ProjectiveCoeffs::from_four_points(src, dst).ok()?;
        Some(Self {
            forward,
            src,
            dst,
            width: w_out,
            height,
            pad,
        })
    }

    /// Output width
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Output height
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Margin padding in output pixels
    pub fn pad(&self) -> f64 {
        self.pad
    }

    /// Map a point of the input into the output.
    pub fn map_point(&self, x: f64, y: f64) -> (f64, f64) {
        let p = self.forward.transform_point(Point::new(x, y));
        (p.x, p.y)
    }

    /// Warp an image.
    pub fn apply(&self, pix: &Pix, method: Interpolation) -> TransformResult<Pix> {
        projective_pta(
            pix,
            self.src,
            self.dst,
            self.width,
            self.height,
            method,
            BorderFill::White,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::letter::extract_letters;
    use crate::letter::tests::boxes_image;
    use rand::SeedableRng;

    fn sample(x: f64, y: f64, offset: f64) -> OffsetSample {
        OffsetSample { x, y, offset }
    }

    #[test]
    fn test_cubic_surface_reproduces_cubic() {
        let f = |x: f64, y: f64| 2.0 + 0.01 * x - 0.02 * y + 1e-5 * x * y + 1e-7 * x * x * x;
        let samples: Vec<_> = (0..8)
            .flat_map(|i| (0..6).map(move |j| (i as f64 * 40.0, j as f64 * 30.0)))
            .map(|(x, y)| sample(x, y, f(x, y)))
            .collect();
        let s = CubicSurface::fit(&samples, 100.0, 300, 200).unwrap();
        for &(x, y) in &[(13.0, 17.0), (250.0, 140.0), (100.0, 5.0)] {
            assert!((s.eval(x, y) - f(x, y)).abs() < 1e-6);
        }
        assert!(CubicSurface::fit(&samples[..9], 100.0, 300, 200).is_none());
    }

    #[test]
    fn test_displacement_never_exceeds_limit() {
        // A steep field: raw values far beyond the limit.
        let samples: Vec<_> = (0..5)
            .flat_map(|i| (0..5).map(move |j| (i as f64 * 50.0, j as f64 * 50.0)))
            .map(|(x, y)| sample(x, y, (x - 100.0) * 3.0))
            .collect();
        let s = CubicSurface::fit(&samples, 1e9, 200, 200).unwrap();
        let fine = FineCorrection::new(s, 12.0);
        let grid = fine.grid(200, 200).unwrap();
        for r in (0..200).step_by(7) {
            for c in (0..200).step_by(7) {
                let (x, y) = grid.get(c, r);
                assert_eq!(x, c as f64);
                assert!((y - r as f64).abs() <= 12.0 + 1e-12);
            }
        }
        assert_eq!(fine.displacement(0.0, 0.0), -12.0);
        assert_eq!(fine.displacement(200.0, 0.0), 12.0);
    }

    #[test]
    fn test_map_point_inverts_grid() {
        let samples: Vec<_> = (0..5)
            .flat_map(|i| (0..5).map(move |j| (i as f64 * 50.0, j as f64 * 50.0)))
            .map(|(x, y)| sample(x, y, 0.02 * x))
            .collect();
        let s = CubicSurface::fit(&samples, 10.0, 200, 200).unwrap();
        let fine = FineCorrection::new(s, 10.0);
        let (x, yd) = fine.map_point(100.0, 80.0);
        // The destination pixel samples back the coarse point.
        assert!((yd - fine.displacement(x, yd) - 80.0).abs() < 1e-9);
        assert!((yd - 82.0).abs() < 1e-9);
    }

    #[test]
    fn test_level_lines_have_zero_offset() {
        let rects: Vec<_> = (0..3)
            .flat_map(|r| (0..12).map(move |i| (20 + 20 * i, 20 + 40 * r, 12, 14)))
            .collect();
        let pix = boxes_image(300, 140, &rects);
        let lines = crate::collate::collate_lines(14.0, &extract_letters(&pix).unwrap());
        let samples = line_offsets(&lines, 300);
        assert_eq!(samples.len(), 3 * FINE_SAMPLES);
        assert!(samples.iter().all(|s| s.offset.abs() < 1e-9));
    }

    #[test]
    fn test_perspective_crop_pads_straight_margins() {
        let rects: Vec<_> = (0..6)
            .flat_map(|r| (0..12).map(move |i| (40 + 20 * i, 20 + 30 * r, 12, 14)))
            .collect();
        let pix = boxes_image(340, 200, &rects);
        let lines = crate::collate::collate_lines(14.0, &extract_letters(&pix).unwrap());
        let mut rng = StdRng::seed_from_u64(3);
        let crop = PerspectiveCrop::estimate(&lines, 340, 200, 14.0, &mut rng).unwrap();
        // Margins at x = 40 and x = 272, padded by 42 on each side.
        assert_eq!(crop.width(), 232 + 84);
        assert_eq!(crop.height(), 200);
        let (x, y) = crop.map_point(40.0, 100.0);
        assert!((x - 42.0).abs() < 1e-6 && (y - 100.0).abs() < 1e-6);
        let out = crop.apply(&pix, Interpolation::Bilinear).unwrap();
        assert_eq!(out.width(), 316);
    }
}
