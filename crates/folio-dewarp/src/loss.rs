//! Straightness and alignment objective
//!
//! Residuals, in order:
//!
//! - **straightness**: for every sample point of target `k` (a text line's
//!   letter base points, or an underline's mid contour) the page-frame
//!   height must equal the target height: `w_i (Y_i - l_k)`, divided by the
//!   ray depth `-t_i` when depth scaling is on;
//! - **alignment**: for every margin whose RANSAC fit is convincing, the
//!   inlier anchors must share one page-frame X: `c (X_i - align)`.
//!
//! A fitted model is only usable if it stays plausible: the rotation is
//! below 45 degrees, the surface slope stays bounded over the observed
//! text, and the text keeps roughly its image width on the page. The
//! problem remembers the lowest-norm plausible parameters it has
//! evaluated, so a run that drifts into a degenerate fit (a page plane
//! seen edge-on has near-zero residuals) still yields a usable model.
//!
//! The Jacobian is analytic. Differentiating `Z(t) = g(X(t))` implicitly
//! gives `dt/dq = -(dZ/dq - g' dX/dq) / (D - g' B)` for every parameter
//! `q`, from which `dX` and `dY` follow.

use crate::camera::{Camera, rotation, rotation_angle, rotation_derivatives};
use crate::line::TextLine;
use crate::newton::{SurfacePoint, is_plausible};
use crate::params::{ParamLayout, Params};
use crate::stats::{linspace, mean, median};
use crate::surface::{DEGREE, Surface, SurfaceModel};
use crate::vanishing::{Side, fit_side};
use levenberg_marquardt::LeastSquaresProblem;
use nalgebra::{DMatrix, DVector, Dyn, Matrix3, Owned, Vector3};
use rand::rngs::StdRng;

/// Residual assigned to a point whose ray misses the surface
const MISS_PENALTY: f64 = 1e4;

/// Sampling step along underline mid contours
const UNDERLINE_STEP: usize = 4;

/// Largest plausible page rotation (wrapped angle)
pub const MAX_ROTATION: f64 = std::f64::consts::FRAC_PI_4;

/// Largest plausible surface slope `|g'(X)|` over the text
pub const MAX_SLOPE: f64 = 2.0;

/// Largest ratio between the page-frame and image extents of the text
pub const MAX_EXTENT_RATIO: f64 = 3.0;

/// Points at which the slope bound is checked
const SLOPE_SAMPLES: usize = 32;

/// Straightness samples of one line or underline
#[derive(Debug, Clone)]
pub struct StraightTarget {
    /// Focal-plane sample points
    pub points: Vec<Vector3<f64>>,
    /// Per-point weights
    pub weights: Vec<f64>,
    /// Page the target belongs to
    pub page: usize,
}

/// Inlier anchors of one margin
#[derive(Debug, Clone)]
pub struct AlignTarget {
    /// Focal-plane anchor points
    pub points: Vec<Vector3<f64>>,
    /// Page the margin belongs to
    pub page: usize,
    /// Which margin
    pub side: Side,
}

/// Knobs of the objective
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossOptions {
    /// Divide straightness residuals by the ray depth
    pub depth_scaling: bool,
    /// Weight line ends up to twice as much as line centers
    pub outer_weighting: bool,
    /// Weight of the alignment residuals
    pub align_weight: f64,
}

/// Sample points of a whole page model
#[derive(Debug, Clone)]
pub struct Objective {
    camera: Camera,
    pages: usize,
    targets: Vec<StraightTarget>,
    aligns: Vec<AlignTarget>,
    options: LossOptions,
    seam0: f64,
    span: f64,
}

fn weights(n: usize, outer: bool) -> Vec<f64> {
    if outer {
        linspace(-1.0, 1.0, n).into_iter().map(|v| 1.0 + v.abs()).collect()
    } else {
        vec![1.0; n]
    }
}

impl Objective {
    /// Collect straightness and alignment samples from the lines of one or
    /// two pages.
    ///
    /// Every line contributes its letter base points; every attached
    /// underline contributes its mid contour as a separate target. The
    /// margins are fitted with threshold `ah / 5`.
    pub fn new(
        camera: Camera,
        pages: &[Vec<TextLine>],
        ah: f64,
        options: LossOptions,
        rng: &mut StdRng,
    ) -> Self {
        let mut targets = Vec::new();
        let mut aligns = Vec::new();
        for (page, lines) in pages.iter().enumerate() {
            for line in lines {
                let points: Vec<Vector3<f64>> = line
                    .base_points()
                    .into_iter()
                    .map(|(x, y)| camera.focal_point(x, y))
                    .collect();
                targets.push(StraightTarget {
                    weights: weights(points.len(), options.outer_weighting),
                    points,
                    page,
                });
                for u in line.underlines() {
                    let points: Vec<Vector3<f64>> = u
                        .mid_contour()
                        .into_iter()
                        .enumerate()
                        .step_by(UNDERLINE_STEP)
                        .filter(|(_, y)| y.is_finite())
                        .map(|(c, y)| camera.focal_point(u.x() + c as f64, y))
                        .collect();
                    if points.is_empty() {
                        continue;
                    }
                    targets.push(StraightTarget {
                        weights: weights(points.len(), options.outer_weighting),
                        points,
                        page,
                    });
                }
            }
            for side in [Side::Left, Side::Right] {
                let Some(fit) = fit_side(lines, side, ah / 5.0, rng) else {
                    continue;
                };
                if !fit.is_convincing() {
                    continue;
                }
                aligns.push(AlignTarget {
                    points: fit
                        .inlier_points()
                        .into_iter()
                        .map(|(x, y)| camera.focal_point(x, y))
                        .collect(),
                    page,
                    side,
                });
            }
        }

        let seam0 = if pages.len() == 2 {
            let right0: Vec<f64> = pages[0].iter().map(|l| -(l.right() - camera.ox)).collect();
            let left1: Vec<f64> = pages[1].iter().map(|l| -(l.left() - camera.ox)).collect();
            let t = (median(&right0) + median(&left1)) / 2.0;
            if t.is_finite() { t } else { 0.0 }
        } else {
            0.0
        };

        let (lo, hi) = targets
            .iter()
            .flat_map(|t| t.points.iter().map(|p| p.x))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| {
                (lo.min(x), hi.max(x))
            });
        let span = if hi > lo { hi - lo } else { 0.0 };

        Self {
            camera,
            pages: pages.len().max(1),
            targets,
            aligns,
            options,
            seam0,
            span,
        }
    }

    /// Camera the samples were taken with
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Straightness targets
    pub fn targets(&self) -> &[StraightTarget] {
        &self.targets
    }

    /// Alignment targets
    pub fn aligns(&self) -> &[AlignTarget] {
        &self.aligns
    }

    /// Parameter layout
    pub fn layout(&self) -> ParamLayout {
        ParamLayout::new(self.pages, self.targets.len())
    }

    /// Image x extent of the straightness samples
    pub fn span(&self) -> f64 {
        self.span
    }

    fn straight_count(&self) -> usize {
        self.targets.iter().map(|t| t.points.len()).sum()
    }

    /// Number of real residuals
    pub fn residual_count(&self) -> usize {
        self.targets.iter().map(|t| t.points.len()).sum::<usize>()
            + self.aligns.iter().map(|a| a.points.len()).sum::<usize>()
    }

    /// Starting parameters for a rotation guess.
    ///
    /// Surfaces start flat and the seam sits between the pages' inner
    /// margins. Every target height and every margin X starts at the mean
    /// of its points on the flat page; margins without a convincing fit
    /// keep -1000 / 1000.
    pub fn initial_params(&self, theta: [f64; 3]) -> Params {
        let mut params = Params::initial(self.pages, self.targets.len());
        params.theta = theta;
        params.seam = self.seam0;
        let r = rotation(&theta);
        let of = self.camera.offset();
        let flat = |p: &Vector3<f64>| r * (-p - of);
        for (l, t) in params.heights.iter_mut().zip(&self.targets) {
            let ys: Vec<f64> = t.points.iter().map(|p| flat(p).y).collect();
            *l = mean(&ys);
        }
        for a in &self.aligns {
            let xs: Vec<f64> = a.points.iter().map(|p| flat(p).x).collect();
            let x = mean(&xs);
            if x.is_finite() {
                params.align[a.page][a.side.index()] = x;
            }
        }
        params
    }

    fn all_points(&self) -> Vec<Vector3<f64>> {
        self.targets
            .iter()
            .flat_map(|t| t.points.iter().copied())
            .chain(self.aligns.iter().flat_map(|a| a.points.iter().copied()))
            .collect()
    }
}

#[derive(Debug, Clone)]
struct IntersectionCache {
    generation: u64,
    rotation: Matrix3<f64>,
    surface: Surface,
    points: Vec<SurfacePoint>,
}

/// Least-squares problem over the scaled parameter vector.
///
/// The optimizer sees `x / scale`. Every parameter update bumps a
/// generation counter and re-solves all ray intersections once, warm
/// started from the previous generation; residuals and Jacobian both read
/// that cache.
pub struct DewarpProblem<'a> {
    objective: &'a Objective,
    model: &'a dyn SurfaceModel,
    focal: Vec<Vector3<f64>>,
    warm: Vec<f64>,
    scales: DVector<f64>,
    scaled: DVector<f64>,
    params: Params,
    generation: u64,
    cache: IntersectionCache,
    residuals: DVector<f64>,
    best: Option<(Params, f64)>,
}

impl<'a> DewarpProblem<'a> {
    /// Problem starting at `initial`.
    pub fn new(objective: &'a Objective, model: &'a dyn SurfaceModel, initial: &Params) -> Self {
        let focal = objective.all_points();
        let scales = objective.layout().scales();
        let n = focal.len();
        let mut problem = Self {
            objective,
            model,
            warm: vec![f64::NAN; n],
            focal,
            scaled: initial.pack().component_div(&scales),
            scales,
            params: initial.clone(),
            generation: 0,
            cache: IntersectionCache {
                generation: 0,
                rotation: Matrix3::identity(),
                surface: Surface::flat(),
                points: Vec::new(),
            },
            residuals: DVector::zeros(0),
            best: None,
        };
        problem.refresh();
        problem
    }

    /// Current parameters
    pub fn current_params(&self) -> &Params {
        &self.params
    }

    /// Number of parameter updates so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Lowest-norm plausible parameters evaluated so far, with their norm
    pub fn best_plausible(&self) -> Option<(&Params, f64)> {
        self.best.as_ref().map(|(p, n)| (p, *n))
    }

    /// Whether the current parameters describe a usable page.
    ///
    /// Checks the wrapped rotation angle, that at least half of the
    /// straightness samples hit the surface plausibly, that their X extent
    /// is within [`MAX_EXTENT_RATIO`] of the image extent, and that the
    /// surface slope over that extent stays below [`MAX_SLOPE`].
    pub fn is_plausible_fit(&self) -> bool {
        let angle = rotation_angle(&self.params.theta);
        if angle.is_nan() || angle > MAX_ROTATION {
            return false;
        }
        let surface = &self.cache.surface;
        let n = self.objective.straight_count().min(self.cache.points.len());
        let xs: Vec<f64> = self.cache.points[..n]
            .iter()
            .filter(|sp| is_plausible(surface, sp))
            .map(|sp| sp.xyz.x)
            .collect();
        if xs.len() < 2 || 2 * xs.len() < n {
            return false;
        }
        let x0 = xs.iter().copied().fold(f64::INFINITY, f64::min);
        let x1 = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let span = self.objective.span;
        if span > 0.0 {
            let ratio = (x1 - x0) / span;
            if !(1.0 / MAX_EXTENT_RATIO..=MAX_EXTENT_RATIO).contains(&ratio) {
                return false;
            }
        }
        linspace(x0, x1, SLOPE_SAMPLES)
            .into_iter()
            .all(|x| surface.deriv(x).abs() <= MAX_SLOPE)
    }

    fn refresh(&mut self) {
        let r = rotation(&self.params.theta);
        let surface = self.model.surface(&self.params);
        let points = self
            .model
            .intersect(&self.objective.camera, &r, &surface, &self.focal, &mut self.warm);
        self.cache = IntersectionCache {
            generation: self.generation,
            rotation: r,
            surface,
            points,
        };
        self.residuals = self.residual_vector();
        let norm = self.residuals.norm();
        if norm.is_finite()
            && self.best.as_ref().is_none_or(|(_, b)| norm < *b)
            && self.is_plausible_fit()
        {
            self.best = Some((self.params.clone(), norm));
        }
    }

    fn rows(&self) -> usize {
        self.objective.residual_count().max(self.scales.len())
    }

    /// Residual vector at the current parameters.
    pub fn residual_vector(&self) -> DVector<f64> {
        let obj = self.objective;
        let mut r = DVector::zeros(self.rows());
        let mut row = 0;
        let mut idx = 0;
        for (k, target) in obj.targets.iter().enumerate() {
            let l = self.params.heights[k];
            for w in &target.weights {
                let sp = &self.cache.points[idx];
                r[row] = if sp.is_finite() {
                    let v = w * (sp.xyz.y - l);
                    if obj.options.depth_scaling { v / -sp.t } else { v }
                } else {
                    MISS_PENALTY
                };
                row += 1;
                idx += 1;
            }
        }
        for a in &obj.aligns {
            let target = self.params.align[a.page][a.side.index()];
            for _ in &a.points {
                let sp = &self.cache.points[idx];
                r[row] = if sp.is_finite() {
                    obj.options.align_weight * (sp.xyz.x - target)
                } else {
                    MISS_PENALTY
                };
                row += 1;
                idx += 1;
            }
        }
        r
    }

    /// Jacobian with respect to the unscaled parameters.
    pub fn unscaled_jacobian(&self) -> DMatrix<f64> {
        let obj = self.objective;
        let layout = obj.layout();
        let f = obj.camera.f;
        let r = &self.cache.rotation;
        let dr = rotation_derivatives(&self.params.theta);
        let surface = &self.cache.surface;
        let mut jac = DMatrix::zeros(self.rows(), layout.len());

        // Per point: derivatives of (X, Y, t) with respect to every
        // parameter that moves the intersection, as (column, dX, dY, dt).
        let point_derivs = |p: &Vector3<f64>, sp: &SurfacePoint| -> Vec<(usize, f64, f64, f64)> {
            let t = sp.t;
            let b = r.row(0).transpose().dot(p);
            let c2 = r.row(1).transpose().dot(p);
            let d = r.row(2).transpose().dot(p);
            let gp = surface.deriv(sp.xyz.x);
            let den = d - gp * b;
            let mut out = Vec::with_capacity(3 + DEGREE + 1);
            for (k, drk) in dr.iter().enumerate() {
                let a = drk.row(0).transpose().dot(p) * t - f * drk[(0, 2)];
                let c = drk.row(2).transpose().dot(p) * t - f * drk[(2, 2)];
                let dt = -(c - gp * a) / den;
                let dy = drk.row(1).transpose().dot(p) * t - f * drk[(1, 2)] + c2 * dt;
                out.push((k, a + b * dt, dy, dt));
            }
            let (side, grad) = surface.coeff_gradient(sp.xyz.x);
            let base = layout.coeff(side);
            for (m, g) in grad.iter().enumerate() {
                let dt = g / den;
                out.push((base + m, b * dt, c2 * dt, dt));
            }
            if surface.is_split() {
                let dt = -gp / den;
                out.push((layout.seam(), b * dt, c2 * dt, dt));
            }
            out
        };

        let mut row = 0;
        let mut idx = 0;
        for (k, target) in obj.targets.iter().enumerate() {
            let l = self.params.heights[k];
            let col_l = layout.height(k);
            for (p, w) in target.points.iter().zip(&target.weights) {
                let sp = &self.cache.points[idx];
                if sp.is_finite() {
                    let u = sp.xyz.y - l;
                    if obj.options.depth_scaling {
                        let s = w / -sp.t;
                        for (col, _, dy, dt) in point_derivs(p, sp) {
                            jac[(row, col)] += s * (dy - u / sp.t * dt);
                        }
                        jac[(row, col_l)] = -s;
                    } else {
                        for (col, _, dy, _) in point_derivs(p, sp) {
                            jac[(row, col)] += w * dy;
                        }
                        jac[(row, col_l)] = -w;
                    }
                }
                row += 1;
                idx += 1;
            }
        }
        let cw = obj.options.align_weight;
        for a in &obj.aligns {
            let col_a = layout.align(a.page, a.side.index());
            for p in &a.points {
                let sp = &self.cache.points[idx];
                if sp.is_finite() {
                    for (col, dx, _, _) in point_derivs(p, sp) {
                        jac[(row, col)] += cw * dx;
                    }
                    jac[(row, col_a)] = -cw;
                }
                row += 1;
                idx += 1;
            }
        }
        jac
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for DewarpProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        let layout = self.objective.layout();
        let unscaled = x.component_mul(&self.scales);
        if let Ok(params) = Params::unpack(unscaled.as_slice(), layout.pages, layout.lines) {
            self.scaled.clone_from(x);
            self.params = params;
            self.generation += 1;
            self.refresh();
        }
    }

    fn params(&self) -> DVector<f64> {
        self.scaled.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        debug_assert_eq!(self.cache.generation, self.generation);
        Some(self.residuals.clone())
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let mut jac = self.unscaled_jacobian();
        for (j, s) in self.scales.iter().enumerate() {
            jac.column_mut(j).scale_mut(*s);
        }
        Some(jac)
    }
}
