//! Arc-length mesh on the fitted surface
//!
//! The mesh is built in the page frame: columns are spaced evenly along
//! the arc of `Z = g(X)`, rows evenly in Y. Every node is projected back
//! into the source image, so destination pixel `(c, r)` of the dewarped
//! page samples the source at `mesh(r, c)`.

use crate::camera::{Camera, rotation};
use crate::line::TextLine;
use crate::newton::is_plausible;
use crate::params::Params;
use crate::stats::{linspace, mean, percentile};
use crate::surface::{Surface, SurfaceModel};
use crate::types::DEFAULT_FOCAL_LENGTH;
use folio_transform::{RemapGrid, TransformResult};
use nalgebra::{Matrix3, Vector3};
use tracing::{debug, warn};

/// Number of X samples used to measure the arc
const ARC_SAMPLES: usize = 400;

/// Relative expansion of the page-frame box on every side
const BOX_EXPANSION: f64 = 0.02;

/// Coordinates beyond this magnitude reject the focal rescale
const MAX_COORDINATE: f64 = 1e6;

/// Smallest arc length, relative to the box height, used for the row count
const MIN_ARC_RATIO: f64 = 0.25;

/// Largest row count, relative to the column count
const MAX_ROW_RATIO: usize = 4;

/// Grid of source-image coordinates, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    rows: usize,
    cols: usize,
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl Mesh {
    /// Build a mesh by evaluating `f(row, col)`.
    pub fn from_fn<F>(rows: usize, cols: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> (f64, f64),
    {
        let mut xs = Vec::with_capacity(rows * cols);
        let mut ys = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                let (x, y) = f(r, c);
                xs.push(x);
                ys.push(y);
            }
        }
        Self { rows, cols, xs, ys }
    }

    /// Identity mesh of an image
    pub fn identity(width: u32, height: u32) -> Self {
        Self::from_fn(height as usize, width as usize, |r, c| (c as f64, r as f64))
    }

    /// Number of rows (output height)
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns (output width)
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Source coordinate of node `(row, col)`
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> (f64, f64) {
        let i = row * self.cols + col;
        (self.xs[i], self.ys[i])
    }

    /// Finite bounding box `(x0, y0, x1, y1)` of the node coordinates.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let mut b: Option<(f64, f64, f64, f64)> = None;
        for (&x, &y) in self.xs.iter().zip(&self.ys) {
            if !(x.is_finite() && y.is_finite()) {
                continue;
            }
            b = Some(match b {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
        b
    }

    fn scale_about_center(&self, factor: f64) -> Option<Self> {
        let (x0, y0, x1, y1) = self.bounds()?;
        let (cx, cy) = ((x0 + x1) / 2.0, (y0 + y1) / 2.0);
        Some(Self {
            rows: self.rows,
            cols: self.cols,
            xs: self.xs.iter().map(|x| cx + (x - cx) * factor).collect(),
            ys: self.ys.iter().map(|y| cy + (y - cy) * factor).collect(),
        })
    }

    fn column_mean_x(&self, col: usize) -> f64 {
        let v: Vec<f64> = (0..self.rows).map(|r| self.get(r, col).0).collect();
        mean(&v)
    }

    fn row_mean_y(&self, row: usize) -> f64 {
        let v: Vec<f64> = (0..self.cols).map(|c| self.get(row, c).1).collect();
        mean(&v)
    }

    /// Flip columns and rows so that x grows with the column index and y
    /// with the row index.
    pub fn orient(&mut self) {
        if self.cols > 1 && self.column_mean_x(0) > self.column_mean_x(self.cols - 1) {
            for r in 0..self.rows {
                let row = r * self.cols..(r + 1) * self.cols;
                self.xs[row.clone()].reverse();
                self.ys[row].reverse();
            }
        }
        if self.rows > 1 && self.row_mean_y(0) > self.row_mean_y(self.rows - 1) {
            let cols = self.cols;
            for r in 0..self.rows / 2 {
                let o = self.rows - 1 - r;
                for c in 0..cols {
                    self.xs.swap(r * cols + c, o * cols + c);
                    self.ys.swap(r * cols + c, o * cols + c);
                }
            }
        }
    }

    /// Destination pixel `(col, row)` of the node nearest to source point
    /// `(x, y)`.
    pub fn nearest_node(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let mut best: Option<(f64, usize)> = None;
        for (i, (&mx, &my)) in self.xs.iter().zip(&self.ys).enumerate() {
            let d = (mx - x).powi(2) + (my - y).powi(2);
            if d.is_finite() && best.is_none_or(|(bd, _)| d < bd) {
                best = Some((d, i));
            }
        }
        best.map(|(_, i)| ((i % self.cols) as f64, (i / self.cols) as f64))
    }

    /// Remap grid for [`folio_transform::remap`].
    pub fn to_grid(&self) -> TransformResult<RemapGrid> {
        RemapGrid::new(
            self.cols as u32,
            self.rows as u32,
            self.xs.clone(),
            self.ys.clone(),
        )
    }
}

/// Sizing knobs for [`make_meshes`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshOptions {
    /// Fixed column count, overriding the derived one
    pub width: Option<u32>,
    /// Lower bound for the derived column count (capped by the image width)
    pub min_width: u32,
    /// Source image width
    pub image_width: u32,
}

/// Meshes of one fitted model
#[derive(Debug, Clone)]
pub struct MeshSet {
    /// One mesh, or one per side of the seam ordered left to right
    pub meshes: Vec<Mesh>,
    /// The arc length was degenerate and the box width was used instead
    pub used_fallback: bool,
    /// The focal rescale blew up and was dropped
    pub rescale_fallback: bool,
}

/// Column count for a set of lines.
pub fn mesh_width(lines: &[TextLine], opts: &MeshOptions) -> usize {
    if let Some(w) = opts.width {
        return w.max(2) as usize;
    }
    let widths: Vec<f64> = lines.iter().map(TextLine::width).collect();
    let p90 = percentile(&widths, 90.0);
    let floor = opts.min_width.min(opts.image_width) as f64;
    let w = if p90.is_finite() {
        (1.2 * p90).max(floor)
    } else {
        floor
    };
    (w.round() as usize).max(2)
}

/// Page-frame points of every letter corner that hit the surface.
fn surface_corners(
    camera: &Camera,
    r: &Matrix3<f64>,
    surface: &Surface,
    model: &dyn SurfaceModel,
    lines: &[TextLine],
) -> Vec<Vector3<f64>> {
    let focal: Vec<Vector3<f64>> = lines
        .iter()
        .flat_map(|l| l.letters().iter().flat_map(|t| t.corners()))
        .map(|(x, y)| camera.focal_point(x, y))
        .collect();
    let mut warm = vec![f64::NAN; focal.len()];
    model
        .intersect(camera, r, surface, &focal, &mut warm)
        .into_iter()
        .filter(|sp| is_plausible(surface, sp))
        .map(|sp| sp.xyz)
        .collect()
}

/// Row count for a mesh of `n_w` columns over `arc` by `height`.
///
/// The arc is clamped from below to a quarter of the height and the result
/// to four times the column count; the flag reports whether a clamp fired.
pub fn row_count(n_w: usize, height: f64, arc: f64) -> (usize, bool) {
    let height = height.abs();
    let min_arc = height * MIN_ARC_RATIO;
    let (arc, short) = if !arc.is_finite() || arc < min_arc {
        (min_arc.max(1.0), true)
    } else {
        (arc, false)
    };
    let rows = (n_w as f64 * height / arc).round();
    let cap = n_w.max(2) * MAX_ROW_RATIO;
    let rows = if rows.is_finite() { rows as usize } else { cap };
    if rows > cap {
        return (cap, true);
    }
    (rows.max(2), short)
}

struct Built {
    mesh: Mesh,
    used_fallback: bool,
    rescale_fallback: bool,
}

fn build_mesh(
    camera: &Camera,
    r: &Matrix3<f64>,
    surface: &Surface,
    points: &[Vector3<f64>],
    n_w: usize,
) -> Built {
    let (mut x0, mut y0, mut x1, mut y1) = points.iter().fold(
        (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        |(a, b, c, d), p| (a.min(p.x), b.min(p.y), c.max(p.x), d.max(p.y)),
    );
    let (dx, dy) = ((x1 - x0) * BOX_EXPANSION, (y1 - y0) * BOX_EXPANSION);
    x0 -= dx;
    x1 += dx;
    y0 -= dy;
    y1 += dy;

    let xs = linspace(x0, x1, ARC_SAMPLES);
    let zs: Vec<f64> = xs.iter().map(|&x| surface.eval(x)).collect();
    let mut cum = Vec::with_capacity(ARC_SAMPLES);
    cum.push(0.0);
    for i in 1..ARC_SAMPLES {
        let seg = (xs[i] - xs[i - 1]).hypot(zs[i] - zs[i - 1]);
        cum.push(cum[i - 1] + seg);
    }
    let mut arc = cum[ARC_SAMPLES - 1];
    let degenerate = !arc.is_finite() || arc <= 1e-6;
    let columns: Vec<f64> = if degenerate {
        arc = (x1 - x0).abs().max(1.0);
        linspace(x0, x1, n_w)
    } else {
        linspace(0.0, arc, n_w)
            .into_iter()
            .map(|s| {
                let i = cum.partition_point(|&c| c < s).clamp(1, ARC_SAMPLES - 1);
                let span = cum[i] - cum[i - 1];
                let u = if span > 0.0 { (s - cum[i - 1]) / span } else { 0.0 };
                xs[i - 1] + u * (xs[i] - xs[i - 1])
            })
            .collect()
    };

    let (n_h, clamped) = row_count(n_w, y1 - y0, arc);
    if clamped {
        warn!(arc, height = y1 - y0, rows = n_h, "mesh row count clamped");
    }
    let used_fallback = degenerate || clamped;
    let rows = linspace(y0, y1, n_h);
    let unscaled = Mesh::from_fn(n_h, n_w, |ri, ci| {
        let x = columns[ci];
        let xyz = Vector3::new(x, rows[ri], surface.eval(x));
        camera.project(r, &xyz).unwrap_or((f64::NAN, f64::NAN))
    });

    let factor = (camera.f / DEFAULT_FOCAL_LENGTH).clamp(0.5, 2.0);
    let (mut mesh, rescale_fallback) = if (factor - 1.0).abs() > 1e-12 {
        match unscaled.scale_about_center(factor) {
            Some(scaled)
                if scaled
                    .xs
                    .iter()
                    .chain(&scaled.ys)
                    .all(|v| !v.is_finite() || v.abs() <= MAX_COORDINATE) =>
            {
                (scaled, false)
            }
            _ => (unscaled, true),
        }
    } else {
        (unscaled, false)
    };
    mesh.orient();
    Built {
        mesh,
        used_fallback,
        rescale_fallback,
    }
}

/// Build the dewarping mesh(es) of a fitted model.
///
/// Letter corners of `lines` are intersected with the surface from fresh
/// warm starts; implausible hits are dropped. Returns `None` when no
/// corner survives. A split surface yields one mesh per side of the seam,
/// ordered by image x.
pub fn make_meshes(
    camera: &Camera,
    params: &Params,
    model: &dyn SurfaceModel,
    lines: &[TextLine],
    opts: &MeshOptions,
) -> Option<MeshSet> {
    let r = rotation(&params.theta);
    let surface = model.surface(params);
    let corners = surface_corners(camera, &r, &surface, model, lines);
    if corners.is_empty() {
        warn!("no letter corner hit the fitted surface");
        return None;
    }
    let n_w = mesh_width(lines, opts);

    let groups: Vec<Vec<Vector3<f64>>> = if surface.is_split() {
        let (lower, upper): (Vec<_>, Vec<_>) =
            corners.into_iter().partition(|p| surface.side(p.x) == 0);
        [lower, upper].into_iter().filter(|g| !g.is_empty()).collect()
    } else {
        vec![corners]
    };

    let mut set = MeshSet {
        meshes: Vec::with_capacity(groups.len()),
        used_fallback: false,
        rescale_fallback: false,
    };
    for g in &groups {
        let built = build_mesh(camera, &r, &surface, g, n_w);
        debug!(
            rows = built.mesh.rows(),
            cols = built.mesh.cols(),
            fallback = built.used_fallback,
            "mesh built"
        );
        set.used_fallback |= built.used_fallback;
        set.rescale_fallback |= built.rescale_fallback;
        set.meshes.push(built.mesh);
    }
    set.meshes.sort_by(|a, b| {
        let ax = a.bounds().map_or(f64::INFINITY, |b| b.0);
        let bx = b.bounds().map_or(f64::INFINITY, |b| b.0);
        ax.total_cmp(&bx)
    });
    Some(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::tests::sample_lines;
    use crate::surface::PolynomialSurface;
    use crate::types::CameraConfig;

    fn opts(width: Option<u32>) -> MeshOptions {
        MeshOptions {
            width,
            min_width: 1800,
            image_width: 460,
        }
    }

    #[test]
    fn test_flat_mesh_is_affine_identity() {
        let cam = Camera::from_config(&CameraConfig::default(), 460, 360);
        let lines = sample_lines();
        let params = Params::initial(1, lines.len());
        let set = make_meshes(&cam, &params, &PolynomialSurface, &lines, &opts(None)).unwrap();
        assert_eq!(set.meshes.len(), 1);
        assert!(!set.used_fallback && !set.rescale_fallback);
        let mesh = &set.meshes[0];
        // The text spans x 40..384 and y 40..306; the box adds 2%.
        let (x0, y0, x1, y1) = mesh.bounds().unwrap();
        assert!((x0 - (40.0 - 0.02 * 344.0)).abs() < 1e-6, "x0 {}", x0);
        assert!((x1 - (384.0 + 0.02 * 344.0)).abs() < 1e-6);
        assert!((y0 - (40.0 - 0.02 * 266.0)).abs() < 1e-6);
        assert!((y1 - (306.0 + 0.02 * 266.0)).abs() < 1e-6);
        // Columns and rows run left to right and top to bottom, evenly.
        let step = (x1 - x0) / (mesh.cols() - 1) as f64;
        for c in 0..mesh.cols() {
            let (x, y) = mesh.get(0, c);
            assert!((x - (x0 + step * c as f64)).abs() < 1e-6);
            assert!((y - y0).abs() < 1e-6);
        }
        // Square pixels: rows follow the same spacing.
        let aspect = (y1 - y0) / (mesh.rows() - 1) as f64 / step;
        assert!((aspect - 1.0).abs() < 0.02, "aspect {}", aspect);
    }

    #[test]
    fn test_mesh_width_rules() {
        let lines = sample_lines();
        // Image width caps the 1800 floor.
        assert_eq!(mesh_width(&lines, &opts(None)), 460);
        assert_eq!(mesh_width(&lines, &opts(Some(77))), 77);
        let wide = MeshOptions {
            width: None,
            min_width: 100,
            image_width: 460,
        };
        // 1.2 * 344
        assert_eq!(mesh_width(&lines, &wide), 413);
    }

    #[test]
    fn test_split_surface_yields_two_meshes() {
        let cam = Camera::from_config(&CameraConfig::default(), 460, 360);
        let lines = sample_lines();
        let params = Params::initial(2, lines.len());
        let set = make_meshes(&cam, &params, &PolynomialSurface, &lines, &opts(Some(50))).unwrap();
        assert_eq!(set.meshes.len(), 2);
        let a = set.meshes[0].bounds().unwrap();
        let b = set.meshes[1].bounds().unwrap();
        assert!(a.0 < b.0);
        // Seam at X = 0 is image x = 230.
        assert!(a.2 <= 231.0 && b.0 >= 229.0, "{:?} {:?}", a, b);
    }

    #[test]
    fn test_focal_rescale_scales_about_center() {
        let cfg = CameraConfig::default().with_focal_length(2.0 * DEFAULT_FOCAL_LENGTH);
        let cam = Camera::from_config(&cfg, 460, 360);
        let lines = sample_lines();
        let params = Params::initial(1, lines.len());
        let set = make_meshes(&cam, &params, &PolynomialSurface, &lines, &opts(Some(40))).unwrap();
        let (x0, _, x1, _) = set.meshes[0].bounds().unwrap();
        assert!((x1 - x0 - 2.0 * 1.04 * 344.0).abs() < 1e-6);
        assert!(!set.rescale_fallback);
    }

    #[test]
    fn test_row_count_is_bounded() {
        // Square cells when the arc is sane.
        assert_eq!(row_count(100, 50.0, 100.0), (50, false));
        assert_eq!(row_count(1, 50.0, 100.0), (2, false));
        // A tiny but nonzero arc over a 300 px box is clamped.
        let (rows, clamped) = row_count(460, 300.0, 1e-5);
        assert!(clamped);
        assert_eq!(rows, 1840);
        assert!(row_count(460, 300.0, f64::NAN).1);
        // A long, flat box keeps its aspect ratio within the cap.
        assert_eq!(row_count(10, 1000.0, 200.0), (40, true));
    }

    #[test]
    fn test_steep_surface_mesh_stays_small() {
        let cam = Camera::from_config(&CameraConfig::default(), 460, 360);
        let lines = sample_lines();
        let mut params = Params::initial(1, lines.len());
        params.coeffs[0][0] = 50.0;
        let Some(set) = make_meshes(&cam, &params, &PolynomialSurface, &lines, &opts(Some(100)))
        else {
            return;
        };
        for mesh in &set.meshes {
            assert!(mesh.rows() <= 400, "rows {}", mesh.rows());
        }
    }

    #[test]
    fn test_orient_and_nearest_node() {
        let mut m = Mesh::from_fn(3, 4, |r, c| (30.0 - 10.0 * c as f64, 20.0 - 10.0 * r as f64));
        m.orient();
        assert_eq!(m.get(0, 0), (0.0, 0.0));
        assert_eq!(m.get(2, 3), (30.0, 20.0));
        assert_eq!(m.nearest_node(21.0, 9.0), Some((2.0, 1.0)));
    }
}
