//! Diagnostic overlays
//!
//! In-memory 32 bpp renderings of what the engine saw: the collated and
//! filtered lines, and the fitted surface projected back into the image.

use crate::DewarpResult;
use crate::camera::{Camera, rotation};
use crate::line::TextLine;
use crate::newton::is_plausible;
use crate::params::Params;
use crate::stats::{linspace, mean};
use crate::surface::SurfaceModel;
use folio_core::{Color, Pix, PixMut};
use nalgebra::Vector3;

const CURVE_SAMPLES: usize = 40;

fn canvas(source: &Pix) -> DewarpResult<PixMut> {
    Ok(source.convert_to_32()?.to_mut())
}

fn polyline(pm: &mut PixMut, points: &[(f64, f64)], width: u32, color: Color) {
    for pair in points.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        pm.render_line(a.0, a.1, b.0, b.1, width, color);
    }
}

/// Collated lines in red, filtered lines (their fitted baselines) in blue.
pub fn line_overlay(source: &Pix, all_lines: &[TextLine], lines: &[TextLine]) -> DewarpResult<Pix> {
    let mut pm = canvas(source)?;
    for line in all_lines {
        polyline(&mut pm, &line.base_points(), 1, Color::Red);
    }
    for line in lines {
        let Some(model) = line.model() else {
            continue;
        };
        let curve: Vec<(f64, f64)> = linspace(line.left(), line.right(), CURVE_SAMPLES)
            .into_iter()
            .map(|x| (x, model.eval(x)))
            .collect();
        polyline(&mut pm, &curve, 2, Color::Blue);
        if let Some(first) = line.first() {
            let (x, y) = first.base_point();
            pm.render_disk(x, y, 3, Color::Blue);
        }
    }
    Ok(pm.into())
}

/// Observed base points in red and the fitted surface in green.
///
/// Each line's base points are intersected with the surface; the surface
/// curve at the mean page-frame height of the hits is projected back into
/// the image across the X range they cover.
pub fn surface_overlay(
    source: &Pix,
    camera: &Camera,
    params: &Params,
    model: &dyn SurfaceModel,
    lines: &[TextLine],
) -> DewarpResult<Pix> {
    let mut pm = canvas(source)?;
    let r = rotation(&params.theta);
    let surface = model.surface(params);
    for line in lines {
        let base = line.base_points();
        for &(x, y) in &base {
            pm.render_disk(x, y, 2, Color::Red);
        }
        let points: Vec<Vector3<f64>> = base.iter().map(|&(x, y)| camera.focal_point(x, y)).collect();
        let mut warm = vec![f64::NAN; points.len()];
        let hits: Vec<Vector3<f64>> = model
            .intersect(camera, &r, &surface, &points, &mut warm)
            .into_iter()
            .filter(|sp| is_plausible(&surface, sp))
            .map(|sp| sp.xyz)
            .collect();
        if hits.len() < 2 {
            continue;
        }
        let height = mean(&hits.iter().map(|p| p.y).collect::<Vec<_>>());
        let x0 = hits.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let x1 = hits.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let curve: Vec<(f64, f64)> = linspace(x0, x1, CURVE_SAMPLES)
            .into_iter()
            .filter_map(|x| camera.project(&r, &Vector3::new(x, height, surface.eval(x))))
            .collect();
        polyline(&mut pm, &curve, 1, Color::Green);
    }
    Ok(pm.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::tests::sample_lines;
    use crate::surface::PolynomialSurface;
    use crate::types::CameraConfig;
    use folio_core::{PixelDepth, Polynomial, color};

    fn blank() -> Pix {
        let mut pm = PixMut::new(460, 360, PixelDepth::Bit8).unwrap();
        pm.set_all(255);
        pm.into()
    }

    #[test]
    fn test_line_overlay_marks_lines() {
        let all = sample_lines();
        let mut lines = all.clone();
        for (k, line) in lines.iter_mut().enumerate() {
            line.set_model(Polynomial::new(vec![56.0 + 50.0 * k as f64]));
        }
        let out = line_overlay(&blank(), &all, &lines).unwrap();
        assert_eq!(out.depth(), PixelDepth::Bit32);
        assert_eq!((out.width(), out.height()), (460, 360));
        // Base points of the first row sit at y = 56.
        let (r, g, b) = color::extract_rgb(out.get_pixel(47, 56).unwrap());
        assert!(b > r && b > g, "{:?}", (r, g, b));
        assert_eq!(out.get_pixel(5, 5), Some(color::compose_rgb(255, 255, 255)));
    }

    #[test]
    fn test_flat_surface_overlay_follows_base_points() {
        let lines = sample_lines();
        let cam = Camera::from_config(&CameraConfig::default(), 460, 360);
        let params = Params::initial(1, lines.len());
        let out = surface_overlay(&blank(), &cam, &params, &PolynomialSurface, &lines).unwrap();
        // The projected flat surface runs along the base points, between
        // the red disks.
        let (r, g, b) = color::extract_rgb(out.get_pixel(62, 56).unwrap());
        assert!(g > r && g > b, "{:?}", (r, g, b));
    }
}
