//! Synthetic page images
//!
//! [`render_text_page`] draws rows of glyph-like shapes on a flat page.
//! Each glyph is a 3-pixel stroked box with a vertical bar, so every glyph
//! is one 4-connected component with a uniform stroke width.
//!
//! [`curl_cylinder`] re-renders a flat page as seen by a pinhole camera
//! looking at the page bent into the surface `Z = c * X^2`. The camera sits
//! at `(0, 0, -f)` facing the page center, so a flat page (c = 0)
//! reproduces the input exactly. The mapping is
//! computed in closed form, independently of any fitting code.

use folio_core::{Pix, PixMut, PixelDepth};

/// Layout of a synthetic text page
#[derive(Debug, Clone)]
pub struct TextPageSpec {
    /// Page width in pixels
    pub width: u32,
    /// Page height in pixels
    pub height: u32,
    /// Blank margin on every side
    pub margin: u32,
    /// Glyph height (the text x-height)
    pub glyph_height: u32,
    /// Distance between consecutive baselines
    pub line_pitch: u32,
    /// Stroke width of the glyph outlines
    pub stroke: u32,
}

impl Default for TextPageSpec {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 800,
            margin: 70,
            glyph_height: 20,
            line_pitch: 42,
            stroke: 3,
        }
    }
}

impl TextPageSpec {
    /// Baseline y coordinate of every rendered line.
    pub fn baselines(&self) -> Vec<u32> {
        let first = self.margin + self.glyph_height;
        let last = self.height.saturating_sub(self.margin);
        (0..)
            .map(|i| first + i * self.line_pitch)
            .take_while(|&b| b <= last)
            .collect()
    }
}

fn fill_rect(pm: &mut PixMut, x0: u32, y0: u32, w: u32, h: u32) {
    for y in y0..(y0 + h).min(pm.height()) {
        for x in x0..(x0 + w).min(pm.width()) {
            pm.set_pixel_unchecked(x, y, 1);
        }
    }
}

/// Render a flat page of glyph rows as a 1 bpp ink mask.
///
/// Glyph widths (10 to 22 pixels) and gaps (5 to 9 pixels) follow a fixed
/// pattern, so the output is deterministic.
pub fn render_text_page(spec: &TextPageSpec) -> Pix {
    let mut pm = PixMut::new(spec.width.max(1), spec.height.max(1), PixelDepth::Bit1)
        .expect("page dimensions are non-zero");
    let h = spec.glyph_height;
    let s = spec.stroke;
    for (line, baseline) in spec.baselines().into_iter().enumerate() {
        let top = baseline - h;
        let mut x = spec.margin;
        let mut i = 0u32;
        loop {
            let w = 10 + (i * 7 + line as u32 * 3) % 13;
            if x + w > spec.width.saturating_sub(spec.margin) {
                break;
            }
            fill_rect(&mut pm, x, top, w, s);
            fill_rect(&mut pm, x, baseline - s, w, s);
            fill_rect(&mut pm, x, top, s, h);
            fill_rect(&mut pm, x + w - s, top, s, h);
            fill_rect(&mut pm, x + w / 2 - 1, top, s, h);
            x += w + 5 + (i * 3 + line as u32) % 5;
            i += 1;
        }
    }
    pm.into()
}

/// Arc length of `Z = c X^2` from 0 to `x`.
fn parabola_arc(c: f64, x: f64) -> f64 {
    if c.abs() < 1e-15 {
        return x;
    }
    let u = 2.0 * c * x;
    (u * (1.0 + u * u).sqrt() + u.asinh()) / (4.0 * c)
}

/// View a flat page bent into the cylinder `Z = curvature * X^2`.
///
/// The page is unrolled isometrically along X; `focal` is the camera
/// distance in pixels. Output pixels whose ray misses the page, or which
/// land outside the flat page, are background. Works on 1, 8 and 32 bpp
/// images (nearest-neighbor sampling).
pub fn curl_cylinder(flat: &Pix, curvature: f64, focal: f64) -> Pix {
    let w = flat.width();
    let h = flat.height();
    let ox = w as f64 / 2.0;
    let oy = h as f64 / 2.0;
    let background = match flat.depth() {
        PixelDepth::Bit1 => 0,
        PixelDepth::Bit8 => 255,
        PixelDepth::Bit32 => folio_core::color::compose_rgb(255, 255, 255),
    };
    let mut out = flat.create_template().to_mut();
    for v in 0..h {
        for u in 0..w {
            let px = u as f64 - ox;
            let py = v as f64 - oy;
            // Ray point t * (px, py, -f) - (0, 0, f) lies on the page when
            // -f (t + 1) = c (t px)^2; take the root near t = -1.
            let a = curvature * px * px;
            let t = if a.abs() < 1e-12 {
                -1.0
            } else {
                let disc = focal * focal - 4.0 * a * focal;
                if disc < 0.0 {
                    out.set_pixel_unchecked(u, v, background);
                    continue;
                }
                (-focal + disc.sqrt()) / (2.0 * a)
            };
            let sx = t * px;
            let sy = t * py;
            // The flat page seen from the same camera has x = ox - X.
            let fx = ox - parabola_arc(curvature, sx);
            let fy = oy - sy;
            let (xi, yi) = (fx.round(), fy.round());
            let val = if xi >= 0.0 && yi >= 0.0 && xi < w as f64 && yi < h as f64 {
                flat.get_pixel_unchecked(xi as u32, yi as u32)
            } else {
                background
            };
            out.set_pixel_unchecked(u, v, val);
        }
    }
    out.into()
}
