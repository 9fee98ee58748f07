//! Mesh remapping
//!
//! A [`RemapGrid`] stores, for every destination pixel, the source image
//! coordinate it samples. [`remap`] resamples the source through the grid.
//!
//! Source coordinates within half a pixel of the image are sampled with
//! edge replication; anything further out takes the border fill value.

use crate::{TransformError, TransformResult};
use folio_core::{Pix, PixMut, PixelDepth, color};

/// Interpolation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// 2x2 neighborhood
    #[default]
    Bilinear,
    /// 4x4 neighborhood, cubic convolution (a = -0.75)
    Bicubic,
}

/// Background fill for pixels that map outside the source image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BorderFill {
    /// Fill with white pixels
    #[default]
    White,
    /// Fill with black pixels
    Black,
}

impl BorderFill {
    /// Fill value for a specific pixel depth
    pub fn to_value(self, depth: PixelDepth) -> u32 {
        match (self, depth) {
            (BorderFill::White, PixelDepth::Bit1) => 0,
            (BorderFill::White, PixelDepth::Bit8) => 255,
            (BorderFill::White, PixelDepth::Bit32) => color::compose_rgb(255, 255, 255),
            (BorderFill::Black, PixelDepth::Bit1) => 1,
            (BorderFill::Black, PixelDepth::Bit8) => 0,
            (BorderFill::Black, PixelDepth::Bit32) => color::compose_rgb(0, 0, 0),
        }
    }
}

/// Source coordinates for every destination pixel, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct RemapGrid {
    width: u32,
    height: u32,
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl RemapGrid {
    /// Build a grid from explicit coordinate arrays.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::InvalidParameters`] if the grid is empty
    /// or the arrays do not hold `width * height` values.
    pub fn new(width: u32, height: u32, xs: Vec<f64>, ys: Vec<f64>) -> TransformResult<Self> {
        let n = width as usize * height as usize;
        if n == 0 || xs.len() != n || ys.len() != n {
            return Err(TransformError::InvalidParameters(format!(
                "remap grid {}x{} needs {} coordinates, got {} / {}",
                width,
                height,
                n,
                xs.len(),
                ys.len()
            )));
        }
        Ok(Self {
            width,
            height,
            xs,
            ys,
        })
    }

    /// Build a grid by evaluating `f(col, row) -> (x, y)` at every node.
    pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> TransformResult<Self>
    where
        F: FnMut(u32, u32) -> (f64, f64),
    {
        let n = width as usize * height as usize;
        let mut xs = Vec::with_capacity(n);
        let mut ys = Vec::with_capacity(n);
        for r in 0..height {
            for c in 0..width {
                let (x, y) = f(c, r);
                xs.push(x);
                ys.push(y);
            }
        }
        Self::new(width, height, xs, ys)
    }

    /// Number of destination columns
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Number of destination rows
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Source coordinate sampled by destination (col, row).
    #[inline]
    pub fn get(&self, col: u32, row: u32) -> (f64, f64) {
        let i = row as usize * self.width as usize + col as usize;
        (self.xs[i], self.ys[i])
    }

    /// Mutable access to the x and y coordinate arrays.
    pub fn coords_mut(&mut self) -> (&mut [f64], &mut [f64]) {
        (&mut self.xs, &mut self.ys)
    }
}

fn cubic_weight(t: f64) -> f64 {
    const A: f64 = -0.75;
    let t = t.abs();
    if t <= 1.0 {
        ((A + 2.0) * t - (A + 3.0)) * t * t + 1.0
    } else if t < 2.0 {
        ((A * t - 5.0 * A) * t + 8.0 * A) * t - 4.0 * A
    } else {
        0.0
    }
}

/// Interpolate one channel; `sample` reads a clamped in-image value.
fn interpolate<S: Fn(i64, i64) -> f64>(x: f64, y: f64, method: Interpolation, sample: S) -> f64 {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (ix, iy) = (x0 as i64, y0 as i64);
    match method {
        Interpolation::Bilinear => {
            let top = sample(ix, iy) * (1.0 - fx) + sample(ix + 1, iy) * fx;
            let bot = sample(ix, iy + 1) * (1.0 - fx) + sample(ix + 1, iy + 1) * fx;
            top * (1.0 - fy) + bot * fy
        }
        Interpolation::Bicubic => {
            let wx = [
                cubic_weight(1.0 + fx),
                cubic_weight(fx),
                cubic_weight(1.0 - fx),
                cubic_weight(2.0 - fx),
            ];
            let wy = [
                cubic_weight(1.0 + fy),
                cubic_weight(fy),
                cubic_weight(1.0 - fy),
                cubic_weight(2.0 - fy),
            ];
            let mut acc = 0.0;
            for (j, wyj) in wy.iter().enumerate() {
                let mut row = 0.0;
                for (i, wxi) in wx.iter().enumerate() {
                    row += wxi * sample(ix - 1 + i as i64, iy - 1 + j as i64);
                }
                acc += wyj * row;
            }
            acc
        }
    }
}

/// Resample `pix` through `grid`.
///
/// 8 and 32 bpp images keep their depth; 1 bpp images are converted to
/// 8 bpp grayscale first.
pub fn remap(
    pix: &Pix,
    grid: &RemapGrid,
    method: Interpolation,
    fill: BorderFill,
) -> TransformResult<Pix> {
    let src = match pix.depth() {
        PixelDepth::Bit1 => pix.convert_to_8()?,
        _ => pix.clone(),
    };
    let depth = src.depth();
    let sw = src.width() as i64;
    let sh = src.height() as i64;
    let mut out = PixMut::new(grid.width(), grid.height(), depth)?;
    let fill_value = fill.to_value(depth);

    let clamped = |x: i64, y: i64| -> u32 {
        src.get_pixel_unchecked(x.clamp(0, sw - 1) as u32, y.clamp(0, sh - 1) as u32)
    };

    for r in 0..grid.height() {
        for c in 0..grid.width() {
            let (x, y) = grid.get(c, r);
            let inside = x.is_finite()
                && y.is_finite()
                && x >= -0.5
                && y >= -0.5
                && x <= sw as f64 - 0.5
                && y <= sh as f64 - 0.5;
            if !inside {
                out.set_pixel_unchecked(c, r, fill_value);
                continue;
            }
            let val = match depth {
                PixelDepth::Bit32 => {
                    let channel = |shift: u32| {
                        let v = interpolate(x, y, method, |xx, yy| {
                            ((clamped(xx, yy) >> shift) & 0xff) as f64
                        });
                        v.round().clamp(0.0, 255.0) as u8
                    };
                    color::compose_rgb(
                        channel(color::RED_SHIFT),
                        channel(color::GREEN_SHIFT),
                        channel(color::BLUE_SHIFT),
                    )
                }
                _ => {
                    let v = interpolate(x, y, method, |xx, yy| clamped(xx, yy) as f64);
                    v.round().clamp(0.0, 255.0) as u32
                }
            };
            out.set_pixel_unchecked(c, r, val);
        }
    }
    Ok(out.into())
}
