//! Distance maps
//!
//! [`distance_transform`] computes, for every ink pixel of a binary image,
//! the exact Euclidean distance to the nearest background pixel using the
//! separable lower-envelope algorithm of Felzenszwalb and Huttenlocher.
//! Pixels outside the image do not count as background.
//!
//! [`dilate_gray_3x3`] is a 3x3 grayscale max filter over an [`FPix`],
//! used to spread stroke-width estimates across a stroke.

use crate::error::{RegionError, RegionResult};
use folio_core::{FPix, Pix, PixelDepth};

const INF: f64 = 1e20;

/// Squared distance transform of a 1-D sampled function.
fn edt_1d(f: &[f64], out: &mut [f64], v: &mut [usize], z: &mut [f64]) {
    let n = f.len();
    if n == 0 {
        return;
    }
    let mut k = 0usize;
    v[0] = 0;
    z[0] = f64::NEG_INFINITY;
    z[1] = f64::INFINITY;
    for q in 1..n {
        let parabola = |p: usize| f[p] + (p * p) as f64;
        let mut s = (parabola(q) - parabola(v[k])) / (2.0 * (q - v[k]) as f64);
        while s <= z[k] {
            k -= 1;
            s = (parabola(q) - parabola(v[k])) / (2.0 * (q - v[k]) as f64);
        }
        k += 1;
        v[k] = q;
        z[k] = s;
        z[k + 1] = f64::INFINITY;
    }
    let mut k = 0usize;
    for (q, o) in out.iter_mut().enumerate().take(n) {
        while z[k + 1] < q as f64 {
            k += 1;
        }
        let d = q as f64 - v[k] as f64;
        *o = d * d + f[v[k]];
    }
}

/// Exact Euclidean distance from each ink pixel to the nearest background
/// pixel; background pixels get 0.
///
/// An image without any background pixel yields `f32::MAX` everywhere.
///
/// # Errors
///
/// Returns [`RegionError::UnsupportedDepth`] if the image is not 1 bpp.
pub fn distance_transform(pix: &Pix) -> RegionResult<FPix> {
    if pix.depth() != PixelDepth::Bit1 {
        return Err(RegionError::UnsupportedDepth {
            expected: "1 bpp",
            actual: pix.depth().bits(),
        });
    }
    let w = pix.width() as usize;
    let h = pix.height() as usize;
    let mut grid = vec![0.0f64; w * h];
    for y in 0..h {
        for x in 0..w {
            if pix.get_pixel_unchecked(x as u32, y as u32) != 0 {
                grid[y * w + x] = INF;
            }
        }
    }

    let n = w.max(h);
    let mut f = vec![0.0; n];
    let mut out = vec![0.0; n];
    let mut v = vec![0usize; n];
    let mut z = vec![0.0; n + 1];

    // columns
    for x in 0..w {
        for y in 0..h {
            f[y] = grid[y * w + x];
        }
        edt_1d(&f[..h], &mut out[..h], &mut v, &mut z);
        for y in 0..h {
            grid[y * w + x] = out[y];
        }
    }
    // rows
    for y in 0..h {
        f[..w].copy_from_slice(&grid[y * w..(y + 1) * w]);
        edt_1d(&f[..w], &mut out[..w], &mut v, &mut z);
        grid[y * w..(y + 1) * w].copy_from_slice(&out[..w]);
    }

    let mut result = FPix::new(pix.width(), pix.height())?;
    for (dst, &sq) in result.data_mut().iter_mut().zip(&grid) {
        *dst = if sq >= INF / 2.0 {
            f32::MAX
        } else {
            sq.sqrt() as f32
        };
    }
    Ok(result)
}

/// 3x3 grayscale dilation (max filter). Borders use the in-image neighbors.
pub fn dilate_gray_3x3(src: &FPix) -> FPix {
    let w = src.width() as i64;
    let h = src.height() as i64;
    let mut dst = src.clone();
    let data = src.data();
    for y in 0..h {
        for x in 0..w {
            let mut m = f32::NEG_INFINITY;
            for dy in -1..=1 {
                let yy = y + dy;
                if yy < 0 || yy >= h {
                    continue;
                }
                for dx in -1..=1 {
                    let xx = x + dx;
                    if xx < 0 || xx >= w {
                        continue;
                    }
                    m = m.max(data[(yy * w + xx) as usize]);
                }
            }
            dst.data_mut()[(y * w + x) as usize] = m;
        }
    }
    dst
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::PixMut;

    #[test]
    fn test_distance_filled_square() {
        let mut pm = PixMut::new(9, 9, PixelDepth::Bit1).unwrap();
        for y in 2..7 {
            for x in 2..7 {
                pm.set_pixel(x, y, 1).unwrap();
            }
        }
        let pix: Pix = pm.into();
        let d = distance_transform(&pix).unwrap();
        assert_eq!(d.get_pixel(0, 0).unwrap(), 0.0);
        assert_eq!(d.get_pixel(2, 4).unwrap(), 1.0);
        assert_eq!(d.get_pixel(3, 4).unwrap(), 2.0);
        assert_eq!(d.get_pixel(4, 4).unwrap(), 3.0);
        assert_eq!(d.get_pixel(3, 3).unwrap(), 2.0);
    }

    #[test]
    fn test_distance_is_euclidean() {
        // Single background pixel at the origin of an all-ink image.
        let mut pm = PixMut::new(6, 6, PixelDepth::Bit1).unwrap();
        pm.set_all(0);
        for y in 0..6 {
            for x in 0..6 {
                if (x, y) != (0, 0) {
                    pm.set_pixel(x, y, 1).unwrap();
                }
            }
        }
        let pix: Pix = pm.into();
        let d = distance_transform(&pix).unwrap();
        assert!((d.get_pixel(3, 4).unwrap() - 5.0).abs() < 1e-6);
        assert!((d.get_pixel(1, 1).unwrap() - 2f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_dilate_spreads_max() {
        let mut f = FPix::new(5, 5).unwrap();
        f.set_pixel(2, 2, 7.0).unwrap();
        let d = dilate_gray_3x3(&f);
        assert_eq!(d.get_pixel(1, 1).unwrap(), 7.0);
        assert_eq!(d.get_pixel(3, 3).unwrap(), 7.0);
        assert_eq!(d.get_pixel(0, 0).unwrap(), 0.0);
        let d2 = dilate_gray_3x3(&d);
        assert_eq!(d2.get_pixel(0, 0).unwrap(), 7.0);
    }
}
