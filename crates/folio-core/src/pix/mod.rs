//! Pix - The main image container
//!
//! `Pix` holds binary, grayscale or RGB raster data.
//!
//! # Pixel layout
//!
//! - Image data is stored in 32-bit words
//! - Every row starts on a 32-bit boundary
//! - Pixels are packed MSB to LSB within each word
//! - For 32-bit images, color order is RGBA (red in MSB)
//! - In 1-bit images a set bit is foreground (ink)
//!
//! # Ownership model
//!
//! `Pix` uses `Arc` for cheap cloning (shared ownership).
//! To modify pixel data, convert to `PixMut` via [`Pix::try_into_mut`]
//! or [`Pix::to_mut`], then convert back with `Into<Pix>`.

mod access;
pub mod convert;
pub mod graphics;

pub use graphics::Color;

use crate::error::{Error, Result};
use std::sync::Arc;

/// Pixel depth (bits per pixel)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PixelDepth {
    /// 1-bit binary image, 1 = ink
    Bit1 = 1,
    /// 8-bit grayscale, 0 = black
    Bit8 = 8,
    /// 32-bit RGB
    Bit32 = 32,
}

impl PixelDepth {
    /// Get the number of bits per pixel.
    pub fn bits(self) -> u32 {
        self as u32
    }

    /// Get the maximum pixel value representable at this depth.
    pub fn max_value(self) -> u32 {
        match self {
            PixelDepth::Bit32 => u32::MAX,
            _ => (1u32 << self.bits()) - 1,
        }
    }
}

/// Internal PIX data
#[derive(Debug, Clone)]
struct PixData {
    width: u32,
    height: u32,
    depth: PixelDepth,
    /// 32-bit words per line
    wpl: u32,
    /// The image data (packed 32-bit words)
    data: Vec<u32>,
}

impl PixData {
    fn new(width: u32, height: u32, depth: PixelDepth) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimension { width, height });
        }
        let wpl = compute_wpl(width, depth);
        Ok(Self {
            width,
            height,
            depth,
            wpl,
            data: vec![0u32; wpl as usize * height as usize],
        })
    }
}

/// Compute words per line for given width and depth.
#[inline]
fn compute_wpl(width: u32, depth: PixelDepth) -> u32 {
    let bits_per_line = u64::from(width) * u64::from(depth.bits());
    bits_per_line.div_ceil(32) as u32
}

/// Immutable, reference-counted raster image.
///
/// # Examples
///
/// ```
/// use folio_core::{Pix, PixelDepth};
///
/// let pix = Pix::new(640, 480, PixelDepth::Bit1).unwrap();
/// assert_eq!(pix.depth(), PixelDepth::Bit1);
/// assert_eq!(pix.get_pixel(10, 10), Some(0));
/// ```
#[derive(Debug, Clone)]
pub struct Pix {
    inner: Arc<PixData>,
}

impl Pix {
    /// Create a new PIX with the specified dimensions and depth.
    ///
    /// The image data is initialized to zero.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDimension`] if width or height is 0.
    pub fn new(width: u32, height: u32, depth: PixelDepth) -> Result<Self> {
        Ok(Pix {
            inner: Arc::new(PixData::new(width, height, depth)?),
        })
    }

    /// Get the image width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.inner.width
    }

    /// Get the image height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.inner.height
    }

    /// Get the pixel depth.
    #[inline]
    pub fn depth(&self) -> PixelDepth {
        self.inner.depth
    }

    /// Get the words per line.
    #[inline]
    pub fn wpl(&self) -> u32 {
        self.inner.wpl
    }

    /// Get raw access to the image data.
    #[inline]
    pub fn data(&self) -> &[u32] {
        &self.inner.data
    }

    /// Get the words of a single row.
    ///
    /// # Panics
    ///
    /// Panics if `y >= height`.
    #[inline]
    pub fn row_data(&self, y: u32) -> &[u32] {
        let start = (y * self.inner.wpl) as usize;
        &self.inner.data[start..start + self.inner.wpl as usize]
    }

    /// Create a zeroed image with the same dimensions and depth.
    pub fn create_template(&self) -> Self {
        let mut inner = (*self.inner).clone();
        inner.data.iter_mut().for_each(|w| *w = 0);
        Pix {
            inner: Arc::new(inner),
        }
    }

    /// Try to get mutable access to the image data.
    ///
    /// Succeeds only if there is exactly one reference to the data.
    pub fn try_into_mut(self) -> std::result::Result<PixMut, Self> {
        match Arc::try_unwrap(self.inner) {
            Ok(data) => Ok(PixMut { inner: data }),
            Err(arc) => Err(Pix { inner: arc }),
        }
    }

    /// Create a mutable copy of this PIX.
    pub fn to_mut(&self) -> PixMut {
        PixMut {
            inner: (*self.inner).clone(),
        }
    }

    /// Clip a rectangular region into a new image.
    ///
    /// The region is intersected with the image bounds first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if the region does not overlap
    /// the image.
    pub fn clip_rectangle(&self, region: &crate::Box) -> Result<Pix> {
        let bounds = crate::Box::new_unchecked(0, 0, self.width() as i32, self.height() as i32);
        let clipped = region.intersect(&bounds).ok_or_else(|| {
            Error::InvalidParameter(format!("region {region:?} lies outside the image"))
        })?;
        let mut out = PixMut::new(clipped.w as u32, clipped.h as u32, self.depth())?;
        for y in 0..clipped.h as u32 {
            for x in 0..clipped.w as u32 {
                let v = self.get_pixel_unchecked(x + clipped.x as u32, y + clipped.y as u32);
                out.set_pixel_unchecked(x, y, v);
            }
        }
        Ok(out.into())
    }

    /// Count the set pixels of a 1-bit image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedDepth`] for depths other than 1.
    pub fn count_pixels(&self) -> Result<u64> {
        if self.depth() != PixelDepth::Bit1 {
            return Err(Error::UnsupportedDepth(self.depth().bits()));
        }
        let w = self.width();
        let full = (w / 32) as usize;
        let rem = w % 32;
        let mut count = 0u64;
        for y in 0..self.height() {
            let row = self.row_data(y);
            count += row[..full].iter().map(|v| v.count_ones() as u64).sum::<u64>();
            if rem > 0 {
                let mask = !0u32 << (32 - rem);
                count += (row[full] & mask).count_ones() as u64;
            }
        }
        Ok(count)
    }
}

/// Mutable PIX
///
/// Allows modification of image data. Convert back to an immutable
/// [`Pix`] using `Into<Pix>`.
#[derive(Debug)]
pub struct PixMut {
    inner: PixData,
}

impl PixMut {
    /// Create a new zeroed mutable image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDimension`] if width or height is 0.
    pub fn new(width: u32, height: u32, depth: PixelDepth) -> Result<Self> {
        Ok(PixMut {
            inner: PixData::new(width, height, depth)?,
        })
    }

    /// Get the image width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.inner.width
    }

    /// Get the image height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.inner.height
    }

    /// Get the pixel depth.
    #[inline]
    pub fn depth(&self) -> PixelDepth {
        self.inner.depth
    }

    /// Get words per line.
    #[inline]
    pub fn wpl(&self) -> u32 {
        self.inner.wpl
    }

    /// Get mutable access to the raw data.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u32] {
        &mut self.inner.data
    }

    /// Set every pixel to the given value.
    pub fn set_all(&mut self, val: u32) {
        match self.inner.depth {
            PixelDepth::Bit1 => {
                let word = if val & 1 != 0 { u32::MAX } else { 0 };
                self.inner.data.iter_mut().for_each(|w| *w = word);
            }
            PixelDepth::Bit8 => {
                let v = val & 0xff;
                let word = v << 24 | v << 16 | v << 8 | v;
                self.inner.data.iter_mut().for_each(|w| *w = word);
            }
            PixelDepth::Bit32 => {
                self.inner.data.iter_mut().for_each(|w| *w = val);
            }
        }
    }
}

impl From<PixMut> for Pix {
    fn from(pix: PixMut) -> Self {
        Pix {
            inner: Arc::new(pix.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pix_creation() {
        let pix = Pix::new(100, 200, PixelDepth::Bit8).unwrap();
        assert_eq!(pix.width(), 100);
        assert_eq!(pix.height(), 200);
        assert_eq!(pix.wpl(), 25);
        assert!(Pix::new(0, 10, PixelDepth::Bit8).is_err());
    }

    #[test]
    fn test_wpl_binary() {
        let pix = Pix::new(33, 2, PixelDepth::Bit1).unwrap();
        assert_eq!(pix.wpl(), 2);
        assert_eq!(pix.data().len(), 4);
    }

    #[test]
    fn test_shared_then_mutable() {
        let pix = Pix::new(4, 4, PixelDepth::Bit8).unwrap();
        let shared = pix.clone();
        let pix = pix.try_into_mut().unwrap_err();
        drop(shared);
        let mut pm = pix.try_into_mut().unwrap();
        pm.set_pixel(1, 1, 77).unwrap();
        let pix: Pix = pm.into();
        assert_eq!(pix.get_pixel(1, 1), Some(77));
    }

    #[test]
    fn test_set_all_and_count() {
        let mut pm = PixMut::new(37, 3, PixelDepth::Bit1).unwrap();
        pm.set_all(1);
        let pix: Pix = pm.into();
        assert_eq!(pix.count_pixels().unwrap(), 37 * 3);
    }

    #[test]
    fn test_clip_rectangle() {
        let mut pm = PixMut::new(10, 10, PixelDepth::Bit8).unwrap();
        pm.set_pixel(5, 6, 200).unwrap();
        let pix: Pix = pm.into();
        let clip = pix
            .clip_rectangle(&crate::Box::new_unchecked(4, 4, 20, 20))
            .unwrap();
        assert_eq!((clip.width(), clip.height()), (6, 6));
        assert_eq!(clip.get_pixel(1, 2), Some(200));
        assert!(pix.clip_rectangle(&crate::Box::new_unchecked(20, 20, 5, 5)).is_err());
    }
}
