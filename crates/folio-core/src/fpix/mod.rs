//! FPix - Floating-point image
//!
//! `FPix` is a 2D array of `f32` values, used for intermediate maps such as
//! distance transforms and stroke widths where integer precision is
//! insufficient.
//!
//! # Examples
//!
//! ```
//! use folio_core::FPix;
//!
//! let mut fpix = FPix::new(100, 100).unwrap();
//! fpix.set_pixel(10, 20, 0.5).unwrap();
//! assert_eq!(fpix.get_pixel(10, 20).unwrap(), 0.5);
//! ```

use crate::error::{Error, Result};

/// Floating-point image
///
/// Data is stored in row-major order with no padding. The pixel at (x, y)
/// is at index `y * width + x`.
#[derive(Debug, Clone, PartialEq)]
pub struct FPix {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl FPix {
    /// Create a new FPix with all pixels set to zero
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDimension` if width or height is 0.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Self::new_with_value(width, height, 0.0)
    }

    /// Create a new FPix with all pixels set to `value`.
    pub fn new_with_value(width: u32, height: u32, value: f32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimension { width, height });
        }
        Ok(Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        })
    }

    /// Get the width
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Get the height
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Get the raw data
    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Get mutable raw data
    #[inline]
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Get a pixel value
    ///
    /// # Errors
    ///
    /// Returns `Error::IndexOutOfBounds` if the coordinates are outside the
    /// image.
    pub fn get_pixel(&self, x: u32, y: u32) -> Result<f32> {
        self.index(x, y).map(|i| self.data[i])
    }

    /// Set a pixel value
    ///
    /// # Errors
    ///
    /// Returns `Error::IndexOutOfBounds` if the coordinates are outside the
    /// image.
    pub fn set_pixel(&mut self, x: u32, y: u32, val: f32) -> Result<()> {
        let i = self.index(x, y)?;
        self.data[i] = val;
        Ok(())
    }

    /// Get a pixel value without bounds checking.
    #[inline]
    pub fn get_pixel_unchecked(&self, x: u32, y: u32) -> f32 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Set a pixel value without bounds checking.
    #[inline]
    pub fn set_pixel_unchecked(&mut self, x: u32, y: u32, val: f32) {
        let w = self.width as usize;
        self.data[y as usize * w + x as usize] = val;
    }

    fn index(&self, x: u32, y: u32) -> Result<usize> {
        if x >= self.width {
            return Err(Error::IndexOutOfBounds {
                index: x as usize,
                len: self.width as usize,
            });
        }
        if y >= self.height {
            return Err(Error::IndexOutOfBounds {
                index: y as usize,
                len: self.height as usize,
            });
        }
        Ok(y as usize * self.width as usize + x as usize)
    }

    /// Maximum value, or `None` if the image contains only NaN.
    pub fn max_value(&self) -> Option<f32> {
        self.data
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, v| Some(acc.map_or(v, |a: f32| a.max(v))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fpix_access() {
        let mut f = FPix::new(3, 2).unwrap();
        f.set_pixel(2, 1, 4.5).unwrap();
        assert_eq!(f.get_pixel(2, 1).unwrap(), 4.5);
        assert_eq!(f.get_pixel_unchecked(2, 1), 4.5);
        assert!(f.get_pixel(3, 0).is_err());
        assert!(f.set_pixel(0, 2, 1.0).is_err());
        assert_eq!(f.max_value(), Some(4.5));
        assert!(FPix::new(0, 1).is_err());
    }
}
