//! Depth conversion
//!
//! Conversions between the three supported depths. Binary images map ink
//! to black (0) and background to white (255/0xffffff).

use super::{Pix, PixMut, PixelDepth};
use crate::color;
use crate::error::{Error, Result};

impl Pix {
    /// Convert to an 8-bit grayscale image.
    ///
    /// 32-bit pixels are reduced with ITU-R 601 luma.
    pub fn convert_to_8(&self) -> Result<Pix> {
        if self.depth() == PixelDepth::Bit8 {
            return Ok(self.clone());
        }
        let mut out = PixMut::new(self.width(), self.height(), PixelDepth::Bit8)?;
        for y in 0..self.height() {
            for x in 0..self.width() {
                let v = self.get_pixel_unchecked(x, y);
                let g = match self.depth() {
                    PixelDepth::Bit1 => {
                        if v != 0 {
                            0
                        } else {
                            255
                        }
                    }
                    PixelDepth::Bit32 => {
                        let (r, g, b) = color::extract_rgb(v);
                        color::luma(r, g, b) as u32
                    }
                    PixelDepth::Bit8 => v,
                };
                out.set_pixel_unchecked(x, y, g);
            }
        }
        Ok(out.into())
    }

    /// Convert to a 32-bit RGB image.
    pub fn convert_to_32(&self) -> Result<Pix> {
        if self.depth() == PixelDepth::Bit32 {
            return Ok(self.clone());
        }
        let gray = self.convert_to_8()?;
        let mut out = PixMut::new(self.width(), self.height(), PixelDepth::Bit32)?;
        for y in 0..self.height() {
            for x in 0..self.width() {
                let g = gray.get_pixel_unchecked(x, y) as u8;
                out.set_pixel_unchecked(x, y, color::compose_rgb(g, g, g));
            }
        }
        Ok(out.into())
    }

    /// Threshold a grayscale or RGB image into a 1-bit ink mask.
    ///
    /// Pixels with intensity strictly below `threshold` become ink.
    /// 1-bit input is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if `threshold` is 0 (nothing
    /// could ever be ink).
    pub fn threshold_to_binary(&self, threshold: u32) -> Result<Pix> {
        if self.depth() == PixelDepth::Bit1 {
            return Ok(self.clone());
        }
        if threshold == 0 {
            return Err(Error::InvalidParameter("threshold must be > 0".into()));
        }
        let gray = self.convert_to_8()?;
        let mut out = PixMut::new(self.width(), self.height(), PixelDepth::Bit1)?;
        for y in 0..self.height() {
            for x in 0..self.width() {
                if gray.get_pixel_unchecked(x, y) < threshold {
                    out.set_pixel_unchecked(x, y, 1);
                }
            }
        }
        Ok(out.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_to_gray_and_back() {
        let mut pm = PixMut::new(5, 5, PixelDepth::Bit1).unwrap();
        pm.set_pixel(2, 3, 1).unwrap();
        let pix: Pix = pm.into();
        let gray = pix.convert_to_8().unwrap();
        assert_eq!(gray.get_pixel(2, 3), Some(0));
        assert_eq!(gray.get_pixel(0, 0), Some(255));
        let bin = gray.threshold_to_binary(128).unwrap();
        assert_eq!(bin.get_pixel(2, 3), Some(1));
        assert_eq!(bin.get_pixel(0, 0), Some(0));
    }

    #[test]
    fn test_rgb_to_gray() {
        let mut pm = PixMut::new(2, 1, PixelDepth::Bit32).unwrap();
        pm.set_rgb(0, 0, 255, 255, 255).unwrap();
        let pix: Pix = pm.into();
        let gray = pix.convert_to_8().unwrap();
        assert_eq!(gray.get_pixel(0, 0), Some(255));
        assert_eq!(gray.get_pixel(1, 0), Some(0));
        let rgb = gray.convert_to_32().unwrap();
        assert_eq!(rgb.get_rgb(0, 0), Some((255, 255, 255)));
    }
}
