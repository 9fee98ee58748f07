//! Binarization seam

use crate::DewarpResult;
use folio_core::Pix;
use std::fmt::Debug;

/// Turns a grayscale or color image into a 1 bpp ink mask (ink = 1).
pub trait Binarizer: Debug + Send + Sync {
    /// Binarize `pix`. 1 bpp input may be returned unchanged.
    fn binarize(&self, pix: &Pix) -> DewarpResult<Pix>;
}

/// Fixed luminance threshold: pixels darker than the threshold are ink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdBinarizer {
    threshold: u32,
}

impl Default for ThresholdBinarizer {
    fn default() -> Self {
        Self { threshold: 128 }
    }
}

impl ThresholdBinarizer {
    /// Binarizer with a custom threshold (1 to 256).
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.clamp(1, 256),
        }
    }

    /// The threshold in use
    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

impl Binarizer for ThresholdBinarizer {
    fn binarize(&self, pix: &Pix) -> DewarpResult<Pix> {
        Ok(pix.threshold_to_binary(self.threshold)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::{PixMut, PixelDepth};

    #[test]
    fn test_threshold_binarizer() {
        let mut pm = PixMut::new(3, 1, PixelDepth::Bit8).unwrap();
        pm.set_pixel(0, 0, 0).unwrap();
        pm.set_pixel(1, 0, 127).unwrap();
        pm.set_pixel(2, 0, 128).unwrap();
        let pix: Pix = pm.into();
        let bin = ThresholdBinarizer::default().binarize(&pix).unwrap();
        assert_eq!(bin.depth(), PixelDepth::Bit1);
        assert_eq!(bin.get_pixel(0, 0), Some(1));
        assert_eq!(bin.get_pixel(1, 0), Some(1));
        assert_eq!(bin.get_pixel(2, 0), Some(0));
        assert_eq!(ThresholdBinarizer::new(0).threshold(), 1);
    }
}
