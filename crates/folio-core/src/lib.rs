//! folio-core - Basic data structures for document image processing
//!
//! This crate provides the fundamental data structures shared by the
//! folio crates:
//!
//! - [`Pix`] / [`PixMut`] - Packed raster image (immutable / mutable)
//! - [`FPix`] - Floating-point raster
//! - [`Box`] - Integer rectangle
//! - [`Polynomial`] - Least-squares polynomial fits in a normalized domain
//!
//! # Example
//!
//! ```
//! use folio_core::{Pix, PixelDepth};
//!
//! let pix = Pix::new(64, 48, PixelDepth::Bit8).unwrap();
//! assert_eq!(pix.width(), 64);
//! assert_eq!(pix.height(), 48);
//! ```

pub mod box_;
pub mod error;
pub mod fpix;
pub mod pix;
pub mod polynomial;

pub use box_::Box;
pub use error::{Error, Result};
pub use fpix::FPix;
pub use pix::{Color, Pix, PixMut, PixelDepth};
pub use polynomial::Polynomial;

/// Helper functions for 32-bit RGB pixels.
///
/// # Pixel format
///
/// 32-bit pixels are stored as `0xRRGGBBAA` (red in MSB, alpha in LSB).
pub mod color {
    /// Shift amounts for extracting color channels
    pub const RED_SHIFT: u32 = 24;
    pub const GREEN_SHIFT: u32 = 16;
    pub const BLUE_SHIFT: u32 = 8;

    /// Compose a 32-bit pixel from RGB components (alpha = 255).
    #[inline]
    pub fn compose_rgb(r: u8, g: u8, b: u8) -> u32 {
        ((r as u32) << RED_SHIFT) | ((g as u32) << GREEN_SHIFT) | ((b as u32) << BLUE_SHIFT) | 0xff
    }

    /// Extract RGB components from a 32-bit pixel.
    #[inline]
    pub fn extract_rgb(pixel: u32) -> (u8, u8, u8) {
        (
            ((pixel >> RED_SHIFT) & 0xff) as u8,
            ((pixel >> GREEN_SHIFT) & 0xff) as u8,
            ((pixel >> BLUE_SHIFT) & 0xff) as u8,
        )
    }

    /// ITU-R 601 luma of an RGB triple, rounded to 8 bits.
    #[inline]
    pub fn luma(r: u8, g: u8, b: u8) -> u8 {
        let y = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        y.round().clamp(0.0, 255.0) as u8
    }
}
