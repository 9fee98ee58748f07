//! Simple rendering for diagnostic overlays
//!
//! Lines, rectangle outlines and filled disks drawn directly into a
//! [`PixMut`]. Coordinates outside the image are silently clipped.

use super::{PixMut, PixelDepth};
use crate::color;

/// Drawing color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Black,
    White,
    Red,
    Green,
    Blue,
    /// Arbitrary RGB value
    Rgb(u8, u8, u8),
}

impl Color {
    /// RGB components of this color.
    pub fn rgb(self) -> (u8, u8, u8) {
        match self {
            Color::Black => (0, 0, 0),
            Color::White => (255, 255, 255),
            Color::Red => (255, 0, 0),
            Color::Green => (0, 160, 0),
            Color::Blue => (0, 0, 255),
            Color::Rgb(r, g, b) => (r, g, b),
        }
    }

    /// Raw pixel value for an image of the given depth.
    pub fn pixel_value(self, depth: PixelDepth) -> u32 {
        let (r, g, b) = self.rgb();
        match depth {
            PixelDepth::Bit1 => u32::from(color::luma(r, g, b) < 128),
            PixelDepth::Bit8 => color::luma(r, g, b) as u32,
            PixelDepth::Bit32 => color::compose_rgb(r, g, b),
        }
    }
}

impl PixMut {
    fn plot(&mut self, x: i32, y: i32, val: u32) {
        if x >= 0 && y >= 0 && (x as u32) < self.width() && (y as u32) < self.height() {
            self.set_pixel_unchecked(x as u32, y as u32, val);
        }
    }

    /// Draw a straight line segment with the given thickness.
    pub fn render_line(&mut self, x0: f64, y0: f64, x1: f64, y1: f64, width: u32, color: Color) {
        if !(x0.is_finite() && y0.is_finite() && x1.is_finite() && y1.is_finite()) {
            return;
        }
        let val = color.pixel_value(self.depth());
        let half = (width.max(1) as i32 - 1) / 2;
        let steps = (x1 - x0).abs().max((y1 - y0).abs()).ceil().min(1e5) as i32;
        for i in 0..=steps.max(1) {
            let s = i as f64 / steps.max(1) as f64;
            let cx = (x0 + s * (x1 - x0)).round() as i32;
            let cy = (y0 + s * (y1 - y0)).round() as i32;
            for dy in -half..=half {
                for dx in -half..=half {
                    self.plot(cx + dx, cy + dy, val);
                }
            }
        }
    }

    /// Draw a filled disk.
    pub fn render_disk(&mut self, cx: f64, cy: f64, radius: u32, color: Color) {
        if !(cx.is_finite() && cy.is_finite()) {
            return;
        }
        let val = color.pixel_value(self.depth());
        let r = radius as i32;
        let (cx, cy) = (cx.round() as i32, cy.round() as i32);
        for dy in -r..=r {
            for dx in -r..=r {
                if dx * dx + dy * dy <= r * r {
                    self.plot(cx + dx, cy + dy, val);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Pix;

    #[test]
    fn test_render_line_endpoints() {
        let mut pm = PixMut::new(20, 20, PixelDepth::Bit32).unwrap();
        pm.render_line(2.0, 3.0, 15.0, 3.0, 1, Color::Red);
        let pix: Pix = pm.into();
        assert_eq!(pix.get_rgb(2, 3), Some((255, 0, 0)));
        assert_eq!(pix.get_rgb(15, 3), Some((255, 0, 0)));
        assert_eq!(pix.get_rgb(15, 4), Some((0, 0, 0)));
    }

    #[test]
    fn test_render_clips() {
        let mut pm = PixMut::new(8, 8, PixelDepth::Bit8).unwrap();
        pm.render_disk(-2.0, -2.0, 3, Color::White);
        pm.render_line(-50.0, 4.0, 50.0, 4.0, 3, Color::White);
        let pix: Pix = pm.into();
        assert_eq!(pix.get_pixel(0, 0), Some(255));
        assert_eq!(pix.get_pixel(7, 5), Some(255));
        assert_eq!(pix.get_pixel(7, 7), Some(0));
    }
}
