//! Glyph extraction
//!
//! Every 4-connected ink component becomes a [`Letter`]. Letters share the
//! label raster they came from, so a letter's exact mask stays available
//! for contour and stroke measurements after the image is gone.

use crate::{DewarpError, DewarpResult};
use folio_core::{Box, Pix, PixelDepth};
use folio_region::{ConnectivityType, LabelMap, label_connected_components};
use std::sync::Arc;

/// Smallest dominant letter height
pub const MIN_LETTER_HEIGHT: usize = 8;

/// One connected component
#[derive(Debug, Clone)]
pub struct Letter {
    label: u32,
    bounds: Box,
    centroid: (f64, f64),
    pixel_count: u32,
    labels: Arc<LabelMap>,
}

impl PartialEq for Letter {
    fn eq(&self, other: &Self) -> bool {
        self.label == other.label && Arc::ptr_eq(&self.labels, &other.labels)
    }
}

impl Letter {
    /// Label in the shared label raster
    pub fn label(&self) -> u32 {
        self.label
    }

    /// Bounding box
    pub fn bounds(&self) -> Box {
        self.bounds
    }

    /// Left edge
    pub fn x(&self) -> f64 {
        self.bounds.x as f64
    }

    /// Top edge
    pub fn y(&self) -> f64 {
        self.bounds.y as f64
    }

    /// Width
    pub fn w(&self) -> f64 {
        self.bounds.w as f64
    }

    /// Height
    pub fn h(&self) -> f64 {
        self.bounds.h as f64
    }

    /// Right edge (exclusive)
    pub fn right(&self) -> f64 {
        self.bounds.right() as f64
    }

    /// Mean ink position
    pub fn centroid(&self) -> (f64, f64) {
        self.centroid
    }

    /// Number of ink pixels
    pub fn pixel_count(&self) -> u32 {
        self.pixel_count
    }

    /// Bottom center of the box
    pub fn base_point(&self) -> (f64, f64) {
        (self.x() + self.w() / 2.0, self.y() + self.h())
    }

    /// Middle of the left edge
    pub fn left_mid(&self) -> (f64, f64) {
        (self.x(), self.y() + self.h() / 2.0)
    }

    /// Middle of the right edge
    pub fn right_mid(&self) -> (f64, f64) {
        (self.right(), self.y() + self.h() / 2.0)
    }

    /// Box corners: top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self) -> [(f64, f64); 4] {
        let (x0, y0) = (self.x(), self.y());
        let (x1, y1) = (self.right(), self.y() + self.h());
        [(x0, y0), (x1, y0), (x1, y1), (x0, y1)]
    }

    /// Whether image pixel `(x, y)` belongs to this letter
    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.labels.contains(self.label, x, y)
    }

    /// Ink pixels of this letter
    pub fn pixels(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let b = self.bounds;
        (b.y..b.bottom()).flat_map(move |y| {
            (b.x..b.right())
                .filter(move |&x| self.contains(x, y))
                .map(move |x| (x as u32, y as u32))
        })
    }

    fn column_extent(&self, col: i32) -> Option<(i32, i32)> {
        let b = self.bounds;
        let x = b.x + col;
        let top = (b.y..b.bottom()).find(|&y| self.contains(x, y))?;
        let bottom = (b.y..b.bottom()).rev().find(|&y| self.contains(x, y))?;
        Some((top, bottom + 1))
    }

    /// First ink row of every column (NaN for empty columns).
    pub fn top_contour(&self) -> Vec<f64> {
        (0..self.bounds.w)
            .map(|c| self.column_extent(c).map_or(f64::NAN, |(t, _)| t as f64))
            .collect()
    }

    /// One past the last ink row of every column (NaN for empty columns).
    pub fn bottom_contour(&self) -> Vec<f64> {
        (0..self.bounds.w)
            .map(|c| self.column_extent(c).map_or(f64::NAN, |(_, b)| b as f64))
            .collect()
    }

    /// Middle of the ink in every column (NaN for empty columns).
    pub fn mid_contour(&self) -> Vec<f64> {
        (0..self.bounds.w)
            .map(|c| {
                self.column_extent(c)
                    .map_or(f64::NAN, |(t, b)| (t + b) as f64 / 2.0)
            })
            .collect()
    }

    /// Ink count of every column.
    pub fn column_projection(&self) -> Vec<f64> {
        let b = self.bounds;
        (b.x..b.right())
            .map(|x| (b.y..b.bottom()).filter(|&y| self.contains(x, y)).count() as f64)
            .collect()
    }
}

/// Extract every 4-connected ink component of a 1 bpp image.
///
/// # Errors
///
/// Returns [`DewarpError::UnsupportedDepth`] if the image is not 1 bpp.
pub fn extract_letters(binary: &Pix) -> DewarpResult<Vec<Letter>> {
    if binary.depth() != PixelDepth::Bit1 {
        return Err(DewarpError::UnsupportedDepth {
            expected: "1 bpp",
            actual: binary.depth().bits(),
        });
    }
    let labels = Arc::new(label_connected_components(binary, ConnectivityType::FourWay)?);
    Ok(labels
        .components()
        .iter()
        .map(|c| Letter {
            label: c.label,
            bounds: c.bounds,
            centroid: c.centroid,
            pixel_count: c.pixel_count,
            labels: Arc::clone(&labels),
        })
        .collect())
}

/// Dominant letter height ("AH").
///
/// Heights of components wider than 10 pixels are histogrammed; the most
/// frequent height of at least [`MIN_LETTER_HEIGHT`] wins. Without any
/// qualifying component the minimum is returned.
pub fn dominant_height(letters: &[Letter]) -> f64 {
    let mut hist = [0usize; 256];
    for l in letters.iter().filter(|l| l.bounds.w > 10) {
        let h = l.bounds.h as usize;
        if h < hist.len() {
            hist[h] += 1;
        }
    }
    let mut best = MIN_LETTER_HEIGHT;
    for h in MIN_LETTER_HEIGHT..hist.len() {
        if hist[h] > hist[best] {
            best = h;
        }
    }
    best as f64
}

/// Size filter for body-text glyphs.
pub fn is_text_sized(ah: f64, letter: &Letter) -> bool {
    let (w, h) = (letter.w(), letter.h());
    ah / 3.0 < h && h < 3.0 * ah && ah / 4.0 < w && w < 3.0 * ah && {
        let r = h / w;
        0.4 < r && r < 2.5
    }
}

/// Keep the letters that pass [`is_text_sized`].
pub fn filter_text_sized(ah: f64, letters: &[Letter]) -> Vec<Letter> {
    letters
        .iter()
        .filter(|l| is_text_sized(ah, l))
        .cloned()
        .collect()
}
