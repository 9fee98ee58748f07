//! Two-page spreads
//!
//! A spread is recognized from the spread of line left edges. The pages
//! are separated by clustering line centers into two groups (1-D two-means)
//! and cutting at the gutter between them.

use crate::line::TextLine;
use crate::stats::{mean, std_dev};
use folio_core::Box;
use tracing::debug;

const MAX_ITERATIONS: usize = 50;

fn center(line: &TextLine) -> f64 {
    0.5 * (line.left() + line.right())
}

/// Whether `lines` look like a two-page spread.
///
/// The image must be wider than tall, and the standard deviation of the
/// line left edges must exceed `ratio` of the width.
pub fn is_spread(lines: &[TextLine], width: u32, height: u32, ratio: f64) -> bool {
    if width <= height || lines.len() < 2 {
        return false;
    }
    let lefts: Vec<f64> = lines.iter().map(TextLine::left).collect();
    let spread = std_dev(&lefts) / width as f64;
    debug!(spread, ratio, "spread detection");
    spread > ratio
}

/// Column separating the two pages of a spread.
///
/// Line centers are split by two-means; the cut lies halfway across the
/// gutter between the rightmost edge of the left group and the leftmost
/// edge of the right group. Returns `None` when the lines do not form two
/// groups.
pub fn split_column(lines: &[TextLine]) -> Option<f64> {
    let centers: Vec<f64> = lines.iter().map(center).collect();
    let lo = centers.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = centers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !lo.is_finite() || hi <= lo {
        return None;
    }

    let (mut c0, mut c1) = (lo, hi);
    for _ in 0..MAX_ITERATIONS {
        let boundary = 0.5 * (c0 + c1);
        let (left, right): (Vec<f64>, Vec<f64>) =
            centers.iter().copied().partition(|&c| c < boundary);
        if left.is_empty() || right.is_empty() {
            return None;
        }
        let (n0, n1) = (mean(&left), mean(&right));
        let settled = (n0 - c0).abs() < 1e-9 && (n1 - c1).abs() < 1e-9;
        c0 = n0;
        c1 = n1;
        if settled {
            break;
        }
    }

    let boundary = 0.5 * (c0 + c1);
    let [left, right] = partition_lines(lines, boundary);
    let inner_left = left.iter().map(TextLine::right).fold(f64::NEG_INFINITY, f64::max);
    let inner_right = right.iter().map(TextLine::left).fold(f64::INFINITY, f64::min);
    let cut = if inner_left < inner_right {
        0.5 * (inner_left + inner_right)
    } else {
        boundary
    };
    debug!(c0, c1, cut, "two-page split");
    Some(cut)
}

/// Lines whose centers fall left and right of `split`.
pub fn partition_lines(lines: &[TextLine], split: f64) -> [Vec<TextLine>; 2] {
    let (left, right): (Vec<TextLine>, Vec<TextLine>) =
        lines.iter().cloned().partition(|l| center(l) < split);
    [left, right]
}

/// Crop rectangles of the two pages, cut at column `split`.
///
/// The cut is clamped so that both crops keep at least one column.
pub fn page_crops(width: u32, height: u32, split: f64) -> [Box; 2] {
    let w = width.max(2) as i32;
    let cut = if split.is_finite() {
        (split.round() as i32).clamp(1, w - 1)
    } else {
        w / 2
    };
    let h = height as i32;
    [
        Box::new_unchecked(0, 0, cut, h),
        Box::new_unchecked(cut, 0, w - cut, h),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collate::collate_lines;
    use crate::letter::extract_letters;
    use crate::letter::tests::boxes_image;

    /// Six rows of ten glyphs on each half of a 600 x 300 spread.
    fn spread_lines() -> Vec<TextLine> {
        let rects: Vec<_> = (0..6)
            .flat_map(|r| {
                (0..10).flat_map(move |i| {
                    [(40 + 20 * i, 30 + 40 * r, 12, 14), (340 + 20 * i, 30 + 40 * r, 12, 14)]
                })
            })
            .collect();
        let pix = boxes_image(600, 300, &rects);
        let letters = extract_letters(&pix).unwrap();
        collate_lines(14.0, &letters)
    }

    #[test]
    fn test_spread_detected() {
        let lines = spread_lines();
        assert_eq!(lines.len(), 12);
        assert!(is_spread(&lines, 600, 300, 0.10));
        // Portrait images are never spreads.
        assert!(!is_spread(&lines, 300, 600, 0.10));
        // One page of left-aligned lines has no spread of left edges.
        let [left, _] = partition_lines(&lines, 300.0);
        assert!(!is_spread(&left, 600, 300, 0.10));
    }

    #[test]
    fn test_split_at_gutter() {
        let lines = spread_lines();
        // Left page ends at 232, right page starts at 340.
        let cut = split_column(&lines).unwrap();
        assert!((cut - 286.0).abs() < 1e-9, "cut {}", cut);
        let [left, right] = partition_lines(&lines, cut);
        assert_eq!((left.len(), right.len()), (6, 6));
        assert!(left.iter().all(|l| l.right() <= 232.0));
    }

    #[test]
    fn test_single_column_has_no_split() {
        let lines = spread_lines();
        let [left, _] = partition_lines(&lines, 300.0);
        assert!(split_column(&left).is_none());
        assert!(split_column(&[]).is_none());
    }

    #[test]
    fn test_page_crops() {
        let [a, b] = page_crops(600, 300, 286.0);
        assert_eq!((a.x, a.w, b.x, b.w), (0, 286, 286, 314));
        assert_eq!(a.h, 300);
        let [a, b] = page_crops(600, 300, -40.0);
        assert_eq!((a.w, b.x), (1, 1));
        let [a, _] = page_crops(600, 300, f64::NAN);
        assert_eq!(a.w, 300);
    }
}
