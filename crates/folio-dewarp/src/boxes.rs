//! Text boxes in the corrected page
//!
//! Boxes come from two sources: caller landmarks (one or two points that
//! mark a text passage or an image region) and hand-drawn underlines found
//! in the coarse output. All coordinates are mapped through the fine
//! correction chain into the final output and clamped to it.

use crate::letter::Letter;
use crate::line::TextLine;
use crate::stats::{percentile, smooth3};
use tracing::warn;

/// Role of a [`PageBox`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RoleCode {
    /// First line of a hand-underlined passage
    HandMarkedStart = 0,
    /// Hand-underlined line continuing the previous one
    HandMarkedContinuation = 1,
    /// Non-text region between two landmarks
    ImageRegion = 2,
    /// First line of a marked text passage
    BodyTextStart = 20,
    /// Text line continuing the previous one
    BodyTextContinuation = 21,
}

impl RoleCode {
    /// Numeric code
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Axis-aligned box in output image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBox {
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
    pub role: RoleCode,
}

impl PageBox {
    /// As a [`folio_core::Box`]
    pub fn to_box(&self) -> folio_core::Box {
        folio_core::Box::new_unchecked(
            self.x_min,
            self.y_min,
            (self.x_max - self.x_min).max(0),
            (self.y_max - self.y_min).max(0),
        )
    }
}

/// Hand-drawn underline below a run of letters of one line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandUnderline {
    /// Index of the line
    pub line: usize,
    /// First underlined letter
    pub start: usize,
    /// Last underlined letter
    pub end: usize,
    /// Left end of the stroke
    pub left_mid: (f64, f64),
    /// Right end of the stroke
    pub right_mid: (f64, f64),
}

fn is_hand_stroke(ah: f64, c: &Letter) -> bool {
    if !(c.w() > 3.0 * ah && c.h() < 4.0 * ah) {
        return false;
    }
    let smooth = smooth3(&c.column_projection());
    let hi = percentile(&smooth, 85.0);
    let lo = percentile(&smooth, 15.0);
    hi <= ah && hi - lo <= ah / 2.0
}

/// Find hand-drawn underlines among `components`.
///
/// A stroke wider than `3 * ah` and thinner than `ah` qualifies when its
/// top contour (with the highest 20% clipped) runs between 0 and
/// `1.5 * ah` below every base point of a line it covers. Pieces on the
/// same line with a gap under `1.5 * ah` are merged.
pub fn hand_drawn_lines(ah: f64, lines: &[TextLine], components: &[Letter]) -> Vec<HandUnderline> {
    let mut found = Vec::new();
    for c in components.iter().filter(|c| is_hand_stroke(ah, c)) {
        let top = c.top_contour();
        let p20 = percentile(&top, 20.0);
        let clipped: Vec<f64> = top.iter().map(|&t| if t < p20 { p20 } else { t }).collect();
        let (x0, x1) = (c.x(), c.right());
        for (idx, line) in lines.iter().enumerate() {
            let covered: Vec<(usize, f64, f64)> = line
                .base_points()
                .into_iter()
                .enumerate()
                .map(|(i, (x, y))| (i, x.floor(), y.floor()))
                .filter(|&(_, x, _)| x >= x0 && x < x1)
                .collect();
            let (Some(first), Some(last)) = (covered.first(), covered.last()) else {
                continue;
            };
            let under = covered.iter().all(|&(_, x, y)| {
                let dy = clipped[(x - x0) as usize] - y;
                (0.0..1.5 * ah).contains(&dy)
            });
            if under {
                found.push(HandUnderline {
                    line: idx,
                    start: first.0,
                    end: last.0,
                    left_mid: c.left_mid(),
                    right_mid: c.right_mid(),
                });
            }
        }
    }

    found.sort_by(|a, b| a.line.cmp(&b.line).then(a.left_mid.0.total_cmp(&b.left_mid.0)));
    let mut merged: Vec<HandUnderline> = Vec::with_capacity(found.len());
    for u in found {
        if let Some(last) = merged.last_mut().filter(|m| m.line == u.line) {
            if (u.left_mid.0 - last.right_mid.0).abs() < 1.5 * ah {
                last.end = u.end;
                last.right_mid = u.right_mid;
                continue;
            }
        }
        merged.push(u);
    }
    merged
}

/// Geometry of the final output shared by the box builders
pub struct BoxFrame<'a> {
    /// Dominant letter height of the coarse output
    pub ah: f64,
    /// Output width
    pub width: u32,
    /// Output height
    pub height: u32,
    /// Left text margin in output x
    pub pad_left: f64,
    /// Right padding: the text ends at `width - pad_right`
    pub pad_right: f64,
    /// Maps a coarse-output point into the final output (unclamped)
    pub map: &'a dyn Fn(f64, f64) -> (f64, f64),
}

impl BoxFrame<'_> {
    fn clamped(&self, x: f64, y: f64) -> (f64, f64) {
        let (u, v) = (self.map)(x, y);
        (
            u.clamp(0.0, self.width as f64),
            v.clamp(0.0, self.height as f64),
        )
    }

    fn right_margin(&self) -> f64 {
        self.width as f64 - self.pad_right
    }

    fn make(&self, x0: f64, y0: f64, x1: f64, y1: f64, role: RoleCode) -> PageBox {
        let (w, h) = (self.width as i32, self.height as i32);
        PageBox {
            x_min: (x0 as i32).clamp(0, w),
            y_min: (y0 as i32).clamp(0, h),
            x_max: (x1 as i32).clamp(0, w),
            y_max: (y1 as i32).clamp(0, h),
            role,
        }
    }

    /// Mapped corners of the letter run `start..=end` of a line.
    fn run_corners(&self, line: &TextLine, start: usize, end: usize) -> Option<[(f64, f64); 4]> {
        let first = line.letters().get(start)?.corners();
        let last = line.letters().get(end)?.corners();
        Some([
            self.clamped(first[0].0, first[0].1),
            self.clamped(last[1].0, last[1].1),
            self.clamped(last[2].0, last[2].1),
            self.clamped(first[3].0, first[3].1),
        ])
    }
}

fn extent(points: &[(f64, f64)]) -> (f64, f64, f64, f64) {
    points.iter().fold(
        (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        |(a, b, c, d), &(x, y)| (a.min(x), b.min(y), c.max(x), d.max(y)),
    )
}

/// Index of the line whose margin anchor is vertically closest to a
/// landmark (left anchors for the left half of the page, right otherwise).
fn nearest_line(lines: &[TextLine], p: (f64, f64), half_width: f64) -> Option<usize> {
    lines
        .iter()
        .enumerate()
        .map(|(i, l)| {
            let anchor = if p.0 < half_width {
                l.left_mid()
            } else {
                l.right_mid()
            };
            (i, (anchor.1 - p.1).abs())
        })
        .filter(|(_, d)| d.is_finite())
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

/// Boxes for one or two landmarks given in coarse-output coordinates.
pub fn landmark_boxes(
    frame: &BoxFrame<'_>,
    lines: &[TextLine],
    landmarks: &[(f64, f64)],
    coarse_width: u32,
) -> Vec<PageBox> {
    let ah = frame.ah;
    let edge = ah / 5.0;
    let half = coarse_width as f64 / 2.0;
    match landmarks {
        [] => Vec::new(),
        [p] => {
            let Some(i) = nearest_line(lines, *p, half) else {
                return Vec::new();
            };
            let line = &lines[i];
            let Some(c) = frame.run_corners(line, 0, line.len().saturating_sub(1)) else {
                return Vec::new();
            };
            let (_, y0, _, y1) = extent(&c);
            vec![frame.make(
                frame.pad_left,
                y0 - edge,
                frame.right_margin(),
                y1 + edge,
                RoleCode::BodyTextStart,
            )]
        }
        [p, q] => {
            let (Some(a), Some(b)) = (nearest_line(lines, *p, half), nearest_line(lines, *q, half))
            else {
                return Vec::new();
            };
            let (lo, hi) = (a.min(b), a.max(b));
            let span = &lines[lo..hi];
            let letters: usize = span.iter().map(TextLine::len).sum();
            if letters as f64 > (q.1 - p.1).abs() / ah * 5.0 {
                let mut boxes: Vec<PageBox> = Vec::with_capacity(span.len());
                for line in span {
                    let Some(c) = frame.run_corners(line, 0, line.len().saturating_sub(1)) else {
                        continue;
                    };
                    let (x0, y0, x1, y1) = extent(&c);
                    let (x0, x1) = (x0 - ah, x1 + ah);
                    let continues = boxes.last().is_some_and(|prev| {
                        prev.x_max as f64 >= frame.right_margin() - ah / 2.0
                            && x0 <= frame.pad_left + ah / 2.0
                    });
                    let role = if continues {
                        RoleCode::BodyTextContinuation
                    } else {
                        RoleCode::BodyTextStart
                    };
                    boxes.push(frame.make(
                        x0.max(frame.pad_left),
                        y0 - edge,
                        x1.min(frame.right_margin()),
                        y1 + edge,
                        role,
                    ));
                }
                boxes
            } else {
                let (_, py) = frame.clamped(p.0, p.1);
                let (_, qy) = frame.clamped(q.0, q.1);
                vec![frame.make(
                    frame.pad_left,
                    py.min(qy),
                    frame.right_margin(),
                    py.max(qy),
                    RoleCode::ImageRegion,
                )]
            }
        }
        _ => {
            warn!(count = landmarks.len(), "only one or two landmarks define boxes");
            Vec::new()
        }
    }
}

/// Boxes around the letters above every hand-drawn underline.
pub fn underline_boxes(
    frame: &BoxFrame<'_>,
    lines: &[TextLine],
    underlines: &[HandUnderline],
) -> Vec<PageBox> {
    let ah = frame.ah;
    let edge = ah / 5.0;
    let mut out = Vec::with_capacity(underlines.len());
    let mut prev: Option<(usize, (f64, f64))> = None;
    for u in underlines {
        let Some(c) = lines
            .get(u.line)
            .and_then(|l| frame.run_corners(l, u.start, u.end))
        else {
            continue;
        };
        let lm = frame.clamped(u.left_mid.0, u.left_mid.1);
        let rm = frame.clamped(u.right_mid.0, u.right_mid.1);
        let (_, y0, _, y1) = extent(&c);
        let all = [c[0], c[1], c[2], c[3], lm, rm];
        let (x0, _, x1, _) = extent(&all);
        let continues = prev.is_some_and(|(line, prev_rm)| {
            line + 1 == u.line
                && prev_rm.0 > frame.right_margin() - ah / 2.0
                && lm.0 < frame.pad_left + ah / 2.0
        });
        let role = if continues {
            RoleCode::HandMarkedContinuation
        } else {
            RoleCode::HandMarkedStart
        };
        out.push(frame.make(x0 - edge, y0 - edge, x1 + edge, y1 + edge, role));
        prev = Some((u.line, rm));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collate::collate_lines;
    use crate::letter::extract_letters;
    use crate::letter::tests::boxes_image;

    fn page() -> (Vec<TextLine>, Vec<Letter>) {
        // Four rows of twelve glyphs; a hand stroke under row 1, glyphs 2..8.
        let mut rects: Vec<_> = (0..4)
            .flat_map(|r| (0..12).map(move |i| (30 + 20 * i, 20 + 40 * r, 12, 14)))
            .collect();
        rects.push((68, 77, 130, 3));
        let pix = boxes_image(320, 200, &rects);
        let components = extract_letters(&pix).unwrap();
        let text: Vec<Letter> = components.iter().filter(|c| c.w() < 20.0).cloned().collect();
        (collate_lines(14.0, &text), components)
    }

    fn identity(x: f64, y: f64) -> (f64, f64) {
        (x, y)
    }

    fn frame(map: &dyn Fn(f64, f64) -> (f64, f64)) -> BoxFrame<'_> {
        frame_with(14.0, map)
    }

    fn frame_with(ah: f64, map: &dyn Fn(f64, f64) -> (f64, f64)) -> BoxFrame<'_> {
        BoxFrame {
            ah,
            width: 320,
            height: 200,
            pad_left: 30.0,
            pad_right: 40.0,
            map,
        }
    }

    #[test]
    fn test_hand_drawn_line_found() {
        let (lines, components) = page();
        assert_eq!(lines.len(), 4);
        let found = hand_drawn_lines(14.0, &lines, &components);
        assert_eq!(found.len(), 1);
        let u = found[0];
        assert_eq!(u.line, 1);
        // Base points x = 36 + 20 i inside [68, 198): i = 2..=8.
        assert_eq!((u.start, u.end), (2, 8));
        assert_eq!(u.left_mid.0, 68.0);
    }

    #[test]
    fn test_underline_box_covers_letters() {
        let (lines, components) = page();
        let found = hand_drawn_lines(14.0, &lines, &components);
        let boxes = underline_boxes(&frame(&identity), &lines, &found);
        assert_eq!(boxes.len(), 1);
        let b = boxes[0];
        assert_eq!(b.role, RoleCode::HandMarkedStart);
        // Letters 2..=8 of row 1: x 70..202, y 60..74; the stroke reaches 198.
        assert_eq!((b.x_min, b.x_max), ((68.0 - 2.8) as i32, (202.0 + 2.8) as i32));
        assert_eq!((b.y_min, b.y_max), ((60.0 - 2.8) as i32, (74.0 + 2.8) as i32));
    }

    #[test]
    fn test_one_landmark_marks_nearest_line() {
        let (lines, _) = page();
        let boxes = landmark_boxes(&frame(&identity), &lines, &[(10.0, 105.0)], 320);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].role, RoleCode::BodyTextStart);
        // Row 2 spans y 100..114.
        assert_eq!(boxes[0].y_min, (100.0 - 2.8) as i32);
        assert_eq!(boxes[0].y_max, (114.0 + 2.8) as i32);
        assert_eq!((boxes[0].x_min, boxes[0].x_max), (30, 280));
    }

    #[test]
    fn test_two_landmarks_box_each_line() {
        let (lines, _) = page();
        let f = frame_with(20.0, &identity);
        let boxes = landmark_boxes(&f, &lines, &[(10.0, 25.0), (10.0, 145.0)], 320);
        // Lines 0..3 hold 36 letters, more than 120 / 20 * 5.
        assert_eq!(boxes.len(), 3);
        // Every line spans both margins, so each continues the previous one.
        let roles: Vec<_> = boxes.iter().map(|b| b.role).collect();
        assert_eq!(
            roles,
            [
                RoleCode::BodyTextStart,
                RoleCode::BodyTextContinuation,
                RoleCode::BodyTextContinuation
            ]
        );
        assert!(boxes.iter().all(|b| b.x_min == 30 && b.x_max == 280));
        assert!(boxes.windows(2).all(|w| w[0].y_max < w[1].y_max));
    }

    #[test]
    fn test_sparse_landmarks_mark_image_region() {
        let (lines, _) = page();
        let boxes = landmark_boxes(&frame(&identity), &lines, &[(10.0, 25.0), (10.0, 65.0)], 320);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].role, RoleCode::ImageRegion);
        assert_eq!((boxes[0].y_min, boxes[0].y_max), (25, 65));
    }

    #[test]
    fn test_landmarks_outside_are_clamped() {
        let (lines, _) = page();
        let far = |x: f64, y: f64| (x * 10.0, y * 10.0);
        let boxes = landmark_boxes(&frame(&far), &lines, &[(10.0, 25.0), (10.0, 65.0)], 320);
        let b = boxes[0];
        assert!(b.y_min >= 0 && b.y_max <= 200 && b.x_min >= 0 && b.x_max <= 320);
        assert_eq!(RoleCode::BodyTextContinuation.code(), 21);
    }
}
