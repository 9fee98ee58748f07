//! Line collation
//!
//! Letters are grouped left to right into lines by a greedy nearest-neighbor
//! rule; typeset underlines found among the remaining components are
//! attached to the lines they run under.

use crate::letter::Letter;
use crate::line::TextLine;
use crate::stats::{percentile, smooth3};

fn spans_overlap(a: &Letter, b: &Letter) -> bool {
    a.y() <= b.y() + b.h() && b.y() <= a.y() + a.h()
}

/// Group letters into lines.
///
/// Each letter, taken in x order, joins the line whose last letter ends
/// less than `4 * ah` before it and overlaps it vertically (or whose
/// second-to-last letter ends less than `ah` before it and overlaps it),
/// picking the lowest `gap + |dy|` score. Otherwise it starts a new line.
/// The result is sorted by the y of each line's first letter.
pub fn collate_lines(ah: f64, letters: &[Letter]) -> Vec<TextLine> {
    let mut sorted: Vec<&Letter> = letters.iter().collect();
    sorted.sort_by(|a, b| a.x().total_cmp(&b.x()));

    let mut groups: Vec<Vec<Letter>> = Vec::new();
    for letter in sorted {
        let mut best: Option<(f64, usize)> = None;
        for (i, group) in groups.iter().enumerate() {
            let last = &group[group.len() - 1];
            let prev = if group.len() > 1 {
                &group[group.len() - 2]
            } else {
                last
            };
            let score = if letter.x() < last.right() + 4.0 * ah && spans_overlap(letter, last) {
                letter.x() - last.right() + (letter.y() - last.y()).abs()
            } else if letter.x() < prev.right() + ah && spans_overlap(letter, prev) {
                letter.x() - prev.right() + (letter.y() - prev.y()).abs()
            } else {
                continue;
            };
            if best.is_none_or(|(s, _)| score < s) {
                best = Some((score, i));
            }
        }
        match best {
            Some((_, i)) => groups[i].push(letter.clone()),
            None => groups.push(vec![letter.clone()]),
        }
    }

    let mut lines: Vec<TextLine> = groups.into_iter().map(TextLine::new).collect();
    lines.sort_by(|a, b| a.original()[0].y().total_cmp(&b.original()[0].y()));
    lines
}

/// Long, thin, level components: typeset underlines and rules.
///
/// A component qualifies when it is wider than `10 * ah` and its smoothed
/// column projection stays at most `ah / 3` thick (98th percentile) with a
/// spread of at most `ah / 6`.
pub fn find_underlines(ah: f64, components: &[Letter]) -> Vec<Letter> {
    components
        .iter()
        .filter(|c| c.w() > 10.0 * ah)
        .filter(|c| {
            let smooth = smooth3(&c.column_projection());
            let hi = percentile(&smooth, 98.0);
            let lo = percentile(&smooth, 2.0);
            hi <= ah / 3.0 && hi - lo <= ah / 6.0
        })
        .cloned()
        .collect()
}

fn runs_under(ah: f64, line: &TextLine, underline: &Letter, bottom: &[f64]) -> bool {
    let x0 = underline.x();
    let covered: Vec<(f64, f64)> = line
        .base_points()
        .into_iter()
        .map(|(x, y)| (x.floor(), y.floor()))
        .filter(|&(x, _)| x >= x0 && x < underline.right())
        .collect();
    !covered.is_empty()
        && covered
            .iter()
            .all(|&(x, y)| (y - bottom[(x - x0) as usize]).abs() < ah)
}

/// Attach typeset underlines to the lines they run under.
///
/// An underline belongs to every line whose base points inside its column
/// span all lie within `ah` of its bottom contour. Lines sharing an
/// underline are merged.
pub fn attach_underlines(ah: f64, lines: Vec<TextLine>, components: &[Letter]) -> Vec<TextLine> {
    let mut slots: Vec<Option<TextLine>> = lines.into_iter().map(Some).collect();
    for underline in find_underlines(ah, components) {
        let bottom = underline.bottom_contour();
        let close: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| {
                s.as_ref()
                    .filter(|l| runs_under(ah, l, &underline, &bottom))
                    .map(|_| i)
            })
            .collect();
        let Some((&keep, rest)) = close.split_first() else {
            continue;
        };
        let mut combined = slots[keep].take().unwrap_or_else(|| TextLine::new(Vec::new()));
        combined.add_underline(underline.clone());
        for &i in rest {
            if let Some(other) = slots[i].take() {
                combined.merge(other);
            }
        }
        slots[keep] = Some(combined);
    }
    slots.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::letter::extract_letters;
    use crate::letter::tests::boxes_image;

    #[test]
    fn test_collate_two_rows() {
        let mut rects: Vec<_> = (0..6).map(|i| (10 + 18 * i, 10, 12, 14)).collect();
        rects.extend((0..5).map(|i| (10 + 18 * i, 50, 12, 14)));
        let pix = boxes_image(200, 80, &rects);
        let letters = extract_letters(&pix).unwrap();
        let lines = collate_lines(14.0, &letters);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 6);
        assert_eq!(lines[1].len(), 5);
        assert!(lines[0].top() < lines[1].top());
    }

    #[test]
    fn test_collate_splits_on_large_gap() {
        let rects = [(10, 10, 12, 14), (30, 10, 12, 14), (150, 10, 12, 14)];
        let pix = boxes_image(200, 40, &rects);
        let letters = extract_letters(&pix).unwrap();
        let lines = collate_lines(14.0, &letters);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_underline_attaches_and_merges() {
        // Two half lines sharing one underline two pixels below the baseline.
        let mut rects: Vec<_> = (0..5).map(|i| (10 + 18 * i, 10, 12, 14)).collect();
        rects.extend((0..5).map(|i| (200 + 18 * i, 10, 12, 14)));
        rects.push((5, 26, 300, 2));
        let pix = boxes_image(320, 40, &rects);
        let letters = extract_letters(&pix).unwrap();
        let ah = 14.0;
        let underlines = find_underlines(ah, &letters);
        assert_eq!(underlines.len(), 1);

        let text: Vec<Letter> = letters.iter().filter(|l| l.w() < 20.0).cloned().collect();
        let lines = collate_lines(ah, &text);
        assert_eq!(lines.len(), 2);
        let merged = attach_underlines(ah, lines, &letters);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].len(), 10);
        assert_eq!(merged[0].underlines().len(), 1);
    }
}
