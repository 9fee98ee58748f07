//! Robust line filtering
//!
//! Collated lines still contain punctuation, figure fragments and lines
//! that are not text at all. The filters here drop them in stages: stroke
//! width outliers, irregular letter spacing, then a RANSAC baseline fit
//! per line followed by merging of lines that share a baseline.
//! [`find_text_lines`] runs the whole chain.

use crate::collate::{attach_underlines, collate_lines};
use crate::letter::{Letter, dominant_height, extract_letters, filter_text_sized};
use crate::line::TextLine;
use crate::ransac::{BaselineEstimator, RansacOptions, ransac};
use crate::stats::{percentile, std_dev};
use crate::DewarpResult;
use folio_core::{FPix, Pix};
use folio_region::{dilate_gray_3x3, distance_transform};
use rand::rngs::StdRng;
use tracing::debug;

/// Stroke widths at or above this value are treated as solid blobs.
const MAX_STROKE: f32 = 41.0;

/// Per-pixel stroke width estimate of the ink.
///
/// The distance map `d` of the ink is turned into a diameter `2d + 1` and
/// spread across each stroke by repeated 3x3 dilation restricted to ink, so
/// every ink pixel carries the width of the stroke through it.
pub fn stroke_width_map(binary: &Pix) -> DewarpResult<FPix> {
    let dist = distance_transform(binary)?;
    let all: Vec<f64> = dist.data().iter().map(|&d| d as f64).collect();
    let radius = (percentile(&all, 95.0).ceil().max(0.0) as usize).min(20);

    let ink: Vec<bool> = dist.data().iter().map(|&d| d > 0.0).collect();
    let mut map = dist;
    for v in map.data_mut() {
        *v = if *v > 0.0 { (2.0 * *v + 1.0).min(255.0).floor() } else { 0.0 };
    }
    for _ in 0..radius {
        map = dilate_gray_3x3(&map);
        for (v, &is_ink) in map.data_mut().iter_mut().zip(&ink) {
            if !is_ink {
                *v = 0.0;
            }
        }
    }
    for v in map.data_mut() {
        if *v >= MAX_STROKE {
            *v = 0.0;
        }
    }
    Ok(map)
}

fn letter_strokes(map: &FPix, letter: &Letter) -> Vec<f64> {
    letter
        .pixels()
        .map(|(x, y)| map.get_pixel_unchecked(x, y) as f64)
        .collect()
}

/// Drop letters whose mean stroke width is far below the page's.
///
/// The page statistics are taken over every letter of every line; a letter
/// is dropped when its mean is below `mean - k * std`. Lines with at most
/// one letter are dropped, and lines left without letters disappear.
pub fn remove_stroke_outliers(
    binary: &Pix,
    lines: Vec<TextLine>,
    k: f64,
) -> DewarpResult<Vec<TextLine>> {
    let map = stroke_width_map(binary)?;
    let all: Vec<f64> = lines
        .iter()
        .flat_map(|l| l.letters())
        .flat_map(|letter| letter_strokes(&map, letter))
        .collect();
    if all.is_empty() {
        return Ok(Vec::new());
    }
    let mean = all.iter().sum::<f64>() / all.len() as f64;
    let cutoff = mean - k * std_dev(&all);

    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        if line.len() <= 1 {
            continue;
        }
        let good: Vec<Letter> = line
            .letters()
            .iter()
            .filter(|letter| {
                let s = letter_strokes(&map, letter);
                !s.is_empty() && s.iter().sum::<f64>() / s.len() as f64 >= cutoff
            })
            .cloned()
            .collect();
        if good.is_empty() {
            continue;
        }
        let mut kept = TextLine::new(good);
        for u in line.underlines() {
            kept.add_underline(u.clone());
        }
        out.push(kept);
    }
    Ok(out)
}

/// Drop lines whose inter-letter gaps vary by more than `ah`.
pub fn filter_spacing_deviation(ah: f64, lines: Vec<TextLine>) -> Vec<TextLine> {
    lines
        .into_iter()
        .filter(|line| {
            let gaps: Vec<f64> = line
                .letters()
                .windows(2)
                .map(|w| w[1].x() - w[0].right())
                .collect();
            gaps.is_empty() || std_dev(&gaps) <= ah
        })
        .collect()
}

fn fit_baseline(line: &mut TextLine, min_samples: usize, thresh: f64, rng: &mut StdRng) -> bool {
    let points = line.base_points();
    let res = ransac::<BaselineEstimator>(&points, &RansacOptions::new(min_samples, thresh), rng);
    match res.model {
        Some(model) => {
            line.compress(&res.inliers);
            line.set_model(model);
            true
        }
        None => false,
    }
}

/// Fit a RANSAC baseline to every line with at least `line_len` letters,
/// keep its inliers, then merge lines sharing a baseline.
pub fn remove_outliers(
    ah: f64,
    mult: f64,
    lines: Vec<TextLine>,
    line_len: usize,
    rng: &mut StdRng,
) -> Vec<TextLine> {
    let mut fitted = Vec::with_capacity(lines.len());
    for mut line in lines {
        if line.len() < line_len {
            continue;
        }
        let min_samples = line.len() / 2 + 1;
        if fit_baseline(&mut line, min_samples, ah / 10.0 * mult, rng) && !line.is_empty() {
            fitted.push(line);
        }
    }
    merge_lines(ah, fitted, rng)
}

/// Merge lines that continue one another.
///
/// Lines are visited by the y of their first letter. A line joins the last
/// kept line when their horizontal overlap exceeds 80% of either width and
/// the mean vertical distance between their baselines over the overlap is
/// below `ah / 8`; the merged line is refit with a tighter threshold.
pub fn merge_lines(ah: f64, mut lines: Vec<TextLine>, rng: &mut StdRng) -> Vec<TextLine> {
    lines.sort_by(|a, b| {
        let ya = a.first().map_or(f64::INFINITY, |l| l.y());
        let yb = b.first().map_or(f64::INFINITY, |l| l.y());
        ya.total_cmp(&yb)
    });
    let mut out: Vec<TextLine> = Vec::with_capacity(lines.len());
    for line in lines {
        let Some(last) = out.last_mut() else {
            out.push(line);
            continue;
        };
        let x_min = line.left().max(last.left());
        let x_max = line.right().min(last.right());
        let overlap = x_max - x_min;
        let close = match (last.model(), line.model()) {
            (Some(p), Some(q)) if overlap > 0.0 => {
                let gap = p.integrate(x_min, x_max) - q.integrate(x_min, x_max);
                (gap / overlap).abs() < ah / 8.0
            }
            _ => false,
        };
        if close && (overlap > 0.8 * line.width() || overlap > 0.8 * last.width()) {
            last.merge(line);
            let min_samples = last.len().min(10);
            fit_baseline(last, min_samples, ah / 15.0, rng);
        } else {
            out.push(line);
        }
    }
    out.retain(|l| !l.is_empty());
    out
}

/// Everything the line finder learned about one page image
#[derive(Debug, Clone)]
pub struct LineSet {
    /// Dominant letter height
    pub ah: f64,
    /// Filtered lines with fitted baselines
    pub lines: Vec<TextLine>,
    /// Lines as collated, before filtering
    pub all_lines: Vec<TextLine>,
    /// Text-sized letters
    pub letters: Vec<Letter>,
    /// Every connected component
    pub components: Vec<Letter>,
}

/// Run the full line pipeline on a 1 bpp image.
///
/// Components, dominant height, size filter, collation, underline
/// attachment, stroke and spacing filters, then RANSAC with the given
/// minimum line length.
pub fn find_text_lines(
    binary: &Pix,
    mult: f64,
    stroke_k: f64,
    line_len: usize,
    rng: &mut StdRng,
) -> DewarpResult<LineSet> {
    let components = extract_letters(binary)?;
    let ah = dominant_height(&components);
    let letters = filter_text_sized(ah, &components);
    let all_lines = collate_lines(ah, &letters);
    let combined = attach_underlines(ah, all_lines.clone(), &components);
    let filtered = remove_stroke_outliers(binary, combined, stroke_k)?;
    let filtered = filter_spacing_deviation(ah, filtered);
    let lines = remove_outliers(ah, mult, filtered, line_len, rng);
    debug!(
        ah,
        components = components.len(),
        letters = letters.len(),
        collated = all_lines.len(),
        lines = lines.len(),
        "text lines"
    );
    Ok(LineSet {
        ah,
        lines,
        all_lines,
        letters,
        components,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::letter::tests::boxes_image;
    use folio_core::{PixMut, PixelDepth};
    use rand::SeedableRng;

    fn rows(n_rows: u32, per_row: u32) -> Vec<(u32, u32, u32, u32)> {
        (0..n_rows)
            .flat_map(|r| (0..per_row).map(move |i| (10 + 18 * i, 10 + 40 * r, 12, 14)))
            .collect()
    }

    #[test]
    fn test_stroke_width_of_bar() {
        // A 5 px thick horizontal bar: the center row has distance 3.
        let pix = boxes_image(40, 20, &[(5, 5, 30, 5)]);
        let map = stroke_width_map(&pix).unwrap();
        assert_eq!(map.get_pixel(20, 7).unwrap(), 7.0);
        assert_eq!(map.get_pixel(20, 5).unwrap(), 7.0);
        assert_eq!(map.get_pixel(20, 2).unwrap(), 0.0);
    }

    #[test]
    fn test_stroke_outliers_dropped() {
        // Twelve hollow glyphs with 3 px strokes plus one hairline glyph.
        let mut pm = PixMut::new(300, 40, PixelDepth::Bit1).unwrap();
        let mut draw = |x0: u32, s: u32| {
            for y in 10..24 {
                for x in x0..x0 + 12 {
                    let edge = x < x0 + s || x >= x0 + 12 - s || y < 10 + s || y >= 24 - s;
                    if edge {
                        pm.set_pixel_unchecked(x, y, 1);
                    }
                }
            }
        };
        for i in 0..12 {
            draw(10 + 18 * i, 3);
        }
        draw(10 + 18 * 12, 1);
        let pix: Pix = pm.into();
        let letters = extract_letters(&pix).unwrap();
        let lines = collate_lines(14.0, &letters);
        assert_eq!(lines.len(), 1);
        let out = remove_stroke_outliers(&pix, lines, 2.0).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 12);
        assert!(out[0].right() < 240.0);
    }

    #[test]
    fn test_spacing_deviation() {
        let even = boxes_image(300, 40, &rows(1, 10));
        let lines = collate_lines(14.0, &extract_letters(&even).unwrap());
        assert_eq!(filter_spacing_deviation(14.0, lines).len(), 1);

        let ragged: Vec<_> = [10, 25, 70, 85, 130, 145]
            .iter()
            .map(|&x| (x, 10, 12, 14))
            .collect();
        let pix = boxes_image(300, 40, &ragged);
        let lines = collate_lines(14.0, &extract_letters(&pix).unwrap());
        assert_eq!(lines.len(), 1);
        assert!(filter_spacing_deviation(10.0, lines).is_empty());
    }

    #[test]
    fn test_find_text_lines_on_rows() {
        let pix = boxes_image(400, 220, &rows(5, 15));
        let mut rng = StdRng::seed_from_u64(1);
        let set = find_text_lines(&pix, 1.0, 2.0, 10, &mut rng).unwrap();
        assert_eq!(set.ah, 14.0);
        assert_eq!(set.lines.len(), 5);
        for line in &set.lines {
            assert_eq!(line.len(), 15);
            assert!(line.model().is_some());
            assert!(line.angle().abs() < 1e-9);
        }
    }

    #[test]
    fn test_merge_lines_joins_split_row() {
        // One row collated as two overlapping fragments on the same baseline.
        let pix = boxes_image(400, 40, &rows(1, 20));
        let letters = extract_letters(&pix).unwrap();
        let (a, b): (Vec<_>, Vec<_>) = letters.into_iter().partition(|l| (l.x() as u32 / 18) % 2 == 0);
        let mut rng = StdRng::seed_from_u64(5);
        let mut la = TextLine::new(a);
        let mut lb = TextLine::new(b);
        assert!(fit_baseline(&mut la, 6, 1.4, &mut rng));
        assert!(fit_baseline(&mut lb, 6, 1.4, &mut rng));
        let merged = merge_lines(14.0, vec![lb, la], &mut rng);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].len(), 20);
    }
}
