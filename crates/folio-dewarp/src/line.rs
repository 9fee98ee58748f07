//! Text lines
//!
//! A [`TextLine`] is an ordered run of letters. Filtering only shrinks the
//! active letter set; the original letters are kept so the line's margin
//! anchors ([`TextLine::left_mid`], [`TextLine::right_mid`]) do not move
//! when an end letter is rejected as an outlier.

use crate::letter::Letter;
use folio_core::Polynomial;

/// Ordered letters on one baseline
#[derive(Debug, Clone)]
pub struct TextLine {
    letters: Vec<Letter>,
    original: Vec<Letter>,
    underlines: Vec<Letter>,
    model: Option<Polynomial>,
}

fn sort_by_x(letters: &mut [Letter]) {
    letters.sort_by(|a, b| a.x().total_cmp(&b.x()).then(a.y().total_cmp(&b.y())));
}

impl TextLine {
    /// Line of the given letters, sorted left to right.
    pub fn new(mut letters: Vec<Letter>) -> Self {
        sort_by_x(&mut letters);
        Self {
            original: letters.clone(),
            letters,
            underlines: Vec::new(),
            model: None,
        }
    }

    /// Number of active letters
    pub fn len(&self) -> usize {
        self.letters.len()
    }

    /// Whether no active letter is left
    pub fn is_empty(&self) -> bool {
        self.letters.is_empty()
    }

    /// Active letters, left to right
    pub fn letters(&self) -> &[Letter] {
        &self.letters
    }

    /// Letters as collated, before outlier filtering
    pub fn original(&self) -> &[Letter] {
        &self.original
    }

    /// Attached typeset underlines
    pub fn underlines(&self) -> &[Letter] {
        &self.underlines
    }

    /// Attach an underline
    pub fn add_underline(&mut self, underline: Letter) {
        if !self.underlines.contains(&underline) {
            self.underlines.push(underline);
        }
    }

    /// Fitted baseline, if any
    pub fn model(&self) -> Option<&Polynomial> {
        self.model.as_ref()
    }

    /// Store a fitted baseline
    pub fn set_model(&mut self, model: Polynomial) {
        self.model = Some(model);
    }

    /// Leftmost active letter
    pub fn first(&self) -> Option<&Letter> {
        self.letters.first()
    }

    /// Rightmost active letter
    pub fn last(&self) -> Option<&Letter> {
        self.letters.last()
    }

    /// Left edge of the first active letter
    pub fn left(&self) -> f64 {
        self.first().map_or(f64::NAN, |l| l.x())
    }

    /// Right edge of the last active letter
    pub fn right(&self) -> f64 {
        self.last().map_or(f64::NAN, |l| l.right())
    }

    /// `right() - left()`
    pub fn width(&self) -> f64 {
        self.right() - self.left()
    }

    /// Smallest letter top
    pub fn top(&self) -> f64 {
        self.letters.iter().map(|l| l.y()).fold(f64::INFINITY, f64::min)
    }

    /// Largest letter bottom
    pub fn bottom(&self) -> f64 {
        self.letters
            .iter()
            .map(|l| l.y() + l.h())
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Base points of the active letters
    pub fn base_points(&self) -> Vec<(f64, f64)> {
        self.letters.iter().map(Letter::base_point).collect()
    }

    /// Left anchor, taken from the original first letter
    pub fn left_mid(&self) -> (f64, f64) {
        self.original
            .first()
            .map_or((f64::NAN, f64::NAN), Letter::left_mid)
    }

    /// Right anchor, taken from the original last letter
    pub fn right_mid(&self) -> (f64, f64) {
        self.original
            .last()
            .map_or((f64::NAN, f64::NAN), Letter::right_mid)
    }

    /// Keep the active letters whose flag is set.
    pub fn compress(&mut self, keep: &[bool]) {
        let mut flags = keep.iter().copied();
        self.letters.retain(|_| flags.next().unwrap_or(false));
    }

    /// Absorb another line. Letters are re-sorted, so the result does not
    /// depend on which line absorbs which. The fitted model is cleared.
    pub fn merge(&mut self, other: TextLine) {
        self.letters.extend(other.letters);
        self.original.extend(other.original);
        for u in other.underlines {
            self.add_underline(u);
        }
        sort_by_x(&mut self.letters);
        sort_by_x(&mut self.original);
        self.model = None;
    }

    /// Least-squares straight line through the base points.
    pub fn fit_line(&self) -> Option<Polynomial> {
        if self.letters.len() < 2 {
            return None;
        }
        let (xs, ys): (Vec<f64>, Vec<f64>) = self.base_points().into_iter().unzip();
        Polynomial::fit(&xs, &ys, 1).ok()
    }

    /// Angle of [`TextLine::fit_line`] in radians (0 when it cannot be fit).
    pub fn angle(&self) -> f64 {
        self.fit_line()
            .map_or(0.0, |p| p.deriv().eval(0.0).atan())
    }
}
