//! Optimizer parameter vector
//!
//! Flat layout, for `P` pages and `L` straightness targets:
//!
//! ```text
//! [ theta (3) | a_m (13 per page) | align (2 per page) | seam (1) | l_k (L) ]
//! ```

use crate::surface::{DEGREE, OMEGA};
use crate::{DewarpError, DewarpResult};
use nalgebra::DVector;

/// Offsets into the flat parameter vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamLayout {
    /// Number of pages (1 or 2)
    pub pages: usize,
    /// Number of straightness targets (lines plus underlines)
    pub lines: usize,
}

impl ParamLayout {
    /// Create a layout
    pub fn new(pages: usize, lines: usize) -> Self {
        Self { pages, lines }
    }

    /// Total number of parameters
    pub fn len(&self) -> usize {
        3 + DEGREE * self.pages + 2 * self.pages + 1 + self.lines
    }

    /// Always false; the rotation is always present
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Offset of the first surface coefficient of `page`
    pub fn coeff(&self, page: usize) -> usize {
        3 + DEGREE * page
    }

    /// Offset of the alignment target of `page`, side 0 (left) or 1 (right)
    pub fn align(&self, page: usize, side: usize) -> usize {
        3 + DEGREE * self.pages + 2 * page + side
    }

    /// Offset of the seam
    pub fn seam(&self) -> usize {
        3 + (DEGREE + 2) * self.pages
    }

    /// Offset of straightness target `k`
    pub fn height(&self, k: usize) -> usize {
        self.seam() + 1 + k
    }

    /// Per-entry scale; the optimizer works on `x / scale`.
    pub fn scales(&self) -> DVector<f64> {
        let mut s = DVector::from_element(self.len(), 1000.0);
        for i in 0..3 {
            s[i] = 0.3;
        }
        let step = 3e-4 / OMEGA;
        for page in 0..self.pages {
            let base = self.coeff(page);
            for m in 0..DEGREE {
                s[base + m] = 1000.0 * step.powi(m as i32);
            }
        }
        s
    }
}

/// Named view of the parameter vector
#[derive(Debug, Clone, PartialEq)]
pub struct Params {
    /// Axis-angle page rotation
    pub theta: [f64; 3],
    /// Surface coefficients `a_1..a_13`, one set per page
    pub coeffs: Vec<[f64; DEGREE]>,
    /// Margin alignment targets (left, right) in page-frame X, per page
    pub align: Vec<[f64; 2]>,
    /// Seam between the pages in page-frame X
    pub seam: f64,
    /// Straightness targets `l_k` in page-frame Y
    pub heights: Vec<f64>,
}

impl Params {
    /// Flat page, no rotation, margins at -1000 / 1000.
    pub fn initial(pages: usize, lines: usize) -> Self {
        Self {
            theta: [0.0; 3],
            coeffs: vec![[0.0; DEGREE]; pages],
            align: vec![[-1000.0, 1000.0]; pages],
            seam: 0.0,
            heights: vec![0.0; lines],
        }
    }

    /// Layout of this parameter set
    pub fn layout(&self) -> ParamLayout {
        ParamLayout::new(self.coeffs.len(), self.heights.len())
    }

    /// Flatten into the optimizer vector.
    pub fn pack(&self) -> DVector<f64> {
        let layout = self.layout();
        let mut v = DVector::zeros(layout.len());
        v.as_mut_slice()[..3].copy_from_slice(&self.theta);
        for (page, (a, al)) in self.coeffs.iter().zip(&self.align).enumerate() {
            let base = layout.coeff(page);
            v.as_mut_slice()[base..base + DEGREE].copy_from_slice(a);
            v[layout.align(page, 0)] = al[0];
            v[layout.align(page, 1)] = al[1];
        }
        v[layout.seam()] = self.seam;
        for (k, l) in self.heights.iter().enumerate() {
            v[layout.height(k)] = *l;
        }
        v
    }

    /// Rebuild from a flat vector.
    ///
    /// # Errors
    ///
    /// Returns [`DewarpError::InvalidParameter`] if `flat` does not have
    /// the length the layout requires.
    pub fn unpack(flat: &[f64], pages: usize, lines: usize) -> DewarpResult<Self> {
        let layout = ParamLayout::new(pages, lines);
        if flat.len() != layout.len() {
            return Err(DewarpError::InvalidParameter(format!(
                "parameter vector for {} pages and {} lines needs {} entries, got {}",
                pages,
                lines,
                layout.len(),
                flat.len()
            )));
        }
        let mut coeffs = Vec::with_capacity(pages);
        let mut align = Vec::with_capacity(pages);
        for page in 0..pages {
            let base = layout.coeff(page);
            let mut a = [0.0; DEGREE];
            a.copy_from_slice(&flat[base..base + DEGREE]);
            coeffs.push(a);
            align.push([flat[layout.align(page, 0)], flat[layout.align(page, 1)]]);
        }
        Ok(Self {
            theta: [flat[0], flat[1], flat[2]],
            coeffs,
            align,
            seam: flat[layout.seam()],
            heights: flat[layout.height(0)..].to_vec(),
        })
    }
}
