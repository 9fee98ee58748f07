//! Geometry correction
//!
//! A [`Corrector`] turns the source image and one dewarping mesh into the
//! corrected page. [`GeometryCorrector`] runs the coarse remap followed by
//! the fine pass (residual line offsets, perspective crop, boxes);
//! [`CoarseCorrector`] stops after the remap.

use crate::DewarpResult;
use crate::binarize::Binarizer;
use crate::boxes::{BoxFrame, HandUnderline, PageBox, hand_drawn_lines, landmark_boxes, underline_boxes};
use crate::filter::find_text_lines;
use crate::fine::{CubicSurface, FineCorrection, PerspectiveCrop, line_offsets};
use crate::line::TextLine;
use crate::mesh::Mesh;
use crate::types::DewarpOptions;
use folio_core::Pix;
use folio_transform::{BorderFill, Interpolation, remap};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fmt::Debug;
use tracing::{debug, info};

/// Shared inputs of a correction
#[derive(Debug, Clone, Copy)]
pub struct CorrectContext<'a> {
    /// Binarizer used to re-detect lines in the coarse output
    pub binarizer: &'a dyn Binarizer,
    /// Engine options
    pub options: &'a DewarpOptions,
    /// RANSAC threshold multiplier
    pub mult: f64,
}

/// One corrected page
#[derive(Debug, Clone)]
pub struct PageCorrection {
    /// Corrected image
    pub image: Pix,
    /// Text and region boxes in output coordinates
    pub boxes: Vec<PageBox>,
    /// Landmarks mapped into the output and clamped to it
    pub landmarks: Vec<(f64, f64)>,
    /// Reference anchors mapped into the output (the landmarks, or two
    /// points at a quarter and three quarters of the width)
    pub anchors: Vec<(f64, f64)>,
    /// Whether the fine pass was applied
    pub fine_applied: bool,
    /// Letter height measured in the coarse output, if any text was found
    pub fine_ah: Option<f64>,
}

/// Strategy that corrects one page given its mesh.
pub trait Corrector: Debug + Send + Sync {
    /// Correct `source` through `mesh`; `landmarks` are in source
    /// coordinates.
    fn correct(
        &self,
        source: &Pix,
        mesh: &Mesh,
        landmarks: &[(f64, f64)],
        ctx: &CorrectContext<'_>,
    ) -> DewarpResult<PageCorrection>;
}

/// Coarse remap of `source` through `mesh` (white outside the source).
pub fn coarse_remap(source: &Pix, mesh: &Mesh, method: Interpolation) -> DewarpResult<Pix> {
    Ok(remap(source, &mesh.to_grid()?, method, BorderFill::White)?)
}

/// Landmarks in coarse-output coordinates, and the anchors that stand in
/// for them when there are none.
fn coarse_points(mesh: &Mesh, landmarks: &[(f64, f64)]) -> (Vec<(f64, f64)>, Vec<(f64, f64)>) {
    let mapped: Vec<(f64, f64)> = landmarks
        .iter()
        .filter_map(|&(x, y)| mesh.nearest_node(x, y))
        .collect();
    let anchors = if mapped.is_empty() {
        let (w, h) = (mesh.cols(), mesh.rows());
        vec![((w / 4) as f64, (h / 2) as f64), ((3 * w / 4) as f64, (h / 2) as f64)]
    } else {
        mapped.clone()
    };
    (mapped, anchors)
}

fn clamp_into(p: (f64, f64), width: u32, height: u32) -> (f64, f64) {
    (
        p.0.clamp(0.0, width.saturating_sub(1) as f64),
        p.1.clamp(0.0, height.saturating_sub(1) as f64),
    )
}

/// Remap only
#[derive(Debug, Clone, Copy, Default)]
pub struct CoarseCorrector {
    /// Interpolation of the remap
    pub interpolation: Interpolation,
}

impl Corrector for CoarseCorrector {
    fn correct(
        &self,
        source: &Pix,
        mesh: &Mesh,
        landmarks: &[(f64, f64)],
        _ctx: &CorrectContext<'_>,
    ) -> DewarpResult<PageCorrection> {
        let image = coarse_remap(source, mesh, self.interpolation)?;
        let (w, h) = (image.width(), image.height());
        let (mapped, anchors) = coarse_points(mesh, landmarks);
        Ok(PageCorrection {
            landmarks: mapped.into_iter().map(|p| clamp_into(p, w, h)).collect(),
            anchors: anchors.into_iter().map(|p| clamp_into(p, w, h)).collect(),
            image,
            boxes: Vec::new(),
            fine_applied: false,
            fine_ah: None,
        })
    }
}

/// Coarse remap plus fine correction
#[derive(Debug, Clone, Copy)]
pub struct GeometryCorrector {
    /// Interpolation of the final coarse remap
    pub interpolation: Interpolation,
}

impl Default for GeometryCorrector {
    fn default() -> Self {
        Self {
            interpolation: Interpolation::Bicubic,
        }
    }
}

/// Result of the fine pass on a coarse image
#[derive(Debug, Clone)]
pub struct FinePass {
    /// Shifted and cropped image
    pub image: Pix,
    /// Vertical shift field
    pub correction: FineCorrection,
    /// Margin-straightening warp
    pub crop: PerspectiveCrop,
    /// Letter height of the coarse output
    pub ah: f64,
    /// Lines found in the coarse output
    pub lines: Vec<TextLine>,
    /// Hand-drawn underlines found in the coarse output
    pub underlines: Vec<HandUnderline>,
}

impl FinePass {
    /// Map a coarse-output point into the final output (unclamped).
    pub fn map_point(&self, x: f64, y: f64) -> (f64, f64) {
        let (x, y) = self.correction.map_point(x, y);
        self.crop.map_point(x, y)
    }
}

/// Run the fine pass. Returns `None` when the coarse output does not hold
/// enough measurable text.
pub fn fine_pass(coarse: &Pix, ctx: &CorrectContext<'_>) -> DewarpResult<Option<FinePass>> {
    let (w, h) = (coarse.width(), coarse.height());
    let binary = ctx.binarizer.binarize(coarse)?;
    let mut rng = StdRng::seed_from_u64(ctx.options.seed);
    let set = find_text_lines(
        &binary,
        ctx.mult,
        ctx.options.stroke_k,
        ctx.options.fine_line_len,
        &mut rng,
    )?;
    let ah = set.ah;

    let samples = line_offsets(&set.lines, w);
    let Some(surface) = CubicSurface::fit(&samples, ah, w, h) else {
        debug!(samples = samples.len(), "too few level lines for the fine pass");
        return Ok(None);
    };
    let correction = FineCorrection::new(surface, ah);
    let Some(crop) = PerspectiveCrop::estimate(&set.lines, w, h, ah, &mut rng) else {
        debug!("page margins not found for the perspective crop");
        return Ok(None);
    };

    let shifted = remap(coarse, &correction.grid(w, h)?, Interpolation::Bilinear, BorderFill::White)?;
    let image = crop.apply(&shifted, Interpolation::Bilinear)?;
    let underlines = hand_drawn_lines(ah, &set.lines, &set.components);
    Ok(Some(FinePass {
        image,
        correction,
        crop,
        ah,
        lines: set.lines,
        underlines,
    }))
}

impl Corrector for GeometryCorrector {
    fn correct(
        &self,
        source: &Pix,
        mesh: &Mesh,
        landmarks: &[(f64, f64)],
        ctx: &CorrectContext<'_>,
    ) -> DewarpResult<PageCorrection> {
        if !ctx.options.fine {
            return CoarseCorrector {
                interpolation: self.interpolation,
            }
            .correct(source, mesh, landmarks, ctx);
        }
        let coarse = coarse_remap(source, mesh, self.interpolation)?;
        let (mapped, anchors) = coarse_points(mesh, landmarks);
        let Some(pass) = fine_pass(&coarse, ctx)? else {
            info!("fine pass skipped, keeping the coarse output");
            let (w, h) = (coarse.width(), coarse.height());
            return Ok(PageCorrection {
                landmarks: mapped.into_iter().map(|p| clamp_into(p, w, h)).collect(),
                anchors: anchors.into_iter().map(|p| clamp_into(p, w, h)).collect(),
                image: coarse,
                boxes: Vec::new(),
                fine_applied: false,
                fine_ah: None,
            });
        };

        let (w, h) = (pass.image.width(), pass.image.height());
        let map = |x: f64, y: f64| pass.map_point(x, y);
        let frame = BoxFrame {
            ah: pass.ah,
            width: w,
            height: h,
            pad_left: pass.crop.pad(),
            pad_right: pass.crop.pad(),
            map: &map,
        };
        let mut boxes = landmark_boxes(&frame, &pass.lines, &mapped, coarse.width());
        boxes.extend(underline_boxes(&frame, &pass.lines, &pass.underlines));
        debug!(boxes = boxes.len(), underlines = pass.underlines.len(), "fine pass applied");

        let chain = |p: (f64, f64)| clamp_into(pass.map_point(p.0, p.1), w, h);
        Ok(PageCorrection {
            landmarks: mapped.into_iter().map(chain).collect(),
            anchors: anchors.into_iter().map(chain).collect(),
            boxes,
            fine_applied: true,
            fine_ah: Some(pass.ah),
            image: pass.image,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binarize::ThresholdBinarizer;
    use crate::letter::tests::boxes_image;

    fn ctx<'a>(bin: &'a ThresholdBinarizer, opts: &'a DewarpOptions) -> CorrectContext<'a> {
        CorrectContext {
            binarizer: bin,
            options: opts,
            mult: 1.0,
        }
    }

    fn text_page() -> Pix {
        let rects: Vec<_> = (0..8)
            .flat_map(|r| (0..16).map(move |i| (40 + 20 * i, 30 + 30 * r, 12, 14)))
            .collect();
        boxes_image(400, 280, &rects)
    }

    #[test]
    fn test_coarse_identity_mesh_keeps_image() {
        let pix = text_page();
        let mesh = Mesh::identity(400, 280);
        let bin = ThresholdBinarizer::default();
        let opts = DewarpOptions::default();
        let out = CoarseCorrector::default()
            .correct(&pix, &mesh, &[(1000.0, -50.0)], &ctx(&bin, &opts))
            .unwrap();
        assert!(!out.fine_applied);
        assert_eq!((out.image.width(), out.image.height()), (400, 280));
        // 1 bpp ink becomes black gray.
        assert_eq!(out.image.get_pixel(45, 35), Some(0));
        assert_eq!(out.image.get_pixel(5, 5), Some(255));
        // A landmark far outside still lands on the border.
        assert_eq!(out.landmarks, vec![(399.0, 0.0)]);
    }

    #[test]
    fn test_default_anchors_without_landmarks() {
        let mesh = Mesh::identity(400, 280);
        let (mapped, anchors) = coarse_points(&mesh, &[]);
        assert!(mapped.is_empty());
        assert_eq!(anchors, vec![(100.0, 140.0), (300.0, 140.0)]);
    }

    #[test]
    fn test_fine_pass_on_straight_page() {
        let pix = text_page();
        let mesh = Mesh::identity(400, 280);
        let bin = ThresholdBinarizer::default();
        let opts = DewarpOptions::default();
        let out = GeometryCorrector::default()
            .correct(&pix, &mesh, &[(45.0, 37.0)], &ctx(&bin, &opts))
            .unwrap();
        assert!(out.fine_applied);
        assert_eq!(out.fine_ah, Some(14.0));
        // Margins at 40 and 352 padded by 42 on each side.
        assert_eq!(out.image.width(), 312 + 84);
        assert_eq!(out.image.height(), 280);
        let (x, y) = out.landmarks[0];
        assert!((x - 47.0).abs() < 1e-6 && (y - 37.0).abs() < 1e-6, "{:?}", out.landmarks);
        assert_eq!(out.boxes.len(), 1);
    }

    #[test]
    fn test_fine_pass_needs_text() {
        let blank = boxes_image(200, 100, &[]);
        let bin = ThresholdBinarizer::default();
        let opts = DewarpOptions::default();
        let gray = blank.convert_to_8().unwrap();
        assert!(fine_pass(&gray, &ctx(&bin, &opts)).unwrap().is_none());
    }
}
