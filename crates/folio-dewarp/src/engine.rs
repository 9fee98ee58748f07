//! Dewarping engine
//!
//! [`Dewarper`] runs the whole pipeline for one image: line extraction,
//! optional two-page handling, the camera/surface fit with restarts, mesh
//! generation and the geometry correction of every page.

use crate::binarize::{Binarizer, ThresholdBinarizer};
use crate::boxes::PageBox;
use crate::camera::Camera;
use crate::correct::{CorrectContext, Corrector, GeometryCorrector};
use crate::filter::{LineSet, find_text_lines};
use crate::line::TextLine;
use crate::loss::{LossOptions, Objective};
use crate::mesh::{MeshOptions, make_meshes};
use crate::optimize::fit_with_retries;
use crate::overlay::{line_overlay, surface_overlay};
use crate::split::{is_spread, page_crops, partition_lines, split_column};
use crate::surface::{PolynomialSurface, SurfaceModel};
use crate::types::{CameraConfig, DewarpOptions, DewarpReport};
use crate::vanishing::initial_rotation;
use crate::{DewarpError, DewarpResult};
use folio_core::{Pix, PixelDepth};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

/// How the input image is divided into pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageLayout {
    /// One page
    #[default]
    Single,
    /// Split when the lines look like a two-page spread
    Auto,
    /// Two pages, each cropped and processed on its own
    Split,
    /// Two pages fitted jointly with one seamed surface
    Spread,
}

/// One image to dewarp
#[derive(Debug, Clone)]
pub struct DewarpInput<'a> {
    /// Image to correct (1, 8 or 32 bpp)
    pub source: &'a Pix,
    /// Ink mask of the same size (1 bpp, ink = 1)
    pub binary: &'a Pix,
    /// Principal point override for this image
    pub principal_point: Option<(f64, f64)>,
    /// Reference points in source coordinates
    pub landmarks: Vec<(f64, f64)>,
    /// Page layout
    pub layout: PageLayout,
    /// Column separating two pages, instead of the detected one
    pub split_hint: Option<f64>,
}

impl<'a> DewarpInput<'a> {
    /// Input with a single page and no landmarks
    pub fn new(source: &'a Pix, binary: &'a Pix) -> Self {
        Self {
            source,
            binary,
            principal_point: None,
            landmarks: Vec::new(),
            layout: PageLayout::Single,
            split_hint: None,
        }
    }

    /// Set the landmarks
    pub fn with_landmarks(mut self, landmarks: Vec<(f64, f64)>) -> Self {
        self.landmarks = landmarks;
        self
    }

    /// Set the page layout
    pub fn with_layout(mut self, layout: PageLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Set the split column
    pub fn with_split_hint(mut self, x: f64) -> Self {
        if x.is_finite() {
            self.split_hint = Some(x);
        }
        self
    }

    /// Set the principal point
    pub fn with_principal_point(mut self, x: f64, y: f64) -> Self {
        self.principal_point = Some((x, y));
        self
    }
}

/// One corrected page
#[derive(Debug, Clone)]
pub struct PageResult {
    /// Corrected image
    pub image: Pix,
    /// Text and region boxes in output coordinates
    pub boxes: Vec<PageBox>,
    /// Landmarks mapped into the output
    pub landmarks: Vec<(f64, f64)>,
    /// Landmarks, or default anchor points, mapped into the output
    pub anchors: Vec<(f64, f64)>,
    /// Fit and fallback summary
    pub report: DewarpReport,
    /// Dominant letter height in the source
    pub ah: f64,
    /// Number of lines used for the fit
    pub line_count: usize,
    /// Number of lines before filtering
    pub all_line_count: usize,
    /// Source rectangle the page was taken from
    pub region: folio_core::Box,
    /// Diagnostic overlays (empty unless enabled)
    pub diagnostics: Vec<Pix>,
}

/// Result of [`Dewarper::dewarp`]
#[derive(Debug, Clone)]
pub struct DewarpOutput {
    /// Corrected pages, left to right
    pub pages: Vec<PageResult>,
}

/// The work for one model fit.
struct PageJob<'a> {
    source: &'a Pix,
    camera: Camera,
    set: LineSet,
    /// Lines grouped by physical page (one group, or two for a spread)
    groups: Vec<Vec<TextLine>>,
    landmarks: Vec<(f64, f64)>,
    region: folio_core::Box,
    /// Column between the pages of a jointly fitted spread
    split: Option<f64>,
}

/// Page dewarping engine
///
/// # Example
///
/// ```no_run
/// use folio_dewarp::{CameraConfig, DewarpInput, DewarpOptions, Dewarper};
/// # fn run(source: &folio_core::Pix, binary: &folio_core::Pix) -> folio_dewarp::DewarpResult<()> {
/// let dewarper = Dewarper::new(CameraConfig::default(), DewarpOptions::default());
/// let output = dewarper.dewarp(&DewarpInput::new(source, binary))?;
/// for page in &output.pages {
///     println!("{}x{} norm {}", page.image.width(), page.image.height(), page.report.final_norm);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Dewarper {
    camera: CameraConfig,
    options: DewarpOptions,
    surface: Box<dyn SurfaceModel>,
    corrector: Box<dyn Corrector>,
    binarizer: Box<dyn Binarizer>,
}

impl Dewarper {
    /// Create an engine with the default strategies.
    pub fn new(camera: CameraConfig, options: DewarpOptions) -> Self {
        Self {
            camera,
            options,
            surface: Box::new(PolynomialSurface),
            corrector: Box::new(GeometryCorrector::default()),
            binarizer: Box::new(ThresholdBinarizer::default()),
        }
    }

    /// Replace the surface model
    pub fn with_surface_model<S: SurfaceModel + 'static>(mut self, model: S) -> Self {
        self.surface = Box::new(model);
        self
    }

    /// Replace the corrector
    pub fn with_corrector<C: Corrector + 'static>(mut self, corrector: C) -> Self {
        self.corrector = Box::new(corrector);
        self
    }

    /// Replace the binarizer used by the fine pass
    pub fn with_binarizer<B: Binarizer + 'static>(mut self, binarizer: B) -> Self {
        self.binarizer = Box::new(binarizer);
        self
    }

    /// Camera configuration
    pub fn camera(&self) -> &CameraConfig {
        &self.camera
    }

    /// Engine options
    pub fn options(&self) -> &DewarpOptions {
        &self.options
    }

    /// Dewarp one image.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid configuration or input: an empty
    /// image, a binary image that is not 1 bpp, or images of different
    /// sizes. Pages without enough text are passed through uncorrected and
    /// flagged in their [`DewarpReport`].
    pub fn dewarp(&self, input: &DewarpInput<'_>) -> DewarpResult<DewarpOutput> {
        self.camera.validate()?;
        self.options.validate()?;
        validate_input(input)?;

        let (w, h) = (input.source.width(), input.source.height());
        let mut config = self.camera.clone();
        if let Some((x, y)) = input.principal_point {
            config = config.with_principal_point(x, y);
        }
        let camera = Camera::from_config(&config, w, h);
        let mut rng = StdRng::seed_from_u64(self.options.seed);
        let set = self.find_lines(input.binary, &camera, &mut rng)?;
        info!(width = w, height = h, ah = set.ah, lines = set.lines.len(), "image analyzed");

        let layout = match input.layout {
            PageLayout::Auto if is_spread(&set.lines, w, h, self.options.split_ratio) => {
                PageLayout::Split
            }
            PageLayout::Auto => PageLayout::Single,
            other => other,
        };
        let split = match layout {
            PageLayout::Split | PageLayout::Spread => {
                input.split_hint.or_else(|| split_column(&set.lines))
            }
            PageLayout::Single | PageLayout::Auto => None,
        };
        debug!(?layout, ?split, "page layout");

        let full = folio_core::Box::new_unchecked(0, 0, w as i32, h as i32);
        let single = |set: LineSet| PageJob {
            source: input.source,
            camera,
            groups: vec![set.lines.clone()],
            set,
            landmarks: input.landmarks.clone(),
            region: full,
            split: None,
        };

        let mut pages = Vec::new();
        match (layout, split) {
            (PageLayout::Split, Some(cut)) => {
                let crops = page_crops(w, h, cut);
                let sources = [
                    input.source.clip_rectangle(&crops[0])?,
                    input.source.clip_rectangle(&crops[1])?,
                ];
                for (crop, source) in crops.iter().zip(&sources) {
                    let binary = input.binary.clip_rectangle(crop)?;
                    let cam = camera.cropped(crop.x as f64, crop.y as f64);
                    let set = self.find_lines(&binary, &cam, &mut rng)?;
                    let (x0, x1) = (crop.x as f64, crop.right() as f64);
                    let landmarks = input
                        .landmarks
                        .iter()
                        .filter(|p| p.0 >= x0 && p.0 < x1)
                        .map(|&(x, y)| (x - x0, y - crop.y as f64))
                        .collect();
                    let job = PageJob {
                        source,
                        camera: cam,
                        groups: vec![set.lines.clone()],
                        set,
                        landmarks,
                        region: *crop,
                        split: None,
                    };
                    pages.extend(self.run(job, &mut rng)?);
                }
            }
            (PageLayout::Spread, Some(cut)) => {
                let [left, right] = partition_lines(&set.lines, cut);
                if left.is_empty() || right.is_empty() {
                    warn!(cut, "spread has text on one side only, fitting one page");
                    pages.extend(self.run(single(set), &mut rng)?);
                } else {
                    let job = PageJob {
                        groups: vec![left, right],
                        split: Some(cut),
                        ..single(set)
                    };
                    pages.extend(self.run(job, &mut rng)?);
                }
            }
            (PageLayout::Split | PageLayout::Spread, None) => {
                warn!("no two-page split found, processing as one page");
                pages.extend(self.run(single(set), &mut rng)?);
            }
            _ => pages.extend(self.run(single(set), &mut rng)?),
        }
        Ok(DewarpOutput { pages })
    }

    fn find_lines(&self, binary: &Pix, camera: &Camera, rng: &mut StdRng) -> DewarpResult<LineSet> {
        find_text_lines(
            binary,
            camera.mult,
            self.options.stroke_k,
            self.options.coarse_line_len,
            rng,
        )
    }

    fn run(&self, job: PageJob<'_>, rng: &mut StdRng) -> DewarpResult<Vec<PageResult>> {
        let lines: Vec<TextLine> = job.groups.concat();
        if lines.len() < 2 {
            warn!(lines = lines.len(), "too few text lines, page left uncorrected");
            return Ok(vec![self.identity_page(&job, DewarpReport::identity())?]);
        }
        let ah = job.set.ah;
        let model = self.surface.as_ref();

        let theta0 = initial_rotation(&job.camera, &lines, ah, rng);
        debug!(?theta0, "initial rotation");
        let loss = LossOptions {
            depth_scaling: self.options.depth_scaling,
            outer_weighting: self.options.outer_weighting,
            align_weight: self.options.align_weight,
        };
        let objective = Objective::new(job.camera, &job.groups, ah, loss, rng);
        let fit = fit_with_retries(&objective, model, theta0, &self.options, rng);
        let params = &fit.best.params;

        let mut diagnostics = Vec::new();
        if self.options.diagnostics {
            diagnostics.push(line_overlay(job.source, &job.set.all_lines, &job.set.lines)?);
            diagnostics.push(surface_overlay(job.source, &job.camera, params, model, &lines)?);
        }

        let mesh_opts = MeshOptions {
            width: self.options.mesh_width,
            min_width: self.options.min_mesh_width,
            image_width: job.source.width(),
        };
        let Some(meshes) = make_meshes(&job.camera, params, model, &lines, &mesh_opts) else {
            let report = DewarpReport {
                final_norm: fit.best.norm,
                attempts: fit.attempts,
                accepted: fit.accepted,
                used_fallback_mesh: true,
                ..DewarpReport::identity()
            };
            let mut page = self.identity_page(&job, report)?;
            page.diagnostics = diagnostics;
            return Ok(vec![page]);
        };

        let ctx = CorrectContext {
            binarizer: self.binarizer.as_ref(),
            options: &self.options,
            mult: job.camera.mult,
        };
        let two = meshes.meshes.len() == 2;
        let mut pages = Vec::with_capacity(meshes.meshes.len());
        for (i, mesh) in meshes.meshes.iter().enumerate() {
            let landmarks: Vec<(f64, f64)> = match job.split {
                Some(cut) if two => job
                    .landmarks
                    .iter()
                    .copied()
                    .filter(|p| (p.0 >= cut) == (i == 1))
                    .collect(),
                _ => job.landmarks.clone(),
            };
            let corrected = self.corrector.correct(job.source, mesh, &landmarks, &ctx)?;
            let report = DewarpReport {
                final_norm: fit.best.norm,
                attempts: fit.attempts,
                fine_applied: corrected.fine_applied,
                used_fallback_mesh: meshes.used_fallback,
                rescale_fallback: meshes.rescale_fallback,
                accepted: fit.accepted,
                identity: false,
            };
            info!(
                page = i,
                width = corrected.image.width(),
                height = corrected.image.height(),
                boxes = corrected.boxes.len(),
                fine = corrected.fine_applied,
                "page corrected"
            );
            pages.push(PageResult {
                image: corrected.image,
                boxes: corrected.boxes,
                landmarks: corrected.landmarks,
                anchors: corrected.anchors,
                report,
                ah,
                line_count: lines.len(),
                all_line_count: job.set.all_lines.len(),
                region: job.region,
                diagnostics: diagnostics.clone(),
            });
        }
        Ok(pages)
    }

    /// The page passed through unchanged.
    fn identity_page(&self, job: &PageJob<'_>, report: DewarpReport) -> DewarpResult<PageResult> {
        let (w, h) = (job.source.width(), job.source.height());
        let clamp = |(x, y): (f64, f64)| {
            (
                x.clamp(0.0, w.saturating_sub(1) as f64),
                y.clamp(0.0, h.saturating_sub(1) as f64),
            )
        };
        let landmarks: Vec<(f64, f64)> = job.landmarks.iter().copied().map(clamp).collect();
        let anchors = if landmarks.is_empty() {
            vec![((w / 4) as f64, (h / 2) as f64), ((3 * w / 4) as f64, (h / 2) as f64)]
        } else {
            landmarks.clone()
        };
        let mut diagnostics = Vec::new();
        if self.options.diagnostics {
            diagnostics.push(line_overlay(job.source, &job.set.all_lines, &job.set.lines)?);
        }
        Ok(PageResult {
            image: job.source.clone(),
            boxes: Vec::new(),
            landmarks,
            anchors,
            report,
            ah: job.set.ah,
            line_count: job.set.lines.len(),
            all_line_count: job.set.all_lines.len(),
            region: job.region,
            diagnostics,
        })
    }
}

fn validate_input(input: &DewarpInput<'_>) -> DewarpResult<()> {
    let (source, binary) = (input.source, input.binary);
    if source.width() == 0 || source.height() == 0 {
        return Err(DewarpError::InvalidParameter("source image is empty".to_string()));
    }
    if binary.depth() != PixelDepth::Bit1 {
        return Err(DewarpError::UnsupportedDepth {
            expected: "1 bpp",
            actual: binary.depth().bits(),
        });
    }
    if (source.width(), source.height()) != (binary.width(), binary.height()) {
        return Err(DewarpError::SizeMismatch {
            source_size: (source.width(), source.height()),
            binary_size: (binary.width(), binary.height()),
        });
    }
    Ok(())
}
