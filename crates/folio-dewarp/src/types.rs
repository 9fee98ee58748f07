//! Dewarp type definitions
//!
//! Configuration values ([`CameraConfig`], [`DewarpOptions`]) and the
//! per-page [`DewarpReport`].

use crate::{DewarpError, DewarpResult};

/// Focal length (pixels) of the reference phone camera
pub const DEFAULT_FOCAL_LENGTH: f64 = 3230.0;

/// Focal length used for flatbed scans
pub const FLATBED_FOCAL_LENGTH: f64 = 10000.0;

/// Pinhole camera parameters
///
/// The camera sits at the origin looking down -Z; the image plane is at
/// depth `-f`. The principal point defaults to the image center.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraConfig {
    /// Focal length in pixels (default: 3230)
    pub focal_length: f64,

    /// Override for the RANSAC threshold multiplier
    ///
    /// When `None` the multiplier is 1.0 for `focal_length <= 3500` and 1.5
    /// above.
    pub threshold_mult: Option<f64>,

    /// Override for the principal point (image center when `None`)
    pub principal_point: Option<(f64, f64)>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            focal_length: DEFAULT_FOCAL_LENGTH,
            threshold_mult: None,
            principal_point: None,
        }
    }
}

impl CameraConfig {
    /// Create a configuration for the default camera
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for flatbed scans (very long focal length)
    pub fn flatbed() -> Self {
        Self::default().with_focal_length(FLATBED_FOCAL_LENGTH)
    }

    /// Set the focal length; values below 1 pixel are raised to 1.
    pub fn with_focal_length(mut self, f: f64) -> Self {
        if f.is_finite() {
            self.focal_length = f.max(1.0);
        }
        self
    }

    /// Override the RANSAC threshold multiplier (minimum 0.1)
    pub fn with_threshold_mult(mut self, mult: f64) -> Self {
        if mult.is_finite() {
            self.threshold_mult = Some(mult.max(0.1));
        }
        self
    }

    /// Override the principal point
    pub fn with_principal_point(mut self, x: f64, y: f64) -> Self {
        self.principal_point = Some((x, y));
        self
    }

    /// Effective RANSAC threshold multiplier
    pub fn threshold_mult(&self) -> f64 {
        self.threshold_mult
            .unwrap_or(if self.focal_length > 3500.0 { 1.5 } else { 1.0 })
    }

    /// Effective principal point for an image of the given size
    pub fn principal_point(&self, width: u32, height: u32) -> (f64, f64) {
        self.principal_point
            .unwrap_or((width as f64 / 2.0, height as f64 / 2.0))
    }

    /// Check that every field holds a usable value.
    pub fn validate(&self) -> DewarpResult<()> {
        if !self.focal_length.is_finite() || self.focal_length < 1.0 {
            return Err(DewarpError::InvalidParameter(format!(
                "focal length must be at least 1 pixel, got {}",
                self.focal_length
            )));
        }
        if let Some(m) = self.threshold_mult.filter(|m| !(m.is_finite() && *m > 0.0)) {
            return Err(DewarpError::InvalidParameter(format!(
                "threshold multiplier must be positive, got {}",
                m
            )));
        }
        if self
            .principal_point
            .is_some_and(|(x, y)| !(x.is_finite() && y.is_finite()))
        {
            return Err(DewarpError::InvalidParameter(
                "principal point must be finite".into(),
            ));
        }
        Ok(())
    }
}

/// Options for dewarping operations
#[derive(Debug, Clone, PartialEq)]
pub struct DewarpOptions {
    /// Maximum number of optimizer attempts with fresh starts (default: 6)
    pub max_attempts: usize,

    /// Final norm below which an attempt is accepted (default: 120)
    pub norm_threshold: f64,

    /// Relative cost tolerance of the optimizer (default: 1e-3)
    pub ftol: f64,

    /// Evaluation budget multiplier of the optimizer (default: 100)
    ///
    /// One attempt stops after `patience * (params + 1)` evaluations.
    pub patience: usize,

    /// Minimum letters per line for the coarse model (default: 10)
    pub coarse_line_len: usize,

    /// Minimum letters per line when measuring the fine residual (default: 4)
    pub fine_line_len: usize,

    /// Stroke width outlier cutoff in standard deviations (default: 2.0)
    pub stroke_k: f64,

    /// Divide straightness residuals by the ray depth (default: true)
    pub depth_scaling: bool,

    /// Weight line ends more than line centers (default: true)
    pub outer_weighting: bool,

    /// Weight of the margin alignment residuals (default: 0.6)
    pub align_weight: f64,

    /// Fixed mesh width; derived from the line widths when `None`
    pub mesh_width: Option<u32>,

    /// Lower bound for the derived mesh width (default: 1800)
    ///
    /// Capped by the image width.
    pub min_mesh_width: u32,

    /// Run the fine residual correction after the coarse remap (default: true)
    pub fine: bool,

    /// Seed for RANSAC sampling and random restarts (default: 0)
    pub seed: u64,

    /// Produce diagnostic overlays (default: false)
    pub diagnostics: bool,

    /// Spread detection threshold on std(line lefts) / width (default: 0.10)
    pub split_ratio: f64,
}

impl Default for DewarpOptions {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            norm_threshold: 120.0,
            ftol: 1e-3,
            patience: 100,
            coarse_line_len: 10,
            fine_line_len: 4,
            stroke_k: 2.0,
            depth_scaling: true,
            outer_weighting: true,
            align_weight: 0.6,
            mesh_width: None,
            min_mesh_width: 1800,
            fine: true,
            seed: 0,
            diagnostics: false,
            split_ratio: 0.10,
        }
    }
}

impl DewarpOptions {
    /// Create new options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of optimizer attempts (1 to 50)
    pub fn with_max_attempts(mut self, n: usize) -> Self {
        self.max_attempts = n.clamp(1, 50);
        self
    }

    /// Set the acceptance norm
    pub fn with_norm_threshold(mut self, norm: f64) -> Self {
        if norm.is_finite() {
            self.norm_threshold = norm.max(0.0);
        }
        self
    }

    /// Set the optimizer cost tolerance
    pub fn with_ftol(mut self, ftol: f64) -> Self {
        if ftol.is_finite() {
            self.ftol = ftol.clamp(1e-12, 1.0);
        }
        self
    }

    /// Set the evaluation budget multiplier
    pub fn with_patience(mut self, patience: usize) -> Self {
        self.patience = patience.max(1);
        self
    }

    /// Set the minimum letters per line for the coarse model (minimum 3)
    pub fn with_coarse_line_len(mut self, n: usize) -> Self {
        self.coarse_line_len = n.max(3);
        self
    }

    /// Set the minimum letters per line for the fine pass (minimum 2)
    pub fn with_fine_line_len(mut self, n: usize) -> Self {
        self.fine_line_len = n.max(2);
        self
    }

    /// Set the stroke width outlier cutoff
    pub fn with_stroke_k(mut self, k: f64) -> Self {
        if k.is_finite() {
            self.stroke_k = k.max(0.0);
        }
        self
    }

    /// Enable or disable depth scaling of straightness residuals
    pub fn with_depth_scaling(mut self, on: bool) -> Self {
        self.depth_scaling = on;
        self
    }

    /// Enable or disable outer weighting of straightness residuals
    pub fn with_outer_weighting(mut self, on: bool) -> Self {
        self.outer_weighting = on;
        self
    }

    /// Set the alignment weight
    pub fn with_align_weight(mut self, w: f64) -> Self {
        if w.is_finite() {
            self.align_weight = w.max(0.0);
        }
        self
    }

    /// Fix the mesh width (minimum 2)
    pub fn with_mesh_width(mut self, width: u32) -> Self {
        self.mesh_width = Some(width.max(2));
        self
    }

    /// Set the lower bound for the derived mesh width (minimum 2)
    pub fn with_min_mesh_width(mut self, width: u32) -> Self {
        self.min_mesh_width = width.max(2);
        self
    }

    /// Enable or disable the fine correction pass
    pub fn with_fine(mut self, on: bool) -> Self {
        self.fine = on;
        self
    }

    /// Set the random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Enable or disable diagnostic overlays
    pub fn with_diagnostics(mut self, on: bool) -> Self {
        self.diagnostics = on;
        self
    }

    /// Set the spread detection threshold
    pub fn with_split_ratio(mut self, ratio: f64) -> Self {
        if ratio.is_finite() {
            self.split_ratio = ratio.clamp(0.0, 1.0);
        }
        self
    }

    /// Check fields that may have been set directly.
    pub fn validate(&self) -> DewarpResult<()> {
        let bad = |what: &str| Err(DewarpError::InvalidParameter(what.to_string()));
        if self.max_attempts == 0 {
            return bad("max_attempts must be at least 1");
        }
        if !(self.ftol.is_finite() && self.ftol > 0.0) {
            return bad("ftol must be positive");
        }
        if self.patience == 0 {
            return bad("patience must be at least 1");
        }
        if self.coarse_line_len < 3 || self.fine_line_len < 2 {
            return bad("line length thresholds are too small");
        }
        if !self.norm_threshold.is_finite() || !self.stroke_k.is_finite() {
            return bad("thresholds must be finite");
        }
        if !(self.align_weight.is_finite() && self.align_weight >= 0.0) {
            return bad("align_weight must be non-negative");
        }
        if self.min_mesh_width < 2 || self.mesh_width.is_some_and(|w| w < 2) {
            return bad("mesh width must be at least 2");
        }
        Ok(())
    }
}

/// Per-page summary of a dewarp run
#[derive(Debug, Clone, PartialEq)]
pub struct DewarpReport {
    /// Residual norm of the best optimizer attempt
    pub final_norm: f64,
    /// Number of optimizer attempts run
    pub attempts: usize,
    /// The fine residual correction was applied
    pub fine_applied: bool,
    /// A mesh fell back to the minimum arc length
    pub used_fallback_mesh: bool,
    /// The focal rescale was undone because coordinates blew up
    pub rescale_fallback: bool,
    /// The best attempt reached the acceptance norm
    pub accepted: bool,
    /// The page was returned uncorrected
    pub identity: bool,
}

impl DewarpReport {
    /// Report for a page that could not be modeled and was passed through.
    pub fn identity() -> Self {
        Self {
            final_norm: f64::INFINITY,
            attempts: 0,
            fine_applied: false,
            used_fallback_mesh: false,
            rescale_fallback: false,
            accepted: false,
            identity: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_config_defaults() {
        let cam = CameraConfig::default();
        assert_eq!(cam.focal_length, 3230.0);
        assert_eq!(cam.threshold_mult(), 1.0);
        assert_eq!(cam.principal_point(200, 100), (100.0, 50.0));
        let flat = CameraConfig::flatbed();
        assert_eq!(flat.focal_length, 10000.0);
        assert_eq!(flat.threshold_mult(), 1.5);
        assert!(flat.validate().is_ok());
    }

    #[test]
    fn test_camera_config_builder() {
        let cam = CameraConfig::new()
            .with_focal_length(-5.0)
            .with_threshold_mult(2.0)
            .with_principal_point(10.0, 20.0);
        assert_eq!(cam.focal_length, 1.0);
        assert_eq!(cam.threshold_mult(), 2.0);
        assert_eq!(cam.principal_point(200, 100), (10.0, 20.0));

        let bad = CameraConfig {
            focal_length: f64::NAN,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_dewarp_options_default() {
        let opts = DewarpOptions::default();
        assert_eq!(opts.max_attempts, 6);
        assert_eq!(opts.norm_threshold, 120.0);
        assert_eq!(opts.coarse_line_len, 10);
        assert_eq!(opts.fine_line_len, 4);
        assert!(opts.depth_scaling);
        assert!(opts.fine);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_dewarp_options_builder_clamps() {
        let opts = DewarpOptions::new()
            .with_max_attempts(0)
            .with_coarse_line_len(1)
            .with_ftol(10.0)
            .with_mesh_width(1)
            .with_split_ratio(3.0);
        assert_eq!(opts.max_attempts, 1);
        assert_eq!(opts.coarse_line_len, 3);
        assert_eq!(opts.ftol, 1.0);
        assert_eq!(opts.mesh_width, Some(2));
        assert_eq!(opts.split_ratio, 1.0);
        assert!(opts.validate().is_ok());

        let bad = DewarpOptions {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_identity_report() {
        let r = DewarpReport::identity();
        assert!(r.identity);
        assert_eq!(r.attempts, 0);
        assert!(!r.accepted);
    }
}
