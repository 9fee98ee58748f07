//! folio-transform - Geometric transformations for folio
//!
//! - [`remap`] - resample an image through a per-pixel source-coordinate
//!   grid ([`RemapGrid`]) with bilinear or bicubic interpolation
//! - [`projective`] - 4-point perspective transforms
//!
//! Destination pixels whose source coordinates fall outside the image are
//! filled with the [`BorderFill`] value.

pub mod error;
pub mod projective;
pub mod remap;

pub use error::{TransformError, TransformResult};
pub use projective::{Point, ProjectiveCoeffs, projective_pta};
pub use remap::{BorderFill, Interpolation, RemapGrid, remap};
