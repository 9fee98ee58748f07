//! folio - Book page dewarping
//!
//! Corrects photographs of curved book pages so that text lines come out
//! straight and level.
//!
//! # Overview
//!
//! - Image primitives: packed 1/8/32 bpp rasters, rectangles, point arrays
//! - PNG input and output
//! - Connected components and distance transforms
//! - Mesh remapping and projective transforms
//! - The camera-model dewarping engine
//!
//! # Example
//!
//! ```no_run
//! use folio::dewarp::{CameraConfig, DewarpInput, DewarpOptions, Dewarper};
//!
//! let source = folio::io::read_image("page.png").unwrap();
//! let binary = source.threshold_to_binary(128).unwrap();
//! let dewarper = Dewarper::new(CameraConfig::default(), DewarpOptions::default());
//! let output = dewarper.dewarp(&DewarpInput::new(&source, &binary)).unwrap();
//! for (i, page) in output.pages.iter().enumerate() {
//!     folio::io::write_image(&page.image, format!("page-{i}.png")).unwrap();
//! }
//! ```

// Re-export core types (primary data structures used everywhere)
pub use folio_core::*;

// Re-export domain crates as modules to avoid name conflicts
pub use folio_dewarp as dewarp;
pub use folio_io as io;
pub use folio_region as region;
pub use folio_transform as transform;
