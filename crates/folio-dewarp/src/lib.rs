//! folio-dewarp - Camera-model page dewarping
//!
//! Corrects the geometric distortion of photographed book pages so that
//! text lines come out straight and level.
//!
//! The page is modeled as a cylinder-like surface `Z = g(X)` seen by a
//! pinhole camera. Text baselines are extracted from a binary image,
//! robustly filtered, and used to fit the camera rotation and the surface
//! polynomial(s) by Levenberg-Marquardt. The fitted surface is unrolled
//! into a sampling mesh that remaps the source image; an optional fine
//! pass removes the remaining line offsets and crops the page margins.
//!
//! # Pipeline
//!
//! - [`letter`], [`collate`], [`filter`]: glyphs, text lines, robust
//!   baselines
//! - [`vanishing`]: page margins and the initial rotation
//! - [`camera`], [`surface`], [`newton`]: the camera/surface model and ray
//!   intersection
//! - [`loss`], [`optimize`]: residuals, Jacobian and the fit with restarts
//! - [`mesh`]: the dewarping mesh
//! - [`correct`], [`fine`], [`boxes`]: remap, fine correction, page boxes
//! - [`engine`]: the [`Dewarper`] entry point
//!
//! # Example
//!
//! ```no_run
//! use folio_core::Pix;
//! use folio_dewarp::{CameraConfig, DewarpInput, DewarpOptions, Dewarper, PageLayout};
//!
//! # fn run(source: &Pix, binary: &Pix) -> folio_dewarp::DewarpResult<()> {
//! let dewarper = Dewarper::new(CameraConfig::default(), DewarpOptions::default().with_seed(7));
//! let input = DewarpInput::new(source, binary)
//!     .with_layout(PageLayout::Auto)
//!     .with_landmarks(vec![(120.0, 340.0)]);
//! let output = dewarper.dewarp(&input)?;
//! for page in &output.pages {
//!     if page.report.identity {
//!         eprintln!("page left uncorrected");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod binarize;
pub mod boxes;
pub mod camera;
pub mod collate;
pub mod correct;
pub mod engine;
mod error;
pub mod filter;
pub mod fine;
pub mod letter;
pub mod line;
pub mod loss;
pub mod mesh;
pub mod newton;
pub mod optimize;
pub mod overlay;
pub mod params;
pub mod ransac;
pub mod split;
pub mod stats;
pub mod surface;
pub mod types;
pub mod vanishing;

pub use error::{DewarpError, DewarpResult};

pub use binarize::{Binarizer, ThresholdBinarizer};
pub use boxes::{PageBox, RoleCode};
pub use camera::Camera;
pub use correct::{CoarseCorrector, Corrector, GeometryCorrector, PageCorrection};
pub use engine::{DewarpInput, DewarpOutput, Dewarper, PageLayout, PageResult};
pub use filter::{LineSet, find_text_lines};
pub use letter::Letter;
pub use line::TextLine;
pub use mesh::Mesh;
pub use params::Params;
pub use surface::{PolynomialSurface, Surface, SurfaceModel};
pub use types::{CameraConfig, DewarpOptions, DewarpReport};
