//! folio-region - Region analysis for folio
//!
//! - **Connected component analysis** - union-find labeling of ink pixels
//!   with per-component bounding box, pixel count and centroid
//! - **Distance maps** - exact Euclidean distance transform and
//!   grayscale dilation of float rasters
//!
//! # Example
//!
//! ```
//! use folio_core::{Pix, PixelDepth};
//! use folio_region::{ConnectivityType, label_connected_components};
//!
//! let mut pm = Pix::new(20, 10, PixelDepth::Bit1).unwrap().to_mut();
//! pm.set_pixel(1, 1, 1).unwrap();
//! pm.set_pixel(2, 1, 1).unwrap();
//! pm.set_pixel(10, 5, 1).unwrap();
//! let pix: Pix = pm.into();
//!
//! let labels = label_connected_components(&pix, ConnectivityType::FourWay).unwrap();
//! assert_eq!(labels.components().len(), 2);
//! ```

pub mod conncomp;
pub mod distance;
pub mod error;

pub use conncomp::{
    ConnectedComponent, ConnectivityType, LabelMap, find_connected_components,
    label_connected_components,
};
pub use distance::{dilate_gray_3x3, distance_transform};
pub use error::{RegionError, RegionResult};
