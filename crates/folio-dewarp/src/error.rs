//! Error types for folio-dewarp

use thiserror::Error;

/// Errors that can occur during dewarping
///
/// Degenerate page content (too few lines, an optimizer that never reaches
/// the acceptance norm) is not an error; it is reported through
/// [`crate::DewarpReport`]. Errors are reserved for invalid input.
#[derive(Debug, Error)]
pub enum DewarpError {
    /// Core library error
    #[error("core error: {0}")]
    Core(#[from] folio_core::Error),

    /// Region analysis error
    #[error("region error: {0}")]
    Region(#[from] folio_region::RegionError),

    /// Transform error
    #[error("transform error: {0}")]
    Transform(#[from] folio_transform::TransformError),

    /// Unsupported pixel depth for this operation
    #[error("unsupported depth: expected {expected}, got {actual}")]
    UnsupportedDepth { expected: &'static str, actual: u32 },

    /// Source and binary images differ in size
    #[error("image size mismatch: source {source_size:?}, binary {binary_size:?}")]
    SizeMismatch {
        source_size: (u32, u32),
        binary_size: (u32, u32),
    },

    /// Invalid parameter
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for dewarp operations
pub type DewarpResult<T> = Result<T, DewarpError>;
