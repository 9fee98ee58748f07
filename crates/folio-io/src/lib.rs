//! folio-io - PNG support for folio images
//!
//! Reads and writes 1, 8 and 32 bpp [`Pix`] images as PNG. The dewarping
//! engine itself never touches files; this crate serves the regression
//! harness and callers that want to persist results.

mod error;
mod png;

pub use error::{IoError, IoResult};
pub use png::{read_png, write_png};

use folio_core::Pix;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Read a PNG image from a file path.
pub fn read_image<P: AsRef<Path>>(path: P) -> IoResult<Pix> {
    let file = File::open(path)?;
    read_png(BufReader::new(file))
}

/// Write an image to a file path as PNG.
pub fn write_image<P: AsRef<Path>>(pix: &Pix, path: P) -> IoResult<()> {
    let file = File::create(path)?;
    write_png(pix, BufWriter::new(file))
}
