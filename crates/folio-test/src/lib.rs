//! folio-test - Regression test framework for folio
//!
//! Supports three modes, selected by the `REGTEST_MODE` environment
//! variable:
//!
//! - **Generate**: write golden images for later comparison
//! - **Compare**: compare values and images (default); images without a
//!   golden counterpart are only written to the output directory
//! - **Display**: run the checks and keep the rendered images for
//!   inspection
//!
//! The [`synthetic`] module renders text pages with known geometry (flat
//! and cylindrically curled) so that tests do not depend on scanned data.
//!
//! # Usage
//!
//! ```ignore
//! use folio_test::RegParams;
//!
//! let mut rp = RegParams::new("dewarp_flat");
//! rp.compare_values(12.0, line_count as f64, 0.0);
//! assert!(rp.cleanup());
//! ```

mod error;
mod params;
pub mod synthetic;

pub use error::{TestError, TestResult};
pub use params::{RegParams, RegTestMode};

/// Get the path to the workspace root
fn workspace_root() -> String {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    // folio-test is at crates/folio-test, so go up two directories
    format!("{}/../..", manifest_dir)
}

/// Get the path to the golden files directory
pub fn golden_dir() -> String {
    format!("{}/tests/golden", workspace_root())
}

/// Get the path to the regout (regression output) directory
pub fn regout_dir() -> String {
    format!("{}/tests/regout", workspace_root())
}
