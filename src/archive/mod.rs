//! Archive extraction and target file discovery.
//!
//! The downloaded archive is unpacked with the `zip` crate into the request
//! workspace, then the unpacked tree is walked for the configured target
//! file names. Each target must be found exactly once.

mod extractor;
mod locator;

pub use extractor::extract_all;
pub use locator::locate;
