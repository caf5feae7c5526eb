//! Frame sources.
//!
//! Sources yield decoded RGB frames strictly in order and report
//! end-of-stream as `Ok(None)`. Supported inputs:
//! - `stub://<name>` synthetic frames (tests and demos)
//! - a directory of still images, read in file-name order
//! - local video files (feature: ingest-file-ffmpeg)
//!
//! Only local inputs are accepted; network streams are rejected.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;

use anyhow::Result;
use image::RgbImage;

pub use file::{FileConfig, FileSource, FileStats};

/// An ordered stream of decoded frames.
pub trait FrameSource {
    /// Human-readable description for logs and the run summary.
    fn describe(&self) -> String;

    /// Native frame rate, when the container reports one.
    fn fps(&self) -> Option<f64> {
        None
    }

    /// Next frame in order, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}
