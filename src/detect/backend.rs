use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// The detector is a black box to the rest of the pipeline: given a frame it
/// returns labeled boxes in frame pixel coordinates with confidences in
/// `[0, 1]`. Confidence filtering and violation classification happen
/// downstream, so backends should return everything they see.
///
/// A failing `detect` call is not fatal; the pipeline treats the frame as
/// having no detections and carries on.
pub trait DetectorBackend: Send {
    /// Backend identifier, as used in configuration.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook, called once before the first frame.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
