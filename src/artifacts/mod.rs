//! Run artifacts: the annotated video and violation screenshots.

mod screenshot;
mod video;
#[cfg(feature = "output-video-ffmpeg")]
mod video_ffmpeg;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use crate::error::WriteError;

pub use screenshot::{screenshot_file_name, ScreenshotWriter};
pub use video::{FrameSequenceWriter, SequenceManifest, VideoSink, MANIFEST_FILE};
#[cfg(feature = "output-video-ffmpeg")]
pub use video_ffmpeg::FfmpegVideoWriter;

pub const JPEG_QUALITY: u8 = 90;

/// JPEG-encode an RGB frame.
pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).encode_image(image)?;
    Ok(buf)
}

/// Open the annotated-output sink for a run under `output_root`.
///
/// With `output-video-ffmpeg` this is an MPEG-4 file; otherwise a JPEG
/// frame sequence.
pub fn create_video_sink(
    output_root: &Path,
    started_at: &DateTime<Local>,
    fps: f64,
) -> Result<Box<dyn VideoSink>, WriteError> {
    #[cfg(feature = "output-video-ffmpeg")]
    {
        Ok(Box::new(FfmpegVideoWriter::create(output_root, started_at, fps)?))
    }
    #[cfg(not(feature = "output-video-ffmpeg"))]
    {
        Ok(Box::new(FrameSequenceWriter::create(output_root, started_at, fps)?))
    }
}

/// The sinks enabled for a run.
pub struct ArtifactWriter {
    video: Option<Box<dyn VideoSink>>,
    screenshots: Option<ScreenshotWriter>,
}

impl ArtifactWriter {
    pub fn new(video: Option<Box<dyn VideoSink>>, screenshots: Option<ScreenshotWriter>) -> Self {
        Self { video, screenshots }
    }

    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    pub fn saves_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn saves_screenshots(&self) -> bool {
        self.screenshots.is_some()
    }

    pub fn screenshot_dir(&self) -> Option<&Path> {
        self.screenshots.as_ref().map(ScreenshotWriter::dir)
    }

    /// Append a frame to the video sink, if one is enabled.
    pub fn write_frame_to_video(&mut self, frame: &RgbImage) -> Result<(), WriteError> {
        match self.video.as_mut() {
            Some(sink) => sink.write_frame(frame),
            None => Ok(()),
        }
    }

    /// Save a screenshot, if enabled. `Ok(None)` when screenshots are off.
    pub fn write_screenshot(
        &self,
        jpeg: &[u8],
        captured_at: &DateTime<Local>,
        frame_index: u64,
    ) -> Result<Option<PathBuf>, WriteError> {
        match &self.screenshots {
            Some(writer) => writer.write(jpeg, captured_at, frame_index).map(Some),
            None => Ok(None),
        }
    }

    /// Finalize the video sink. Returns its output location, if any.
    pub fn finish(&mut self, complete: bool) -> Result<Option<PathBuf>, WriteError> {
        match self.video.take() {
            Some(sink) => sink.finish(complete).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn jpeg_encoding_round_trips_dimensions() {
        let image = RgbImage::from_pixel(32, 24, Rgb([200, 10, 10]));
        let jpeg = encode_jpeg(&image).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn disabled_writer_is_a_no_op() {
        let mut writer = ArtifactWriter::disabled();
        assert!(!writer.saves_video());
        writer.write_frame_to_video(&RgbImage::new(2, 2)).unwrap();
        assert_eq!(writer.write_screenshot(&[], &Local::now(), 0).unwrap(), None);
        assert_eq!(writer.finish(true).unwrap(), None);
    }
}
