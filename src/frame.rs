//! Frames and video-relative timestamps.
//!
//! - `Frame`: one decoded image plus its position in the input video.
//! - `FrameTimestamp`: offset from the start of the video, derived from the
//!   frame index and frame rate (never from the wall clock), so throttling
//!   decisions are reproducible for a given input.
//! - `FrameClock`: maps frame indices to timestamps.

use std::fmt;
use std::time::Duration;

use image::RgbImage;

/// Frame rate used when neither the source nor the configuration provides one.
pub const DEFAULT_FPS: f64 = 30.0;

/// Accepted frame-rate range.
pub const MIN_FPS: f64 = 0.1;
pub const MAX_FPS: f64 = 1000.0;

// ----------------------------------------------------------------------------
// FrameTimestamp
// ----------------------------------------------------------------------------

/// Offset of a frame from the start of the video.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameTimestamp(Duration);

impl FrameTimestamp {
    pub const ZERO: FrameTimestamp = FrameTimestamp(Duration::ZERO);

    pub fn from_duration(offset: Duration) -> Self {
        Self(offset)
    }

    /// Negative and NaN offsets clamp to zero; offsets too large for a
    /// `Duration` saturate.
    pub fn from_secs_f64(secs: f64) -> Self {
        Self(Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0.as_secs_f64()
    }

    /// Time elapsed since `earlier`, or `None` if `earlier` is in the future.
    pub fn since(&self, earlier: FrameTimestamp) -> Option<Duration> {
        self.0.checked_sub(earlier.0)
    }
}

impl fmt::Display for FrameTimestamp {
    /// Formats as `HH:MM:SS.mmm`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_ms = self.0.as_millis();
        let ms = total_ms % 1000;
        let total_s = total_ms / 1000;
        let s = total_s % 60;
        let m = (total_s / 60) % 60;
        let h = total_s / 3600;
        write!(f, "{h:02}:{m:02}:{s:02}.{ms:03}")
    }
}

// ----------------------------------------------------------------------------
// FrameClock
// ----------------------------------------------------------------------------

/// Derives frame timestamps from frame indices at a fixed frame rate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameClock {
    fps: f64,
}

impl FrameClock {
    /// Rates outside `MIN_FPS..=MAX_FPS` fall back to `DEFAULT_FPS`.
    pub fn new(fps: f64) -> Self {
        let fps = if (MIN_FPS..=MAX_FPS).contains(&fps) {
            fps
        } else {
            log::warn!("invalid frame rate {fps}; assuming {DEFAULT_FPS} fps");
            DEFAULT_FPS
        };
        Self { fps }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn timestamp_for(&self, frame_index: u64) -> FrameTimestamp {
        FrameTimestamp::from_secs_f64(frame_index as f64 / self.fps)
    }
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// A decoded video frame. Lives for one iteration of the frame loop.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Zero-based position in the input video.
    pub index: u64,
    pub timestamp: FrameTimestamp,
    image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, timestamp: FrameTimestamp, image: RgbImage) -> Self {
        Self {
            index,
            timestamp,
            image,
        }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_derives_timestamps_from_index() {
        let clock = FrameClock::new(30.0);
        assert_eq!(clock.timestamp_for(0), FrameTimestamp::ZERO);
        assert_eq!(clock.timestamp_for(150).as_duration(), Duration::from_secs(5));
        assert_eq!(clock.timestamp_for(45).as_duration(), Duration::from_millis(1500));
    }

    #[test]
    fn clock_rejects_invalid_rate() {
        assert_eq!(FrameClock::new(0.0).fps(), DEFAULT_FPS);
        assert_eq!(FrameClock::new(f64::NAN).fps(), DEFAULT_FPS);
        assert_eq!(FrameClock::new(-5.0).fps(), DEFAULT_FPS);
        assert_eq!(FrameClock::new(1e-20).fps(), DEFAULT_FPS);
        assert_eq!(FrameClock::new(1e9).fps(), DEFAULT_FPS);
    }

    #[test]
    fn tiny_rate_does_not_overflow_timestamps() {
        let clock = FrameClock::new(1e-20);
        assert_eq!(clock.timestamp_for(1).as_duration(), Duration::from_nanos(33_333_333));
    }

    #[test]
    fn huge_offsets_saturate() {
        assert_eq!(FrameTimestamp::from_secs_f64(1e30).as_duration(), Duration::MAX);
        assert_eq!(FrameTimestamp::from_secs_f64(f64::NAN), FrameTimestamp::ZERO);
        assert_eq!(FrameTimestamp::from_secs_f64(-3.0), FrameTimestamp::ZERO);
    }

    #[test]
    fn since_is_none_when_going_backwards() {
        let early = FrameTimestamp::from_secs_f64(1.0);
        let late = FrameTimestamp::from_secs_f64(3.0);
        assert_eq!(late.since(early), Some(Duration::from_secs(2)));
        assert_eq!(early.since(late), None);
    }

    #[test]
    fn display_formats_hours_minutes_seconds_millis() {
        let ts = FrameTimestamp::from_duration(Duration::from_millis(3_723_045));
        assert_eq!(ts.to_string(), "01:02:03.045");
        assert_eq!(FrameTimestamp::ZERO.to_string(), "00:00:00.000");
    }
}
