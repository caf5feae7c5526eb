use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

/// Stub backend for tests and demos.
///
/// Returns scripted detections per frame index. Frames without a script see
/// nothing, and frames marked with `fail_on` return an error. `demo()` builds
/// a repeating pattern so `stub://` runs produce violations and alerts.
#[derive(Default)]
pub struct StubBackend {
    scripted: HashMap<u64, Vec<Detection>>,
    failing: HashSet<u64>,
    pattern: Option<DemoPattern>,
}

/// Repeating scene: a compliant worker throughout, and a violation for the
/// first `violation_frames` of every `period` frames.
#[derive(Clone, Copy, Debug)]
struct DemoPattern {
    period: u64,
    violation_frames: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repeating demo scene, 90-frame period with 20 violation frames.
    pub fn demo() -> Self {
        Self {
            pattern: Some(DemoPattern {
                period: 90,
                violation_frames: 20,
            }),
            ..Self::default()
        }
    }

    /// Script the detections returned for `frame_index`.
    pub fn with_frame(mut self, frame_index: u64, detections: Vec<Detection>) -> Self {
        self.scripted.insert(frame_index, detections);
        self
    }

    /// Make `detect` fail for `frame_index`.
    pub fn fail_on(mut self, frame_index: u64) -> Self {
        self.failing.insert(frame_index);
        self
    }

    fn demo_detections(pattern: DemoPattern, frame: &Frame) -> Vec<Detection> {
        let w = frame.width() as f32;
        let h = frame.height() as f32;
        let mut detections = vec![
            Detection::new(
                "helmet",
                0.88,
                BoundingBox::new(w * 0.10, h * 0.15, w * 0.25, h * 0.30),
            ),
            Detection::new(
                "vest",
                0.81,
                BoundingBox::new(w * 0.08, h * 0.32, w * 0.28, h * 0.70),
            ),
        ];
        if frame.index % pattern.period < pattern.violation_frames {
            detections.push(Detection::new(
                "no-helmet",
                0.76,
                BoundingBox::new(w * 0.60, h * 0.12, w * 0.75, h * 0.28),
            ));
            detections.push(Detection::new(
                "person",
                0.93,
                BoundingBox::new(w * 0.55, h * 0.10, w * 0.80, h * 0.90),
            ));
        }
        detections
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        if self.failing.contains(&frame.index) {
            return Err(anyhow!("stub detector failure on frame {}", frame.index));
        }
        if let Some(detections) = self.scripted.get(&frame.index) {
            return Ok(detections.clone());
        }
        Ok(match self.pattern {
            Some(pattern) => Self::demo_detections(pattern, frame),
            None => Vec::new(),
        })
    }
}
