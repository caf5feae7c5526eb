use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Replays detections recorded by an external detector.
///
/// The input is JSON Lines, one record per frame that had detections:
///
/// ```text
/// {"frame": 0, "detections": [{"label": "no-helmet", "confidence": 0.91, "bbox": [12, 40, 96, 130]}]}
/// ```
///
/// Frames without a record have no detections. Blank lines and lines starting
/// with `#` are ignored.
pub struct ReplayBackend {
    frames: HashMap<u64, Vec<Detection>>,
}

#[derive(Debug, Deserialize)]
struct ReplayRecord {
    frame: u64,
    #[serde(default)]
    detections: Vec<Detection>,
}

impl ReplayBackend {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open replay file {}", path.display()))?;
        let backend = Self::from_reader(BufReader::new(file))
            .with_context(|| format!("invalid replay file {}", path.display()))?;
        log::info!(
            "ReplayBackend: loaded {} frame records from {}",
            backend.frames.len(),
            path.display()
        );
        Ok(backend)
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut frames: HashMap<u64, Vec<Detection>> = HashMap::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("read line {}", line_no + 1))?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let record: ReplayRecord = serde_json::from_str(trimmed)
                .map_err(|e| anyhow!("line {}: {}", line_no + 1, e))?;
            frames
                .entry(record.frame)
                .or_default()
                .extend(record.detections);
        }
        Ok(Self { frames })
    }

    pub fn recorded_frames(&self) -> usize {
        self.frames.len()
    }
}

impl DetectorBackend for ReplayBackend {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        Ok(self.frames.get(&frame.index).cloned().unwrap_or_default())
    }
}
