use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::WriteError;

use super::encode_jpeg;

pub const MANIFEST_FILE: &str = "manifest.json";

/// Append-only destination for annotated frames.
pub trait VideoSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), WriteError>;

    /// Finalize the output. `complete` is false when the run ended on a
    /// fatal error.
    fn finish(self: Box<Self>, complete: bool) -> Result<PathBuf, WriteError>;
}

/// Summary written next to the frames on finish.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SequenceManifest {
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub frame_count: u64,
    pub complete: bool,
}

/// Writes annotated frames as numbered JPEGs plus a manifest.
///
/// Frames land in `<root>/output_<YYYYmmdd_HHMMSS>/frame_NNNNNN.jpg`. Every
/// frame must match the dimensions of the first one.
pub struct FrameSequenceWriter {
    dir: PathBuf,
    fps: f64,
    dimensions: Option<(u32, u32)>,
    frame_count: u64,
}

impl FrameSequenceWriter {
    pub fn create(
        output_root: &Path,
        started_at: &DateTime<Local>,
        fps: f64,
    ) -> Result<Self, WriteError> {
        fs::create_dir_all(output_root).map_err(|err| WriteError::video(output_root, err))?;
        let base = format!("output_{}", started_at.format("%Y%m%d_%H%M%S"));
        let dir = (0u32..)
            .map(|n| match n {
                0 => output_root.join(&base),
                n => output_root.join(format!("{base}_{n}")),
            })
            .find(|candidate| !candidate.exists())
            .ok_or_else(|| WriteError::video(output_root, "no free output directory name"))?;
        fs::create_dir(&dir).map_err(|err| WriteError::video(&dir, err))?;
        log::info!("writing annotated frames to {}", dir.display());
        Ok(Self {
            dir,
            fps,
            dimensions: None,
            frame_count: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("frame_{index:06}.jpg"))
    }

    fn write_manifest(&self, complete: bool) -> Result<(), WriteError> {
        let path = self.dir.join(MANIFEST_FILE);
        let (width, height) = self.dimensions.unwrap_or((0, 0));
        let manifest = SequenceManifest {
            fps: self.fps,
            width,
            height,
            frame_count: self.frame_count,
            complete,
        };
        let json =
            serde_json::to_vec_pretty(&manifest).map_err(|err| WriteError::video(&path, err))?;
        fs::write(&path, json).map_err(|err| WriteError::video(&path, err))
    }
}

impl VideoSink for FrameSequenceWriter {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), WriteError> {
        let path = self.frame_path(self.frame_count);
        let current = self.dimensions;
        match current {
            None => self.dimensions = Some(frame.dimensions()),
            Some(expected) if expected != frame.dimensions() => {
                return Err(WriteError::video(
                    &path,
                    format!(
                        "frame is {}x{}, sequence is {}x{}",
                        frame.width(),
                        frame.height(),
                        expected.0,
                        expected.1
                    ),
                ));
            }
            Some(_) => {}
        }
        let jpeg = encode_jpeg(frame).map_err(|err| WriteError::video(&path, err))?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|err| WriteError::video(&path, err))?;
        file.write_all(&jpeg)
            .map_err(|err| WriteError::video(&path, err))?;
        self.frame_count += 1;
        Ok(())
    }

    fn finish(self: Box<Self>, complete: bool) -> Result<PathBuf, WriteError> {
        self.write_manifest(complete)?;
        log::info!(
            "annotated output: {} frames in {}{}",
            self.frame_count,
            self.dir.display(),
            if complete { "" } else { " (incomplete)" }
        );
        Ok(self.dir)
    }
}
