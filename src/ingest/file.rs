//! Local file frame source.
//!
//! `FileSource` picks a backend from the configured path:
//! - `stub://...` produces synthetic frames
//! - an existing directory yields its image files in sorted order
//! - anything else is decoded as a video file with FFmpeg

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::FrameSource;

/// Frames produced by `stub://` sources unless `?frames=` says otherwise.
pub const DEFAULT_SYNTHETIC_FRAMES: u64 = 300;
const SYNTHETIC_WIDTH: u32 = 640;
const SYNTHETIC_HEIGHT: u32 = 480;
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local path, image directory, or `stub://name[?frames=N]`.
    pub path: String,
}

impl FileConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
    frames_read: u64,
    path: String,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    Images(ImageDirSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes): '{}'",
                config.path
            ));
        }
        let backend = if let Some(spec) = config.path.strip_prefix("stub://") {
            FileBackend::Synthetic(SyntheticFileSource::parse(spec)?)
        } else if Path::new(&config.path).is_dir() {
            FileBackend::Images(ImageDirSource::open(Path::new(&config.path))?)
        } else {
            open_video(&config.path)?
        };
        log::info!("FileSource: opened {}", config.path);
        Ok(Self {
            backend,
            frames_read: 0,
            path: config.path,
        })
    }

    pub fn stats(&self) -> FileStats {
        FileStats {
            frames_captured: self.frames_read,
            path: self.path.clone(),
        }
    }
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn open_video(path: &str) -> Result<FileBackend> {
    Ok(FileBackend::Ffmpeg(FfmpegFileSource::new(path)?))
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn open_video(path: &str) -> Result<FileBackend> {
    if !Path::new(path).exists() {
        return Err(anyhow!("input '{}' does not exist", path));
    }
    Err(anyhow!(
        "decoding video files requires the ingest-file-ffmpeg feature ('{}')",
        path
    ))
}

impl FrameSource for FileSource {
    fn describe(&self) -> String {
        let kind = match &self.backend {
            FileBackend::Synthetic(_) => "synthetic",
            FileBackend::Images(_) => "images",
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(_) => "ffmpeg",
        };
        format!("{} ({kind})", self.path)
    }

    fn fps(&self) -> Option<f64> {
        match &self.backend {
            FileBackend::Synthetic(_) | FileBackend::Images(_) => None,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.fps(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let frame = match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            FileBackend::Images(source) => source.next_frame()?,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame()?,
        };
        if frame.is_some() {
            self.frames_read += 1;
        }
        Ok(frame)
    }
}

/// Statistics for a file source.
#[derive(Clone, Debug)]
pub struct FileStats {
    pub frames_captured: u64,
    pub path: String,
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests and demos
// ----------------------------------------------------------------------------

struct SyntheticFileSource {
    total_frames: u64,
    frame_count: u64,
    scene_state: u8,
}

impl SyntheticFileSource {
    /// Parse `name[?frames=N]`.
    fn parse(spec: &str) -> Result<Self> {
        let mut total_frames = DEFAULT_SYNTHETIC_FRAMES;
        if let Some((_, query)) = spec.split_once('?') {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                match pair.split_once('=') {
                    Some(("frames", value)) => {
                        total_frames = value
                            .parse()
                            .with_context(|| format!("invalid stub frame count '{value}'"))?;
                    }
                    _ => return Err(anyhow!("unknown stub source option '{pair}'")),
                }
            }
        }
        Ok(Self {
            total_frames,
            frame_count: 0,
            scene_state: 0,
        })
    }

    fn next_frame(&mut self) -> Option<RgbImage> {
        if self.frame_count >= self.total_frames {
            return None;
        }
        self.frame_count += 1;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let shift = self.frame_count as u32 + self.scene_state as u32 * 40;
        Some(RgbImage::from_fn(SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT, |x, y| {
            Rgb([
                ((x + shift) % 256) as u8,
                ((y + shift / 2) % 256) as u8,
                ((x + y) / 8 % 256) as u8,
            ])
        }))
    }
}

// ----------------------------------------------------------------------------
// Image directory source
// ----------------------------------------------------------------------------

struct ImageDirSource {
    files: std::vec::IntoIter<PathBuf>,
}

impl ImageDirSource {
    fn open(dir: &Path) -> Result<Self> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)
            .with_context(|| format!("failed to list image directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && has_image_extension(&path) {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(anyhow!("no image files found in {}", dir.display()));
        }
        files.sort();
        log::debug!("FileSource: {} images in {}", files.len(), dir.display());
        Ok(Self {
            files: files.into_iter(),
        })
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(path) = self.files.next() else {
            return Ok(None);
        };
        let image = image::open(&path)
            .with_context(|| format!("failed to decode {}", path.display()))?;
        Ok(Some(image.into_rgb8()))
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(source: &mut FileSource) -> Vec<RgbImage> {
        let mut frames = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn rejects_remote_urls() {
        assert!(FileSource::new(FileConfig::new("rtsp://camera/stream")).is_err());
        assert!(FileSource::new(FileConfig::new("https://example.com/a.mp4")).is_err());
        assert!(FileSource::new(FileConfig::new("  ")).is_err());
    }

    #[test]
    fn synthetic_source_honors_frame_count() {
        let mut source = FileSource::new(FileConfig::new("stub://yard?frames=3")).unwrap();
        let frames = drain(&mut source);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].dimensions(), (SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT));
        assert_ne!(frames[0], frames[1]);
        assert_eq!(source.stats().frames_captured, 3);
        assert!(source.next_frame().unwrap().is_none());
        assert_eq!(source.fps(), None);
    }

    #[test]
    fn synthetic_source_rejects_bad_options() {
        assert!(FileSource::new(FileConfig::new("stub://yard?frames=lots")).is_err());
        assert!(FileSource::new(FileConfig::new("stub://yard?speed=2")).is_err());
    }

    #[test]
    fn image_directory_is_read_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        for (name, shade) in [("b.png", 20u8), ("a.png", 10), ("c.jpg", 30)] {
            RgbImage::from_pixel(8, 6, Rgb([shade, shade, shade]))
                .save(dir.path().join(name))
                .unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = FileSource::new(FileConfig::new(dir.path().to_string_lossy())).unwrap();
        assert!(source.describe().ends_with("(images)"));
        let frames = drain(&mut source);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].get_pixel(0, 0), &Rgb([10, 10, 10]));
        assert_eq!(frames[1].get_pixel(0, 0), &Rgb([20, 20, 20]));
        assert_eq!(frames[2].dimensions(), (8, 6));
    }

    #[test]
    fn empty_image_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileSource::new(FileConfig::new(dir.path().to_string_lossy())).is_err());
    }
}
