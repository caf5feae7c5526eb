use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::error::WriteError;

/// Gives up after this many name collisions for the same instant.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// `violation_<YYYYmmdd_HHMMSS_mmm>_f<frame:06>.jpg`
pub fn screenshot_file_name(captured_at: &DateTime<Local>, frame_index: u64) -> String {
    format!(
        "violation_{}_f{:06}.jpg",
        captured_at.format("%Y%m%d_%H%M%S_%3f"),
        frame_index
    )
}

/// Saves violation screenshots without ever overwriting an existing file.
#[derive(Clone, Debug)]
pub struct ScreenshotWriter {
    dir: PathBuf,
}

impl ScreenshotWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write JPEG bytes and return the path used. A `_<n>` suffix is added
    /// when the natural name is taken.
    pub fn write(
        &self,
        jpeg: &[u8],
        captured_at: &DateTime<Local>,
        frame_index: u64,
    ) -> Result<PathBuf, WriteError> {
        fs::create_dir_all(&self.dir).map_err(|err| WriteError::screenshot(&self.dir, err))?;
        let name = screenshot_file_name(captured_at, frame_index);
        let stem = name.trim_end_matches(".jpg");
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let path = match attempt {
                0 => self.dir.join(&name),
                n => self.dir.join(format!("{stem}_{n}.jpg")),
            };
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(WriteError::screenshot(&path, err)),
            };
            file.write_all(jpeg)
                .map_err(|err| WriteError::screenshot(&path, err))?;
            log::info!("screenshot saved: {}", path.display());
            return Ok(path);
        }
        Err(WriteError::screenshot(
            self.dir.join(&name),
            "too many screenshots with the same name",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn captured_at() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2026, 5, 1, 14, 30, 5)
            .unwrap()
            + chrono::Duration::milliseconds(42)
    }

    #[test]
    fn file_name_has_millis_and_frame() {
        assert_eq!(
            screenshot_file_name(&captured_at(), 1234),
            "violation_20260501_143005_042_f001234.jpg"
        );
    }

    #[test]
    fn collisions_get_a_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ScreenshotWriter::new(dir.path().join("shots"));
        let first = writer.write(b"one", &captured_at(), 7).unwrap();
        let second = writer.write(b"two", &captured_at(), 7).unwrap();
        assert_ne!(first, second);
        assert!(second.to_string_lossy().ends_with("_f000007_1.jpg"));
        assert_eq!(fs::read(&first).unwrap(), b"one");
        assert_eq!(fs::read(&second).unwrap(), b"two");
    }

    #[test]
    fn unwritable_directory_is_a_screenshot_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"x").unwrap();
        let err = ScreenshotWriter::new(&blocker)
            .write(b"jpeg", &captured_at(), 0)
            .unwrap_err();
        assert!(matches!(err, WriteError::Screenshot { .. }));
        assert!(!err.is_fatal());
    }
}
