//! Error taxonomy for a monitoring run.
//!
//! Fatal errors (`Config`, video `Write`, `Source`) terminate a run at the
//! pipeline boundary. `Detection`, screenshot `Write` and `Dispatch` errors
//! are recovered inside the component that produced them and only surface in
//! logs and run statistics.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("detection failed on frame {frame_index}: {message}")]
    Detection { frame_index: u64, message: String },

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("frame source failed: {0}")]
    Source(String),
}

impl PipelineError {
    /// Create a detection failure error, keeping the full context chain.
    pub fn detection(frame_index: u64, err: &anyhow::Error) -> Self {
        Self::Detection {
            frame_index,
            message: format!("{err:#}"),
        }
    }

    /// Create a frame source error, keeping the full context chain.
    pub fn source(err: &anyhow::Error) -> Self {
        Self::Source(format!("{err:#}"))
    }

    /// Whether this error terminates the run.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Config(_) | Self::Source(_) => true,
            Self::Write(err) => err.is_fatal(),
            Self::Detection { .. } | Self::Dispatch(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("violation label set is empty; no detection can ever be a violation")]
    EmptyViolationLabels,
}

impl ConfigError {
    pub fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("video write failed at {path}: {message}")]
    Video { path: PathBuf, message: String },

    #[error("screenshot write failed at {path}: {message}")]
    Screenshot { path: PathBuf, message: String },
}

impl WriteError {
    pub fn video(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Video {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn screenshot(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Screenshot {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Video writes are "complete or explicitly failed"; a lost screenshot is not.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Video { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("notification transport failed: {0}")]
    Transport(String),

    #[error("notification rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("notification did not complete within {0:?}")]
    Timeout(Duration),

    #[error("dispatch queue full; alert dropped")]
    QueueFull,

    #[error("dispatch worker is no longer running")]
    Disconnected,
}
