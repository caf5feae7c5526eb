//! PPE Sentinel
//!
//! This crate monitors video for Personal Protective Equipment compliance and
//! raises rate-limited alerts when required equipment is missing.
//!
//! # Architecture
//!
//! Every frame flows through the same fixed stages:
//!
//! 1. **Detect**: a [`DetectorBackend`] returns labeled boxes for the frame.
//! 2. **Classify**: detections below the confidence threshold are dropped and
//!    the rest are tagged violation or compliant by label.
//! 3. **Annotate**: boxes and a status overlay are drawn on a copy of the frame.
//! 4. **Throttle**: a single cooldown gate decides whether a violation frame
//!    becomes an alert. Alerts are delivered off the frame loop.
//! 5. **Record**: annotated frames, screenshots and the run summary are
//!    written to the output directory.
//!
//! # Module Structure
//!
//! - `detect`: detector backends and the backend registry
//! - `classify`: violation taxonomy and per-frame results
//! - `annotate`: frame overlays
//! - `alert`: cooldown throttle, notifiers and the dispatch worker
//! - `artifacts`: frame sequence and screenshot writers
//! - `ingest`: frame sources
//! - `pipeline`: the run orchestrator

pub mod alert;
pub mod annotate;
pub mod artifacts;
pub mod classify;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod ui;

pub use alert::{
    Alert, AlertPayload, AlertThrottle, Dispatcher, LogNotifier, Notifier, TelegramNotifier,
    ThrottleDecision,
};
pub use annotate::annotate;
pub use artifacts::{ArtifactWriter, FrameSequenceWriter, ScreenshotWriter, VideoSink};
pub use classify::{classify, ClassifiedDetection, Classifier, FrameResult, SafetyStatus, ViolationLabels};
pub use config::SentinelConfig;
pub use detect::{BackendRegistry, BoundingBox, Detection, DetectorBackend};
pub use error::{ConfigError, DispatchError, PipelineError, PipelineResult, WriteError};
pub use frame::{Frame, FrameClock, FrameTimestamp};
pub use ingest::{file::FileConfig, FileSource, FrameSource};
pub use pipeline::{Pipeline, RunFailure, RunSettings, RunStatistics, RunSummary};
