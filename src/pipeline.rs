//! Run orchestration: the per-frame loop and everything around it.
//!
//! Each frame goes through detect, classify, annotate, throttle/dispatch and
//! video write, strictly in order. Detection, screenshot and dispatch
//! failures are logged and counted; source and video failures end the run.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Local};
use image::RgbImage;
use serde::Serialize;
use thiserror::Error;

use crate::alert::{Alert, AlertPayload, AlertThrottle, DispatchOutcome, Dispatcher, Notifier, ThrottleDecision};
use crate::annotate::annotate;
use crate::artifacts::{create_video_sink, encode_jpeg, ArtifactWriter, ScreenshotWriter, VideoSink};
use crate::classify::{Classifier, FrameResult};
use crate::config::SentinelConfig;
use crate::detect::{BackendRegistry, DetectorBackend};
use crate::error::PipelineError;
use crate::frame::{Frame, FrameClock};
use crate::ingest::FrameSource;

pub const SUMMARY_FILE: &str = "summary.json";

/// Counters for one run. Only ever incremented.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunStatistics {
    pub frames_processed: u64,
    pub frames_with_violations: u64,
    pub alerts_sent: u64,
    pub alerts_suppressed: u64,
    pub alert_failures: u64,
    pub detection_failures: u64,
    pub screenshots_written: u64,
    pub screenshot_failures: u64,
}

/// What a run did, written to `summary.json` and printed by the binary.
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub source: String,
    pub started_at: String,
    pub finished_at: String,
    pub fps: f64,
    /// False when the run ended on a fatal error.
    pub complete: bool,
    /// True when the stop flag ended the run before the source did.
    pub stopped_early: bool,
    pub error: Option<String>,
    pub output_video: Option<PathBuf>,
    pub screenshot_dir: Option<PathBuf>,
    /// Name of the notifier alerts were sent through.
    pub notifier: String,
    pub last_alert_at_secs: Option<f64>,
    pub stats: RunStatistics,
}

/// A fatal error together with the progress made before it.
#[derive(Debug, Error)]
#[error("run aborted after {} frames: {error}", .summary.stats.frames_processed)]
pub struct RunFailure {
    #[source]
    pub error: PipelineError,
    pub summary: RunSummary,
}

/// Settings that shape the loop itself rather than a component.
#[derive(Clone, Debug)]
pub struct RunSettings {
    /// Frame rate used to derive frame timestamps.
    pub fps: f64,
    pub max_frames: Option<u64>,
    /// Upper bound on waiting for pending alerts at the end of the run.
    pub dispatch_timeout: Duration,
    /// Where `summary.json` goes when there is no video directory. `None`
    /// disables the summary file.
    pub output_dir: Option<PathBuf>,
}

type ProgressHook = Box<dyn FnMut(&RunStatistics)>;

pub struct Pipeline {
    detector: Box<dyn DetectorBackend>,
    classifier: Classifier,
    throttle: AlertThrottle,
    dispatcher: Dispatcher,
    artifacts: ArtifactWriter,
    settings: RunSettings,
    stats: RunStatistics,
    progress: Option<ProgressHook>,
}

impl Pipeline {
    pub fn new(
        detector: Box<dyn DetectorBackend>,
        classifier: Classifier,
        cooldown: Duration,
        dispatcher: Dispatcher,
        artifacts: ArtifactWriter,
        settings: RunSettings,
    ) -> Self {
        Self {
            detector,
            classifier,
            throttle: AlertThrottle::new(cooldown),
            dispatcher,
            artifacts,
            settings,
            stats: RunStatistics::default(),
            progress: None,
        }
    }

    /// Wire a pipeline from validated configuration.
    ///
    /// `source_fps` is the rate reported by the frame source, preferred over
    /// the configured fallback.
    pub fn from_config(
        config: &SentinelConfig,
        registry: &BackendRegistry,
        source_fps: Option<f64>,
        notifier: Box<dyn Notifier>,
    ) -> anyhow::Result<Self> {
        let labels = config.violation_labels.clone().require_non_empty()?;
        log::info!(
            "violation labels: [{}], confidence threshold {:.2}, cooldown {:?}",
            labels.sorted().join(", "),
            config.detection.confidence_threshold,
            config.alerts.cooldown
        );
        let classifier = Classifier::new(config.detection.confidence_threshold, labels);
        let detector = registry.build(&config.detection)?;

        let fps = match source_fps {
            Some(fps) if fps.is_finite() && fps > 0.0 => fps,
            _ => config.video.fps,
        };
        let started_at = Local::now();
        let video: Option<Box<dyn VideoSink>> = if config.video.save_output_video {
            Some(create_video_sink(&config.video.output_path, &started_at, fps)?)
        } else {
            None
        };
        let screenshots = config
            .alerts
            .save_screenshots
            .then(|| ScreenshotWriter::new(&config.alerts.screenshot_path));
        let dispatcher = Dispatcher::spawn(
            notifier,
            config.alerts.queue_capacity,
            config.alerts.dispatch_timeout,
        )
            .context("failed to start alert dispatch")?;

        Ok(Self::new(
            detector,
            classifier,
            config.alerts.cooldown,
            dispatcher,
            ArtifactWriter::new(video, screenshots),
            RunSettings {
                fps,
                max_frames: config.video.max_frames,
                dispatch_timeout: config.alerts.dispatch_timeout,
                output_dir: Some(config.video.output_path.clone()),
            },
        ))
    }

    /// Called after every processed frame.
    pub fn on_progress<F>(&mut self, hook: F)
    where
        F: FnMut(&RunStatistics) + 'static,
    {
        self.progress = Some(Box::new(hook));
    }

    /// Process `source` until it ends, `stop` is set, `max_frames` is
    /// reached, or a fatal error occurs.
    pub fn run(
        mut self,
        source: &mut dyn FrameSource,
        stop: &AtomicBool,
    ) -> Result<RunSummary, RunFailure> {
        let started_at = Local::now();
        log::info!("processing {} at {:.2} fps", source.describe(), self.settings.fps);

        let mut outcome = self.process(source, stop);
        let complete = outcome.is_ok();

        let output_video = match self.artifacts.finish(complete) {
            Ok(path) => path,
            Err(err) => {
                log::error!("failed to finalize annotated output: {err}");
                if outcome.is_ok() {
                    outcome = Err(err.into());
                }
                None
            }
        };

        let Pipeline {
            dispatcher,
            artifacts,
            throttle,
            settings,
            mut stats,
            ..
        } = self;

        let notifier = dispatcher.notifier_name().to_string();
        if dispatcher.in_flight() > 0 {
            log::info!(
                "waiting up to {:?} for {} pending alert(s)",
                settings.dispatch_timeout,
                dispatcher.in_flight()
            );
        }
        let drain = dispatcher.finish(settings.dispatch_timeout);
        for outcome in drain.outcomes {
            record_outcome(&mut stats, outcome);
        }
        if drain.abandoned > 0 {
            log::warn!("{} alert(s) not delivered before shutdown", drain.abandoned);
            stats.alert_failures += drain.abandoned as u64;
        }

        let (stopped_early, error) = match &outcome {
            Ok(stopped_early) => (*stopped_early, None),
            Err(err) => (false, Some(err.to_string())),
        };
        let summary = RunSummary {
            source: source.describe(),
            started_at: started_at.to_rfc3339(),
            finished_at: Local::now().to_rfc3339(),
            fps: settings.fps,
            complete: error.is_none(),
            stopped_early,
            error,
            output_video: output_video.clone(),
            screenshot_dir: artifacts.screenshot_dir().map(Path::to_path_buf),
            notifier,
            last_alert_at_secs: throttle
                .state()
                .last_alert_timestamp
                .map(|ts| ts.as_secs_f64()),
            stats,
        };
        log_summary(&summary);

        let summary_dir = output_video.map(summary_dir_for).or(settings.output_dir);
        if let Some(dir) = summary_dir {
            if let Err(err) = write_summary(&dir, &summary) {
                log::warn!("failed to write run summary: {err:#}");
            }
        }

        match outcome {
            Ok(_) => Ok(summary),
            Err(error) => Err(RunFailure { error, summary }),
        }
    }

    /// The frame loop. Returns whether the stop flag ended it.
    fn process(
        &mut self,
        source: &mut dyn FrameSource,
        stop: &AtomicBool,
    ) -> Result<bool, PipelineError> {
        let clock = FrameClock::new(self.settings.fps);
        let mut index: u64 = 0;
        loop {
            if stop.load(Ordering::SeqCst) {
                log::info!("stop requested; ending run after {} frames", index);
                return Ok(true);
            }
            if self.settings.max_frames.is_some_and(|max| index >= max) {
                log::info!("reached frame limit of {}", index);
                return Ok(false);
            }
            let image = match source.next_frame() {
                Ok(Some(image)) => image,
                Ok(None) => {
                    log::info!("end of input after {} frames", index);
                    return Ok(false);
                }
                Err(err) => return Err(PipelineError::source(&err)),
            };
            let frame = Frame::new(index, clock.timestamp_for(index), image);
            self.process_frame(&frame)?;
            index += 1;

            for outcome in self.dispatcher.poll() {
                record_outcome(&mut self.stats, outcome);
            }
            if let Some(hook) = self.progress.as_mut() {
                hook(&self.stats);
            }
        }
    }

    fn process_frame(&mut self, frame: &Frame) -> Result<(), PipelineError> {
        let detections = match self.detector.detect(frame) {
            Ok(detections) => detections,
            Err(err) => {
                log::warn!("{}", PipelineError::detection(frame.index, &err));
                self.stats.detection_failures += 1;
                Vec::new()
            }
        };
        let result = FrameResult::new(
            frame.index,
            frame.timestamp,
            self.classifier.classify(&detections),
        );
        if result.has_violations() {
            self.stats.frames_with_violations += 1;
        }

        let annotated = annotate(frame, &result);

        match self.throttle.evaluate(&result) {
            ThrottleDecision::NoViolation => {}
            ThrottleDecision::Suppressed { remaining } => {
                self.stats.alerts_suppressed += 1;
                log::debug!(
                    "frame {}: {} violation(s), alert suppressed ({:.1}s of cooldown left)",
                    frame.index,
                    result.violation_count,
                    remaining.as_secs_f64()
                );
            }
            ThrottleDecision::Fire(payload) => self.raise_alert(payload, &annotated),
        }

        self.artifacts.write_frame_to_video(&annotated)?;
        self.stats.frames_processed += 1;
        Ok(())
    }

    fn raise_alert(&mut self, payload: AlertPayload, annotated: &RgbImage) {
        let raised_at = Local::now();
        let frame_index = payload.frame_index;
        log::warn!(
            "SAFETY VIOLATION at {} (frame {}): {} [{}]",
            payload.timestamp,
            frame_index,
            payload.violation_count,
            payload.violation_types.join(", ")
        );
        let mut alert = Alert::new(payload, raised_at);
        match encode_jpeg(annotated) {
            Ok(jpeg) => {
                if let Some(path) = self.save_screenshot(&jpeg, &raised_at, frame_index) {
                    alert = alert.with_screenshot(path);
                }
                alert = alert.with_image(jpeg);
            }
            Err(err) => log::warn!("frame {}: failed to encode alert image: {}", frame_index, err),
        }
        if let Err(err) = self.dispatcher.submit(alert) {
            log::warn!("frame {}: alert not dispatched: {}", frame_index, err);
            self.stats.alert_failures += 1;
        }
    }

    fn save_screenshot(
        &mut self,
        jpeg: &[u8],
        raised_at: &DateTime<Local>,
        frame_index: u64,
    ) -> Option<PathBuf> {
        match self.artifacts.write_screenshot(jpeg, raised_at, frame_index) {
            Ok(Some(path)) => {
                self.stats.screenshots_written += 1;
                Some(path)
            }
            Ok(None) => None,
            Err(err) => {
                log::warn!("{}", err);
                self.stats.screenshot_failures += 1;
                None
            }
        }
    }
}

/// The frame-sequence directory itself, or the directory holding an encoded
/// video file.
fn summary_dir_for(video: PathBuf) -> PathBuf {
    if video.is_dir() {
        return video;
    }
    match video.parent() {
        Some(parent) => parent.to_path_buf(),
        None => video,
    }
}

fn record_outcome(stats: &mut RunStatistics, outcome: DispatchOutcome) {
    match outcome.result {
        Ok(()) => {
            stats.alerts_sent += 1;
            log::info!("alert for frame {} delivered", outcome.frame_index);
        }
        Err(err) => {
            stats.alert_failures += 1;
            log::warn!("alert for frame {} failed: {}", outcome.frame_index, err);
        }
    }
}

fn write_summary(dir: &Path, summary: &RunSummary) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(SUMMARY_FILE);
    let json = serde_json::to_vec_pretty(summary).context("serialize run summary")?;
    fs::write(&path, json).with_context(|| format!("write {}", path.display()))?;
    log::debug!("run summary written to {}", path.display());
    Ok(path)
}

fn log_summary(summary: &RunSummary) {
    let stats = &summary.stats;
    log::info!(
        "run {}: {} frames, {} with violations",
        if summary.complete { "complete" } else { "incomplete" },
        stats.frames_processed,
        stats.frames_with_violations
    );
    log::info!(
        "alerts: {} sent, {} suppressed, {} failed",
        stats.alerts_sent,
        stats.alerts_suppressed,
        stats.alert_failures
    );
    if stats.detection_failures > 0 || stats.screenshot_failures > 0 {
        log::warn!(
            "{} detection failure(s), {} screenshot failure(s)",
            stats.detection_failures,
            stats.screenshot_failures
        );
    }
    if let Some(path) = &summary.output_video {
        log::info!("annotated output: {}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::LogNotifier;
    use crate::classify::ViolationLabels;
    use crate::detect::{BoundingBox, Detection, StubBackend};

    struct Blank {
        remaining: u64,
    }

    impl FrameSource for Blank {
        fn describe(&self) -> String {
            "blank".to_string()
        }

        fn next_frame(&mut self) -> anyhow::Result<Option<RgbImage>> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            Ok(Some(RgbImage::new(64, 48)))
        }
    }

    fn pipeline(detector: StubBackend, max_frames: Option<u64>) -> Pipeline {
        Pipeline::new(
            Box::new(detector),
            Classifier::new(0.5, ViolationLabels::new(["no-helmet"])),
            Duration::from_secs(5),
            Dispatcher::spawn(Box::new(LogNotifier), 4, Duration::from_secs(2)).unwrap(),
            ArtifactWriter::disabled(),
            RunSettings {
                fps: 1.0,
                max_frames,
                dispatch_timeout: Duration::from_secs(2),
                output_dir: None,
            },
        )
    }

    fn violation() -> Vec<Detection> {
        vec![Detection::new("no-helmet", 0.9, BoundingBox::new(4.0, 4.0, 20.0, 20.0))]
    }

    #[test]
    fn max_frames_caps_the_run() {
        let summary = pipeline(StubBackend::new(), Some(3))
            .run(&mut Blank { remaining: 10 }, &AtomicBool::new(false))
            .unwrap();
        assert_eq!(summary.stats.frames_processed, 3);
        assert!(summary.complete);
        assert!(!summary.stopped_early);
    }

    #[test]
    fn stop_flag_ends_run_cleanly() {
        let summary = pipeline(StubBackend::new(), None)
            .run(&mut Blank { remaining: 10 }, &AtomicBool::new(true))
            .unwrap();
        assert_eq!(summary.stats.frames_processed, 0);
        assert!(summary.complete);
        assert!(summary.stopped_early);
    }

    #[test]
    fn log_notifier_counts_as_delivered() {
        let detector = StubBackend::new()
            .with_frame(0, violation())
            .with_frame(1, violation());
        let summary = pipeline(detector, None)
            .run(&mut Blank { remaining: 3 }, &AtomicBool::new(false))
            .unwrap();
        assert_eq!(summary.stats.frames_with_violations, 2);
        assert_eq!(summary.stats.alerts_sent, 1);
        assert_eq!(summary.stats.alerts_suppressed, 1);
        assert_eq!(summary.last_alert_at_secs, Some(0.0));
        assert_eq!(summary.notifier, "log");
    }

    #[test]
    fn source_error_is_fatal() {
        struct Broken;
        impl FrameSource for Broken {
            fn describe(&self) -> String {
                "broken".to_string()
            }
            fn next_frame(&mut self) -> anyhow::Result<Option<RgbImage>> {
                Err(anyhow::anyhow!("decoder crashed"))
            }
        }
        let failure = pipeline(StubBackend::new(), None)
            .run(&mut Broken, &AtomicBool::new(false))
            .unwrap_err();
        assert!(matches!(failure.error, PipelineError::Source(_)));
        assert!(failure.error.is_fatal());
        assert!(!failure.summary.complete);
        assert!(failure.summary.error.unwrap().contains("decoder crashed"));
    }

    #[test]
    fn summary_sits_beside_an_encoded_video() {
        let root = tempfile::tempdir().unwrap();
        let frames = root.path().join("output_20260501_143005");
        fs::create_dir(&frames).unwrap();
        assert_eq!(summary_dir_for(frames.clone()), frames);
        assert_eq!(
            summary_dir_for(root.path().join("output_20260501_143005.mp4")),
            root.path()
        );
    }
}
