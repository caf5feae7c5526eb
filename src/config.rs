use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::classify::ViolationLabels;
use crate::error::ConfigError;
use crate::frame::{MAX_FPS, MIN_FPS};

const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_VIOLATION_LABELS: &[&str] = &["no-helmet", "no-vest"];
const DEFAULT_COOLDOWN_SECS: f64 = 30.0;
const DEFAULT_SCREENSHOT_PATH: &str = "output/screenshots";
const DEFAULT_DISPATCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_QUEUE_CAPACITY: usize = 4;
const DEFAULT_INPUT_PATH: &str = "stub://demo";
const DEFAULT_OUTPUT_PATH: &str = "output";
const DEFAULT_FPS: f64 = 30.0;
const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize, Default)]
struct SentinelConfigFile {
    detection: Option<DetectionConfigFile>,
    violations: Option<ViolationsConfigFile>,
    alerts: Option<AlertsConfigFile>,
    video: Option<VideoConfigFile>,
    telegram: Option<TelegramConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    class_names: Option<Vec<String>>,
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
    replay_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct ViolationsConfigFile {
    violation_labels: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertsConfigFile {
    cooldown_seconds: Option<f64>,
    save_screenshots: Option<bool>,
    screenshot_path: Option<PathBuf>,
    dispatch_timeout_secs: Option<u64>,
    queue_capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct VideoConfigFile {
    input_path: Option<String>,
    output_path: Option<PathBuf>,
    save_output_video: Option<bool>,
    fps: Option<f64>,
    max_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TelegramConfigFile {
    enable_alerts: Option<bool>,
    bot_token: Option<String>,
    chat_id: Option<String>,
    api_base: Option<String>,
}

/// Validated configuration for a monitoring run.
#[derive(Debug, Clone)]
pub struct SentinelConfig {
    pub detection: DetectionSettings,
    pub violation_labels: ViolationLabels,
    pub alerts: AlertSettings,
    pub video: VideoSettings,
    pub telegram: TelegramSettings,
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    /// Registered backend name ("stub", "replay", "tract").
    pub backend: String,
    pub model_path: Option<PathBuf>,
    /// Model class index to label mapping.
    pub class_names: Vec<String>,
    /// Square model input edge in pixels.
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub replay_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AlertSettings {
    pub cooldown: Duration,
    pub save_screenshots: bool,
    pub screenshot_path: PathBuf,
    /// Upper bound on a single notification attempt and on the end-of-run drain.
    pub dispatch_timeout: Duration,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct VideoSettings {
    pub input_path: String,
    pub output_path: PathBuf,
    pub save_output_video: bool,
    /// Used when the source does not report a frame rate.
    pub fps: f64,
    pub max_frames: Option<u64>,
}

#[derive(Clone, Default)]
pub struct TelegramSettings {
    pub enable_alerts: bool,
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub api_base: String,
}

impl std::fmt::Debug for TelegramSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramSettings")
            .field("enable_alerts", &self.enable_alerts)
            .field("bot_token", &self.bot_token.as_ref().map(|_| "<redacted>"))
            .field("chat_id", &self.chat_id)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            model_path: None,
            class_names: Vec::new(),
            input_size: DEFAULT_INPUT_SIZE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            replay_path: None,
        }
    }
}

impl SentinelConfig {
    /// Load from the file named by `PPE_CONFIG` (if set), then apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("PPE_CONFIG")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Load from an explicit file (or defaults when `None`), then apply
    /// environment overrides and validate.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => SentinelConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SentinelConfigFile) -> Result<Self, ConfigError> {
        let detection_file = file.detection.unwrap_or_default();
        let detection = DetectionSettings {
            backend: detection_file
                .backend
                .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            model_path: detection_file.model_path,
            class_names: detection_file.class_names.unwrap_or_default(),
            input_size: detection_file.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
            confidence_threshold: detection_file
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            replay_path: detection_file.replay_path,
        };

        let violation_labels = file
            .violations
            .and_then(|v| v.violation_labels)
            .map(ViolationLabels::new)
            .unwrap_or_else(|| ViolationLabels::new(DEFAULT_VIOLATION_LABELS.iter().copied()));

        let alerts_file = file.alerts.unwrap_or_default();
        let cooldown_seconds = alerts_file.cooldown_seconds.unwrap_or(DEFAULT_COOLDOWN_SECS);
        let alerts = AlertSettings {
            cooldown: secs_to_duration("alerts.cooldown_seconds", cooldown_seconds)?,
            save_screenshots: alerts_file.save_screenshots.unwrap_or(true),
            screenshot_path: alerts_file
                .screenshot_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SCREENSHOT_PATH)),
            dispatch_timeout: Duration::from_secs(
                alerts_file
                    .dispatch_timeout_secs
                    .unwrap_or(DEFAULT_DISPATCH_TIMEOUT_SECS),
            ),
            queue_capacity: alerts_file.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
        };

        let video_file = file.video.unwrap_or_default();
        let video = VideoSettings {
            input_path: video_file
                .input_path
                .unwrap_or_else(|| DEFAULT_INPUT_PATH.to_string()),
            output_path: video_file
                .output_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PATH)),
            save_output_video: video_file.save_output_video.unwrap_or(true),
            fps: video_file.fps.unwrap_or(DEFAULT_FPS),
            max_frames: video_file.max_frames,
        };

        let telegram_file = file.telegram.unwrap_or_default();
        let telegram = TelegramSettings {
            enable_alerts: telegram_file.enable_alerts.unwrap_or(false),
            bot_token: telegram_file.bot_token.filter(|t| !t.trim().is_empty()),
            chat_id: telegram_file.chat_id.filter(|c| !c.trim().is_empty()),
            api_base: telegram_file
                .api_base
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE.to_string()),
        };

        Ok(Self {
            detection,
            violation_labels,
            alerts,
            video,
            telegram,
        })
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(input) = env_non_empty("PPE_INPUT_PATH") {
            self.video.input_path = input;
        }
        if let Some(output) = env_non_empty("PPE_OUTPUT_PATH") {
            self.video.output_path = PathBuf::from(output);
        }
        if let Some(threshold) = env_non_empty("PPE_CONFIDENCE_THRESHOLD") {
            self.detection.confidence_threshold = threshold.trim().parse().map_err(|_| {
                ConfigError::invalid("PPE_CONFIDENCE_THRESHOLD", "must be a number in [0, 1]")
            })?;
        }
        if let Some(labels) = env_non_empty("PPE_VIOLATION_LABELS") {
            self.violation_labels = ViolationLabels::new(split_csv(&labels));
        }
        if let Some(cooldown) = env_non_empty("PPE_COOLDOWN_SECS") {
            let seconds: f64 = cooldown.trim().parse().map_err(|_| {
                ConfigError::invalid("PPE_COOLDOWN_SECS", "must be a number of seconds")
            })?;
            self.alerts.cooldown = secs_to_duration("PPE_COOLDOWN_SECS", seconds)?;
        }
        if let Some(token) = env_non_empty("PPE_TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(token);
        }
        if let Some(chat_id) = env_non_empty("PPE_TELEGRAM_CHAT_ID") {
            self.telegram.chat_id = Some(chat_id);
        }
        Ok(())
    }

    /// Check cross-field constraints. Called by `load_from`; call again after
    /// changing fields by hand.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.detection.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::invalid(
                "detection.confidence_threshold",
                format!("{threshold} is outside [0, 1]"),
            ));
        }
        if self.violation_labels.is_empty() {
            return Err(ConfigError::EmptyViolationLabels);
        }
        if !(MIN_FPS..=MAX_FPS).contains(&self.video.fps) {
            return Err(ConfigError::invalid(
                "video.fps",
                format!("{} is outside [{MIN_FPS}, {MAX_FPS}]", self.video.fps),
            ));
        }
        if self.video.max_frames == Some(0) {
            return Err(ConfigError::invalid("video.max_frames", "must be greater than zero"));
        }
        if self.alerts.dispatch_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "alerts.dispatch_timeout_secs",
                "must be greater than zero",
            ));
        }
        if self.alerts.queue_capacity == 0 {
            return Err(ConfigError::invalid(
                "alerts.queue_capacity",
                "must be greater than zero",
            ));
        }
        if self.detection.input_size == 0 {
            return Err(ConfigError::invalid(
                "detection.input_size",
                "must be greater than zero",
            ));
        }
        match self.detection.backend.as_str() {
            "replay" if self.detection.replay_path.is_none() => {
                return Err(ConfigError::invalid(
                    "detection.replay_path",
                    "required by the replay backend",
                ));
            }
            "tract" if self.detection.model_path.is_none() => {
                return Err(ConfigError::invalid(
                    "detection.model_path",
                    "required by the tract backend",
                ));
            }
            _ => {}
        }
        if self.telegram.enable_alerts {
            if self.telegram.bot_token.is_none() {
                return Err(ConfigError::invalid(
                    "telegram.bot_token",
                    "required when telegram.enable_alerts is true",
                ));
            }
            if self.telegram.chat_id.is_none() {
                return Err(ConfigError::invalid(
                    "telegram.chat_id",
                    "required when telegram.enable_alerts is true",
                ));
            }
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<SentinelConfigFile, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let parsed = if is_json {
        serde_json::from_str(&raw).map_err(|e| e.to_string())
    } else {
        toml::from_str(&raw).map_err(|e| e.to_string())
    };
    parsed.map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

fn secs_to_duration(key: &'static str, seconds: f64) -> Result<Duration, ConfigError> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(ConfigError::invalid(
            key,
            "must be a finite, non-negative number of seconds",
        ));
    }
    Duration::try_from_secs_f64(seconds)
        .map_err(|_| ConfigError::invalid(key, format!("{seconds} seconds is out of range")))
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
