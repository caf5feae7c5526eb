use std::path::PathBuf;

use chrono::{DateTime, Local};

use super::throttle::AlertPayload;

/// Sent by connectivity checks.
pub const STARTUP_MESSAGE: &str = "🤖 Worker Safety Detection System is now active!";

/// An alert handed to a notifier: what fired, when, and the evidence.
#[derive(Clone, Debug)]
pub struct Alert {
    pub payload: AlertPayload,
    /// Wall-clock time the alert was raised.
    pub raised_at: DateTime<Local>,
    /// Annotated frame, JPEG-encoded.
    pub image_jpeg: Option<Vec<u8>>,
    pub screenshot: Option<PathBuf>,
}

impl Alert {
    pub fn new(payload: AlertPayload, raised_at: DateTime<Local>) -> Self {
        Self {
            payload,
            raised_at,
            image_jpeg: None,
            screenshot: None,
        }
    }

    pub fn with_image(mut self, jpeg: Vec<u8>) -> Self {
        self.image_jpeg = Some(jpeg);
        self
    }

    pub fn with_screenshot(mut self, path: PathBuf) -> Self {
        self.screenshot = Some(path);
        self
    }

    /// Markdown caption for chat notifications.
    pub fn caption(&self) -> String {
        format_caption(&self.payload, &self.raised_at)
    }
}

pub fn format_caption(payload: &AlertPayload, raised_at: &DateTime<Local>) -> String {
    let types: Vec<String> = payload
        .violation_types
        .iter()
        .map(|t| escape_markdown(t))
        .collect();
    let plural = if payload.violation_count == 1 { "" } else { "s" };
    format!(
        "⚠️ *SAFETY VIOLATION DETECTED* ⚠️\n\n\
         🕒 Time: {}\n\
         🎞 Video time: {}\n\
         📍 Type: {}\n\
         🔢 Count: {} violation{}\n\n\
         ⚡ Immediate action required!",
        raised_at.format("%Y-%m-%d %H:%M:%S"),
        payload.timestamp,
        types.join(", "),
        payload.violation_count,
        plural,
    )
}

/// Escape the characters legacy Telegram Markdown treats as markup.
fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
