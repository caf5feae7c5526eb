//! Telegram Bot API notifier (`sendPhoto` / `sendMessage`).

use std::time::Duration;

use anyhow::Context;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, RequestBuilder};

use crate::config::TelegramSettings;
use crate::error::DispatchError;

use super::message::{Alert, STARTUP_MESSAGE};
use super::notifier::Notifier;

const PHOTO_FILE_NAME: &str = "violation.jpg";

/// Posts alerts to a Telegram chat.
///
/// Alerts with an image are sent as a photo with a Markdown caption; alerts
/// without one fall back to a text message. Every request is bounded by the
/// client's timeout.
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(
        api_base: impl Into<String>,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .context("build telegram http client")?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        })
    }

    /// Build from validated settings. Fails if the token or chat id is missing.
    pub fn from_settings(settings: &TelegramSettings, timeout: Duration) -> anyhow::Result<Self> {
        let token = settings
            .bot_token
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("telegram.bot_token is not set"))?;
        let chat_id = settings
            .chat_id
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("telegram.chat_id is not set"))?;
        Self::new(&settings.api_base, token, chat_id, timeout)
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    fn send_message(&self, text: &str, markdown: bool) -> Result<(), DispatchError> {
        let mut body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
        });
        if markdown {
            body["parse_mode"] = serde_json::json!("Markdown");
        }
        self.execute(self.client.post(self.method_url("sendMessage")).json(&body))
    }

    fn send_photo(&self, jpeg: &[u8], caption: &str) -> Result<(), DispatchError> {
        let form = self.photo_form(jpeg, caption)?;
        self.execute(self.client.post(self.method_url("sendPhoto")).multipart(form))
    }

    fn photo_form(&self, jpeg: &[u8], caption: &str) -> Result<Form, DispatchError> {
        let photo = Part::bytes(jpeg.to_vec())
            .file_name(PHOTO_FILE_NAME)
            .mime_str("image/jpeg")
            .map_err(|err| DispatchError::Transport(err.to_string()))?;
        Ok(Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", caption.to_string())
            .text("parse_mode", "Markdown")
            .part("photo", photo))
    }

    fn execute(&self, request: RequestBuilder) -> Result<(), DispatchError> {
        let response = request
            .send()
            .map_err(|err| DispatchError::Transport(self.redact(&err.to_string())))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().unwrap_or_default();
        Err(DispatchError::Rejected {
            status: status.as_u16(),
            body: self.redact(&body),
        })
    }

    /// Keep the bot token out of logs and error messages.
    fn redact(&self, text: &str) -> String {
        if self.bot_token.is_empty() {
            text.to_string()
        } else {
            text.replace(&self.bot_token, "<redacted>")
        }
    }
}

impl Notifier for TelegramNotifier {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn send(&self, alert: &Alert) -> Result<(), DispatchError> {
        let caption = alert.caption();
        match &alert.image_jpeg {
            Some(jpeg) => self.send_photo(jpeg, &caption),
            None => self.send_message(&caption, true),
        }
    }

    fn check(&self) -> Result<(), DispatchError> {
        self.send_message(STARTUP_MESSAGE, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn photo_form_uses_a_unique_boundary() {
        let notifier = TelegramNotifier::new(
            "https://api.telegram.org",
            "123:SECRET",
            "-100",
            Duration::from_secs(1),
        )
        .unwrap();
        let first = notifier.photo_form(&[0xFF, 0xD8, 0xFF], "hi").unwrap();
        let second = notifier.photo_form(&[0xFF, 0xD8, 0xFF], "hi").unwrap();
        assert!(!first.boundary().is_empty());
        assert_ne!(first.boundary(), second.boundary());
    }

    #[test]
    fn urls_and_errors_hide_the_token() {
        let notifier = TelegramNotifier::new(
            "https://api.telegram.org/",
            "123:SECRET",
            "-100",
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            notifier.method_url("sendMessage"),
            "https://api.telegram.org/bot123:SECRET/sendMessage"
        );
        assert_eq!(
            notifier.redact("POST https://api.telegram.org/bot123:SECRET/sendPhoto failed"),
            "POST https://api.telegram.org/bot<redacted>/sendPhoto failed"
        );
    }

    #[test]
    fn unreachable_api_is_a_transport_error() {
        // Port 9 on localhost is expected to refuse connections.
        let notifier = TelegramNotifier::new(
            "http://127.0.0.1:9",
            "123:SECRET",
            "-100",
            Duration::from_millis(500),
        )
        .unwrap();
        match notifier.check() {
            Err(DispatchError::Transport(message)) => assert!(!message.contains("SECRET")),
            other => panic!("expected transport error, got {other:?}"),
        }
    }
}
