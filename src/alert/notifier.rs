use crate::error::DispatchError;

use super::message::Alert;

/// Outbound notification capability.
///
/// `send` is called off the frame loop, one alert at a time. The dispatcher
/// stops waiting on an attempt after its timeout, so an implementation that
/// never returns costs a thread but does not stall later alerts.
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn send(&self, alert: &Alert) -> Result<(), DispatchError>;

    /// Connectivity probe.
    fn check(&self) -> Result<(), DispatchError> {
        Ok(())
    }
}

/// Writes alerts to the log. Used when chat alerts are disabled.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    fn send(&self, alert: &Alert) -> Result<(), DispatchError> {
        log::warn!(
            "ALERT frame={} video_time={} types=[{}] count={}",
            alert.payload.frame_index,
            alert.payload.timestamp,
            alert.payload.violation_types.join(", "),
            alert.payload.violation_count
        );
        if let Some(path) = &alert.screenshot {
            log::warn!("ALERT screenshot: {}", path.display());
        }
        Ok(())
    }
}
