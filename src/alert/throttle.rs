use std::time::Duration;

use serde::Serialize;

use crate::classify::FrameResult;
use crate::frame::FrameTimestamp;

/// Cooldown bookkeeping for one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlertState {
    pub last_alert_timestamp: Option<FrameTimestamp>,
    pub cooldown: Duration,
}

impl AlertState {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            last_alert_timestamp: None,
            cooldown,
        }
    }

    /// Cooldown left at `now`, or `None` when an alert may fire (Idle).
    /// A `now` earlier than the last alert counts as a full cooldown.
    pub fn remaining_at(&self, now: FrameTimestamp) -> Option<Duration> {
        let last = self.last_alert_timestamp?;
        match now.since(last) {
            Some(elapsed) if elapsed >= self.cooldown => None,
            Some(elapsed) => Some(self.cooldown - elapsed),
            None => Some(self.cooldown),
        }
    }

    pub fn is_cooling(&self, now: FrameTimestamp) -> bool {
        self.remaining_at(now).is_some()
    }
}

/// What an alert says about the frame that raised it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AlertPayload {
    pub frame_index: u64,
    #[serde(rename = "timestamp_secs", serialize_with = "serialize_secs")]
    pub timestamp: FrameTimestamp,
    pub violation_types: Vec<String>,
    pub violation_count: usize,
}

fn serialize_secs<S: serde::Serializer>(ts: &FrameTimestamp, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(ts.as_secs_f64())
}

#[derive(Clone, Debug, PartialEq)]
pub enum ThrottleDecision {
    NoViolation,
    Fire(AlertPayload),
    Suppressed { remaining: Duration },
}

/// Single global cooldown gate between violation frames and outbound alerts.
///
/// The cooldown is measured in video time. A frame whose timestamp is older
/// than the last alert is treated as still cooling down.
#[derive(Debug)]
pub struct AlertThrottle {
    state: AlertState,
}

impl AlertThrottle {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            state: AlertState::new(cooldown),
        }
    }

    pub fn state(&self) -> &AlertState {
        &self.state
    }

    pub fn evaluate(&mut self, result: &FrameResult) -> ThrottleDecision {
        if !result.has_violations() {
            return ThrottleDecision::NoViolation;
        }
        let now = result.timestamp;
        if let Some(remaining) = self.state.remaining_at(now) {
            return ThrottleDecision::Suppressed { remaining };
        }
        self.state.last_alert_timestamp = Some(now);
        ThrottleDecision::Fire(AlertPayload {
            frame_index: result.frame_index,
            timestamp: now,
            violation_types: result.violation_types(),
            violation_count: result.violation_count,
        })
    }
}
