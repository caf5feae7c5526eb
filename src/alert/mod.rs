//! Alert throttling and notification dispatch.
//!
//! [`AlertThrottle`] decides, per frame, whether a violation becomes an
//! outbound alert. [`Dispatcher`] delivers fired alerts through a
//! [`Notifier`] on a worker thread.

mod dispatch;
mod message;
mod notifier;
mod telegram;
mod throttle;

pub use dispatch::{DispatchDrain, DispatchOutcome, Dispatcher};
pub use message::{format_caption, Alert, STARTUP_MESSAGE};
pub use notifier::{LogNotifier, Notifier};
pub use telegram::TelegramNotifier;
pub use throttle::{AlertPayload, AlertState, AlertThrottle, ThrottleDecision};
