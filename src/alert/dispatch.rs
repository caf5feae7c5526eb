use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::error::DispatchError;

use super::message::Alert;
use super::notifier::Notifier;

/// Delivery result for one submitted alert.
#[derive(Clone, Debug, PartialEq)]
pub struct DispatchOutcome {
    pub frame_index: u64,
    pub result: Result<(), DispatchError>,
}

/// Everything collected when the dispatcher shuts down.
#[derive(Debug, Default)]
pub struct DispatchDrain {
    pub outcomes: Vec<DispatchOutcome>,
    /// Alerts still queued or in flight when the drain timed out.
    pub abandoned: usize,
}

/// Delivers alerts on a background worker so the frame loop never waits on
/// the network.
///
/// Alerts are delivered in submission order, each at most once. The queue is
/// bounded; when it is full the alert is dropped instead of blocking. Each
/// delivery attempt is bounded by `attempt_timeout`; an attempt that overruns
/// is reported as `DispatchError::Timeout` and the worker moves on.
pub struct Dispatcher {
    sender: Option<SyncSender<Alert>>,
    outcomes: Receiver<DispatchOutcome>,
    worker: Option<JoinHandle<()>>,
    notifier_name: &'static str,
    in_flight: usize,
}

impl Dispatcher {
    pub fn spawn(
        notifier: Box<dyn Notifier>,
        capacity: usize,
        attempt_timeout: Duration,
    ) -> Result<Self> {
        let (sender, queue) = mpsc::sync_channel::<Alert>(capacity.max(1));
        let (outcome_tx, outcomes) = mpsc::channel();
        let notifier: Arc<dyn Notifier> = Arc::from(notifier);
        let notifier_name = notifier.name();
        let worker = thread::Builder::new()
            .name("alert-dispatch".to_string())
            .spawn(move || {
                for alert in queue {
                    let frame_index = alert.payload.frame_index;
                    let result = send_bounded(&notifier, alert, attempt_timeout);
                    if outcome_tx.send(DispatchOutcome { frame_index, result }).is_err() {
                        break;
                    }
                }
            })
            .context("failed to spawn alert dispatch worker")?;
        log::info!(
            "alert dispatch: {} (queue {}, attempt timeout {:?})",
            notifier_name,
            capacity.max(1),
            attempt_timeout
        );
        Ok(Self {
            sender: Some(sender),
            outcomes,
            worker: Some(worker),
            notifier_name,
            in_flight: 0,
        })
    }

    pub fn notifier_name(&self) -> &'static str {
        self.notifier_name
    }

    /// Alerts submitted whose outcome has not been collected yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Queue an alert without blocking.
    pub fn submit(&mut self, alert: Alert) -> Result<(), DispatchError> {
        let sender = self.sender.as_ref().ok_or(DispatchError::Disconnected)?;
        match sender.try_send(alert) {
            Ok(()) => {
                self.in_flight += 1;
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(DispatchError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(DispatchError::Disconnected),
        }
    }

    /// Collect outcomes that are ready, without waiting.
    pub fn poll(&mut self) -> Vec<DispatchOutcome> {
        let mut ready = Vec::new();
        loop {
            match self.outcomes.try_recv() {
                Ok(outcome) => {
                    self.in_flight = self.in_flight.saturating_sub(1);
                    ready.push(outcome);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        ready
    }

    /// Stop accepting alerts and wait up to `timeout` for pending ones.
    ///
    /// A worker still busy after the timeout is detached, and its pending
    /// alerts are reported as abandoned.
    pub fn finish(mut self, timeout: Duration) -> DispatchDrain {
        self.sender.take();
        let deadline = Instant::now() + timeout;
        let mut drain = DispatchDrain {
            outcomes: self.poll(),
            abandoned: 0,
        };
        while self.in_flight > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.outcomes.recv_timeout(remaining) {
                Ok(outcome) => {
                    self.in_flight -= 1;
                    drain.outcomes.push(outcome);
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    log::error!("alert dispatch worker exited with alerts pending");
                    break;
                }
            }
        }
        drain.abandoned = self.in_flight;
        if drain.abandoned == 0 {
            if let Some(worker) = self.worker.take() {
                if worker.join().is_err() {
                    log::error!("alert dispatch worker panicked");
                }
            }
        } else {
            log::warn!(
                "alert dispatch: {} alert(s) still pending after {:?}; abandoning",
                drain.abandoned,
                timeout
            );
        }
        drain
    }
}

/// Run one delivery attempt on its own thread and wait at most `timeout`.
/// An overrunning attempt is left to finish in the background.
fn send_bounded(
    notifier: &Arc<dyn Notifier>,
    alert: Alert,
    timeout: Duration,
) -> Result<(), DispatchError> {
    let (result_tx, result_rx) = mpsc::channel();
    let notifier = Arc::clone(notifier);
    let frame_index = alert.payload.frame_index;
    thread::Builder::new()
        .name("alert-send".to_string())
        .spawn(move || {
            let _ = result_tx.send(notifier.send(&alert));
        })
        .map_err(|err| DispatchError::Transport(format!("failed to start delivery: {err}")))?;
    match result_rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            log::warn!("alert for frame {frame_index} did not complete within {timeout:?}");
            Err(DispatchError::Timeout(timeout))
        }
        Err(RecvTimeoutError::Disconnected) => Err(DispatchError::Transport(
            "notifier panicked during delivery".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use chrono::Local;

    use crate::alert::AlertPayload;
    use crate::frame::FrameTimestamp;

    struct Recording {
        sent: Arc<Mutex<Vec<u64>>>,
        fail: bool,
        delay: Duration,
    }

    impl Notifier for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn send(&self, alert: &Alert) -> Result<(), DispatchError> {
            thread::sleep(self.delay);
            self.sent.lock().unwrap().push(alert.payload.frame_index);
            if self.fail {
                Err(DispatchError::Transport("offline".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn alert(frame_index: u64) -> Alert {
        Alert::new(
            AlertPayload {
                frame_index,
                timestamp: FrameTimestamp::ZERO,
                violation_types: vec!["no-helmet".to_string()],
                violation_count: 1,
            },
            Local::now(),
        )
    }

    fn recording(fail: bool, delay: Duration) -> (Box<dyn Notifier>, Arc<Mutex<Vec<u64>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let notifier = Recording {
            sent: Arc::clone(&sent),
            fail,
            delay,
        };
        (Box::new(notifier), sent)
    }

    #[test]
    fn delivers_in_submission_order() {
        let (notifier, sent) = recording(false, Duration::ZERO);
        let mut dispatcher = Dispatcher::spawn(notifier, 8, Duration::from_secs(5)).unwrap();
        for i in [3, 1, 2] {
            dispatcher.submit(alert(i)).unwrap();
        }
        let drain = dispatcher.finish(Duration::from_secs(5));
        assert_eq!(drain.abandoned, 0);
        assert_eq!(*sent.lock().unwrap(), vec![3, 1, 2]);
        let frames: Vec<u64> = drain.outcomes.iter().map(|o| o.frame_index).collect();
        assert_eq!(frames, vec![3, 1, 2]);
        assert!(drain.outcomes.iter().all(|o| o.result.is_ok()));
    }

    #[test]
    fn failures_are_reported_not_retried() {
        let (notifier, sent) = recording(true, Duration::ZERO);
        let mut dispatcher = Dispatcher::spawn(notifier, 2, Duration::from_secs(5)).unwrap();
        dispatcher.submit(alert(0)).unwrap();
        let drain = dispatcher.finish(Duration::from_secs(5));
        assert_eq!(sent.lock().unwrap().len(), 1);
        assert_eq!(
            drain.outcomes[0].result,
            Err(DispatchError::Transport("offline".to_string()))
        );
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let (notifier, _sent) = recording(false, Duration::from_millis(300));
        let mut dispatcher = Dispatcher::spawn(notifier, 1, Duration::from_secs(5)).unwrap();
        let started = Instant::now();
        let results: Vec<_> = (0..5).map(|i| dispatcher.submit(alert(i))).collect();
        assert!(started.elapsed() < Duration::from_millis(200));
        assert!(results.iter().any(|r| *r == Err(DispatchError::QueueFull)));
        dispatcher.finish(Duration::from_secs(5));
    }

    #[test]
    fn slow_notifier_is_abandoned_after_timeout() {
        let (notifier, _sent) = recording(false, Duration::from_secs(2));
        let mut dispatcher = Dispatcher::spawn(notifier, 4, Duration::from_secs(5)).unwrap();
        dispatcher.submit(alert(0)).unwrap();
        let started = Instant::now();
        let drain = dispatcher.finish(Duration::from_millis(100));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(drain.abandoned, 1);
        assert!(drain.outcomes.is_empty());
    }

    #[test]
    fn hung_attempt_times_out_and_later_alerts_still_go_out() {
        let (notifier, sent) = recording(false, Duration::from_secs(3));
        let mut dispatcher = Dispatcher::spawn(notifier, 4, Duration::from_millis(100)).unwrap();
        assert_eq!(dispatcher.notifier_name(), "recording");
        dispatcher.submit(alert(0)).unwrap();
        dispatcher.submit(alert(1)).unwrap();
        assert_eq!(dispatcher.in_flight(), 2);

        let started = Instant::now();
        let drain = dispatcher.finish(Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(drain.abandoned, 0);
        let results: Vec<_> = drain.outcomes.iter().map(|o| (o.frame_index, o.result.clone())).collect();
        assert_eq!(
            results,
            vec![
                (0, Err(DispatchError::Timeout(Duration::from_millis(100)))),
                (1, Err(DispatchError::Timeout(Duration::from_millis(100)))),
            ]
        );
        assert!(sent.lock().unwrap().is_empty());
    }

    #[test]
    fn in_flight_tracks_uncollected_outcomes() {
        let (notifier, _sent) = recording(false, Duration::ZERO);
        let mut dispatcher = Dispatcher::spawn(notifier, 4, Duration::from_secs(5)).unwrap();
        dispatcher.submit(alert(0)).unwrap();
        assert_eq!(dispatcher.in_flight(), 1);
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut collected = Vec::new();
        while collected.is_empty() && Instant::now() < deadline {
            collected = dispatcher.poll();
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(collected.len(), 1);
        assert_eq!(dispatcher.in_flight(), 0);
        dispatcher.finish(Duration::from_secs(1));
    }
}
