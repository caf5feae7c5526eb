//! Terminal progress output for the binaries.

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Plain mode prints a progress line every this many frames.
const PLAIN_PROGRESS_EVERY: u64 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty && self.mode != UiMode::Plain
    }

    /// Announce a stage; completion and elapsed time are reported on drop.
    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Per-frame progress for a run. `total` is the frame cap, if known.
    pub fn frames(&self, total: Option<u64>) -> FrameProgress {
        let bar = self.use_pretty().then(|| {
            let (bar, template) = match total {
                Some(total) => (
                    ProgressBar::new(total),
                    "{bar:32} {pos}/{len} frames  {msg}",
                ),
                None => (ProgressBar::new_spinner(), "{spinner} {pos} frames  {msg}"),
            };
            bar.set_draw_target(ProgressDrawTarget::stderr());
            let style = ProgressStyle::with_template(template)
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar
        });
        FrameProgress { bar }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

/// Frame counter shown while a run is in progress. Clones share one display.
#[derive(Clone)]
pub struct FrameProgress {
    bar: Option<ProgressBar>,
}

impl FrameProgress {
    pub fn update(&self, frames_processed: u64, alerts_sent: u64) {
        match &self.bar {
            Some(bar) => {
                bar.set_position(frames_processed);
                bar.set_message(format!("{alerts_sent} alerts"));
            }
            None if frames_processed % PLAIN_PROGRESS_EVERY == 0 => {
                eprintln!("... {frames_processed} frames, {alerts_sent} alerts");
            }
            None => {}
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretty_output_needs_a_terminal() {
        assert!(!Ui::from_args(Some("pretty"), false).use_pretty());
        assert!(!Ui::from_args(Some("plain"), true).use_pretty());
        assert!(Ui::from_args(None, true).use_pretty());
    }

    #[test]
    fn durations_switch_units_at_one_second() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }
}
