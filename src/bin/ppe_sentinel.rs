//! ppe_sentinel - process a video and alert on missing PPE
//!
//! Reads frames from a local source, runs the configured detector on each
//! one, writes annotated output and sends throttled violation alerts.
//! Ctrl-C stops the run after the current frame.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use ppe_sentinel::alert::{LogNotifier, Notifier, TelegramNotifier};
use ppe_sentinel::ui::Ui;
use ppe_sentinel::{BackendRegistry, FileConfig, FileSource, FrameSource, Pipeline, SentinelConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Monitor video for PPE violations and send alerts")]
struct Args {
    /// Config file (TOML, or JSON with a .json extension).
    #[arg(long, env = "PPE_CONFIG")]
    config: Option<PathBuf>,

    /// Input video, image directory, or stub:// source. Overrides video.input_path.
    #[arg(long)]
    input: Option<String>,

    /// Output directory. Overrides video.output_path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,

    /// Skip writing annotated frames.
    #[arg(long)]
    no_video: bool,

    /// Progress output: auto, plain or pretty.
    #[arg(long)]
    ui: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = Ui::from_args(args.ui.as_deref(), std::io::stderr().is_terminal());

    let config = {
        let _stage = ui.stage("load configuration");
        let mut config = SentinelConfig::load_from(args.config.as_deref())?;
        if let Some(input) = args.input {
            config.video.input_path = input;
        }
        if let Some(output) = args.output {
            config.alerts.screenshot_path = output.join("screenshots");
            config.video.output_path = output;
        }
        if args.max_frames.is_some() {
            config.video.max_frames = args.max_frames;
        }
        if args.no_video {
            config.video.save_output_video = false;
        }
        config.validate()?;
        log::debug!("configuration: {:?}", config);
        config
    };

    let mut source = FileSource::new(FileConfig::new(config.video.input_path.clone()))
        .with_context(|| format!("failed to open input '{}'", config.video.input_path))?;

    let notifier: Box<dyn Notifier> = if config.telegram.enable_alerts {
        Box::new(TelegramNotifier::from_settings(
            &config.telegram,
            config.alerts.dispatch_timeout,
        )?)
    } else {
        log::info!("telegram alerts disabled; alerts go to the log");
        Box::new(LogNotifier)
    };

    let mut pipeline = {
        let _stage = ui.stage("load detector");
        Pipeline::from_config(&config, &BackendRegistry::with_builtin(), source.fps(), notifier)?
    };

    let progress = ui.frames(config.video.max_frames);
    let hook_progress = progress.clone();
    pipeline.on_progress(move |stats| hook_progress.update(stats.frames_processed, stats.alerts_sent));

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        handler_stop.store(true, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    let result = pipeline.run(&mut source, &stop);
    progress.finish();
    let input = source.stats();
    log::info!("read {} frame(s) from {}", input.frames_captured, input.path);

    match result {
        Ok(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Err(failure) => {
            println!("{}", serde_json::to_string_pretty(&failure.summary)?);
            Err(anyhow!(failure.error)).context("monitoring run failed")
        }
    }
}
