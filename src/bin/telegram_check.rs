//! telegram_check - verify Telegram bot connectivity
//!
//! Sends the start-up message to the configured chat and exits non-zero if
//! the Bot API rejects it or cannot be reached.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use ppe_sentinel::alert::{Notifier, TelegramNotifier};
use ppe_sentinel::SentinelConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "Send a test message through the configured Telegram bot")]
struct Args {
    /// Config file (TOML, or JSON with a .json extension).
    #[arg(long, env = "PPE_CONFIG")]
    config: Option<PathBuf>,

    /// Request timeout in seconds. Defaults to alerts.dispatch_timeout_secs.
    #[arg(long)]
    timeout_secs: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = SentinelConfig::load_from(args.config.as_deref())?;
    let timeout = args
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(config.alerts.dispatch_timeout);
    if timeout.is_zero() {
        return Err(anyhow!("timeout must be at least 1 second"));
    }

    let notifier = TelegramNotifier::from_settings(&config.telegram, timeout)
        .context("telegram.bot_token and telegram.chat_id must be configured")?;
    notifier
        .check()
        .map_err(|err| anyhow!(err))
        .context("telegram connection failed")?;
    log::info!("telegram connection successful");
    Ok(())
}
