#![allow(missing_docs)]

//! Switchboard CLI entry point.
//!
//! Provides `send` for one-off messages and `messengers` for checking that
//! every configured messenger resolves.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{debug, warn};

use switchboard::smsable::{Envelope, PlainSms};
use switchboard::{config, logging, SmsConfig, SmsManager, SmsSender};

/// Switchboard: send SMS through configured messengers.
#[derive(Parser)]
#[command(name = "switchboard", version, about)]
struct Cli {
    /// Config file (default: `$SWITCHBOARD_CONFIG` or `./switchboard.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write JSON logs to this directory in addition to stderr.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Send a text message.
    Send {
        /// Messenger to send through (default: the configured default).
        #[arg(long, short)]
        messenger: Option<String>,
        /// Recipient number; repeat for several recipients.
        #[arg(long, required = true)]
        to: Vec<String>,
        /// Sender number.
        #[arg(long)]
        from: Option<String>,
        /// Message body.
        text: String,
    },
    /// Resolve every configured messenger and print its transport.
    Messengers,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let _logging_guard = match &cli.log_dir {
        Some(dir) => Some(logging::init_production(dir)?),
        None => {
            logging::init_cli(cli.verbose);
            None
        }
    };

    let path = cli.config.clone().unwrap_or_else(config::config_path);
    let sms_config = SmsConfig::load(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    debug!(config = %path.display(), default = %sms_config.default, "configuration loaded");
    let manager = SmsManager::new(sms_config);

    match cli.command {
        Command::Send {
            messenger,
            to,
            from,
            text,
        } => handle_send(&manager, messenger.as_deref(), to, from, text).await,
        Command::Messengers => handle_messengers(&manager),
    }
}

/// Send one message and report where it went.
async fn handle_send(
    manager: &SmsManager,
    messenger: Option<&str>,
    to: Vec<String>,
    from: Option<String>,
    text: String,
) -> anyhow::Result<()> {
    let messenger = manager
        .messenger(messenger)
        .context("failed to resolve messenger")?;

    let mut envelope = Envelope::with_content(text);
    if let Some(from) = from {
        envelope = envelope.from(from);
    }
    let sms = PlainSms::from_envelope(envelope);

    let sent = messenger
        .to(to.into())
        .send(sms)
        .await
        .with_context(|| format!("failed to send through {}", messenger.name()))?;

    match sent {
        Some(sent) => {
            let message = sent.original_message();
            println!(
                "sent via {} ({}) to {}",
                messenger.name(),
                messenger.transport().name(),
                message.to().join(", ")
            );
            Ok(())
        }
        None => bail!("message was not delivered by {}", messenger.name()),
    }
}

/// Print each configured messenger with its transport kind.
fn handle_messengers(manager: &SmsManager) -> anyhow::Result<()> {
    let default = manager.default_messenger_name();
    let mut failures = 0_usize;

    for name in manager.messenger_names() {
        let marker = if name == default { "*" } else { " " };
        match manager.messenger(Some(&name)) {
            Ok(messenger) => {
                println!("{marker} {name}\t{}", messenger.transport().name());
            }
            Err(e) => {
                warn!(messenger = %name, error = %e, "messenger failed to resolve");
                println!("{marker} {name}\terror: {e}");
                failures = failures.saturating_add(1);
            }
        }
    }

    if failures > 0 {
        bail!("{failures} messenger(s) failed to resolve");
    }
    Ok(())
}
