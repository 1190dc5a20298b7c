//! CLI entry point for xm2toot

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use xm2toot_channels::{BridgeSettings, ChatSessionBridge, XmppTransport};
use xm2toot_commands::CommandProcessor;
use xm2toot_core::bus::MessageBus;
use xm2toot_core::config::{Config, ConfigLoader};
use xm2toot_core::logging::{init_logging, LogLevels};
use xm2toot_core::StopSignal;
use xm2toot_mastodon::{MastodonClient, StreamReader};

mod supervisor;

use supervisor::{wait_for_stop, Supervisor};

#[derive(Parser)]
#[command(name = "xm2toot")]
#[command(about = "Relay Mastodon notifications into an XMPP chat room")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Debug logging for the bridge
    #[arg(short, long)]
    debug: bool,

    /// Debug logging for the XMPP library
    #[arg(short = 'x', long = "xmpp-debug")]
    xmpp_debug: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loader = ConfigLoader::with_path(&cli.config);
    let config = loader
        .load()
        .with_context(|| format!("Failed to load {}", loader.config_path().display()))?;

    let _guard = init_logging(
        &config.logging,
        LogLevels {
            debug: cli.debug,
            xmpp_debug: cli.xmpp_debug,
        },
    );

    run_bridge(config).await
}

async fn run_bridge(config: Config) -> Result<()> {
    info!(
        "Starting xm2toot: {} -> {} as {}",
        config.mastodon.base_url(),
        config.xmpp.muc,
        config.xmpp.muc_nick
    );

    let bus = MessageBus::new();
    let stop = StopSignal::new();
    let client = MastodonClient::new(&config.mastodon, &config.bridge)?;

    let reader = StreamReader::new(
        client.clone(),
        config.mastodon.account.clone(),
        bus.clone(),
        config.bridge.retry_delay(),
    );
    let processor = CommandProcessor::with_defaults(Arc::new(client), bus.clone());

    let mut supervisor = Supervisor::new(config.bridge.shutdown_grace());
    let cancel = supervisor.cancel_token();

    let reader_cancel = cancel.clone();
    supervisor.spawn("stream reader", async move {
        reader
            .run(reader_cancel)
            .await
            .map_err(anyhow::Error::from)
    });

    supervisor.spawn(
        "chat session",
        run_chat_session(config, bus, processor, stop.clone(), cancel.clone()),
    );

    supervisor.spawn("stop signal", wait_for_stop(stop, cancel));

    supervisor.run().await
}

async fn run_chat_session(
    config: Config,
    bus: MessageBus,
    processor: CommandProcessor,
    stop: StopSignal,
    cancel: tokio_util::sync::CancellationToken,
) -> Result<()> {
    let transport = tokio::select! {
        transport = XmppTransport::connect(&config.xmpp, config.bridge.connect_timeout()) => transport?,
        _ = cancel.cancelled() => return Ok(()),
    };
    let settings = BridgeSettings::from_config(&config.xmpp);
    ChatSessionBridge::new(transport, settings, bus, processor, stop)
        .run(cancel)
        .await
        .context("chat session ended")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_flags() {
        let cli = Cli::parse_from(["xm2toot", "-c", "/etc/xm2toot.json", "-d", "-x"]);
        assert_eq!(cli.config, PathBuf::from("/etc/xm2toot.json"));
        assert!(cli.debug);
        assert!(cli.xmpp_debug);
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["xm2toot"]);
        assert_eq!(cli.config, PathBuf::from("config.json"));
        assert!(!cli.debug);
        assert!(!cli.xmpp_debug);
    }

    #[test]
    fn test_missing_config_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::with_path(dir.path().join("absent.json"));
        assert!(loader.load().is_err());
    }
}
