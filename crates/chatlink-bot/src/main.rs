//! chatlink daemon: long-polls the OneBot platform and dispatches events.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chatlink_bot::channels::OneBotClient;
use chatlink_bot::dispatch::Dispatcher;
use chatlink_bot::providers::OpenAiProvider;
use chatlink_core::config::ChatLinkConfig;

/// Bridge a OneBot v12 chat platform to an OpenAI-compatible completion API.
#[derive(Parser)]
#[command(name = "chatlink", version, about)]
struct Cli {
    /// Config file path (defaults to the platform config directory).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,chatlink_core=debug,chatlink_bot=debug")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(ChatLinkConfig::default_path);

    let mut config = ChatLinkConfig::load(&config_path)?;
    config.apply_env();
    config.validate()?;

    info!(
        "starting chatlink: model={}, history_limit={}, public_group_session={}",
        config.openai.model, config.chat.max_history_limit, config.chat.public_group_session
    );

    let provider = Arc::new(OpenAiProvider::new(config.openai.clone())?);
    let dispatcher = Dispatcher::new(&config, provider.clone(), provider);
    let client = OneBotClient::new(config.onebot.clone())?;

    tokio::select! {
        _ = poll_loop(&client, &dispatcher) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down ({} active sessions)", dispatcher.store().count());
        }
    }

    Ok(())
}

/// Long-poll the platform and hand each event to the dispatcher. Poll
/// failures back off briefly instead of tearing the loop down.
async fn poll_loop(client: &OneBotClient, dispatcher: &Dispatcher) {
    loop {
        match client.poll_events().await {
            Ok(events) => {
                for event in events {
                    dispatcher.handle(client, event).await;
                }
            }
            Err(e) => {
                error!("polling error: {}. Retrying in 5s...", e);
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}
