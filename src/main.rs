use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use assistant_bridge::config::Config;
use assistant_bridge::handler::{CommandRouter, Dispatcher};
use assistant_bridge::hub::sse::SseConnector;
use assistant_bridge::hub::Connector;
use assistant_bridge::plugin::Echo;
use assistant_bridge::scheduler::Scheduler;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,assistant_bridge=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("  Assistant: {}", config.assistant.base_url());
    info!("  Basic auth: {}", config.assistant.credentials().is_some());
    info!("  Command prefix: {:?}", config.command.prefix);

    let connector = Arc::new(SseConnector::connect(&config.assistant).await?);

    let dispatcher = Dispatcher::new(vec![Box::new(CommandRouter::new(
        config.command.prefix.clone(),
        vec![Box::new(Echo::new(connector.clone()))],
    ))]);

    let mut scheduler = Scheduler::new(connector.clone()).await?;
    scheduler.register_heartbeat(&config.heartbeat.cron).await?;
    scheduler.start().await?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                shutdown.cancel();
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    // Single worker: messages are handled one at a time, in wire order
    let listener = {
        let connector = connector.clone();
        tokio::spawn(async move {
            info!("Listening for assistant events...");
            connector.listen(cancel, &dispatcher).await;
        })
    };

    listener.await.context("Event listener task failed")?;

    if let Err(e) = scheduler.shutdown().await {
        error!("{:#}", e);
    }
    info!("Bye");
    Ok(())
}
