use chat_relay::{
    BannedWords, Registry,
    config::{Cli, Config},
    net::{AppCtx, tcp},
};
use clap::Parser;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let cli = Cli::parse();
    let cfg = Arc::new(Config::resolve(&cli)?);

    // Banned words must load before anything is bound
    let filter = Arc::new(BannedWords::load(&cfg.banned_words_path)?);
    filter.log_words();

    let registry = Arc::new(Registry::new());
    let app = Arc::new(AppCtx::new(registry.clone(), filter, cfg.clone()));

    let addr = cfg.listen_addr();
    let listener = tcp::bind(&addr).await?;
    tracing::info!(%addr, "chat relay waiting for clients");

    tokio::select! {
        _ = tcp::serve(listener, app) => {}
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!(active = registry.len(), "shutting down");
        }
    }

    registry.shutdown();
    // Give writer tasks a moment to flush and close their sockets
    tokio::time::sleep(std::time::Duration::from_millis(250)).await;
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::{EnvFilter, prelude::*};

    color_eyre::install().map_err(|e| anyhow::anyhow!("{e}"))?;

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info,chat_relay=debug"))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::uptime()),
        )
        .with(tracing_error::ErrorLayer::default())
        .init();

    Ok(())
}
