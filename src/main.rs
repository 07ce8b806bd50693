use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use portfolio_chat::app::AppBundle;
use portfolio_chat::config::{API_KEY_ENV, Config};
use portfolio_chat::server::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load();

    let bundle = Arc::new(AppBundle::initialize(&config));
    if let Some(reason) = &bundle.profile_error {
        tracing::error!(%reason, "Serving the placeholder persona");
    }

    let state = AppState::new(&config, Arc::clone(&bundle)).context("Failed to set up the model client")?;
    if state.dispatcher.is_none() {
        tracing::warn!("{} is not set - POST /api/chat will answer 500", API_KEY_ENV);
    }

    let bind: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid server.bind {:?} (expected host:port)", config.server.bind))?;
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;

    tracing::info!(
        %bind,
        persona = %bundle.profile.personal.name,
        model = %config.model.model,
        max_steps = config.model.max_steps,
        "Starting portfolio chat server"
    );

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
