// Declare the modules
pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod controller;
pub mod events;
pub mod models;
pub mod relay;
pub mod sse;
pub mod state;
pub mod storage;

use crate::api::{CompletionProvider, OpenAICompatibleProvider};
use crate::config::RelayConfig;
use crate::relay::RelayState;
use anyhow::Context;
use std::sync::Arc;

pub use controller::ChatController;

/// Runs the streaming relay until Ctrl-C.
pub async fn run() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let settings = RelayConfig::from_env()?;
    log::info!(
        "Relay starting on {} (upstream {}, model {})",
        settings.bind_addr,
        settings.upstream_url,
        settings.model
    );
    // The key itself is read per request; only warn here.
    if let Err(e) = config::get_api_key(&settings.api_key_ref) {
        log::warn!("Upstream key not available yet: {}", e);
    }

    // Create the API provider instance
    let provider: Arc<dyn CompletionProvider> =
        Arc::new(OpenAICompatibleProvider::new(settings.upstream_url.clone()));

    let listener = tokio::net::TcpListener::bind(settings.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", settings.bind_addr))?;
    let app = relay::router(RelayState::new(settings, provider));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Relay server failed")?;

    log::info!("Relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown signal received");
}
