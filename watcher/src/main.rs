//! ATH Watcher
//!
//! Polls the pool's worker stats and posts a Discord alert whenever a
//! worker beats its own best-ever share. Settings are edited through the
//! web UI and picked up on the next poll without a restart.

mod config;
mod extract;
mod notifier;
mod pool;
mod store;
mod tracker;
mod watcher;

use anyhow::Context;
use config::{EnvDefaults, SettingsProvider, WatcherConfig};
use notifier::WebhookNotifier;
use pool::UmbrelPoolApi;
use store::StateStore;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;
use watcher::Watcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WatcherConfig::load_with_env();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!("Starting AxeBCH ATH Watcher");

    let store = StateStore::new(&config.state_path);
    store
        .ensure_parent_dir()
        .await
        .with_context(|| format!("Cannot create state directory for {}", config.state_path.display()))?;

    let settings = SettingsProvider::new(&config.settings_path, EnvDefaults::from_env());
    let initial = settings.resolve().await;
    info!(
        base_url = %initial.pool_api_base,
        settings_file = %config.settings_path.display(),
        state_file = %config.state_path.display(),
        proxy_token = config.proxy_token.is_some(),
        "Configuration loaded"
    );

    let pool_api = UmbrelPoolApi::new(config.proxy_token.clone())?;
    let notifier = WebhookNotifier::new()?;
    let watcher = Watcher::start(settings, pool_api, notifier, store).await;

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    let handle = tokio::spawn(watcher.run(shutdown_rx));

    signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down...");

    let _ = shutdown_tx.send(());
    let _ = handle.await;

    info!("Watcher shut down");
    Ok(())
}
