use std::sync::Arc;

use tokio::signal;
use tracing_subscriber::EnvFilter;

use formbase::{config::AppConfig, routes, state::AppState, storage::LocalStorage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        host = %config.server_host,
        port = config.server_port,
        storage_root = %config.storage_root.display(),
        master_key = %config.redacted_master_key(),
        "loaded formbase configuration"
    );

    let storage = Arc::new(LocalStorage::new(config.storage_root.clone())?);
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let state = AppState::new(config, storage);
    let router = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "formbase listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if signal::ctrl_c().await.is_ok() {
        tracing::info!("received shutdown signal");
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
