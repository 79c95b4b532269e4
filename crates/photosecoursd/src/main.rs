use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod engine;
mod error;
mod upload;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "photosecoursd starting");

    let config = config::Config::from_env();
    let store = upload::UploadStore::open(&config.upload_dir)
        .with_context(|| format!("cannot prepare upload directory {}", config.upload_dir.display()))?;

    let engine = engine::spawn_engine(
        &config.model_paths(),
        config.analysis_settings(),
        config.inference_timeout(),
    )
    .with_context(|| format!("cannot start analysis engine from {}", config.model_dir.display()))?;

    let state = api::AppState::new(engine, store, config.max_upload_bytes, config.keep_uploads);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("cannot bind {}", config.bind_addr))?;

    tracing::info!(addr = %config.bind_addr, "photosecoursd ready");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("photosecoursd shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
