mod config;
mod metrics;
mod routes;
mod state;

use anyhow::Context;
use extract::{LlmCapability, OllamaClient};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, LogFormat};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(config.server.log_format);

    info!(
        backend = ?config.store.backend,
        model = %config.llm.llm_model,
        "Starting GraphRAG server"
    );

    let stores = state::connect_stores(&config).await?;

    // Extraction wants JSON back; synthesis wants prose
    let extraction_llm: Arc<dyn LlmCapability> = Arc::new(
        OllamaClient::new(config.llm.ollama_url.clone(), config.llm.llm_model.clone())
            .with_json_output(),
    );
    let answer_llm: Arc<dyn LlmCapability> = Arc::new(OllamaClient::new(
        config.llm.ollama_url.clone(),
        config.llm.llm_model.clone(),
    ));

    let state = Arc::new(AppState::assemble(&config, stores, extraction_llm, answer_llm)?);
    let app = routes::router(state.clone());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;

    info!("Server listening on http://{}", config.server.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.shutdown.clone()))
        .await
        .context("Server error")?;

    state.close().await?;
    info!("Server stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown requested, cancelling in-flight work");
    shutdown.cancel();
}
