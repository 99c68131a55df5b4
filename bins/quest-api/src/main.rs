mod handlers;
mod routes;

use anyhow::{Context, Result};
use axum::Router;
use quest_engine::{ConfiguredBackend, EngineConfig, QuestEngine};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

const DEFAULT_ADDR: &str = "0.0.0.0:8001";

pub type Engine = QuestEngine<ConfiguredBackend>;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        )
        .with_target(false)
        .init();

    info!("Quest API booting...");

    let config = EngineConfig::load_default()?;
    let backend = ConfiguredBackend::from_config(&config.backend)
        .context("Failed to initialize sandbox backend")?;
    let engine = QuestEngine::new(config, backend).context("Failed to build quest engine")?;

    let state = Arc::new(AppState {
        engine: Arc::new(engine),
    });

    let app = Router::new()
        .merge(routes::routes())
        .with_state(state);

    let addr = std::env::var("QUEST_API_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
