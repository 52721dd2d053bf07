//! Anya server binary: the entry point for the conversational server.
//!
//! Loads configuration, initializes structured logging, builds the inference
//! and speech backends once, and serves until SIGINT/SIGTERM.

use anya_conversation::{ChatCompletionsBackend, SharedInference};
use anya_server::config;
use anya_server::{AppState, SessionServer};
use anya_voice::AudioPipeline;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("ANYA_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration; the server cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    // Backends are built once and shared by every connection.
    let inference: SharedInference = Arc::new(ChatCompletionsBackend::new(
        &config.inference.endpoint,
        config.inference.model.clone(),
    ));
    tracing::info!(endpoint = %config.inference.endpoint, "using chat completions backend");

    let audio = Arc::new(AudioPipeline::from_config(&config.audio));
    tracing::info!(
        staging = %config.audio.staging_dir().display(),
        responses = %config.audio.responses_dir.display(),
        "audio pipeline ready"
    );

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let state = AppState::new(&config, inference, audio);
    let server = SessionServer::start(addr, state)
        .await
        .expect("failed to bind to address; is another process using this port?");

    tracing::info!(addr = %server.local_addr(), "anya server started");

    shutdown_signal().await;

    if let Err(e) = server.stop().await {
        tracing::error!("server error during shutdown: {}", e);
    }

    tracing::info!("anya server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
