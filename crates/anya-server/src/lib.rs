//! Anya conversational server library logic.
//!
//! Clients hold a WebSocket open at `/ws`, send typed JSON envelopes, and get
//! generated text plus a synthesized audio path back. The HTTP side serves
//! those audio files, accepts audio uploads, and exposes health and operator
//! broadcast endpoints.

pub mod api;
pub mod api_media;
pub mod api_ws;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod server;

use anya_conversation::{ConversationLimits, SharedInference};
use anya_types::PersonalityConfig;
use anya_voice::{AudioPipeline, AUDIO_RESPONSES_ROUTE};
use axum::{
    extract::DefaultBodyLimit,
    handler::HandlerWithoutStateExt,
    routing::{get, post},
    Extension, Router,
};
use config::{Config, MediaConfig, TransportConfig};
use registry::ConnectionRegistry;
use router::MessageRouter;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub use error::{RequestError, ServerError, TransportError};
pub use server::SessionServer;

/// Maximum request body size outside the upload route (2 MiB).
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Room for multipart framing on top of the configured upload limit.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state shared across all request handlers and connections.
pub struct AppState {
    /// Live WebSocket connections.
    pub registry: ConnectionRegistry,
    /// Envelope dispatch, holding the process-wide backends.
    pub router: MessageRouter,
    /// Persona given to every new session.
    pub personality: Arc<PersonalityConfig>,
    /// History bounds for every new session.
    pub limits: ConversationLimits,
    pub transport: TransportConfig,
    pub media: MediaConfig,
    /// Directory of synthesized and uploaded audio.
    pub responses_dir: PathBuf,
    /// Cancelled once when the server starts shutting down.
    pub shutdown: CancellationToken,
    /// Tracks connection tasks so shutdown can wait for them.
    pub tracker: TaskTracker,
}

impl AppState {
    /// Builds the state from configuration and the backends constructed once
    /// at startup.
    pub fn new(config: &Config, inference: SharedInference, audio: Arc<AudioPipeline>) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            router: MessageRouter::new(inference, audio),
            personality: Arc::new(config.personality.clone()),
            limits: config.conversation.limits(),
            transport: config.transport.clone(),
            media: config.media.clone(),
            responses_dir: config.audio.responses_dir.clone(),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }
}

/// Builds the application router with all routes.
pub fn app(state: Arc<AppState>) -> Router {
    let upload_routes = Router::new()
        .route("/upload_audio", post(api_media::upload_audio_handler))
        .layer(DefaultBodyLimit::max(
            state.media.max_upload_bytes + MULTIPART_OVERHEAD_BYTES,
        ));

    let audio_files = ServeDir::new(&state.responses_dir)
        .not_found_service(api_media::audio_not_found.into_service());

    let router = Router::new()
        .route("/health", get(api::health_handler))
        .route("/ws", get(api_ws::ws_handler))
        .route("/api/broadcast", post(api::broadcast_handler))
        .merge(upload_routes)
        .nest_service(&format!("/{}", AUDIO_RESPONSES_ROUTE), audio_files);

    // Serve the browser client if it is present.
    let public_dir = state.media.public_dir.clone();
    let router = if public_dir.is_dir() {
        tracing::info!(path = %public_dir.display(), "serving static files");
        router.fallback_service(ServeDir::new(&public_dir))
    } else {
        tracing::info!(
            path = %public_dir.display(),
            "public directory not found, skipping static file serving"
        );
        router
    };

    router
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(state))
}
