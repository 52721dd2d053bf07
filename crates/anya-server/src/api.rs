//! HTTP handlers for health and operator broadcasts.

use crate::AppState;
use axum::{
    extract::{Extension, Json},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

/// Handler for `GET /health`.
pub async fn health_handler(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.registry.len().await,
    }))
}

/// Request body for `POST /api/broadcast`.
#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: String,
}

/// Response body for `POST /api/broadcast`.
#[derive(Debug, Serialize, Deserialize)]
pub struct BroadcastResponse {
    /// Connections the broadcast was attempted on.
    pub recipients: usize,
    /// Connections that failed and were dropped.
    pub failed: usize,
}

/// Handler for `POST /api/broadcast`.
///
/// Fans an envelope out to every connected client.
pub async fn broadcast_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<BroadcastRequest>,
) -> Result<Json<BroadcastResponse>, ApiError> {
    let kind = payload.kind.trim();
    if kind.is_empty() {
        return Err(ApiError::BadRequest("type is required".to_string()));
    }

    let report = state.registry.broadcast(kind, &payload.content).await;
    tracing::info!(
        kind,
        recipients = report.recipients(),
        failed = report.failed.len(),
        "operator broadcast"
    );

    Ok(Json(BroadcastResponse {
        recipients: report.recipients(),
        failed: report.failed.len(),
    }))
}
