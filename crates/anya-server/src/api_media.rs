//! Audio upload and download endpoints.
//!
//! Synthesized replies and client uploads share one directory, served under
//! `/audio_responses/` by `ServeDir`. Envelopes refer to those files by the
//! same relative path.

use crate::api::ApiError;
use crate::AppState;
use anya_voice::AUDIO_RESPONSES_ROUTE;
use axum::{
    extract::{Extension, Multipart},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Field name carrying the file in `POST /upload_audio`.
const UPLOAD_FIELD: &str = "audio";

/// Extension used when the upload's file name carries none we accept.
const DEFAULT_UPLOAD_EXT: &str = "mp3";

/// Picks a safe extension from a client-supplied file name.
fn upload_extension(filename: Option<&str>) -> String {
    filename
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .unwrap_or_else(|| DEFAULT_UPLOAD_EXT.to_string())
}

/// Handler for `POST /upload_audio`.
///
/// Stores the `audio` field as `<uuid>.<ext>` and returns its public path.
pub async fn upload_audio_handler(
    Extension(state): Extension<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let field = loop {
        let next = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(format!("multipart error: {}", e)))?;
        match next {
            Some(field) if field.name() == Some(UPLOAD_FIELD) => break field,
            Some(_) => continue,
            None => return Err(ApiError::BadRequest("No audio file provided".to_string())),
        }
    };

    let ext = upload_extension(field.file_name());
    let data = field
        .bytes()
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {}", e)))?;

    if data.is_empty() {
        return Err(ApiError::BadRequest("No audio file provided".to_string()));
    }
    if data.len() > state.media.max_upload_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
            "file too large: {} bytes (max {})",
            data.len(),
            state.media.max_upload_bytes
        )));
    }

    tokio::fs::create_dir_all(&state.responses_dir)
        .await
        .map_err(|e| ApiError::InternalServerError(format!("failed to create upload dir: {}", e)))?;

    let filename = format!("{}.{}", Uuid::new_v4(), ext);
    let file_path = state.responses_dir.join(&filename);
    tokio::fs::write(&file_path, &data)
        .await
        .map_err(|e| ApiError::InternalServerError(format!("failed to write file: {}", e)))?;

    tracing::info!(
        path = %file_path.display(),
        size = data.len(),
        "stored uploaded audio"
    );

    Ok(Json(json!({
        "filepath": format!("{}/{}", AUDIO_RESPONSES_ROUTE, filename),
    }))
    .into_response())
}

/// Fallback for `/audio_responses` requests that match no stored file.
pub async fn audio_not_found() -> ApiError {
    ApiError::NotFound("File not found".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_extensions_are_sanitized() {
        assert_eq!(upload_extension(Some("clip.WAV")), "wav");
        assert_eq!(upload_extension(Some("clip")), "mp3");
        assert_eq!(upload_extension(Some("x.../../etc")), "mp3");
        assert_eq!(upload_extension(None), "mp3");
    }
}
