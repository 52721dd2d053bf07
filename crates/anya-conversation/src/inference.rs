//! The inference engine boundary and its HTTP implementation.

use crate::session::ConversationSession;
use anya_types::{GenerationParams, PromptMessage, Role};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Errors produced while generating a reply.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("inference request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("inference engine returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed inference response: {0}")]
    MalformedResponse(String),

    #[error("inference engine returned an empty completion")]
    EmptyCompletion,

    #[error("inference backend unavailable: {0}")]
    Unavailable(String),
}

/// Turns a prompt payload into generated text.
///
/// Implementations may take seconds per call. Callers run them on the
/// connection's own task so a slow generation only delays that connection.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn generate(
        &self,
        messages: &[PromptMessage],
        params: &GenerationParams,
    ) -> Result<String, GenerationError>;
}

/// The process-wide inference handle, constructed once at startup.
pub type SharedInference = Arc<dyn InferenceBackend>;

/// Runs one user turn: records the user text, generates, records the reply.
///
/// On failure the user message stays in history and no assistant message is
/// added; the error is returned for the caller to report.
pub async fn complete_turn(
    session: &mut ConversationSession,
    backend: &dyn InferenceBackend,
    user_text: &str,
) -> Result<String, GenerationError> {
    session.append_message(Role::User, user_text);
    let payload = session.build_prompt_payload();
    let params = session.personality().generation;

    tracing::debug!(messages = payload.len(), "requesting completion");
    let reply = backend.generate(&payload, &params).await?;

    session.append_message(Role::Assistant, &reply);
    Ok(reply)
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: &'a [PromptMessage],
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    repeat_penalty: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible `/v1/chat/completions` endpoint, such as
/// the llama.cpp server.
#[derive(Debug, Clone)]
pub struct ChatCompletionsBackend {
    client: reqwest::Client,
    url: String,
    model: Option<String>,
}

impl ChatCompletionsBackend {
    /// `endpoint` is the server base URL, e.g. `http://127.0.0.1:8080`.
    pub fn new(endpoint: &str, model: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("{}/v1/chat/completions", endpoint.trim_end_matches('/')),
            model,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl InferenceBackend for ChatCompletionsBackend {
    async fn generate(
        &self,
        messages: &[PromptMessage],
        params: &GenerationParams,
    ) -> Result<String, GenerationError> {
        let request = ChatCompletionRequest {
            model: self.model.as_deref(),
            messages,
            temperature: params.temperature,
            top_p: params.top_p,
            max_tokens: params.max_tokens,
            repeat_penalty: params.repeat_penalty,
            stream: false,
        };

        let response = self.client.post(&self.url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GenerationError::MalformedResponse("no choices".to_string()))?
            .message
            .content
            .unwrap_or_default();

        let content = content.trim();
        if content.is_empty() {
            return Err(GenerationError::EmptyCompletion);
        }
        Ok(content.to_string())
    }
}
