//! Wire envelopes exchanged over the WebSocket.
//!
//! Every frame is a JSON object discriminated by its `type` field. Outbound
//! envelopes always carry `type`, `content` and `timestamp`; type-specific
//! fields (`audio_path`, `ai_personality`, summary counters, ...) sit next to
//! them at the top level.

use crate::error::RequestError;
use anya_types::{unix_timestamp, ConversationSummary, PersonalityConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Inbound types this server understands.
const KNOWN_TYPES: &[&str] = &[
    "user_message",
    "ping",
    "get_conversation_summary",
    "audio_input",
];

const DEFAULT_AUDIO_FORMAT: &str = "wav";

/// A recognized inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    UserMessage {
        #[serde(default)]
        content: Option<String>,
    },
    Ping,
    GetConversationSummary,
    AudioInput {
        #[serde(default)]
        audio_data: Option<String>,
        #[serde(default)]
        format: Option<String>,
    },
}

impl Inbound {
    /// Declared audio container for `audio_input`, defaulting to `wav`.
    pub fn audio_format(format: Option<&str>) -> &str {
        match format.map(str::trim) {
            Some(f) if !f.is_empty() => f,
            _ => DEFAULT_AUDIO_FORMAT,
        }
    }
}

/// Result of decoding one text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Request(Inbound),
    /// Valid JSON with a `type` this server does not handle.
    Unrecognized(String),
}

/// Decodes a text frame into a request.
///
/// # Errors
///
/// `Protocol` if the frame is not a JSON object, `Validation` if `type` is
/// missing, `InvalidField` if a known type carries a field of the wrong type.
pub fn decode(raw: &str) -> Result<Decoded, RequestError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| RequestError::Protocol(e.to_string()))?;

    let kind = match &value {
        Value::Object(map) => match map.get("type") {
            Some(Value::String(kind)) => kind.clone(),
            _ => return Err(RequestError::Validation("Message type is required")),
        },
        _ => {
            return Err(RequestError::Protocol(
                "envelope is not a JSON object".to_string(),
            ))
        }
    };

    if !KNOWN_TYPES.contains(&kind.as_str()) {
        return Ok(Decoded::Unrecognized(kind));
    }

    serde_json::from_value(value)
        .map(Decoded::Request)
        .map_err(|e| RequestError::InvalidField(e.to_string()))
}

/// An outbound envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            content: content.into(),
            timestamp: unix_timestamp(),
            extra: Map::new(),
        }
    }

    /// Adds a type-specific field. The reserved keys are left untouched.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        if !matches!(key, "type" | "content" | "timestamp") {
            self.extra.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn welcome(personality: &PersonalityConfig) -> Self {
        Self::new("welcome", format!("Connected to {}!", personality.name))
            .with("ai_personality", personality.traits.clone())
    }

    pub fn typing(content: &str) -> Self {
        Self::new("typing", content)
    }

    pub fn pong() -> Self {
        Self::new("pong", "alive")
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new("error", message)
    }

    /// Summary counters flattened next to an empty `content`.
    pub fn conversation_summary(summary: &ConversationSummary) -> Self {
        let mut envelope = Self::new("conversation_summary", "");
        if let Ok(Value::Object(fields)) = serde_json::to_value(summary) {
            for (key, value) in fields {
                envelope = envelope.with(&key, value);
            }
        }
        envelope
    }

    pub fn ai_response_audio(
        reply: impl Into<String>,
        audio_path: impl Into<String>,
        summary: &ConversationSummary,
    ) -> Self {
        let summary = serde_json::to_value(summary).unwrap_or(Value::Null);
        Self::new("ai_response_audio", reply)
            .with("audio_path", audio_path.into())
            .with("conversation_summary", summary)
            .with("response_time", unix_timestamp())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
