//! Shared types for the Anya conversational server.
//!
//! This crate holds the leaf definitions used by every other crate in the
//! workspace: message roles, the prompt payload shape handed to the inference
//! engine, the conversation summary reported to clients, and the personality
//! configuration that shapes generation.
//!
//! It has no knowledge of transports or backends, which keeps the dependency
//! graph flat: `anya-conversation`, `anya-voice`, and `anya-server` all depend
//! on `anya-types`, never the other way around.

use serde::{Deserialize, Serialize};

mod personality;
pub use personality::{GenerationParams, PersonalityConfig};

/// The author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A message sent by the connected client.
    User,
    /// A message produced by the inference engine.
    Assistant,
    /// An instruction message. Never evicted by history trimming.
    System,
}

impl Role {
    /// Returns the wire label for this role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the prompt payload sent to the inference engine.
///
/// This is the `{role, content}` projection of a conversation message; the
/// timestamp is dropped because inference engines do not consume it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Counters and activity bounds for one conversation.
///
/// `conversation_start` and `last_activity` are `None` (serialized as `null`)
/// when the conversation has no messages yet.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Number of messages currently retained in history.
    pub total_messages: usize,
    /// Retained messages authored by the client.
    pub user_messages: usize,
    /// Retained messages authored by the assistant.
    pub ai_messages: usize,
    /// Timestamp of the oldest retained message, seconds since epoch.
    pub conversation_start: Option<f64>,
    /// Timestamp of the newest retained message, seconds since epoch.
    pub last_activity: Option<f64>,
}

/// Current wall-clock time as fractional seconds since the Unix epoch.
pub fn unix_timestamp() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
