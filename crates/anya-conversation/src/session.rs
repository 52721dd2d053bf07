//! Per-connection conversation history.

use anya_types::{unix_timestamp, ConversationSummary, PersonalityConfig, PromptMessage, Role};
use std::sync::Arc;

/// One immutable entry in a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    role: Role,
    content: String,
    timestamp: f64,
}

impl Message {
    fn new(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.trim().to_string(),
            timestamp: unix_timestamp(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Creation time, seconds since epoch.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    fn to_prompt(&self) -> PromptMessage {
        PromptMessage::new(self.role, self.content.clone())
    }
}

/// Bounds applied to a session's history and prompt payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationLimits {
    /// Maximum retained messages before trimming kicks in.
    pub max_history: usize,
    /// Maximum non-system messages included in a prompt payload.
    pub prompt_window: usize,
    /// Approximate token budget for the whole prompt payload.
    pub context_window: usize,
}

impl Default for ConversationLimits {
    fn default() -> Self {
        Self {
            max_history: 20,
            prompt_window: 10,
            context_window: 4000,
        }
    }
}

/// Rough token estimate: four characters per token, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Conversation state owned by a single connection.
#[derive(Debug, Clone)]
pub struct ConversationSession {
    history: Vec<Message>,
    personality: Arc<PersonalityConfig>,
    limits: ConversationLimits,
}

impl ConversationSession {
    pub fn new(personality: Arc<PersonalityConfig>, limits: ConversationLimits) -> Self {
        Self {
            history: Vec::new(),
            personality,
            limits,
        }
    }

    pub fn personality(&self) -> &PersonalityConfig {
        &self.personality
    }

    pub fn limits(&self) -> ConversationLimits {
        self.limits
    }

    /// Retained messages in their current order.
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Appends a message with trimmed content and the current timestamp,
    /// then applies the trim policy if history exceeds `max_history`.
    pub fn append_message(&mut self, role: Role, content: &str) {
        self.history.push(Message::new(role, content));
        if self.history.len() > self.limits.max_history {
            self.trim();
        }
    }

    /// System messages first, then the newest non-system messages that fit.
    ///
    /// If the system messages alone exceed `max_history`, they are all kept
    /// and every non-system message is dropped.
    pub(crate) fn trim(&mut self) {
        let system_count = self
            .history
            .iter()
            .filter(|m| m.role == Role::System)
            .count();
        let keep_recent = self.limits.max_history.saturating_sub(system_count);
        let drop_count = (self.history.len() - system_count).saturating_sub(keep_recent);

        let (system, rest): (Vec<Message>, Vec<Message>) = std::mem::take(&mut self.history)
            .into_iter()
            .partition(|m| m.role == Role::System);

        self.history = system;
        self.history.extend(rest.into_iter().skip(drop_count));
    }

    /// Builds the message list handed to the inference engine.
    ///
    /// The configured system prompt comes first, followed by up to
    /// `min(prompt_window, max_history)` of the most recent non-system
    /// messages. Older messages are dropped while the estimated size exceeds
    /// `context_window`; the newest message is always kept.
    pub fn build_prompt_payload(&self) -> Vec<PromptMessage> {
        let mut payload = Vec::new();
        let mut budget_used = 0;

        if let Some(prompt) = self.personality.system_prompt() {
            budget_used += estimate_tokens(prompt);
            payload.push(PromptMessage::new(Role::System, prompt));
        }

        let window = self.limits.prompt_window.min(self.limits.max_history);
        let mut recent: Vec<&Message> = Vec::with_capacity(window);
        for message in self
            .history
            .iter()
            .rev()
            .filter(|m| m.role != Role::System)
            .take(window)
        {
            let cost = estimate_tokens(&message.content);
            if !recent.is_empty() && budget_used + cost > self.limits.context_window {
                break;
            }
            budget_used += cost;
            recent.push(message);
        }

        payload.extend(recent.into_iter().rev().map(Message::to_prompt));
        payload
    }

    pub fn summary(&self) -> ConversationSummary {
        let count = |role: Role| self.history.iter().filter(|m| m.role == role).count();
        ConversationSummary {
            total_messages: self.history.len(),
            user_messages: count(Role::User),
            ai_messages: count(Role::Assistant),
            conversation_start: self.history.first().map(Message::timestamp),
            last_activity: self.history.last().map(Message::timestamp),
        }
    }
}
