//! Conversation state and the inference boundary.
//!
//! A [`ConversationSession`] holds the bounded message history for exactly one
//! client connection together with the personality that shapes its replies.
//! Sessions perform no I/O: appending, trimming, building the prompt payload,
//! and summarizing are all local and infallible.
//!
//! Generation is delegated to an [`InferenceBackend`], a narrow async trait
//! the server holds as a single process-wide handle. [`complete_turn`] glues
//! the two together for one user turn.
//!
//! # Trim policy
//!
//! When history grows past `max_history`, all system-role messages are kept
//! (moved to the front) and only the most recent non-system messages that fit
//! in the remaining budget survive. Trimming an already trimmed history is a
//! no-op.

mod inference;
mod session;

pub use inference::{
    complete_turn, ChatCompletionsBackend, GenerationError, InferenceBackend, SharedInference,
};
pub use session::{estimate_tokens, ConversationLimits, ConversationSession, Message};
