//! Error kinds raised while serving connections.

use anya_conversation::GenerationError;
use anya_voice::VoiceError;
use thiserror::Error;
use uuid::Uuid;

/// A failure while handling one inbound envelope.
///
/// Every variant is converted into an `error` envelope for the originating
/// client; none of them close the connection.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The frame was not a JSON object.
    #[error("malformed envelope: {0}")]
    Protocol(String),

    /// A required field was missing or empty.
    #[error("{0}")]
    Validation(&'static str),

    /// A known message type carried a field of the wrong type.
    #[error("invalid field: {0}")]
    InvalidField(String),

    /// The connection already has too many envelopes waiting.
    #[error("inbound queue full")]
    Overloaded,

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Transcription(VoiceError),

    #[error(transparent)]
    Synthesis(VoiceError),

    /// The audio payload could not be decoded or staged.
    #[error(transparent)]
    Decode(VoiceError),

    /// A handler panicked.
    #[error("handler panicked: {0}")]
    Internal(String),
}

impl RequestError {
    /// Classifies a failure from the inbound audio stages.
    pub fn from_audio_input(err: VoiceError) -> Self {
        match err {
            VoiceError::Decode(_) | VoiceError::Io(_) => Self::Decode(err),
            _ => Self::Transcription(err),
        }
    }

    /// Content of the `error` envelope sent back to the client.
    pub fn client_message(&self) -> String {
        match self {
            Self::Protocol(_) => "Invalid JSON format".to_string(),
            Self::Validation(msg) => (*msg).to_string(),
            Self::InvalidField(detail) => format!("Invalid field: {}", detail),
            Self::Overloaded => "Too many pending messages, request dropped".to_string(),
            Self::Generation(e) => format!("An error occurred: {}", e),
            Self::Synthesis(e) => format!("An error occurred: {}", e),
            Self::Transcription(VoiceError::EmptyTranscript) => {
                "Could not transcribe audio".to_string()
            }
            Self::Transcription(e) | Self::Decode(e) => format!("Audio processing error: {}", e),
            Self::Internal(detail) => format!("Internal error: {}", detail),
        }
    }
}

/// A connection-level failure. Terminates only the affected connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection {0} is closed")]
    Closed(Uuid),

    #[error("send to connection {0} timed out")]
    Timeout(Uuid),

    #[error("outbound queue for connection {0} is full")]
    Full(Uuid),

    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failures starting or stopping the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),

    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
