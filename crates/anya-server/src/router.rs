//! Dispatch of decoded envelopes to their handlers.

use crate::error::RequestError;
use crate::protocol::{self, Decoded, Envelope, Inbound};
use crate::registry::ClientConnection;
use anya_conversation::{complete_turn, ConversationSession, SharedInference};
use anya_voice::AudioPipeline;
use std::sync::Arc;

const TYPING_TEXT: &str = "AI is typing...";
const TYPING_AUDIO: &str = "AI is processing audio input...";

/// Routes inbound frames for every connection.
///
/// Holds only the process-wide backends; each call borrows the caller's
/// session exclusively, so one router is shared by all connections.
#[derive(Clone)]
pub struct MessageRouter {
    inference: SharedInference,
    audio: Arc<AudioPipeline>,
}

impl MessageRouter {
    pub fn new(inference: SharedInference, audio: Arc<AudioPipeline>) -> Self {
        Self { inference, audio }
    }

    /// Handles one text frame. Failures are reported to the client as an
    /// `error` envelope and never propagate.
    pub async fn dispatch(
        &self,
        session: &mut ConversationSession,
        connection: &ClientConnection,
        raw: &str,
    ) {
        if let Err(err) = self.handle(session, connection, raw).await {
            tracing::warn!(
                connection_id = %connection.id(),
                "request failed: {}",
                err
            );
            send(connection, &Envelope::error(err.client_message())).await;
        }
    }

    async fn handle(
        &self,
        session: &mut ConversationSession,
        connection: &ClientConnection,
        raw: &str,
    ) -> Result<(), RequestError> {
        let request = match protocol::decode(raw)? {
            Decoded::Request(request) => request,
            Decoded::Unrecognized(kind) => {
                tracing::warn!(
                    connection_id = %connection.id(),
                    kind = %kind,
                    "ignoring unknown message type"
                );
                return Ok(());
            }
        };

        match request {
            Inbound::Ping => send(connection, &Envelope::pong()).await,
            Inbound::GetConversationSummary => {
                send(connection, &Envelope::conversation_summary(&session.summary())).await
            }
            Inbound::UserMessage { content } => {
                let text = content.as_deref().unwrap_or_default().trim();
                if text.is_empty() {
                    return Err(RequestError::Validation("Message cannot be empty"));
                }
                tracing::debug!(connection_id = %connection.id(), "handling user message");
                send(connection, &Envelope::typing(TYPING_TEXT)).await;
                self.respond(session, connection, text).await?;
            }
            Inbound::AudioInput { audio_data, format } => {
                let payload = audio_data.as_deref().unwrap_or_default();
                if payload.trim().is_empty() {
                    return Err(RequestError::Validation("Audio data is empty"));
                }
                let format = Inbound::audio_format(format.as_deref());
                tracing::debug!(connection_id = %connection.id(), format, "handling audio input");

                let transcript = {
                    let artifact = self
                        .audio
                        .stage_inbound(payload, format)
                        .await
                        .map_err(RequestError::from_audio_input)?;
                    send(connection, &Envelope::typing(TYPING_AUDIO)).await;
                    self.audio
                        .transcribe(&artifact)
                        .await
                        .map_err(RequestError::from_audio_input)?
                };
                tracing::debug!(
                    connection_id = %connection.id(),
                    chars = transcript.len(),
                    "transcribed audio input"
                );
                self.respond(session, connection, &transcript).await?;
            }
        }
        Ok(())
    }

    /// Generate, then synthesize, then send the reply.
    async fn respond(
        &self,
        session: &mut ConversationSession,
        connection: &ClientConnection,
        text: &str,
    ) -> Result<(), RequestError> {
        let reply = complete_turn(session, self.inference.as_ref(), text).await?;
        let audio = self
            .audio
            .synthesize(&reply)
            .await
            .map_err(RequestError::Synthesis)?;

        let envelope = Envelope::ai_response_audio(reply, audio.public_path, &session.summary());
        send(connection, &envelope).await;
        Ok(())
    }
}

/// Queues an envelope. A closed connection is noticed by the read loop, so a
/// failed send here is only logged.
async fn send(connection: &ClientConnection, envelope: &Envelope) {
    if let Err(e) = connection.send_envelope(envelope).await {
        tracing::debug!(
            connection_id = %connection.id(),
            kind = %envelope.kind,
            "dropping outbound envelope: {}",
            e
        );
    }
}
