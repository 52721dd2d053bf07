//! Audio handling for the Anya conversational server.
//!
//! Inbound audio arrives base64-encoded inside a protocol envelope. The
//! [`AudioPipeline`] decodes it into a uniquely named temporary file (an
//! [`AudioArtifact`] that deletes itself when dropped), hands that file to a
//! [`Transcriber`], and turns reply text back into audio with a
//! [`Synthesizer`]. Synthesized files outlive the request: they are served
//! later by the media endpoints under `audio_responses/`.
//!
//! The default backends shell out to local binaries: whisper.cpp for
//! speech-to-text and Piper for text-to-speech. Both are bounded by timeouts
//! and killed if the calling task is dropped.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod stt;
pub mod tts;

pub use config::SpeechConfig;
pub use error::VoiceError;
pub use pipeline::{decode_audio_payload, AudioArtifact, AudioPipeline, SynthesizedAudio};
pub use stt::{Transcriber, WhisperCli};
pub use tts::{PiperTts, Synthesizer};

/// URL path segment under which synthesized audio is served.
pub const AUDIO_RESPONSES_ROUTE: &str = "audio_responses";
