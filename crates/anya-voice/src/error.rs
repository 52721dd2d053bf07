use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("invalid audio payload: {0}")]
    Decode(String),

    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("transcription produced no text")]
    EmptyTranscript,

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("audio file error: {0}")]
    Io(#[from] std::io::Error),
}

impl VoiceError {
    /// True for both transcription failure kinds.
    pub fn is_transcription(&self) -> bool {
        matches!(self, Self::Transcription(_) | Self::EmptyTranscript)
    }
}
