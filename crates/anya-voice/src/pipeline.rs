use crate::config::SpeechConfig;
use crate::error::VoiceError;
use crate::stt::{Transcriber, WhisperCli};
use crate::tts::{PiperTts, Synthesizer};
use crate::AUDIO_RESPONSES_ROUTE;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;

const DEFAULT_FORMAT: &str = "wav";
const MAX_FORMAT_LEN: usize = 8;

/// Decodes a base64 audio payload. Empty payloads are rejected before any
/// file is touched.
pub fn decode_audio_payload(payload: &str) -> Result<Vec<u8>, VoiceError> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(VoiceError::Decode("audio payload is empty".to_string()));
    }
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| VoiceError::Decode(e.to_string()))?;
    if bytes.is_empty() {
        return Err(VoiceError::Decode("audio payload is empty".to_string()));
    }
    Ok(bytes)
}

/// Normalizes the client-supplied format into a file extension.
fn sanitize_format(format: &str) -> Result<String, VoiceError> {
    let format = format.trim().trim_start_matches('.');
    if format.is_empty() {
        return Ok(DEFAULT_FORMAT.to_string());
    }
    if format.len() > MAX_FORMAT_LEN || !format.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(VoiceError::Decode(format!(
            "unsupported audio format: {:?}",
            format
        )));
    }
    Ok(format.to_ascii_lowercase())
}

/// A staged inbound audio file. The file is removed when the artifact is
/// dropped, whatever happened to the request that created it.
#[derive(Debug)]
pub struct AudioArtifact {
    path: PathBuf,
    temp: Option<TempPath>,
    len: usize,
    format: String,
}

impl AudioArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of decoded bytes written to the file.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn format(&self) -> &str {
        &self.format
    }
}

impl Drop for AudioArtifact {
    fn drop(&mut self) {
        if let Some(temp) = self.temp.take() {
            match temp.close() {
                Ok(()) => tracing::debug!(path = %self.path.display(), "removed staged audio"),
                Err(e) => tracing::warn!(
                    path = %self.path.display(),
                    "failed to remove staged audio: {}",
                    e
                ),
            }
        }
    }
}

/// A synthesized reply and the path clients fetch it from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    pub path: PathBuf,
    pub public_path: String,
}

/// Decode, transcribe and synthesize. Shared by every connection.
pub struct AudioPipeline {
    staging_dir: PathBuf,
    transcriber: Arc<dyn Transcriber>,
    synthesizer: Arc<dyn Synthesizer>,
}

impl AudioPipeline {
    pub fn new(
        staging_dir: impl Into<PathBuf>,
        transcriber: Arc<dyn Transcriber>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            transcriber,
            synthesizer,
        }
    }

    /// Builds the whisper.cpp + Piper pipeline described by `config`.
    pub fn from_config(config: &SpeechConfig) -> Self {
        let transcriber = WhisperCli::new(
            &config.whisper_model,
            &config.whisper_binary,
            config.transcription_timeout(),
        );
        let synthesizer = PiperTts::new(
            &config.piper_binary,
            &config.piper_voice,
            &config.responses_dir,
            config.synthesis_timeout(),
        );
        Self::new(
            config.staging_dir(),
            Arc::new(transcriber),
            Arc::new(synthesizer),
        )
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Decodes `payload` and writes it to a uniquely named file in the
    /// staging directory.
    pub async fn stage_inbound(
        &self,
        payload: &str,
        format: &str,
    ) -> Result<AudioArtifact, VoiceError> {
        let bytes = decode_audio_payload(payload)?;
        let format = sanitize_format(format)?;
        let dir = self.staging_dir.clone();
        let suffix = format!(".{}", format);

        let (temp, len) = tokio::task::spawn_blocking(
            move || -> Result<(TempPath, usize), std::io::Error> {
                std::fs::create_dir_all(&dir)?;
                let mut file = tempfile::Builder::new()
                    .prefix("temp_audio_")
                    .suffix(&suffix)
                    .tempfile_in(&dir)?;
                file.write_all(&bytes)?;
                file.flush()?;
                Ok((file.into_temp_path(), bytes.len()))
            },
        )
        .await
        .map_err(|e| VoiceError::Io(std::io::Error::other(e)))??;

        let path = temp.to_path_buf();
        tracing::debug!(path = %path.display(), bytes = len, "staged inbound audio");
        Ok(AudioArtifact {
            path,
            temp: Some(temp),
            len,
            format,
        })
    }

    /// Transcribes a staged artifact. Blank transcripts are an error.
    pub async fn transcribe(&self, artifact: &AudioArtifact) -> Result<String, VoiceError> {
        let text = self.transcriber.transcribe(artifact.path()).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(VoiceError::EmptyTranscript);
        }
        Ok(text.to_string())
    }

    /// Renders reply text to audio.
    pub async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, VoiceError> {
        let path = self.synthesizer.synthesize(text).await?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                VoiceError::Synthesis(format!("synthesizer returned unusable path {:?}", path))
            })?
            .to_string();
        Ok(SynthesizedAudio {
            public_path: format!("{}/{}", AUDIO_RESPONSES_ROUTE, file_name),
            path,
        })
    }
}

impl std::fmt::Debug for AudioPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioPipeline")
            .field("staging_dir", &self.staging_dir)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_empty_and_garbage() {
        assert!(matches!(decode_audio_payload(""), Err(VoiceError::Decode(_))));
        assert!(matches!(decode_audio_payload("   "), Err(VoiceError::Decode(_))));
        assert!(matches!(
            decode_audio_payload("%%%notbase64%%%"),
            Err(VoiceError::Decode(_))
        ));
    }

    #[test]
    fn decode_returns_raw_bytes() {
        assert_eq!(decode_audio_payload("AAECAw==").unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn format_defaults_and_validation() {
        assert_eq!(sanitize_format("").unwrap(), "wav");
        assert_eq!(sanitize_format(".MP3").unwrap(), "mp3");
        assert!(sanitize_format("../etc").is_err());
        assert!(sanitize_format("averyverylongformat").is_err());
    }
}
