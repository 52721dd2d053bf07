use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

fn default_responses_dir() -> PathBuf {
    PathBuf::from("audio_responses")
}

fn default_whisper_binary() -> PathBuf {
    PathBuf::from("whisper-cli")
}

fn default_whisper_model() -> PathBuf {
    PathBuf::from("models/ggml-base.bin")
}

fn default_piper_binary() -> PathBuf {
    PathBuf::from("piper")
}

fn default_piper_voice() -> PathBuf {
    PathBuf::from("voices/en_US-lessac-medium.onnx")
}

fn default_transcription_timeout_secs() -> u64 {
    120
}

fn default_synthesis_timeout_secs() -> u64 {
    60
}

/// Speech backend settings (the `[audio]` table of the server config).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Where inbound audio is staged. Defaults to the system temp dir.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    /// Where synthesized replies are written and served from.
    #[serde(default = "default_responses_dir")]
    pub responses_dir: PathBuf,
    #[serde(default = "default_whisper_binary")]
    pub whisper_binary: PathBuf,
    #[serde(default = "default_whisper_model")]
    pub whisper_model: PathBuf,
    #[serde(default = "default_piper_binary")]
    pub piper_binary: PathBuf,
    #[serde(default = "default_piper_voice")]
    pub piper_voice: PathBuf,
    #[serde(default = "default_transcription_timeout_secs")]
    pub transcription_timeout_secs: u64,
    #[serde(default = "default_synthesis_timeout_secs")]
    pub synthesis_timeout_secs: u64,
}

impl SpeechConfig {
    pub fn staging_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn transcription_timeout(&self) -> Duration {
        Duration::from_secs(self.transcription_timeout_secs)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_secs(self.synthesis_timeout_secs)
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            responses_dir: default_responses_dir(),
            whisper_binary: default_whisper_binary(),
            whisper_model: default_whisper_model(),
            piper_binary: default_piper_binary(),
            piper_voice: default_piper_voice(),
            transcription_timeout_secs: default_transcription_timeout_secs(),
            synthesis_timeout_secs: default_synthesis_timeout_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table_uses_defaults() {
        let config: SpeechConfig = toml::from_str("").unwrap();
        assert_eq!(config.responses_dir, PathBuf::from("audio_responses"));
        assert_eq!(config.staging_dir(), std::env::temp_dir());
        assert_eq!(config.synthesis_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn explicit_temp_dir_wins() {
        let config: SpeechConfig = toml::from_str(r#"temp_dir = "/var/tmp/anya""#).unwrap();
        assert_eq!(config.staging_dir(), PathBuf::from("/var/tmp/anya"));
    }
}
