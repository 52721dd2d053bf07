use crate::error::VoiceError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use uuid::Uuid;

/// Maximum text input size for TTS (64 KiB). Prevents resource exhaustion from
/// oversized synthesis requests.
const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// Text-to-speech collaborator.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Renders `text` to a new audio file and returns its path.
    async fn synthesize(&self, text: &str) -> Result<PathBuf, VoiceError>;
}

/// Synthesizes WAV files with the Piper command line tool.
#[derive(Debug, Clone)]
pub struct PiperTts {
    piper_binary: PathBuf,
    voice_model: PathBuf,
    output_dir: PathBuf,
    timeout: Duration,
}

impl PiperTts {
    pub fn new(
        piper_binary: impl AsRef<Path>,
        voice_model: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
        timeout: Duration,
    ) -> Self {
        Self {
            piper_binary: piper_binary.as_ref().to_path_buf(),
            voice_model: voice_model.as_ref().to_path_buf(),
            output_dir: output_dir.as_ref().to_path_buf(),
            timeout,
        }
    }

    async fn run_piper(&self, text: &str, output_path: &Path) -> Result<(), VoiceError> {
        let mut command = Command::new(&self.piper_binary);
        command
            .arg("--model")
            .arg(&self.voice_model)
            .arg("--output_file")
            .arg(output_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| VoiceError::Synthesis(format!("failed to spawn piper: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| VoiceError::Synthesis("failed to open piper stdin".to_string()))?;
        let text_owned = text.to_string();

        // Write from a separate task so a full stderr pipe cannot deadlock us.
        let write_task = tokio::spawn(async move {
            stdin.write_all(text_owned.as_bytes()).await?;
            stdin.shutdown().await
        });

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                VoiceError::Synthesis(format!(
                    "TTS process timed out after {} seconds",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| VoiceError::Synthesis(format!("failed to wait for piper: {}", e)))?;

        match write_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(VoiceError::Synthesis(format!(
                    "failed to write to piper stdin: {}",
                    e
                )))
            }
            Err(e) => return Err(VoiceError::Synthesis(format!("stdin task failed: {}", e))),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VoiceError::Synthesis(format!(
                "piper failed: {}",
                stderr.trim()
            )));
        }

        if !tokio::fs::try_exists(output_path).await.unwrap_or(false) {
            return Err(VoiceError::Synthesis(
                "piper exited without writing audio".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Synthesizer for PiperTts {
    async fn synthesize(&self, text: &str) -> Result<PathBuf, VoiceError> {
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(VoiceError::Synthesis(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }

        if !self.voice_model.exists() {
            return Err(VoiceError::Synthesis(format!(
                "voice model not found: {:?}",
                self.voice_model
            )));
        }

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let output_path = self.output_dir.join(format!("{}.wav", Uuid::new_v4()));

        if let Err(e) = self.run_piper(text, &output_path).await {
            if let Err(cleanup) = tokio::fs::remove_file(&output_path).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        path = %output_path.display(),
                        "failed to remove partial synthesis output: {}",
                        cleanup
                    );
                }
            }
            return Err(e);
        }

        tracing::debug!(path = %output_path.display(), "synthesized reply audio");
        Ok(output_path)
    }
}
