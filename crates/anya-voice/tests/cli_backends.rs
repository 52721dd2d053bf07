use anya_voice::{PiperTts, Synthesizer, Transcriber, VoiceError, WhisperCli};
use std::time::Duration;

#[tokio::test]
async fn piper_requires_voice_model() {
    let dir = tempfile::tempdir().unwrap();
    let tts = PiperTts::new(
        "piper",
        dir.path().join("missing.onnx"),
        dir.path().join("out"),
        Duration::from_secs(5),
    );
    let err = tts.synthesize("hello").await.unwrap_err();
    match err {
        VoiceError::Synthesis(msg) => assert!(msg.contains("voice model not found")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn whisper_reports_missing_binary() {
    let dir = tempfile::tempdir().unwrap();
    let audio = dir.path().join("in.wav");
    std::fs::write(&audio, b"RIFF").unwrap();

    let stt = WhisperCli::new(
        dir.path().join("model.bin"),
        dir.path().join("no-such-whisper"),
        Duration::from_secs(5),
    );
    let err = stt.transcribe(&audio).await.unwrap_err();
    assert!(err.is_transcription());
}

#[cfg(unix)]
mod scripted {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn whisper_stdout_is_the_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "whisper", "echo '  what time is it  '");
        let audio = dir.path().join("in.wav");
        std::fs::write(&audio, b"RIFF").unwrap();

        let stt = WhisperCli::new("model.bin", bin, Duration::from_secs(5));
        assert_eq!(stt.transcribe(&audio).await.unwrap(), "what time is it");
    }

    #[tokio::test]
    async fn whisper_failure_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "whisper", "echo 'bad model' >&2; exit 3");
        let audio = dir.path().join("in.wav");
        std::fs::write(&audio, b"RIFF").unwrap();

        let stt = WhisperCli::new("model.bin", bin, Duration::from_secs(5));
        match stt.transcribe(&audio).await.unwrap_err() {
            VoiceError::Transcription(msg) => assert!(msg.contains("bad model")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn piper_writes_into_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("voice.onnx");
        std::fs::write(&model, b"onnx").unwrap();
        // Args: --model <m> --output_file <out>
        let bin = script(dir.path(), "piper", "cat > \"$4\"");
        let out_dir = dir.path().join("responses");

        let tts = PiperTts::new(bin, &model, &out_dir, Duration::from_secs(5));
        let path = tts.synthesize("hello world").await.unwrap();
        assert_eq!(path.parent().unwrap(), out_dir);
        assert_eq!(path.extension().unwrap(), "wav");
        assert_eq!(std::fs::read(&path).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn piper_failure_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("voice.onnx");
        std::fs::write(&model, b"onnx").unwrap();
        let bin = script(dir.path(), "piper", "echo partial > \"$4\"; exit 1");
        let out_dir = dir.path().join("responses");

        let tts = PiperTts::new(bin, &model, &out_dir, Duration::from_secs(5));
        assert!(tts.synthesize("hello").await.is_err());
        assert_eq!(std::fs::read_dir(&out_dir).unwrap().count(), 0);
    }
}
