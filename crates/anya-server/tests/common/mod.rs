//! Shared fixtures for the server integration tests.

#![allow(dead_code)]

use anya_conversation::{GenerationError, InferenceBackend};
use anya_server::config::Config;
use anya_server::{AppState, SessionServer};
use anya_types::{GenerationParams, PromptMessage};
use anya_voice::{AudioPipeline, Synthesizer, Transcriber, VoiceError};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Echoes the newest user message. Sleeps first when it contains "slow".
pub struct EchoInference {
    pub slow_delay: Duration,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl EchoInference {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            slow_delay: Duration::from_secs(5),
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            slow_delay: Duration::from_secs(5),
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl InferenceBackend for EchoInference {
    async fn generate(
        &self,
        messages: &[PromptMessage],
        _params: &GenerationParams,
    ) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let last = messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        if last.contains("slow") {
            tokio::time::sleep(self.slow_delay).await;
        }
        if last.contains("panic") {
            panic!("inference exploded");
        }
        if self.fail {
            return Err(GenerationError::Unavailable("engine offline".to_string()));
        }
        Ok(format!("You said: {}", last))
    }
}

/// Returns a fixed transcript and records the staged file it was given.
pub struct FakeTranscriber {
    pub transcript: String,
    pub seen: Mutex<Vec<PathBuf>>,
}

impl FakeTranscriber {
    pub fn new(transcript: &str) -> Arc<Self> {
        Arc::new(Self {
            transcript: transcript.to_string(),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn seen(&self) -> Vec<PathBuf> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<String, VoiceError> {
        assert!(audio_path.exists(), "staged audio must exist while transcribing");
        self.seen.lock().unwrap().push(audio_path.to_path_buf());
        Ok(self.transcript.clone())
    }
}

/// Writes the reply text as a `.wav` file into a directory.
pub struct FileSynthesizer {
    pub dir: PathBuf,
    pub fail: bool,
}

#[async_trait]
impl Synthesizer for FileSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<PathBuf, VoiceError> {
        if self.fail {
            return Err(VoiceError::Synthesis("voice model missing".to_string()));
        }
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{}.wav", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, text.as_bytes()).await?;
        Ok(path)
    }
}

pub struct TestServer {
    pub server: SessionServer,
    pub addr: SocketAddr,
    pub dir: TempDir,
    pub transcriber: Arc<FakeTranscriber>,
}

impl TestServer {
    pub fn staging_dir(&self) -> PathBuf {
        self.dir.path().join("staging")
    }

    pub fn responses_dir(&self) -> PathBuf {
        self.dir.path().join("responses")
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

pub struct Options {
    pub inference: Arc<dyn InferenceBackend>,
    pub transcript: String,
    pub synthesis_fails: bool,
    pub configure: fn(&mut Config),
}

impl Default for Options {
    fn default() -> Self {
        Self {
            inference: EchoInference::new(),
            transcript: "hello from audio".to_string(),
            synthesis_fails: false,
            configure: |_| {},
        }
    }
}

pub async fn start_server(options: Options) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.server.port = 0;
    config.audio.responses_dir = dir.path().join("responses");
    config.audio.temp_dir = Some(dir.path().join("staging"));
    config.media.public_dir = dir.path().join("public");
    config.transport.drain_timeout_secs = 5;
    (options.configure)(&mut config);

    let transcriber = FakeTranscriber::new(&options.transcript);
    let synthesizer = Arc::new(FileSynthesizer {
        dir: config.audio.responses_dir.clone(),
        fail: options.synthesis_fails,
    });
    let audio = Arc::new(AudioPipeline::new(
        config.audio.staging_dir(),
        transcriber.clone(),
        synthesizer,
    ));

    let state = AppState::new(&config, options.inference, audio);
    let server = SessionServer::start("127.0.0.1:0".parse().unwrap(), state)
        .await
        .unwrap();
    let addr = server.local_addr();

    TestServer {
        server,
        addr,
        dir,
        transcriber,
    }
}

/// Connects and consumes the welcome envelope.
pub async fn connect(server: &TestServer) -> Client {
    let (mut ws, _) = connect_async(server.url()).await.unwrap();
    let welcome = recv_json(&mut ws).await;
    assert_eq!(welcome["type"], "welcome");
    ws
}

pub async fn send_json(ws: &mut Client, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

pub async fn send_raw(ws: &mut Client, text: &str) {
    ws.send(Message::Text(text.to_string().into())).await.unwrap();
}

/// Next JSON envelope, skipping control frames. Panics after 10 seconds.
pub async fn recv_json(ws: &mut Client) -> Value {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str::<Value>(text.as_str()).unwrap()
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                other => panic!("expected text frame, got {other:?}"),
            }
        }
    })
    .await
    .expect("timed out waiting for envelope")
}

/// Asserts nothing but control frames arrive within `window`.
pub async fn assert_silent(ws: &mut Client, window: Duration) {
    let result = tokio::time::timeout(window, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                other => return other,
            }
        }
    })
    .await;
    if let Ok(frame) = result {
        panic!("expected no envelope, got {frame:?}");
    }
}

/// Waits until the registry holds `expected` connections.
pub async fn wait_for_connections(server: &TestServer, expected: usize) {
    for _ in 0..200 {
        if server.server.registry().len().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "registry never reached {} connections (has {})",
        expected,
        server.server.registry().len().await
    );
}
