//! Server configuration loading from file and environment variables.

use anya_conversation::ConversationLimits;
use anya_types::PersonalityConfig;
use anya_voice::SpeechConfig;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// WebSocket transport limits and liveness settings.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// The assistant's persona and sampling parameters.
    #[serde(default)]
    pub personality: PersonalityConfig,

    /// Per-connection history bounds.
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Text generation backend.
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Speech-to-text and text-to-speech backends.
    #[serde(default)]
    pub audio: SpeechConfig,

    /// Static files and uploads.
    #[serde(default)]
    pub media: MediaConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// WebSocket transport configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Seconds between server-initiated pings.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Seconds without any inbound frame before a peer is considered dead.
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,

    /// Largest accepted inbound message or frame, in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Outbound envelopes queued per connection before senders wait.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    /// How long `stop()` waits for open connections to finish.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "anya_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Conversation history configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationConfig {
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    #[serde(default = "default_prompt_window")]
    pub prompt_window: usize,

    /// Approximate prompt budget in tokens.
    #[serde(default = "default_context_window")]
    pub context_window: usize,
}

/// Inference engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    /// Base URL of an OpenAI-compatible chat completions server.
    #[serde(default = "default_inference_endpoint")]
    pub endpoint: String,

    /// Model name sent with each request, if the server needs one.
    #[serde(default)]
    pub model: Option<String>,
}

/// Media configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    /// Directory of static client files served at `/`.
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,

    /// Largest accepted `POST /upload_audio` body, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8765
}

fn default_heartbeat_interval_secs() -> u64 {
    20
}

fn default_heartbeat_timeout_secs() -> u64 {
    10
}

fn default_max_message_size() -> usize {
    10_000_000
}

fn default_outbound_buffer() -> usize {
    64
}

fn default_drain_timeout_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_history() -> usize {
    20
}

fn default_prompt_window() -> usize {
    10
}

fn default_context_window() -> usize {
    4000
}

fn default_inference_endpoint() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_public_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            heartbeat_timeout_secs: default_heartbeat_timeout_secs(),
            max_message_size: default_max_message_size(),
            outbound_buffer: default_outbound_buffer(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

impl TransportConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            prompt_window: default_prompt_window(),
            context_window: default_context_window(),
        }
    }
}

impl ConversationConfig {
    pub fn limits(&self) -> ConversationLimits {
        ConversationLimits {
            max_history: self.max_history,
            prompt_window: self.prompt_window,
            context_window: self.context_window,
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_inference_endpoint(),
            model: None,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            public_dir: default_public_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `ANYA_HOST` overrides `server.host`
/// - `ANYA_PORT` overrides `server.port`
/// - `ANYA_LOG_LEVEL` overrides `logging.level`
/// - `ANYA_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `ANYA_INFERENCE_URL` overrides `inference.endpoint`
/// - `ANYA_PUBLIC_DIR` overrides `media.public_dir`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(host) = var("ANYA_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("ANYA_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(level) = var("ANYA_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("ANYA_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(url) = var("ANYA_INFERENCE_URL") {
        if !url.trim().is_empty() {
            config.inference.endpoint = url;
        }
    }
    if let Some(dir) = var("ANYA_PUBLIC_DIR") {
        config.media.public_dir = PathBuf::from(dir);
    }
}
