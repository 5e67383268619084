//! Configuration for the RTMS relay gateway.
//!
//! Configuration can be loaded from a TOML file and/or environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for the relay gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Pre-shared credentials for signatures
    #[serde(default)]
    pub auth: AuthConfig,

    /// Recording output configuration
    #[serde(default)]
    pub recording: RecordingConfig,

    /// Connection limits
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Path the lifecycle webhook is mounted on
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    3000
}

fn default_webhook_path() -> String {
    "/webhook".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            webhook_path: default_webhook_path(),
        }
    }
}

/// Pre-shared credentials used for handshake signatures and the webhook
/// URL-validation challenge.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// Client id included in the stream signature
    #[serde(default)]
    pub client_id: String,

    /// Secret keying the stream signature
    #[serde(default)]
    pub client_secret: String,

    /// Secret keying the webhook URL-validation hash
    #[serde(default)]
    pub webhook_secret: String,
}

/// Recording output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Directory receiving recorded artifacts; created on demand
    #[serde(default = "default_recordings_dir")]
    pub dir: String,

    /// Minimum JPEG payload size in bytes; smaller frames are discarded
    #[serde(default = "default_jpeg_min_bytes")]
    pub jpeg_min_bytes: usize,

    /// Number of initial JPEG frames per session discarded as warm-up.
    /// The stream emits garbage frames before it stabilizes; how many is
    /// environment-specific, hence a tunable.
    #[serde(default = "default_jpeg_warmup_frames")]
    pub jpeg_warmup_frames: u64,

    /// Whether transcript entries are appended to a per-meeting log file
    /// in addition to being fanned out to browser clients
    #[serde(default)]
    pub persist_transcripts: bool,
}

fn default_recordings_dir() -> String {
    "./recordings".to_string()
}

fn default_jpeg_min_bytes() -> usize {
    1000
}

fn default_jpeg_warmup_frames() -> u64 {
    3
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            dir: default_recordings_dir(),
            jpeg_min_bytes: default_jpeg_min_bytes(),
            jpeg_warmup_frames: default_jpeg_warmup_frames(),
            persist_transcripts: false,
        }
    }
}

/// Connection limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Idle window in seconds after which a signaling or media connection
    /// with no inbound traffic (keep-alives included) is force-closed
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,
}

fn default_idle_timeout() -> u64 {
    300
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_seconds: default_idle_timeout(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            recording: RecordingConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config.normalized())
    }

    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Config::default();

        // Server
        if let Ok(host) = std::env::var("RTMS_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("RTMS_HTTP_PORT") {
            if let Ok(p) = port.parse() {
                config.server.http_port = p;
            }
        }
        if let Ok(path) = std::env::var("RTMS_WEBHOOK_PATH") {
            config.server.webhook_path = path;
        }

        // Auth
        if let Ok(id) = std::env::var("RTMS_CLIENT_ID") {
            config.auth.client_id = id;
        }
        if let Ok(secret) = std::env::var("RTMS_CLIENT_SECRET") {
            config.auth.client_secret = secret;
        }
        if let Ok(secret) = std::env::var("RTMS_WEBHOOK_SECRET") {
            config.auth.webhook_secret = secret;
        }

        // Recording
        if let Ok(dir) = std::env::var("RTMS_RECORDINGS_DIR") {
            config.recording.dir = dir;
        }
        if let Ok(min) = std::env::var("RTMS_JPEG_MIN_BYTES") {
            if let Ok(m) = min.parse() {
                config.recording.jpeg_min_bytes = m;
            }
        }
        if let Ok(warmup) = std::env::var("RTMS_JPEG_WARMUP_FRAMES") {
            if let Ok(w) = warmup.parse() {
                config.recording.jpeg_warmup_frames = w;
            }
        }
        if let Ok(persist) = std::env::var("RTMS_PERSIST_TRANSCRIPTS") {
            if let Ok(p) = persist.parse() {
                config.recording.persist_transcripts = p;
            }
        }

        // Limits
        if let Ok(idle) = std::env::var("RTMS_IDLE_TIMEOUT") {
            if let Ok(i) = idle.parse() {
                config.limits.idle_timeout_seconds = i;
            }
        }

        config.normalized()
    }

    /// Router paths must start with `/`; a bare path in the config would
    /// otherwise panic at route registration.
    fn normalized(mut self) -> Self {
        if !self.server.webhook_path.starts_with('/') {
            self.server.webhook_path.insert(0, '/');
        }
        self
    }

    /// Load configuration from file if it exists, otherwise from environment
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, ConfigError> {
        if let Some(p) = path {
            if p.as_ref().exists() {
                return Self::from_file(p);
            }
        }
        Ok(Self::from_env())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.http_port, 3000);
        assert_eq!(config.server.webhook_path, "/webhook");
        assert_eq!(config.recording.jpeg_min_bytes, 1000);
        assert_eq!(config.recording.jpeg_warmup_frames, 3);
        assert!(!config.recording.persist_transcripts);
        assert_eq!(config.limits.idle_timeout_seconds, 300);
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
[server]
http_port = 9090
webhook_path = "/hooks/rtms"

[auth]
client_id = "client-1"
client_secret = "cs"
webhook_secret = "ws"

[recording]
dir = "/var/recordings"
jpeg_warmup_frames = 10
persist_transcripts = true
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.http_port, 9090);
        assert_eq!(config.server.webhook_path, "/hooks/rtms");
        assert_eq!(config.auth.client_id, "client-1");
        assert_eq!(config.recording.dir, "/var/recordings");
        assert_eq!(config.recording.jpeg_warmup_frames, 10);
        assert!(config.recording.persist_transcripts);
        // Unset section falls back to defaults
        assert_eq!(config.limits.idle_timeout_seconds, 300);
    }

    #[test]
    fn test_webhook_path_gets_leading_slash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "[server]\nwebhook_path = \"hooks/rtms\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.server.webhook_path, "/hooks/rtms");

        // Already-rooted paths pass through untouched
        std::fs::write(&path, "[server]\nwebhook_path = \"/hooks/rtms\"\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.server.webhook_path, "/hooks/rtms");
    }
}
