//! buildstream configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main buildstream configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Connection lifecycle and store settings
    pub feed: FeedConfig,

    /// Backend endpoints and credentials
    pub server: ServerConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        self.feed.validate()?;
        self.server.validate()
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .buildstream.yml
        let local_config = PathBuf::from(".buildstream.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/buildstream/buildstream.yml
        if let Some(user_config) = Self::user_config_path()
            && user_config.exists()
        {
            match Self::load_from_file(&user_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialised
    ///
    /// Errors are swallowed: a broken config file is reported properly by
    /// [`Config::load`] once logging is up.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates: Vec<PathBuf> = match config_path {
            Some(path) => vec![path.clone()],
            None => {
                let mut paths = vec![PathBuf::from(".buildstream.yml")];
                paths.extend(Self::user_config_path());
                paths
            }
        };

        candidates
            .into_iter()
            .filter(|p| p.exists())
            .find_map(|p| fs::read_to_string(p).ok())
            .and_then(|content| serde_yaml::from_str::<Config>(&content).ok())
            .and_then(|config| config.log_level)
    }

    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("buildstream").join("buildstream.yml"))
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Connection lifecycle configuration
///
/// One canonical surface for backoff, fallback and store sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Consecutive failed attempts before falling back (or failing)
    #[serde(rename = "max-reconnect-attempts")]
    pub max_reconnect_attempts: u32,

    /// Delay before the first retry in milliseconds
    #[serde(rename = "initial-delay-ms")]
    pub initial_delay_ms: u64,

    /// Upper bound on any retry delay in milliseconds
    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,

    /// Growth factor between retries
    #[serde(rename = "backoff-multiplier")]
    pub backoff_multiplier: f64,

    /// Random jitter fraction applied to each delay (0.2 = ±20%)
    pub jitter: f64,

    /// Poll instead of failing once retries are exhausted
    #[serde(rename = "enable-fallback")]
    pub enable_fallback: bool,

    /// Fallback poll interval in milliseconds
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,

    /// Log buffer capacity
    #[serde(rename = "max-logs")]
    pub max_logs: usize,

    /// Start connecting as soon as the feed is created
    #[serde(rename = "auto-connect")]
    pub auto_connect: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 1.5,
            jitter: 0.0,
            enable_fallback: true,
            poll_interval_ms: 5_000,
            max_logs: crate::store::DEFAULT_MAX_LOGS,
            auto_connect: true,
        }
    }
}

impl FeedConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_logs == 0 {
            return Err(eyre::eyre!("feed.max-logs must be at least 1"));
        }
        if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0) {
            return Err(eyre::eyre!(
                "feed.backoff-multiplier must be >= 1.0 (got {})",
                self.backoff_multiplier
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(eyre::eyre!("feed.jitter must be within 0.0..=1.0 (got {})", self.jitter));
        }
        if self.poll_interval_ms == 0 {
            return Err(eyre::eyre!("feed.poll-interval-ms must be greater than zero"));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(eyre::eyre!(
                "feed.initial-delay-ms ({}) exceeds feed.max-delay-ms ({})",
                self.initial_delay_ms,
                self.max_delay_ms
            ));
        }
        Ok(())
    }
}

/// Which persistent transport to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Websocket,
    Sse,
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "websocket" | "ws" => Ok(Self::Websocket),
            "sse" => Ok(Self::Sse),
            other => Err(format!("unknown transport '{}' (expected websocket or sse)", other)),
        }
    }
}

/// Backend endpoint configuration
///
/// Paths may contain a `{job}` placeholder that is replaced with the job id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP base URL of the backend
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// WebSocket path (scheme derived from base-url)
    #[serde(rename = "ws-path")]
    pub ws_path: String,

    /// Server-sent events path
    #[serde(rename = "events-path")]
    pub events_path: String,

    /// Fallback poll path
    #[serde(rename = "poll-path")]
    pub poll_path: String,

    /// Environment variable containing the bearer token
    #[serde(rename = "token-env")]
    pub token_env: String,

    pub transport: TransportKind,

    /// Poll request timeout in milliseconds
    #[serde(rename = "request-timeout-ms")]
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            ws_path: "/ws/projects/{job}".to_string(),
            events_path: "/api/v1/projects/{job}/events".to_string(),
            poll_path: "/api/v1/projects/{job}/logs".to_string(),
            token_env: "BUILDSTREAM_TOKEN".to_string(),
            transport: TransportKind::Websocket,
            request_timeout_ms: 10_000,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| eyre::eyre!("server.base-url '{}' is not a valid URL: {}", self.base_url, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(eyre::eyre!(
                "server.base-url must use http or https (got {})",
                url.scheme()
            ));
        }
        Ok(())
    }
}
