//! Configuration management for aihuman
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};
use crate::session::timer::TimerDurations;
use crate::session::{Entitlements, InteractionMode};
use crate::token::TokenPolicy;

/// Main configuration structure for aihuman
///
/// Every section has defaults, so an empty file (or none at all) yields a
/// working configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Application host (token mint, public app pages)
    #[serde(default)]
    pub app: AppConfig,
    /// Backend API host (projects, document extraction)
    #[serde(default)]
    pub api: ApiConfig,
    /// Token retry policy
    #[serde(default)]
    pub token: TokenConfig,
    /// Session controller behavior
    #[serde(default)]
    pub session: SessionSettings,
    /// Streaming provider control plane
    #[serde(default)]
    pub streaming: StreamingConfig,
    /// Document extraction proxy
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Application host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_base_url")]
    pub base_url: String,
}

fn default_app_base_url() -> String {
    "https://humanaiapp.com".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: default_app_base_url(),
        }
    }
}

/// Backend API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_base_url")]
    pub base_url: String,

    /// Timeout of project save requests
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_api_base_url() -> String {
    "https://api.humanaiapp.com".to_string()
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Retry policy of the token endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Attempts before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Timeout of a single attempt
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,

    /// Backoff unit; attempt `n` is followed by `n * base_delay_ms`
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_attempt_timeout() -> u64 {
    30
}

fn default_base_delay() -> u64 {
    1000
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            attempt_timeout_secs: default_attempt_timeout(),
            base_delay_ms: default_base_delay(),
        }
    }
}

impl TokenConfig {
    pub fn policy(&self) -> TokenPolicy {
        TokenPolicy {
            max_attempts: self.max_attempts,
            attempt_timeout: Duration::from_secs(self.attempt_timeout_secs),
            base_delay: Duration::from_millis(self.base_delay_ms),
        }
    }
}

/// Session controller settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Soft limit for the base tier
    #[serde(default = "default_soft_base")]
    pub soft_duration_base_secs: u64,

    /// Soft limit for the top tier
    #[serde(default = "default_soft_top")]
    pub soft_duration_top_secs: u64,

    /// Hard limit, regardless of tier
    #[serde(default = "default_hard")]
    pub hard_duration_secs: u64,

    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,

    /// Run the soft and hard timers at all
    #[serde(default = "default_timers_enabled")]
    pub timers_enabled: bool,

    /// Mode a freshly started session begins in
    #[serde(default)]
    pub initial_mode: InteractionMode,

    /// How long `start` waits for the media stream
    #[serde(default = "default_stream_ready_timeout")]
    pub stream_ready_timeout_secs: u64,
}

fn default_soft_base() -> u64 {
    120
}

fn default_soft_top() -> u64 {
    300
}

fn default_hard() -> u64 {
    480
}

fn default_tick_millis() -> u64 {
    1000
}

fn default_timers_enabled() -> bool {
    true
}

fn default_stream_ready_timeout() -> u64 {
    30
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            soft_duration_base_secs: default_soft_base(),
            soft_duration_top_secs: default_soft_top(),
            hard_duration_secs: default_hard(),
            tick_millis: default_tick_millis(),
            timers_enabled: default_timers_enabled(),
            initial_mode: InteractionMode::default(),
            stream_ready_timeout_secs: default_stream_ready_timeout(),
        }
    }
}

impl SessionSettings {
    /// Timer lengths for a user with `entitlements`
    pub fn timer_durations(&self, entitlements: &Entitlements) -> TimerDurations {
        let soft = if entitlements.top_tier {
            self.soft_duration_top_secs
        } else {
            self.soft_duration_base_secs
        };
        TimerDurations {
            soft: Duration::from_secs(soft),
            hard: Duration::from_secs(self.hard_duration_secs),
            tick: Duration::from_millis(self.tick_millis),
        }
    }

    pub fn stream_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_ready_timeout_secs)
    }
}

/// Streaming provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Base URL of the provider's REST API
    #[serde(default = "default_streaming_api_base")]
    pub api_base: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_streaming_api_base() -> String {
    "https://api.heygen.com".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            api_base: default_streaming_api_base(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Document extraction proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `aihuman=debug`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable JSON-formatted logs
    #[serde(default)]
    pub json_format: bool,

    /// Log file path (if None, stderr only)
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}

fn default_log_level() -> String {
    "aihuman=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            file_path: None,
        }
    }
}

/// Default location of the configuration file
///
/// Falls back to `config.yaml` in the working directory when no home
/// directory can be determined.
pub fn default_config_path() -> PathBuf {
    directories::ProjectDirs::from("com", "humanaiapp", "aihuman")
        .map(|dirs| dirs.config_dir().join("config.yaml"))
        .unwrap_or_else(|| PathBuf::from("config.yaml"))
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// A missing file is not an error; defaults are used instead.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &Path, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            tracing::debug!("Config file not found at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SessionError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| SessionError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(base_url) = std::env::var("AIHUMAN_APP_BASE_URL") {
            self.app.base_url = base_url;
        }

        if let Ok(base_url) = std::env::var("AIHUMAN_API_BASE_URL") {
            self.api.base_url = base_url;
        }

        if let Ok(api_base) = std::env::var("AIHUMAN_STREAMING_API_BASE") {
            self.streaming.api_base = api_base;
        }

        if let Ok(attempts) = std::env::var("AIHUMAN_TOKEN_MAX_ATTEMPTS") {
            if let Ok(value) = attempts.parse() {
                self.token.max_attempts = value;
            } else {
                tracing::warn!("Invalid AIHUMAN_TOKEN_MAX_ATTEMPTS: {}", attempts);
            }
        }

        if let Ok(enabled) = std::env::var("AIHUMAN_TIMERS_ENABLED") {
            if let Ok(value) = enabled.parse() {
                self.session.timers_enabled = value;
            } else {
                tracing::warn!("Invalid AIHUMAN_TIMERS_ENABLED: {}", enabled);
            }
        }

        if let Ok(mode) = std::env::var("AIHUMAN_INITIAL_MODE") {
            match mode.parse() {
                Ok(value) => self.session.initial_mode = value,
                Err(_) => tracing::warn!("Invalid AIHUMAN_INITIAL_MODE: {}", mode),
            }
        }

        if let Ok(bind) = std::env::var("AIHUMAN_BIND") {
            self.server.bind = bind;
        }

        if let Ok(level) = std::env::var("AIHUMAN_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(path) = std::env::var("AIHUMAN_LOG_FILE") {
            self.logging.file_path = Some(PathBuf::from(path));
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            self.logging.level = "aihuman=debug".to_string();
        }
        if cli.json_logs {
            self.logging.json_format = true;
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("app.base_url", &self.app.base_url),
            ("api.base_url", &self.api.base_url),
            ("streaming.api_base", &self.streaming.api_base),
        ] {
            url::Url::parse(value).map_err(|e| {
                SessionError::Config(format!("{} is not a valid URL ({}): {}", name, value, e))
            })?;
        }

        if self.token.max_attempts == 0 {
            return Err(
                SessionError::Config("token.max_attempts must be greater than 0".to_string())
                    .into(),
            );
        }

        if self.token.attempt_timeout_secs == 0 {
            return Err(SessionError::Config(
                "token.attempt_timeout_secs must be greater than 0".to_string(),
            )
            .into());
        }

        let session = &self.session;
        if session.soft_duration_base_secs == 0
            || session.soft_duration_top_secs == 0
            || session.hard_duration_secs == 0
        {
            return Err(SessionError::Config(
                "session durations must be greater than 0".to_string(),
            )
            .into());
        }

        if session.tick_millis == 0 {
            return Err(
                SessionError::Config("session.tick_millis must be greater than 0".to_string())
                    .into(),
            );
        }

        if session.stream_ready_timeout_secs == 0 {
            return Err(SessionError::Config(
                "session.stream_ready_timeout_secs must be greater than 0".to_string(),
            )
            .into());
        }

        if self.api.request_timeout_secs == 0 {
            return Err(SessionError::Config(
                "api.request_timeout_secs must be greater than 0".to_string(),
            )
            .into());
        }

        if self.streaming.request_timeout_secs == 0 {
            return Err(SessionError::Config(
                "streaming.request_timeout_secs must be greater than 0".to_string(),
            )
            .into());
        }

        if self.server.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(SessionError::Config(format!(
                "server.bind is not a socket address: {}",
                self.server.bind
            ))
            .into());
        }

        Ok(())
    }
}
