//! Configuration loading, validation, and management for Kotoba.
//!
//! Loads configuration from `~/.kotoba/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.kotoba/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model provider base URL (any OpenAI-compatible endpoint)
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Chat pipeline configuration
    #[serde(default)]
    pub chat: ChatConfig,

    /// Session store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Long-term-memory service configuration
    #[serde(default)]
    pub memory: MemoryServiceConfig,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2048
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("chat", &self.chat)
            .field("store", &self.store)
            .field("memory", &self.memory)
            .finish()
    }
}

/// Chat pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// How many stored messages are sent alongside the system prompt
    /// (12 messages = 6 conversational turns)
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// How many memory entries the memory service is asked for per send
    #[serde(default = "default_memory_limit")]
    pub memory_limit: usize,

    /// Optional persona block override (skips the built-in persona)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona_override: Option<String>,
}

fn default_history_window() -> usize {
    12
}
fn default_memory_limit() -> usize {
    5
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            memory_limit: default_memory_limit(),
            persona_override: None,
        }
    }
}

/// Session store backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "sqlite" or "in_memory"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// SQLite database path (relative paths resolve under the config dir)
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_backend() -> String {
    "sqlite".into()
}
fn default_store_path() -> String {
    "sessions.db".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: default_store_path(),
        }
    }
}

/// Long-term-memory service endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct MemoryServiceConfig {
    /// Whether to query the memory service at all
    #[serde(default)]
    pub enabled: bool,

    /// Service base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Service API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for MemoryServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryServiceConfig")
            .field("enabled", &self.enabled)
            .field("url", &self.url)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

impl Default for MemoryServiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            api_key: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.kotoba/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `KOTOBA_API_KEY` (highest priority)
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        // Environment variable overrides (highest priority)
        if config.api_key.is_none() {
            config.api_key = std::env::var("KOTOBA_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("KOTOBA_MODEL") {
            config.default_model = model;
        }

        if let Ok(url) = std::env::var("KOTOBA_API_URL") {
            config.api_url = url;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".kotoba")
    }

    /// Resolve the SQLite database path (relative paths live in config_dir).
    pub fn store_path(&self) -> PathBuf {
        let p = Path::new(&self.store.path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            Self::config_dir().join(p)
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.default_temperature) {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.chat.history_window == 0 {
            return Err(ConfigError::ValidationError(
                "chat.history_window must be at least 1".into(),
            ));
        }

        match self.store.backend.as_str() {
            "sqlite" | "in_memory" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "unknown store backend '{other}' (expected \"sqlite\" or \"in_memory\")"
                )));
            }
        }

        if self.memory.enabled && self.memory.url.is_none() {
            return Err(ConfigError::ValidationError(
                "memory.url is required when memory.enabled = true".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            chat: ChatConfig::default(),
            store: StoreConfig::default(),
            memory: MemoryServiceConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for kotoba_core::Error {
    fn from(e: ConfigError) -> Self {
        kotoba_core::Error::Config {
            message: e.to_string(),
        }
    }
}
