//! Configuration loading, validation, and management for Proctor.
//!
//! Loads configuration from `~/.proctor/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use proctor_core::LoopSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.proctor/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// LLM endpoint used for actions and goal evaluation
    #[serde(default)]
    pub llm: LlmConfig,

    /// Loop budgets
    #[serde(default)]
    pub agent: LoopSettings,

    /// Remote tool servers (MCP over stdio)
    #[serde(default)]
    pub remote_tools: Vec<RemoteToolConfig>,

    /// System under test for the built-in `send_message` tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetConfig>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API key (falls back to environment variables)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// HTTP timeout for one generation request
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_llm_timeout() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// A remote tool server launched as a subprocess.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteToolConfig {
    /// Name used in logs and errors
    pub name: String,

    /// Executable to spawn
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// HTTP endpoint that receives test messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub url: String,

    /// Extra request headers (e.g. authorization)
    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default = "default_target_timeout")]
    pub timeout_secs: u64,
}

fn default_target_timeout() -> u64 {
    30
}

impl AppConfig {
    /// Load configuration from the default path (~/.proctor/config.toml).
    ///
    /// Also checks environment variables:
    /// - `PROCTOR_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `PROCTOR_API_URL`
    /// - `PROCTOR_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
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

    /// Apply environment overrides through a lookup function.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.llm.api_key.is_none() {
            self.llm.api_key = lookup("PROCTOR_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(url) = lookup("PROCTOR_API_URL") {
            self.llm.api_url = url;
        }
        if let Some(model) = lookup("PROCTOR_MODEL") {
            self.llm.model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".proctor")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be > 0".into(),
            ));
        }

        if self.agent.history_window == 0 {
            return Err(ConfigError::ValidationError(
                "agent.history_window must be > 0".into(),
            ));
        }

        if self.agent.tool_call_multiplier == 0 {
            return Err(ConfigError::ValidationError(
                "agent.tool_call_multiplier must be > 0".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for remote in &self.remote_tools {
            if !seen.insert(remote.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate remote tool server name '{}'",
                    remote.name
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.llm.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
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
