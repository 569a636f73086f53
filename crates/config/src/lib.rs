//! Configuration loading, validation, and management for SandPilot.
//!
//! Loads configuration from `~/.sandpilot/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable holding the model API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// The root configuration structure.
///
/// Maps directly to `~/.sandpilot/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model API key. Usually supplied via `GEMINI_API_KEY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the model API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// HTTP timeout for a single model call
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Directory all tools are confined to
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Tool limits
    #[serde(default)]
    pub tools: ToolsConfig,
}

fn default_model() -> String {
    "gemini-2.0-flash-001".into()
}
fn default_api_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}
fn default_request_timeout_secs() -> u64 {
    120
}
fn default_working_dir() -> PathBuf {
    PathBuf::from("./calculator")
}

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
            .field("model", &self.model)
            .field("api_url", &self.api_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("working_dir", &self.working_dir)
            .field("agent", &self.agent)
            .field("tools", &self.tools)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum model calls per user invocation
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
}

fn default_max_steps() -> u32 {
    20
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Character cap on file contents and process output returned to the model
    #[serde(default = "default_max_read_chars")]
    pub max_read_chars: usize,

    /// Wall-clock limit for script execution
    #[serde(default = "default_exec_timeout_secs")]
    pub exec_timeout_secs: u64,

    /// Interpreter used to run scripts
    #[serde(default = "default_python_interpreter")]
    pub python_interpreter: String,
}

fn default_max_read_chars() -> usize {
    10_000
}
fn default_exec_timeout_secs() -> u64 {
    30
}
fn default_python_interpreter() -> String {
    "python3".into()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            max_read_chars: default_max_read_chars(),
            exec_timeout_secs: default_exec_timeout_secs(),
            python_interpreter: default_python_interpreter(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.sandpilot/config.toml),
    /// then apply overrides found through `lookup`:
    /// - `GEMINI_API_KEY`
    /// - `SANDPILOT_MODEL`
    /// - `SANDPILOT_WORKING_DIR`
    pub fn load(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config file found at {}, using defaults", path.display());
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

    /// Apply overrides from an environment lookup. Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get(API_KEY_ENV) {
            self.api_key = Some(key);
        }
        if let Some(model) = get("SANDPILOT_MODEL") {
            self.model = model;
        }
        if let Some(dir) = get("SANDPILOT_WORKING_DIR") {
            self.working_dir = PathBuf::from(dir);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".sandpilot")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_steps must be at least 1".into(),
            ));
        }
        if self.tools.exec_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "tools.exec_timeout_secs must be at least 1".into(),
            ));
        }
        if self.tools.max_read_chars == 0 {
            return Err(ConfigError::ValidationError(
                "tools.max_read_chars must be at least 1".into(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }
        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            api_url: default_api_url(),
            request_timeout_secs: default_request_timeout_secs(),
            working_dir: default_working_dir(),
            agent: AgentConfig::default(),
            tools: ToolsConfig::default(),
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
