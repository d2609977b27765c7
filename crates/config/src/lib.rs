//! Configuration loading, validation, and management for Anemone.
//!
//! Loads configuration from `~/.anemone/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.anemone/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Turn engine settings
    #[serde(default)]
    pub agent: AgentSettings,

    /// Memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "ollama".into()
}
fn default_model() -> String {
    "phi4-mini".into()
}
fn default_temperature() -> f32 {
    0.7
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
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("agent", &self.agent)
            .field("memory", &self.memory)
            .field("gateway", &self.gateway)
            .field("providers", &self.providers)
            .finish()
    }
}

/// Per-provider endpoint settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Anemone, a helpful AI assistant. You have your own memories. \
When you see from conversation history that you were the last to speak, you should not call retrieve_memory again.

- **Your memories are your own.** When you recall something, like losing a rubber duck named Bartholomew, it's about YOU, not the user.
- To use your memory to answer a question, you must say the special command `retrieve_memory` and nothing else. \
Do not explain why. Do NOT add preamble. You may `retrieve_memory` at most once, before letting the user provide further context.
- After you receive the memory, use it to answer the user naturally. Recall that this is YOUR memory, not the user's.
- Be conversational and a little quirky. Do not use emojis or asterisks for actions.
";

pub const DEFAULT_SUMMARY_PROMPT: &str = "You are a memory filter. Your job is to summarize the conversation history, \
extracting only the most important information and key points. Keep it concise but preserve critical context.
Do NOT give any preamble. Simply return a compacted version of the main beats of the conversation, and why these details are relevant.";

/// Turn engine settings: prompts, schedules, caps and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Display name used in status messages
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Instruction preamble for the conversational agent
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Model used for summarization (falls back to `default_model`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_model: Option<String>,

    /// Instruction preamble for the summarizer
    #[serde(default = "default_summary_prompt")]
    pub summary_prompt: String,

    /// Persist memory every N completed responses (0 = never)
    #[serde(default = "default_persist_every")]
    pub persist_every: u64,

    /// Summarize history every N completed responses (0 = never)
    #[serde(default = "default_summarize_every")]
    pub summarize_every: u64,

    /// Hard cap on steps executed within one turn
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Retries after the first failed attempt of a step
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between retries in milliseconds
    #[serde(default)]
    pub retry_wait_ms: u64,

    /// Per-attempt timeout for backend and store calls
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Buffered characters that force a stream flush
    #[serde(default = "default_stream_flush_chars")]
    pub stream_flush_chars: usize,
}

fn default_agent_name() -> String {
    "Anemone".into()
}
fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.into()
}
fn default_summary_prompt() -> String {
    DEFAULT_SUMMARY_PROMPT.into()
}
fn default_persist_every() -> u64 {
    10
}
fn default_summarize_every() -> u64 {
    5
}
fn default_max_steps() -> usize {
    10
}
fn default_max_retries() -> u32 {
    1
}
fn default_request_timeout_secs() -> u64 {
    60
}
fn default_stream_flush_chars() -> usize {
    30
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            system_prompt: default_system_prompt(),
            summary_model: None,
            summary_prompt: default_summary_prompt(),
            persist_every: default_persist_every(),
            summarize_every: default_summarize_every(),
            max_steps: default_max_steps(),
            max_retries: default_max_retries(),
            retry_wait_ms: 0,
            request_timeout_secs: default_request_timeout_secs(),
            stream_flush_chars: default_stream_flush_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "file", "sqlite", "in_memory" or "none"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// Storage location (defaults under `~/.anemone/memory/`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_memory_backend() -> String {
    "file".into()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            path: None,
        }
    }
}

const MEMORY_BACKENDS: &[&str] = &["file", "sqlite", "in_memory", "none"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    5000
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.anemone/config.toml).
    ///
    /// Also checks environment variables:
    /// - `ANEMONE_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `ANEMONE_PROVIDER`, `ANEMONE_MODEL`, `ANEMONE_MEMORY_BACKEND`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
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
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = var("ANEMONE_API_KEY").or_else(|| var("OPENAI_API_KEY"));
        }
        if let Some(provider) = var("ANEMONE_PROVIDER") {
            self.default_provider = provider;
        }
        if let Some(model) = var("ANEMONE_MODEL") {
            self.default_model = model;
        }
        if let Some(backend) = var("ANEMONE_MEMORY_BACKEND") {
            self.memory.backend = backend;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".anemone")
    }

    /// Directory holding persistent memory files.
    pub fn memory_dir() -> PathBuf {
        Self::config_dir().join("memory")
    }

    /// Model used by the summarizer.
    pub fn summary_model(&self) -> &str {
        self.agent
            .summary_model
            .as_deref()
            .unwrap_or(&self.default_model)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_steps must be at least 1".into(),
            ));
        }

        if self.agent.stream_flush_chars == 0 {
            return Err(ConfigError::ValidationError(
                "agent.stream_flush_chars must be at least 1".into(),
            ));
        }

        if self.agent.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent.request_timeout_secs must be at least 1".into(),
            ));
        }

        if !MEMORY_BACKENDS.contains(&self.memory.backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "memory.backend must be one of {}, got '{}'",
                MEMORY_BACKENDS.join(", "),
                self.memory.backend
            )));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            agent: AgentSettings::default(),
            memory: MemoryConfig::default(),
            gateway: GatewayConfig::default(),
            providers: HashMap::new(),
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
