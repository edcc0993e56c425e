//! Configuration management
//!
//! This module handles loading, validation, and management of the Waymark configuration.
//! Configuration is stored in TOML format at ~/.waymark/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **llm**: Generative service selection, timeout and per-provider settings
//! - **negotiation**: History cap and prompt window
//!
//! Credentials are never stored here. The OpenAI key is read from the environment
//! variable named by `llm.openai.api_key_env`, or from the OS keychain.
//!
//! # Examples
//!
//! ```no_run
//! use waymark_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//!
//! println!("Database: {:?}", config.database_path());
//! println!("Provider: {}", config.llm.default_provider);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to write config: {0}")]
    Write(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Generative service configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Negotiation engine settings
    #[serde(default)]
    pub negotiation: NegotiationConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Generative service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Provider used for negotiation (openai, ollama)
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Upper bound for one generative call, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// OpenAI provider settings
    #[serde(default)]
    pub openai: OpenAIConfig,

    /// Ollama provider settings
    #[serde(default)]
    pub ollama: OllamaConfig,
}

/// OpenAI provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    /// Base URL for OpenAI API
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_openai_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL for Ollama API
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

/// Negotiation engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationConfig {
    /// Maximum stored history entries per conversation
    ///
    /// Every turn stores a user entry and an assistant entry, so the cap must
    /// be even; an odd cap would leave the oldest retained entry an assistant
    /// reply without its question.
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,

    /// Number of most recent entries replayed to the model
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.waymark")
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_history_cap() -> usize {
    10
}

fn default_history_window() -> usize {
    10
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            request_timeout_secs: default_request_timeout(),
            openai: OpenAIConfig::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
        }
    }
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            history_cap: default_history_cap(),
            history_window: default_history_window(),
        }
    }
}

impl LLMConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Config {
    /// Load configuration from the default location (~/.waymark/config.toml)
    ///
    /// If the configuration file doesn't exist, writes a default configuration first.
    pub fn load_or_create() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, TOML parsing fails
    /// or validation fails.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;

        let mut config: Config =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ConfigError::Write(format!("Failed to create config directory: {}", e))
            })?;
        }

        // Serialize before processing so the file keeps the portable ~ paths
        let toml_string = toml::to_string_pretty(&Self::default())
            .map_err(|e| ConfigError::Write(e.to_string()))?;

        fs::write(path, toml_string).map_err(|e| ConfigError::Write(e.to_string()))?;

        let mut config = Self::default();
        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.waymark/config.toml)
    fn default_config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir()
            .ok_or_else(|| ConfigError::Invalid("Could not determine home directory".to_string()))?;

        Ok(home.join(".waymark").join("config.toml"))
    }

    /// Path of the SQLite database inside the data directory
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join("waymark.db")
    }

    /// Validate and process configuration
    ///
    /// This method validates value ranges, expands ~ in the data directory
    /// and creates it if it doesn't exist.
    fn validate_and_process(&mut self) -> Result<(), ConfigError> {
        self.validate()?;

        self.core.data_dir = expand_path(&self.core.data_dir)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                ConfigError::Write(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }

    /// Check value ranges without touching the filesystem
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let valid_providers = ["openai", "ollama"];
        if !valid_providers.contains(&self.llm.default_provider.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid default provider '{}'. Must be one of: {}",
                self.llm.default_provider,
                valid_providers.join(", ")
            )));
        }

        if self.llm.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }

        if self.negotiation.history_cap == 0 {
            return Err(ConfigError::Invalid(
                "history_cap must be at least 1".to_string(),
            ));
        }

        if self.negotiation.history_cap % 2 != 0 {
            return Err(ConfigError::Invalid(format!(
                "history_cap must be even (one user and one assistant entry per turn), got {}",
                self.negotiation.history_cap
            )));
        }

        if self.negotiation.history_window == 0 {
            return Err(ConfigError::Invalid(
                "history_window must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            core: CoreConfig::default(),
            llm: LLMConfig::default(),
            negotiation: NegotiationConfig::default(),
        }
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, ConfigError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| ConfigError::Invalid("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| ConfigError::Invalid("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| ConfigError::Invalid("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = Config::default();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.llm.default_provider, "openai");
        assert_eq!(config.llm.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.negotiation.history_cap, 10);
        assert_eq!(config.negotiation.history_window, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let expanded = expand_path(&PathBuf::from("~/test")).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        assert_eq!(expand_path(&path).unwrap(), path);
    }

    #[test]
    fn test_rejects_zero_history_cap() {
        let mut config = Config::default();
        config.negotiation.history_cap = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_odd_history_cap() {
        let mut config = Config::default();
        config.negotiation.history_cap = 7;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("history_cap must be even"));

        config.negotiation.history_cap = 8;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let mut config = Config::default();
        config.llm.default_provider = "gemini".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("gemini"));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.core.log_level, deserialized.core.log_level);
        assert_eq!(
            config.negotiation.history_cap,
            deserialized.negotiation.history_cap
        );
        assert_eq!(config.llm.openai.model, deserialized.llm.openai.model);
    }
}
