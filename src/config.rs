//! Configuration management for db-query.
//!
//! Handles loading configuration from TOML files and environment variables:
//! row ceilings, connection timeout, LLM settings, and the state database
//! location.

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the OpenAI API key.
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
/// Environment variable overriding the configured model.
pub const ENV_OPENAI_MODEL: &str = "OPENAI_MODEL";
/// Environment variable overriding the state database path.
pub const ENV_STATE_DB: &str = "DB_QUERY_STATE_DB";

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Row ceilings and timeouts.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Natural-language-to-SQL provider configuration.
    #[serde(default)]
    pub llm: LlmConfig,

    /// State database settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Row ceilings and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LimitsConfig {
    /// LIMIT injected into queries that have none.
    #[serde(default = "default_query_row_ceiling")]
    pub query_row_ceiling: u64,

    /// Maximum number of rows an export may contain.
    #[serde(default = "default_export_row_limit")]
    pub export_row_limit: usize,

    /// Seconds allowed for opening a database connection.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_query_row_ceiling() -> u64 {
    crate::safety::DEFAULT_ROW_CEILING
}

fn default_export_row_limit() -> usize {
    crate::export::DEFAULT_EXPORT_ROW_LIMIT
}

fn default_connect_timeout_secs() -> u64 {
    5
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            query_row_ceiling: default_query_row_ceiling(),
            export_row_limit: default_export_row_limit(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl LimitsConfig {
    /// Returns the connection open timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    /// LLM provider: "openai" or "mock".
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name (e.g., "gpt-4o-mini").
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Upper bound on completion tokens.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// API key; normally supplied through the environment instead.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    1000
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            api_key: None,
        }
    }
}

/// State database settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StorageConfig {
    /// Overrides the platform default state database path.
    pub path: Option<PathBuf>,
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("db-query")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file, then applies environment overrides.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file without consulting the environment.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            AppError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Applies environment overrides using the given lookup.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(ENV_OPENAI_API_KEY).filter(|k| !k.is_empty()) {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = lookup(ENV_OPENAI_MODEL).filter(|m| !m.is_empty()) {
            self.llm.model = model;
        }
        if let Some(path) = lookup(ENV_STATE_DB).filter(|p| !p.is_empty()) {
            self.storage.path = Some(PathBuf::from(path));
        }
    }

    /// Rejects values that would make every request fail.
    pub fn validate(&self) -> Result<()> {
        if self.limits.query_row_ceiling == 0 {
            return Err(AppError::config("limits.query_row_ceiling must be positive"));
        }
        if self.limits.export_row_limit == 0 {
            return Err(AppError::config("limits.export_row_limit must be positive"));
        }
        if self.limits.connect_timeout_secs == 0 {
            return Err(AppError::config(
                "limits.connect_timeout_secs must be positive",
            ));
        }
        Ok(())
    }

    /// Returns the configured state database path, or the platform default.
    pub fn state_db_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(crate::persistence::StateDb::default_path)
    }
}
