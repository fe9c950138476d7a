//! Configuration management for Yakusu.
//!
//! Handles loading, saving, and validating configuration from
//! platform-specific config directories.

use crate::error::ConfigError;
use crate::language::Language;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application name used for config directory.
const APP_NAME: &str = "Yakusu";

/// Default config filename.
const CONFIG_FILENAME: &str = "config.toml";

/// Placeholder value for an unconfigured access token.
const TOKEN_PLACEHOLDER: &str = "YOUR_ACCESS_TOKEN_HERE";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Persistence/quota service.
    pub platform: PlatformConfig,

    /// Extraction/translation compute service.
    pub compute: ComputeConfig,

    /// Orchestration behavior.
    pub pipeline: PipelineConfig,
}

/// Connection settings for the persistence/quota service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Base URL of the service.
    pub base_url: String,

    /// Bearer token of the signed-in author.
    pub token: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api/".to_string(),
            token: TOKEN_PLACEHOLDER.to_string(),
        }
    }
}

impl PlatformConfig {
    /// Checks if the access token is configured (not placeholder).
    pub fn is_configured(&self) -> bool {
        !self.token.is_empty() && self.token != TOKEN_PLACEHOLDER
    }
}

/// Connection settings for the compute service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeConfig {
    /// Base URL of the service.
    pub base_url: String,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/".to_string(),
        }
    }
}

/// Orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Languages the site publishes in. The source language is excluded per episode.
    pub languages: Vec<Language>,

    /// Interval between status polls in milliseconds.
    pub poll_interval_ms: u64,

    /// Upper bound for any single service call in seconds.
    pub request_timeout_secs: u64,

    /// Failed poll ticks in a row before the run is reported as degraded.
    pub max_consecutive_poll_failures: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            languages: Language::ALL.to_vec(),
            poll_interval_ms: 2000,
            request_timeout_secs: 20,
            max_consecutive_poll_failures: 5,
        }
    }
}

impl PipelineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Config {
    /// Returns the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Returns the full path to the config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Loads configuration from the default location.
    ///
    /// If the config file doesn't exist, creates a default one.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.platform.is_configured() {
            return Err(ConfigError::MissingValue(
                "platform.token (set your access token in config file)".to_string(),
            ));
        }

        for (key, value) in [
            ("platform.base_url", &self.platform.base_url),
            ("compute.base_url", &self.compute.base_url),
        ] {
            url::Url::parse(value).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        }

        if self.pipeline.languages.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.languages".to_string(),
                message: "must list at least one language".to_string(),
            });
        }

        let unique: HashSet<Language> = self.pipeline.languages.iter().copied().collect();
        if unique.len() != self.pipeline.languages.len() {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.languages".to_string(),
                message: "contains duplicates".to_string(),
            });
        }

        if self.pipeline.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.poll_interval_ms".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if self.pipeline.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.request_timeout_secs".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        // Zero would never trip the degraded flag.
        if self.pipeline.max_consecutive_poll_failures == 0 {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.max_consecutive_poll_failures".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}
