//! Weft Configuration Module
//!
//! Manages persistent configuration for API access and sampling defaults.
//! Config is stored in `~/.config/weft/config.toml`.
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. Environment variables (`OPENAI_API_KEY`, `WEFT_BASE_URL`, `WEFT_MODEL`)
//! 2. Config file (`~/.config/weft/config.toml`)
//! 3. Defaults

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WeftError};
use crate::provider::openai::OPENAI_BASE_URL;
use crate::provider::OPENAI_DEFAULT_MODEL;
use crate::util::constants::DEFAULT_TEMPERATURE;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WeftConfig {
    /// API access settings
    #[serde(default)]
    pub api: ApiSettings,

    /// Default model and sampling settings
    #[serde(default)]
    pub defaults: Defaults,
}

/// API access configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ApiSettings {
    /// API key for the OpenAI-compatible endpoint (sk-...)
    pub openai_api_key: Option<String>,

    /// Endpoint root; defaults to the public OpenAI API
    pub base_url: Option<String>,
}

/// Default settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Defaults {
    /// Default model identifier (gpt-4o-mini, gpt-4o, ...)
    pub model: Option<String>,

    /// Default sampling temperature
    pub temperature: Option<f64>,
}

impl WeftConfig {
    /// Get the config directory path
    ///
    /// Returns `~/.config/weft/` on Unix, `%APPDATA%/weft/` on Windows
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("weft")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from the default location.
    ///
    /// Loads `.env` opportunistically first so env-var overrides work for
    /// local development. Returns default config if the file doesn't
    /// exist; errors if it exists but is malformed.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| WeftError::Config {
            reason: format!("Failed to read config file: {}", e),
        })?;

        toml::from_str(&content).map_err(|e| WeftError::Config {
            reason: format!("Failed to parse config file: {}", e),
        })
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir();
        fs::create_dir_all(&dir).map_err(|e| WeftError::Config {
            reason: format!("Failed to create config dir: {}", e),
        })?;
        self.save_to(&Self::config_path())
    }

    /// Save configuration to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| WeftError::Config {
            reason: format!("Failed to serialize config: {}", e),
        })?;
        fs::write(path, content).map_err(|e| WeftError::Config {
            reason: format!("Failed to write config file: {}", e),
        })
    }

    /// API key: environment first, then config file.
    pub fn resolved_api_key(&self) -> Option<String> {
        std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.api.openai_api_key.clone())
    }

    /// Endpoint root: environment, then config file, then the public API.
    pub fn resolved_base_url(&self) -> String {
        std::env::var("WEFT_BASE_URL")
            .ok()
            .filter(|u| !u.is_empty())
            .or_else(|| self.api.base_url.clone())
            .unwrap_or_else(|| OPENAI_BASE_URL.to_string())
    }

    /// Model: environment, then config file, then the provider default.
    pub fn resolved_model(&self) -> String {
        std::env::var("WEFT_MODEL")
            .ok()
            .filter(|m| !m.is_empty())
            .or_else(|| self.defaults.model.clone())
            .unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string())
    }

    /// Sampling temperature: config file, then the built-in default.
    pub fn resolved_temperature(&self) -> f64 {
        self.defaults.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }
}

/// Mask an API key for display: first 7 and last 4 characters.
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 12 {
        return "***".to_string();
    }
    let head: String = chars[..7].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
