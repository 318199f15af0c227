//! Configuration for consplice.
//!
//! The configuration file is located at `~/.consplice/config.toml`:
//!
//! ```toml
//! # Log level when RUST_LOG is not set: error, warn, info, debug, trace
//! log_level = "info"
//!
//! [transform]
//! negotiate_single_char = true
//! stuff_output = true
//!
//! [registry]
//! max_records = 16
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::registry::DEFAULT_MAX_RECORDS;
use crate::core::transform::TransformOptions;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config: {0}")]
    Write(#[source] std::io::Error),

    #[error("Could not determine config path")]
    NoPath,
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShimConfig {
    /// Default log filter
    pub log_level: String,
    /// Transform switches
    pub transform: TransformConfig,
    /// Registry limits
    pub registry: RegistryConfig,
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            transform: TransformConfig::default(),
            registry: RegistryConfig::default(),
        }
    }
}

/// Transform configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub negotiate_single_char: bool,
    pub stuff_output: bool,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            negotiate_single_char: true,
            stuff_output: true,
        }
    }
}

impl From<&TransformConfig> for TransformOptions {
    fn from(config: &TransformConfig) -> Self {
        Self {
            negotiate_single_char: config.negotiate_single_char,
            stuff_output: config.stuff_output,
        }
    }
}

/// Registry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub max_records: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_records: DEFAULT_MAX_RECORDS,
        }
    }
}

impl ShimConfig {
    /// Load configuration from the default location, falling back to defaults
    pub fn load() -> Self {
        match Self::get_config_path() {
            Some(path) if path.exists() => Self::load_from(&path).unwrap_or_else(|e| {
                tracing::warn!("{}, using defaults", e);
                Self::default()
            }),
            _ => Self::default(),
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::get_config_path().ok_or(ConfigError::NoPath)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(ConfigError::Write)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content).map_err(ConfigError::Write)
    }

    /// Get config file path
    pub fn get_config_path() -> Option<PathBuf> {
        home_dir().map(|home| home.join(".consplice").join("config.toml"))
    }

    pub fn transform_options(&self) -> TransformOptions {
        TransformOptions::from(&self.transform)
    }
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}
