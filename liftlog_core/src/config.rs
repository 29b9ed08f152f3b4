//! Configuration file support for liftlog.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/liftlog/config.toml`.

use crate::types::WeightUnit;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub progression: ProgressionConfig,

    #[serde(default)]
    pub library: LibraryConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Progression parameters configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProgressionConfig {
    /// Increment of the global fallback linear rule
    #[serde(default = "default_fallback_increment")]
    pub fallback_increment: f64,

    /// Deload applied when a rule does not set its own
    #[serde(default = "default_deload_percent")]
    pub deload_percent: f64,

    /// Consecutive minor failures that force a deload (0 disables)
    #[serde(default = "default_deload_after_failures")]
    pub deload_after_failures: u32,

    /// Deload rounding granularity for kilogram prescriptions
    #[serde(default = "default_rounding_kg")]
    pub rounding_kg: f64,

    /// Deload rounding granularity for pound prescriptions
    #[serde(default = "default_rounding_lb")]
    pub rounding_lb: f64,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            fallback_increment: default_fallback_increment(),
            deload_percent: default_deload_percent(),
            deload_after_failures: default_deload_after_failures(),
            rounding_kg: default_rounding_kg(),
            rounding_lb: default_rounding_lb(),
        }
    }
}

impl ProgressionConfig {
    pub fn rounding_for(&self, unit: WeightUnit) -> f64 {
        match unit {
            WeightUnit::Kg => self.rounding_kg,
            WeightUnit::Lb => self.rounding_lb,
        }
    }
}

/// Exercise library source
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct LibraryConfig {
    /// TOML library replacing the built-in one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| {
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".local/share"))
            .unwrap_or_else(|| PathBuf::from("."))
    });
    base.join("liftlog")
}

fn default_fallback_increment() -> f64 {
    2.5
}

fn default_deload_percent() -> f64 {
    10.0
}

fn default_deload_after_failures() -> u32 {
    3
}

fn default_rounding_kg() -> f64 {
    2.5
}

fn default_rounding_lb() -> f64 {
    5.0
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|| PathBuf::from("."))
        });
        base.join("liftlog").join("config.toml")
    }

    /// Reject values the progression engine cannot work with
    pub fn validate(&self) -> Result<()> {
        let p = &self.progression;
        if !(0.0..100.0).contains(&p.deload_percent) {
            return Err(Error::Config(format!(
                "deload_percent must be in [0, 100), got {}",
                p.deload_percent
            )));
        }
        if p.fallback_increment < 0.0 || p.rounding_kg < 0.0 || p.rounding_lb < 0.0 {
            return Err(Error::Config(
                "increments and rounding granularities must be non-negative".into(),
            ));
        }
        Ok(())
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}
