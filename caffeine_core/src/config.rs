//! Configuration file support for caftrak.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/caftrak/config.toml`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub bands: BandConfig,

    #[serde(default)]
    pub health: HealthConfig,
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

impl DataConfig {
    /// Location of the persisted ledger
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("ledger.json")
    }

    /// Location of the file-backed health log
    pub fn health_log_path(&self) -> PathBuf {
        self.data_dir.join("health.jsonl")
    }
}

/// Decay model parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_half_life_hours")]
    pub half_life_hours: f64,

    #[serde(default = "default_reference_serving_mg")]
    pub reference_serving_mg: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            half_life_hours: default_half_life_hours(),
            reference_serving_mg: default_reference_serving_mg(),
        }
    }
}

/// Lower bounds of the moderate and high bands
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BandConfig {
    #[serde(default = "default_level_moderate_mg")]
    pub level_moderate_mg: f64,

    #[serde(default = "default_level_high_mg")]
    pub level_high_mg: f64,

    #[serde(default = "default_cups_moderate")]
    pub cups_moderate: f64,

    #[serde(default = "default_cups_high")]
    pub cups_high: f64,
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            level_moderate_mg: default_level_moderate_mg(),
            level_high_mg: default_level_high_mg(),
            cups_moderate: default_cups_moderate(),
            cups_high: default_cups_high(),
        }
    }
}

/// Health-record synchronization
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_health_enabled")]
    pub enabled: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: default_health_enabled(),
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| {
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".local/share"))
            .unwrap_or_else(|| PathBuf::from("."))
    });
    base.join("caftrak")
}

fn default_half_life_hours() -> f64 {
    5.0
}

fn default_reference_serving_mg() -> f64 {
    crate::catalog::REFERENCE_SERVING_MG
}

fn default_level_moderate_mg() -> f64 {
    200.0
}

fn default_level_high_mg() -> f64 {
    400.0
}

fn default_cups_moderate() -> f64 {
    3.0
}

fn default_cups_high() -> f64 {
    5.0
}

fn default_health_enabled() -> bool {
    true
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
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
        base.join("caftrak").join("config.toml")
    }

    /// Reject values the decay model and banding cannot work with
    pub fn validate(&self) -> Result<()> {
        if !is_positive(self.model.half_life_hours) {
            return Err(Error::Config(format!(
                "half_life_hours must be positive, got {}",
                self.model.half_life_hours
            )));
        }
        if !is_positive(self.model.reference_serving_mg) {
            return Err(Error::Config(format!(
                "reference_serving_mg must be positive, got {}",
                self.model.reference_serving_mg
            )));
        }
        if self.bands.level_moderate_mg > self.bands.level_high_mg
            || self.bands.cups_moderate > self.bands.cups_high
        {
            return Err(Error::Config(
                "moderate band bounds must not exceed high band bounds".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model.half_life_hours, 5.0);
        assert_eq!(config.model.reference_serving_mg, 95.0);
        assert_eq!(config.bands.level_moderate_mg, 200.0);
        assert_eq!(config.bands.cups_high, 5.0);
        assert!(config.health.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_loaded_from_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut config = Config::default();
        config.data.data_dir = temp_dir.path().join("data");
        config.model.half_life_hours = 6.0;
        std::fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();

        let parsed = Config::load_from(&path).unwrap();
        assert_eq!(parsed.model.half_life_hours, 6.0);
        assert_eq!(parsed.data.data_dir, temp_dir.path().join("data"));
        assert_eq!(
            parsed.data.ledger_path(),
            temp_dir.path().join("data").join("ledger.json")
        );
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[bands]
level_high_mg = 350.0
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.bands.level_high_mg, 350.0);
        assert_eq!(config.bands.level_moderate_mg, 200.0); // default
        assert_eq!(config.model.half_life_hours, 5.0); // default
    }

    #[test]
    fn test_rejects_non_positive_half_life() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[model]\nhalf_life_hours = 0.0\n").unwrap();

        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }
}
