//! Tracker configuration, stored as a TOML file.
//!
//! Every field has a default, so an absent file or an empty table is a valid
//! configuration.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::MAX_LOOKBACK_DAYS;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerConfig {
    /// Directory holding the per-interval CSV datasets.
    pub data_dir: PathBuf,
    pub alert_config: PathBuf,
    /// Application-level cap on analytics look-back, in sessions.
    pub max_lookback_days: u32,
    pub moving_average_period: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            alert_config: PathBuf::from("alert_config.json"),
            max_lookback_days: MAX_LOOKBACK_DAYS,
            moving_average_period: crate::analytics::DEFAULT_MA_PERIOD,
        }
    }
}

impl TrackerConfig {
    /// Load from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Like [`TrackerConfig::from_file`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::from_file(path) {
            Err(ConfigError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_lookback_days == 0 || self.max_lookback_days > MAX_LOOKBACK_DAYS {
            return Err(ConfigError::Invalid(format!(
                "max_lookback_days must be between 1 and {MAX_LOOKBACK_DAYS}, got {}",
                self.max_lookback_days
            )));
        }
        if self.moving_average_period == 0 {
            return Err(ConfigError::Invalid(
                "moving_average_period must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
