//! KREPS configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::duel::DuelError;

/// Main KREPS configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Duel timing and odds
    pub duel: DuelConfig,
}

impl Config {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        self.duel.validate().context("Invalid duel section")?;
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .kreps.yml
        let local_config = PathBuf::from(".kreps.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/kreps/kreps.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("kreps").join("kreps.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Errors are swallowed; the full load reports them later.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Duel timing and odds
///
/// Every delay is expressed in time units; `time-unit-ms` sets the unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuelConfig {
    /// Length of one time unit in milliseconds
    #[serde(rename = "time-unit-ms")]
    pub time_unit_ms: u64,

    /// Units between computing the epoch and the duel start
    #[serde(rename = "pre-delay")]
    pub pre_delay: f64,

    /// Units between the start and the earliest shot
    #[serde(rename = "ready-delay")]
    pub ready_delay: f64,

    /// Units to wait when the epoch has already passed
    #[serde(rename = "fallback-delay")]
    pub fallback_delay: f64,

    /// Upper bound (exclusive) of the random pre-fire jitter, in units
    #[serde(rename = "max-jitter")]
    pub max_jitter: f64,

    /// Probability that an incoming shot misses
    #[serde(rename = "survival-probability")]
    pub survival_probability: f64,

    /// Units the root waits for the challenger to exit before killing it
    #[serde(rename = "reap-grace")]
    pub reap_grace: f64,
}

impl Default for DuelConfig {
    fn default() -> Self {
        Self {
            time_unit_ms: 1000,
            pre_delay: 3.0,
            ready_delay: 1.0,
            fallback_delay: 1.0,
            max_jitter: 1.0,
            survival_probability: 0.3333,
            reap_grace: 2.0,
        }
    }
}

impl DuelConfig {
    /// Convert a count of time units into a duration
    pub fn units(&self, count: f64) -> Duration {
        Duration::from_millis(self.time_unit_ms).mul_f64(count.max(0.0))
    }

    pub fn validate(&self) -> Result<(), DuelError> {
        if self.time_unit_ms == 0 {
            return Err(DuelError::InvalidConfig("time-unit-ms must be positive".to_string()));
        }
        if !(0.0..1.0).contains(&self.survival_probability) {
            return Err(DuelError::InvalidConfig(format!(
                "survival-probability must be in [0, 1), got {}",
                self.survival_probability
            )));
        }
        let delays = [
            ("pre-delay", self.pre_delay),
            ("ready-delay", self.ready_delay),
            ("fallback-delay", self.fallback_delay),
            ("max-jitter", self.max_jitter),
            ("reap-grace", self.reap_grace),
        ];
        for (name, value) in delays {
            if !value.is_finite() || value < 0.0 {
                return Err(DuelError::InvalidConfig(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if self.fallback_delay == 0.0 {
            return Err(DuelError::InvalidConfig("fallback-delay must be positive".to_string()));
        }
        Ok(())
    }
}
