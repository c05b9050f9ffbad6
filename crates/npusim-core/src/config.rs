//! TOML configuration for grading runs.
//!
//! Every field has a default matching the contest grader, so an empty
//! document (or no config file at all) yields the standard rules.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Top-level grading configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub limits: LimitsSection,
    #[serde(default)]
    pub log: LogSection,
    #[serde(default)]
    pub report: ReportSection,
}

/// Hard limits applied while validating and simulating a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsSection {
    /// Upper bound on T_i, the number of requests a user may send.
    #[serde(default = "default_max_requests_per_user")]
    pub max_requests_per_user: u32,
    /// Latest declared send time accepted in a submission.
    #[serde(default = "default_max_send_time_ms")]
    pub max_send_time_ms: u64,
    /// Last tick the simulation may reach before aborting.
    #[serde(default = "default_tick_ceiling_ms")]
    pub tick_ceiling_ms: u64,
}

fn default_max_requests_per_user() -> u32 {
    300
}
fn default_max_send_time_ms() -> u64 {
    1_000_000
}
fn default_tick_ceiling_ms() -> u64 {
    2_000_000
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_requests_per_user: default_max_requests_per_user(),
            max_send_time_ms: default_max_send_time_ms(),
            tick_ceiling_ms: default_tick_ceiling_ms(),
        }
    }
}

/// Resource log output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_log_path")]
    pub path: PathBuf,
}

fn default_log_path() -> PathBuf {
    PathBuf::from("simulation_log.txt")
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_log_path(),
        }
    }
}

/// Report verbosity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSection {
    /// Append per-request and per-NPU tables to the score summary.
    #[serde(default)]
    pub detailed: bool,
}

impl SimConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_requests_per_user == 0 {
            return Err(ConfigError::Validation(
                "max_requests_per_user must be > 0".to_string(),
            ));
        }
        if self.limits.max_send_time_ms == 0 {
            return Err(ConfigError::Validation(
                "max_send_time_ms must be > 0".to_string(),
            ));
        }
        if self.limits.tick_ceiling_ms == 0 {
            return Err(ConfigError::Validation(
                "tick_ceiling_ms must be > 0".to_string(),
            ));
        }
        if self.log.enabled && self.log.path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "log.path must be set when log.enabled = true".to_string(),
            ));
        }
        Ok(())
    }
}
