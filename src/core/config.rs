use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Error while loading or parsing a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level simulator configuration. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Optional RNG seed for deterministic output.
    pub seed: Option<u64>,
    pub generator: GeneratorConfig,
    pub polling: PollingConfig,
    pub outcomes: OutcomeConfig,
    pub checkpoint: CheckpointConfig,
    pub metrics: MetricsConfig,
    pub log: LogConfig,
}

impl Config {
    /// Loads a config file from TOML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generator.login_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "generator.login_interval_seconds must be positive".to_string(),
            ));
        }
        if self.generator.subject_access_interval_seconds == Some(0) {
            return Err(ConfigError::Invalid(
                "generator.subject_access_interval_seconds must be positive".to_string(),
            ));
        }
        if self.polling.poll_timeout_ms == 0 || self.polling.backoff_ms == 0 {
            return Err(ConfigError::Invalid(
                "polling intervals must be positive".to_string(),
            ));
        }
        if self.metrics.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "metrics.interval_ms must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("login_success", self.outcomes.login_success),
            ("subject_access_success", self.outcomes.subject_access_success),
            ("document_success", self.outcomes.document_success),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "outcomes.{name} must be within [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Controls the timer-driven root event sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Turns the synthetic traffic off; events then only arrive from outside.
    pub enabled: bool,
    pub login_interval_seconds: u64,
    /// When set, subject access attempts are synthesized on their own timer.
    pub subject_access_interval_seconds: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            login_interval_seconds: 10,
            subject_access_interval_seconds: None,
        }
    }
}

impl GeneratorConfig {
    pub fn login_interval(&self) -> Duration {
        Duration::from_secs(self.login_interval_seconds)
    }

    pub fn subject_access_interval(&self) -> Option<Duration> {
        self.subject_access_interval_seconds.map(Duration::from_secs)
    }
}

/// Cursor loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Bounded wait for a long-poll.
    pub poll_timeout_ms: u64,
    /// Sleep after an empty poll or a store error.
    pub backoff_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 100,
            backoff_ms: 500,
        }
    }
}

/// Success probabilities for the simulated decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutcomeConfig {
    pub login_success: f64,
    pub subject_access_success: f64,
    pub document_success: f64,
}

impl Default for OutcomeConfig {
    fn default() -> Self {
        Self {
            login_success: 0.5,
            subject_access_success: 0.8,
            document_success: 0.8,
        }
    }
}

/// Cursor checkpoint persistence. In-memory when `path` is absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub interval_ms: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_ms: 10_000 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}
