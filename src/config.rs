//! Global configuration parsing and validation.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

fn default_http_host() -> String {
    "localhost".into()
}

fn default_http_port() -> u16 {
    8080
}

fn default_cpu_threshold_percent() -> f64 {
    5.0
}

fn default_sample_interval_seconds() -> u64 {
    2
}

fn default_retention_seconds() -> u64 {
    30
}

fn default_tracked_cli() -> String {
    "claude".into()
}

fn default_true() -> bool {
    true
}

/// Global configuration parsed from `config.toml`.
///
/// Every field has a default, so an empty file (or no file at all) yields
/// a working configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct GlobalConfig {
    /// Host name or address the control API binds to.
    #[serde(default = "default_http_host")]
    pub http_host: String,
    /// TCP port for the control API.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// CPU percentage at or above which a session counts as running.
    #[serde(default = "default_cpu_threshold_percent")]
    pub cpu_threshold_percent: f64,
    /// Seconds between resource monitor passes.
    #[serde(default = "default_sample_interval_seconds")]
    pub sample_interval_seconds: u64,
    /// Seconds a terminal session stays visible before it is purged.
    #[serde(default = "default_retention_seconds")]
    pub retention_seconds: u64,
    /// Seconds between purge sweeps; falls back to the sample interval.
    #[serde(default)]
    pub purge_interval_seconds: Option<u64>,
    /// Executable name of the CLI whose sessions are tracked.
    #[serde(default = "default_tracked_cli")]
    pub tracked_cli: String,
    /// Register untracked live `tracked_cli` processes at startup.
    #[serde(default = "default_true")]
    pub auto_discover: bool,
    /// Repeat auto-discovery on every monitor pass instead of only once.
    #[serde(default)]
    pub rediscover: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            http_host: default_http_host(),
            http_port: default_http_port(),
            cpu_threshold_percent: default_cpu_threshold_percent(),
            sample_interval_seconds: default_sample_interval_seconds(),
            retention_seconds: default_retention_seconds(),
            purge_interval_seconds: None,
            tracked_cli: default_tracked_cli(),
            auto_discover: true,
            rediscover: false,
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// `host:port` string the control API binds to.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    /// Interval between resource monitor passes.
    #[must_use]
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_seconds)
    }

    /// Retention window for terminal sessions.
    #[must_use]
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_seconds)
    }

    /// Interval between purge sweeps.
    #[must_use]
    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(
            self.purge_interval_seconds
                .unwrap_or(self.sample_interval_seconds),
        )
    }

    /// Check the cross-field constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.http_host.trim().is_empty() {
            return Err(AppError::Config("http_host must not be empty".into()));
        }

        if !(0.0..=100.0).contains(&self.cpu_threshold_percent) {
            return Err(AppError::Config(
                "cpu_threshold_percent must be between 0 and 100".into(),
            ));
        }

        if self.sample_interval_seconds == 0 {
            return Err(AppError::Config(
                "sample_interval_seconds must be greater than zero".into(),
            ));
        }

        if self.purge_interval_seconds == Some(0) {
            return Err(AppError::Config(
                "purge_interval_seconds must be greater than zero".into(),
            ));
        }

        if self.tracked_cli.trim().is_empty() {
            return Err(AppError::Config("tracked_cli must not be empty".into()));
        }

        Ok(())
    }
}
