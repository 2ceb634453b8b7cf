//! Fixture configuration.
//!
//! Loaded from `fixture.toml` in the working directory, or from the path in
//! `FIXTURE_CONFIG`. A missing file means defaults.
//!
//! ## Precedence
//!
//! 1. Environment variables
//! 2. Config file
//! 3. Built-in defaults
//!
//! ## Environment Variables
//!
//! - `FIXTURE_CONFIG`: Override config file path
//! - `FIXTURE_POLL_INTERVAL_MS`: Drain poll interval in milliseconds
//! - `FIXTURE_DRAIN_TIMEOUT_MS`: Drain deadline in milliseconds (`0` = none)
//! - `FIXTURE_LOG`: Per-test log level
//! - `FIXTURE_LOG_FORMAT`: Per-test log format (human, json, compact)

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::DrainPolicy;
use crate::core::logging::{LOG_FORMAT_ENV, LOG_LEVEL_ENV, LogFormat, LogLevel};
use crate::error::{FixtureError, Result};

// =============================================================================
// Environment Variable Names
// =============================================================================

/// Environment variable to override config file path.
pub const ENV_CONFIG: &str = "FIXTURE_CONFIG";
/// Environment variable for the drain poll interval.
pub const ENV_POLL_INTERVAL_MS: &str = "FIXTURE_POLL_INTERVAL_MS";
/// Environment variable for the drain deadline.
pub const ENV_DRAIN_TIMEOUT_MS: &str = "FIXTURE_DRAIN_TIMEOUT_MS";

/// Config file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "fixture.toml";

const MAX_POLL_INTERVAL_MS: u64 = 60_000;

/// Fixture configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureConfig {
    /// Drain wait settings.
    pub drain: DrainConfig,
    /// Per-test logger settings.
    pub logging: LoggingConfig,
}

/// Drain wait settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrainConfig {
    /// Delay between polls.
    pub poll_interval_ms: u64,
    /// Give up after this long; absent waits until drained or cancelled.
    pub timeout_ms: Option<u64>,
}

/// Per-test logger settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level name (trace, debug, info, warn, error).
    pub level: Option<String>,
    /// Format name (human, json, compact).
    pub format: Option<String>,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            timeout_ms: None,
        }
    }
}

impl FixtureConfig {
    /// Load from file, apply env overrides, and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid, or if the merged
    /// values fail [`FixtureConfig::validate`].
    pub fn resolve() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from `FIXTURE_CONFIG` or `./fixture.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the file exists but is invalid.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load from a specific path; defaults when the file is missing.
    ///
    /// # Errors
    ///
    /// [`FixtureError::ConfigParse`] for malformed TOML, or an I/O error.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        tracing::debug!(?path, "Loading config file");
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| FixtureError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// The config file path in effect.
    #[must_use]
    pub fn config_path() -> PathBuf {
        std::env::var(ENV_CONFIG)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from)
    }

    /// Overlay `FIXTURE_*` environment variables. Unparseable values are
    /// ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        if let Some(interval) = env_u64(ENV_POLL_INTERVAL_MS) {
            self.drain.poll_interval_ms = interval;
        }
        if let Some(timeout) = env_u64(ENV_DRAIN_TIMEOUT_MS) {
            self.drain.timeout_ms = (timeout > 0).then_some(timeout);
        }
        if let Some(level) = env_string(LOG_LEVEL_ENV) {
            self.logging.level = Some(level);
        }
        if let Some(format) = env_string(LOG_FORMAT_ENV) {
            self.logging.format = Some(format);
        }
    }

    /// Validate configuration values.
    ///
    /// Checks that:
    /// - The poll interval is between 1 and 60000 ms
    /// - A timeout, if set, is at least one poll interval
    /// - Log level and format names are known
    ///
    /// # Errors
    ///
    /// [`FixtureError::Config`] naming the offending value.
    pub fn validate(&self) -> Result<()> {
        let interval = self.drain.poll_interval_ms;
        if interval == 0 || interval > MAX_POLL_INTERVAL_MS {
            return Err(FixtureError::Config(format!(
                "poll_interval_ms must be between 1 and {MAX_POLL_INTERVAL_MS}, got {interval}"
            )));
        }

        if let Some(timeout) = self.drain.timeout_ms
            && timeout < interval
        {
            return Err(FixtureError::Config(format!(
                "timeout_ms ({timeout}) must be at least poll_interval_ms ({interval})"
            )));
        }

        if let Some(level) = &self.logging.level
            && LogLevel::from_arg(level).is_none()
        {
            return Err(FixtureError::Config(format!(
                "Invalid log level \"{level}\". Valid levels: trace, debug, info, warn, error"
            )));
        }

        if let Some(format) = &self.logging.format
            && LogFormat::from_arg(format).is_none()
        {
            return Err(FixtureError::Config(format!(
                "Invalid log format \"{format}\". Valid formats: human, json, compact"
            )));
        }

        Ok(())
    }

    /// The drain policy these settings describe.
    #[must_use]
    pub fn drain_policy(&self) -> DrainPolicy {
        let policy =
            DrainPolicy::default().with_poll_interval(Duration::from_millis(self.drain.poll_interval_ms));
        match self.drain.timeout_ms {
            Some(timeout) => policy.with_timeout(Duration::from_millis(timeout)),
            None => policy,
        }
    }

    /// Per-test log level; unknown names fall back to the default.
    #[must_use]
    pub fn log_level(&self) -> LogLevel {
        self.logging
            .level
            .as_deref()
            .and_then(LogLevel::from_arg)
            .unwrap_or_default()
    }

    /// Per-test log format; unknown names fall back to the default.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.logging
            .format
            .as_deref()
            .and_then(LogFormat::from_arg)
            .unwrap_or_default()
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    let raw = env_string(key)?;
    match raw.parse::<u64>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring non-numeric environment override");
            None
        }
    }
}
