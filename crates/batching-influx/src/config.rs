// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! YAML configuration for the batching writer.

use crate::url::ConnectionTarget;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default time between periodic flushes (milliseconds).
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 30_000;

/// Default number of pending points that forces a flush.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 4000;

/// Default number of consecutive failed writes before periodic flushing stops.
pub const DEFAULT_MAX_FAILED_ATTEMPTS: u32 = 4;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct InfluxConfig {
    /// InfluxDB connection, either `url` or structured parameters.
    pub influxdb: ConnectionTarget,
    /// Batching behaviour.
    #[serde(default)]
    pub batching: BatchConfig,
}

impl InfluxConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: InfluxConfig = serde_yaml::from_str(yaml)?;
        config.batching.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}

/// Batching settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BatchConfig {
    /// Time between periodic flushes.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Pending point count that forces an immediate flush.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Consecutive failed writes until periodic flushing is aborted.
    #[serde(default = "default_max_failed_attempts")]
    pub max_failed_attempts: u32,

    /// Upper bound on a single write. None = wait indefinitely.
    #[serde(default)]
    pub write_timeout_ms: Option<u64>,
}

fn default_flush_interval_ms() -> u64 {
    DEFAULT_FLUSH_INTERVAL_MS
}

fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

fn default_max_failed_attempts() -> u32 {
    DEFAULT_MAX_FAILED_ATTEMPTS
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_failed_attempts: DEFAULT_MAX_FAILED_ATTEMPTS,
            write_timeout_ms: None,
        }
    }
}

impl BatchConfig {
    /// Set the flush interval, rounded up to whole milliseconds.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval_ms = ceil_millis(interval);
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    pub fn with_max_failed_attempts(mut self, max_failed_attempts: u32) -> Self {
        self.max_failed_attempts = max_failed_attempts;
        self
    }

    /// Set the write timeout, rounded up to whole milliseconds.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout_ms = Some(ceil_millis(timeout));
        self
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "flush_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "max_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.max_failed_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_failed_attempts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Sub-millisecond durations must not collapse to zero.
fn ceil_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}
