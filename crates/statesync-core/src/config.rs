//! Configuration types for the statesync system
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main synchronizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Backoff settings for the fetch loop
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Number of fetch attempts a re-fetched value may match an invalidated
    /// value before it is accepted anyway
    ///
    /// After a caller invalidates the published value, each fetch returning
    /// that same value is provisionally rejected until the backoff iteration
    /// counter reaches this bound. With default backoff settings the bound
    /// keeps the loop fetching for about four minutes before giving up and
    /// accepting the repeated value.
    #[serde(default = "default_max_invalidated_retries")]
    pub max_invalidated_retries: u32,

    /// Capacity of the internal event channel
    ///
    /// When full, new synchronizer events will be dropped (with a warning
    /// log). This prevents unbounded memory growth when nothing drains the
    /// receiver.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl SyncConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            max_invalidated_retries: default_max_invalidated_retries(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.backoff.validate()?;

        if self.max_invalidated_retries == 0 {
            return Err(crate::Error::config(
                "max_invalidated_retries must be at least 1",
            ));
        }

        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config(
                "event_channel_capacity must be > 0",
            ));
        }

        Ok(())
    }

    /// Load and validate a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, crate::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Backoff settings for the fetch loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// First delay between fetch attempts (in milliseconds)
    #[serde(default = "default_backoff_base_ms")]
    pub base_ms: u64,

    /// Upper bound on the delay between fetch attempts (in milliseconds)
    #[serde(default = "default_backoff_cap_ms")]
    pub cap_ms: u64,
}

impl BackoffConfig {
    /// Validate the backoff settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.base_ms == 0 {
            return Err(crate::Error::config("backoff base_ms must be > 0"));
        }

        if self.cap_ms < self.base_ms {
            return Err(crate::Error::config(
                "backoff cap_ms must be >= base_ms",
            ));
        }

        Ok(())
    }

    /// The first delay as a [`Duration`]
    pub fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    /// The delay cap as a [`Duration`]
    pub fn cap(&self) -> Duration {
        Duration::from_millis(self.cap_ms)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: default_backoff_base_ms(),
            cap_ms: default_backoff_cap_ms(),
        }
    }
}

fn default_max_invalidated_retries() -> u32 {
    7
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_cap_ms() -> u64 {
    // 2 hours
    2 * 60 * 60 * 1000
}
