use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use super::BackoffPolicy;
use crate::Error;
use crate::Result;

/// Stream manager tuning
///
/// ```toml
/// [stream]
/// idle_check_interval_ms = 5000
/// idle_zero_threshold = 3
/// submit_timeout_ms = 1000
/// ```
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StreamConfig {
    /// Interval between two presence checks of a running stream
    #[serde(default = "default_idle_check_interval_ms")]
    pub idle_check_interval_ms: u64,

    /// Consecutive zero-subscriber observations that stop a stream
    #[serde(default = "default_idle_zero_threshold")]
    pub idle_zero_threshold: u32,

    /// Upper bound a subscriber waits for the manager to acknowledge a
    /// submission
    #[serde(default = "default_submit_timeout_ms")]
    pub submit_timeout_ms: u64,

    /// Capacity of the manager's command queue
    #[serde(default = "default_command_buffer_size")]
    pub command_buffer_size: usize,

    #[serde(default)]
    pub restart_backoff: BackoffPolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            idle_check_interval_ms: default_idle_check_interval_ms(),
            idle_zero_threshold: default_idle_zero_threshold(),
            submit_timeout_ms: default_submit_timeout_ms(),
            command_buffer_size: default_command_buffer_size(),
            restart_backoff: BackoffPolicy::default(),
        }
    }
}

impl StreamConfig {
    pub fn idle_check_interval(&self) -> Duration {
        Duration::from_millis(self.idle_check_interval_ms)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.idle_check_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "idle_check_interval_ms must be > 0".into(),
            )));
        }
        if self.idle_zero_threshold == 0 {
            return Err(Error::Config(ConfigError::Message(
                "idle_zero_threshold must be >= 1".into(),
            )));
        }
        if !(10..=60_000).contains(&self.submit_timeout_ms) {
            return Err(Error::Config(ConfigError::Message(format!(
                "submit_timeout_ms must be between 10 and 60000, got {}",
                self.submit_timeout_ms
            ))));
        }
        if self.command_buffer_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "command_buffer_size must be > 0".into(),
            )));
        }
        self.restart_backoff.validate()
    }
}

fn default_idle_check_interval_ms() -> u64 {
    5000
}
fn default_idle_zero_threshold() -> u32 {
    3
}
fn default_submit_timeout_ms() -> u64 {
    1000
}
fn default_command_buffer_size() -> usize {
    1024
}
