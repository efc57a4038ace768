//! Configuration management for a live node.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support (`CONFIG_PATH`)
//! - Environment variable overrides (`LIVE__` prefix)
//! - Component-wise validation
mod features;
mod leader;
mod monitoring;
mod node;
mod retry;
mod storage;
mod stream;
pub use features::*;
pub use leader::*;
pub use monitoring::*;
pub use node::*;
pub use retry::*;
pub use storage::*;
pub use stream::*;


use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Main configuration container of a live node
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct LiveConfig {
    /// Node identity and HA mode
    #[serde(default)]
    pub node: NodeConfig,
    /// Stream manager timing (idle watchdog, submission bound, restarts)
    #[serde(default)]
    pub stream: StreamConfig,
    /// Leader lease and forwarding parameters
    #[serde(default)]
    pub leader: LeaderConfig,
    /// Last-message store backend
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metrics and monitoring settings
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    /// Optional channel features
    #[serde(default)]
    pub features: FeatureConfig,
}

impl Debug for LiveConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("LiveConfig")
            .field("node", &self.node)
            .field("stream", &self.stream)
            .finish()
    }
}

fn environment() -> Environment {
    Environment::with_prefix("LIVE")
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}

impl LiveConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `LIVE__` prefix (highest priority)
    ///
    /// Callers MUST call `validate()` before using the configuration.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("LIVE__STREAM__SUBMIT_TIMEOUT_MS", "500");
    /// let cfg = LiveConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);
        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }
        builder = builder.add_source(environment());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    ///
    /// Consumes self; must be called after all overrides are applied.
    pub fn validate(self) -> Result<Self> {
        self.node.validate()?;
        self.stream.validate()?;
        self.leader.validate()?;
        self.storage.validate()?;
        self.monitoring.validate()?;
        Ok(self)
    }
}
