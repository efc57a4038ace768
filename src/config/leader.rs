use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Leader lease parameters for HA deployments
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LeaderConfig {
    /// How long a lease stays valid without renewal
    #[serde(default = "default_lease_ttl_ms")]
    pub lease_ttl_ms: u64,

    /// How often a leader running a stream re-checks its lease
    #[serde(default = "default_renew_interval_ms")]
    pub renew_interval_ms: u64,

    /// Bound on a forwarded subscribe call to the leader
    #[serde(default = "default_forward_timeout_ms")]
    pub forward_timeout_ms: u64,
}

impl Default for LeaderConfig {
    fn default() -> Self {
        Self {
            lease_ttl_ms: default_lease_ttl_ms(),
            renew_interval_ms: default_renew_interval_ms(),
            forward_timeout_ms: default_forward_timeout_ms(),
        }
    }
}

impl LeaderConfig {
    pub fn lease_ttl(&self) -> Duration {
        Duration::from_millis(self.lease_ttl_ms)
    }

    pub fn renew_interval(&self) -> Duration {
        Duration::from_millis(self.renew_interval_ms)
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_millis(self.forward_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.renew_interval_ms == 0 || self.renew_interval_ms >= self.lease_ttl_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "renew_interval_ms({}) must be > 0 and below lease_ttl_ms({})",
                self.renew_interval_ms, self.lease_ttl_ms
            ))));
        }
        if self.forward_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "forward_timeout_ms must be > 0".into(),
            )));
        }
        Ok(())
    }
}

fn default_lease_ttl_ms() -> u64 {
    10_000
}
fn default_renew_interval_ms() -> u64 {
    3000
}
fn default_forward_timeout_ms() -> u64 {
    2000
}
