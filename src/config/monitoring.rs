use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::Error;
use crate::Result;

/// Lowest port the metrics endpoint may bind without elevated privileges
const MIN_METRICS_PORT: u16 = 1024;

/// Prometheus scrape endpoint of a live node
///
/// ```toml
/// [monitoring]
/// prometheus_enabled = true
/// prometheus_port = 9100
/// ```
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub prometheus_enabled: bool,

    /// Serves `GET /metrics`; ignored while the endpoint is disabled
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            prometheus_enabled: false,
            prometheus_port: default_prometheus_port(),
        }
    }
}

impl MonitoringConfig {
    /// Port to serve metrics on, `None` when the endpoint is off
    pub fn metrics_port(&self) -> Option<u16> {
        self.prometheus_enabled.then_some(self.prometheus_port)
    }

    pub fn validate(&self) -> Result<()> {
        match self.metrics_port() {
            Some(port) if port < MIN_METRICS_PORT => Err(Error::Config(ConfigError::Message(format!(
                "monitoring.prometheus_port must be at least {MIN_METRICS_PORT}, got {port}"
            )))),
            Some(_) => Ok(()),
            None => {
                if self.prometheus_port != default_prometheus_port() {
                    debug!(port = self.prometheus_port, "Metrics port set while the endpoint is disabled");
                }
                Ok(())
            }
        }
    }
}

fn default_prometheus_port() -> u16 {
    9100
}
