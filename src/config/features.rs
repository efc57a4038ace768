use serde::Deserialize;
use serde::Serialize;

/// Optional channel families
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FeatureConfig {
    /// Serve `watch/...` channels (resource watch bridge)
    #[serde(default)]
    pub watch_enabled: bool,

    #[serde(default = "default_true")]
    pub chat_enabled: bool,

    /// Serve the synthetic `grafana/testdata/...` generators
    #[serde(default = "default_true")]
    pub testdata_enabled: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            watch_enabled: false,
            chat_enabled: true,
            testdata_enabled: true,
        }
    }
}

fn default_true() -> bool {
    true
}
