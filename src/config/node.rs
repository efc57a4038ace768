use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::NodeId;
use crate::Result;

/// Node identity within a (possibly multi-node) deployment
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NodeConfig {
    /// Unique node id, used as leader candidate identity
    #[serde(default = "default_node_id")]
    pub node_id: NodeId,

    /// Elect one owner per plugin stream across nodes and forward
    /// subscribes to it
    #[serde(default)]
    pub ha_enabled: bool,

    /// Root directory of the node's log files
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            ha_enabled: false,
            log_dir: default_log_dir(),
        }
    }
}

impl NodeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.node_id == 0 {
            return Err(Error::Config(ConfigError::Message(
                "node_id cannot be 0 (reserved)".into(),
            )));
        }
        Ok(())
    }
}

fn default_node_id() -> NodeId {
    1
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}
