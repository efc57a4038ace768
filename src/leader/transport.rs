use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::timeout;
use tracing::debug;
use tracing::warn;

use super::LeaderSubscribeHandler;
use super::LeaderSubscribeRequest;
use super::LeaderSubscribeResponse;
use super::LeaderTransport;
use super::NodeId;
use crate::NetworkError;
use crate::Result;

/// Routes forwarded subscribes between nodes living in the same process
///
/// Nodes are held weakly so a node can be dropped while others still hold
/// the transport; calls to a dropped node fail as unreachable.
pub struct LocalLeaderTransport {
    nodes: DashMap<NodeId, Weak<dyn LeaderSubscribeHandler>>,
    call_timeout: Duration,
}

impl LocalLeaderTransport {
    pub fn new(call_timeout: Duration) -> Self {
        Self {
            nodes: DashMap::new(),
            call_timeout,
        }
    }

    pub fn register(
        &self,
        node_id: NodeId,
        handler: Arc<dyn LeaderSubscribeHandler>,
    ) {
        debug!(node_id, "Node registered on local transport");
        self.nodes.insert(node_id, Arc::downgrade(&handler));
    }

    pub fn unregister(
        &self,
        node_id: NodeId,
    ) {
        self.nodes.remove(&node_id);
    }
}

#[async_trait]
impl LeaderTransport for LocalLeaderTransport {
    async fn forward_subscribe(
        &self,
        request: LeaderSubscribeRequest,
    ) -> Result<LeaderSubscribeResponse> {
        let node_id = request.leader_node_id;
        let handler = self
            .nodes
            .get(&node_id)
            .and_then(|weak| weak.upgrade())
            .ok_or(NetworkError::NodeUnreachable(node_id))?;

        match timeout(self.call_timeout, handler.handle_leader_subscribe(request)).await {
            Ok(response) => response,
            Err(_) => {
                warn!(node_id, "Forwarded subscribe timed out");
                Err(NetworkError::Timeout {
                    node_id,
                    duration: self.call_timeout,
                }
                .into())
            }
        }
    }
}
