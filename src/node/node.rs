//! A running live node.
//!
//! ## Key Responsibilities
//! - Owns the [`LiveService`] the transport layer calls into
//! - Exposes the in-process hub subscribers attach to
//! - Tracks readiness and tears background work down on shutdown
//!
//! ## Example Usage
//! ```ignore
//! let node = LiveNodeBuilder::init(config, shutdown_rx).build()?.ready()?;
//! tokio::spawn(async move {
//!     node.run().await.expect("live node execution failed");
//! });
//! ```

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::stream::StreamManagerHandle;
use crate::LiveConfig;
use crate::LiveService;
use crate::LocalHub;
use crate::LocalLeaderTransport;
use crate::NodeId;
use crate::Result;

pub struct LiveNode {
    pub(crate) node_id: NodeId,
    pub(crate) config: Arc<LiveConfig>,
    pub(crate) service: Arc<LiveService>,
    pub(crate) hub: LocalHub,
    pub(crate) streams: StreamManagerHandle,
    pub(crate) local_transport: Option<Arc<LocalLeaderTransport>>,
    pub(crate) ready: AtomicBool,
    pub(crate) shutdown_signal: watch::Receiver<()>,
}

impl LiveNode {
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn config(&self) -> &Arc<LiveConfig> {
        &self.config
    }

    pub fn service(&self) -> &Arc<LiveService> {
        &self.service
    }

    /// In-process hub; only carries traffic when no custom publisher was set
    pub fn hub(&self) -> &LocalHub {
        &self.hub
    }

    pub fn streams(&self) -> &StreamManagerHandle {
        &self.streams
    }

    /// Serve until the shutdown signal fires, then stop background work
    pub async fn run(&self) -> Result<()> {
        self.set_ready(true);
        info!(node_id = self.node_id, "Live node ready");

        let mut shutdown = self.shutdown_signal.clone();
        let _ = shutdown.changed().await;

        info!(node_id = self.node_id, "Live node shutting down");
        self.stop();
        Ok(())
    }

    /// Cancel watches and leave the leader transport. Plugin and generator
    /// streams stop with the stream manager on the shutdown signal.
    pub fn stop(&self) {
        self.set_ready(false);
        self.service.stop();
        if let Some(transport) = &self.local_transport {
            transport.unregister(self.node_id);
        }
    }

    pub fn set_ready(
        &self,
        is_ready: bool,
    ) {
        self.ready.store(is_ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}
