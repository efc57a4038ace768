use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use live_engine::plugin::PluginBackend;
use live_engine::plugin::PluginContext;
use live_engine::plugin::PluginContextProvider;
use live_engine::Error;
use live_engine::LiveConfig;
use live_engine::LiveNode;
use live_engine::LiveNodeBuilder;
use live_engine::NodeId;
use live_engine::OrgId;
use live_engine::OrgRole;
use live_engine::Principal;
use live_engine::Result;
use live_engine::Status;
use live_engine::StorageBackend;
use live_engine::StreamSender;
use once_cell::sync::Lazy;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub const PLUGIN_ID: &str = "testplugin";

static LOGGER_INIT: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    Lazy::force(&LOGGER_INIT);
}

pub fn viewer(org_id: OrgId) -> Principal {
    Principal::new(org_id, 10, "u-viewer", "viewer", OrgRole::Viewer)
}

pub fn editor(org_id: OrgId) -> Principal {
    Principal::new(org_id, 20, "u-editor", "editor", OrgRole::Editor)
}

pub fn node_config(
    node_id: NodeId,
    ha_enabled: bool,
) -> LiveConfig {
    let mut config = LiveConfig::default();
    config.node.node_id = node_id;
    config.node.ha_enabled = ha_enabled;
    config.storage.backend = StorageBackend::Memory;
    config
}

/// A node plus the sender that shuts it down
pub struct TestNode {
    pub node: Arc<LiveNode>,
    pub backend: Arc<CountingBackend>,
    pub shutdown: watch::Sender<()>,
}

impl TestNode {
    /// Build a node around a fresh [`CountingBackend`]; `customize` may add
    /// HA collaborators
    pub fn start(
        config: LiveConfig,
        customize: impl FnOnce(LiveNodeBuilder) -> LiveNodeBuilder,
    ) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(());
        let backend = Arc::new(CountingBackend::new(config.node.node_id));
        let builder = LiveNodeBuilder::init(config, shutdown_rx)
            .plugin_backend(backend.clone())
            .plugin_contexts(Arc::new(KnownPlugins));
        let node = customize(builder).build().unwrap().ready().unwrap();
        Self {
            node,
            backend,
            shutdown,
        }
    }
}

/// Streaming backend that counts calls and tags frames with its node id.
/// `run_stream` sends one frame and then waits for cancellation.
pub struct CountingBackend {
    node_id: NodeId,
    subscribe_calls: AtomicUsize,
    run_calls: AtomicUsize,
}

impl CountingBackend {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            subscribe_calls: AtomicUsize::new(0),
            run_calls: AtomicUsize::new(0),
        }
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn run_calls(&self) -> usize {
        self.run_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PluginBackend for CountingBackend {
    fn supports_streaming(
        &self,
        plugin_id: &str,
    ) -> bool {
        plugin_id == PLUGIN_ID
    }

    async fn subscribe_stream(
        &self,
        _ctx: &PluginContext,
        _path: &str,
    ) -> Result<(Status, Option<Bytes>)> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        Ok((Status::Ok, Some(Bytes::from(format!("{{\"node\":{}}}", self.node_id)))))
    }

    async fn publish_stream(
        &self,
        _ctx: &PluginContext,
        _path: &str,
        _data: Bytes,
    ) -> Result<(Status, Option<Bytes>)> {
        Ok((Status::PermissionDenied, None))
    }

    async fn run_stream(
        &self,
        token: CancellationToken,
        _ctx: PluginContext,
        _path: String,
        sender: StreamSender,
    ) -> Result<()> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        sender.send(Bytes::from(format!("frame from {}", self.node_id))).await?;
        token.cancelled().await;
        Ok(())
    }
}

/// Resolves every plugin id; no datasources exist
pub struct KnownPlugins;

#[async_trait]
impl PluginContextProvider for KnownPlugins {
    async fn get_plugin_context(
        &self,
        principal: &Principal,
        plugin_id: &str,
        datasource_uid: Option<String>,
    ) -> Result<PluginContext> {
        if datasource_uid.is_some() {
            return Err(Error::NotFound("datasource".into()));
        }
        Ok(PluginContext {
            org_id: principal.org_id,
            plugin_id: plugin_id.to_string(),
            datasource_uid,
            user: principal.clone(),
        })
    }

    async fn datasource_plugin_id(
        &self,
        _org_id: OrgId,
        _datasource_uid: &str,
    ) -> Result<Option<String>> {
        Ok(None)
    }
}
