//! A builder pattern implementation for constructing a [`LiveNode`].
//!
//! The [`LiveNodeBuilder`] provides a fluent interface to assemble the
//! collaborators a live node dispatches through: the last-message store, the
//! fan-out hub, plugin backends, the resource watcher and, in HA mode, the
//! leader coordinator and transport.
//!
//! ## Key Design Points
//! - **Default Components**: the in-process [`LocalHub`], the store selected by
//!   `storage.backend`, no streaming plugins, an in-memory lease table.
//! - **Customization**: every default can be overridden through a setter.
//! - **Lifecycle Management**:
//!   - `build()`: assembles the [`LiveNode`] and spawns the stream manager.
//!   - `start_metrics_server()`: launches the Prometheus endpoint.
//!   - `ready()`: returns the initialized [`LiveNode`].
//!
//! ## Example
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(());
//! let node = LiveNodeBuilder::init(config, shutdown_rx)
//!     .plugin_backend(my_backend)
//!     .build()?
//!     .start_metrics_server(shutdown_tx.subscribe())
//!     .ready()?;
//! ```

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;
use tracing::info;

use super::LiveNode;
use crate::features::CommentPermissionChecker;
use crate::features::OrgMemberCommentChecker;
use crate::features::ResourceWatcher;
use crate::metrics;
use crate::open_message_store;
use crate::plugin::LeaderRouting;
use crate::plugin::NoPlugins;
use crate::plugin::PluginBackend;
use crate::plugin::PluginContextProvider;
use crate::plugin::PluginEnv;
use crate::stream::StreamManager;
use crate::ChannelPublisher;
use crate::HandlerDeps;
use crate::HandlerRegistry;
use crate::InMemoryLeaderCoordinator;
use crate::LeaderCoordinator;
use crate::LeaderTransport;
use crate::LiveConfig;
use crate::LiveService;
use crate::LiveStats;
use crate::LocalHub;
use crate::LocalLeaderTransport;
use crate::MessageStore;
use crate::PresenceOracle;
use crate::Result;
use crate::SystemError;

/// Builder for a live node with configurable collaborators
pub struct LiveNodeBuilder {
    pub(super) config: LiveConfig,
    pub(super) store: Option<Arc<dyn MessageStore>>,
    pub(super) hub: Option<LocalHub>,
    pub(super) publisher: Option<Arc<dyn ChannelPublisher>>,
    pub(super) oracle: Option<Arc<dyn PresenceOracle>>,
    pub(super) plugin_backend: Option<Arc<dyn PluginBackend>>,
    pub(super) plugin_contexts: Option<Arc<dyn PluginContextProvider>>,
    pub(super) comment_checker: Option<Arc<dyn CommentPermissionChecker>>,
    pub(super) resource_watcher: Option<Arc<dyn ResourceWatcher>>,
    pub(super) coordinator: Option<Arc<dyn LeaderCoordinator>>,
    pub(super) transport: Option<Arc<dyn LeaderTransport>>,
    pub(super) local_transport: Option<Arc<LocalLeaderTransport>>,
    pub(super) shutdown_signal: watch::Receiver<()>,

    pub(super) node: Option<Arc<LiveNode>>,
}

impl LiveNodeBuilder {
    /// Loads configuration (defaults, `CONFIG_PATH`, `LIVE__*` environment),
    /// applies `config_path` on top and validates the result
    pub fn new(
        config_path: Option<&str>,
        shutdown_signal: watch::Receiver<()>,
    ) -> Result<Self> {
        let mut config = LiveConfig::new()?;
        if let Some(p) = config_path {
            info!("with_override_config from: {}", p);
            config = config.with_override_config(p)?;
        }
        Ok(Self::init(config.validate()?, shutdown_signal))
    }

    /// Core initialization logic shared by all construction paths
    pub fn init(
        config: LiveConfig,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            config,
            store: None,
            hub: None,
            publisher: None,
            oracle: None,
            plugin_backend: None,
            plugin_contexts: None,
            comment_checker: None,
            resource_watcher: None,
            coordinator: None,
            transport: None,
            local_transport: None,
            shutdown_signal,
            node: None,
        }
    }

    /// Sets a custom last-message store
    pub fn store(
        mut self,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the in-process hub used for fan-out and presence, unless a
    /// publisher or oracle is set explicitly
    pub fn hub(
        mut self,
        hub: LocalHub,
    ) -> Self {
        self.hub = Some(hub);
        self
    }

    pub fn publisher(
        mut self,
        publisher: Arc<dyn ChannelPublisher>,
    ) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn presence_oracle(
        mut self,
        oracle: Arc<dyn PresenceOracle>,
    ) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Sets the streaming plugin backend
    pub fn plugin_backend(
        mut self,
        backend: Arc<dyn PluginBackend>,
    ) -> Self {
        self.plugin_backend = Some(backend);
        self
    }

    pub fn plugin_contexts(
        mut self,
        contexts: Arc<dyn PluginContextProvider>,
    ) -> Self {
        self.plugin_contexts = Some(contexts);
        self
    }

    pub fn comment_checker(
        mut self,
        checker: Arc<dyn CommentPermissionChecker>,
    ) -> Self {
        self.comment_checker = Some(checker);
        self
    }

    /// Sets the upstream watch API; `watch/...` channels also require
    /// `features.watch_enabled`
    pub fn resource_watcher(
        mut self,
        watcher: Arc<dyn ResourceWatcher>,
    ) -> Self {
        self.resource_watcher = Some(watcher);
        self
    }

    /// Sets the lease table shared with the other nodes (HA only)
    pub fn leader_coordinator(
        mut self,
        coordinator: Arc<dyn LeaderCoordinator>,
    ) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Sets a custom transport for forwarded subscribes (HA only)
    pub fn leader_transport(
        mut self,
        transport: Arc<dyn LeaderTransport>,
    ) -> Self {
        self.transport = Some(transport);
        self.local_transport = None;
        self
    }

    /// Joins an in-process transport; the built node registers itself on it
    pub fn local_transport(
        mut self,
        transport: Arc<LocalLeaderTransport>,
    ) -> Self {
        self.transport = Some(transport.clone());
        self.local_transport = Some(transport);
        self
    }

    /// Replaces the entire node configuration
    pub fn config(
        mut self,
        config: LiveConfig,
    ) -> Self {
        self.config = config;
        self
    }

    /// Finalizes the builder and constructs the live node.
    ///
    /// Initializes default implementations for any unconfigured components
    /// and spawns the stream manager loop.
    ///
    /// # Errors
    /// Fails when the configured store cannot be opened.
    pub fn build(mut self) -> Result<Self> {
        let config = self.config.clone();
        let node_id = config.node.node_id;

        let store = match self.store.take() {
            Some(store) => store,
            None => open_message_store(&config.storage)?,
        };
        let hub = self.hub.take().unwrap_or_default();
        let publisher = self
            .publisher
            .take()
            .unwrap_or_else(|| Arc::new(hub.clone()));
        let oracle = self.oracle.take().unwrap_or_else(|| Arc::new(hub.clone()));

        let (manager, streams) = StreamManager::new(
            config.stream.clone(),
            oracle.clone(),
            self.shutdown_signal.clone(),
        );
        tokio::spawn(manager.run());

        let (coordinator, leader, local_transport) = if config.node.ha_enabled {
            let coordinator = self.coordinator.take().unwrap_or_else(|| {
                Arc::new(InMemoryLeaderCoordinator::new(config.leader.lease_ttl()))
            });
            let (transport, local_transport): (Arc<dyn LeaderTransport>, _) = match self.transport.take() {
                Some(transport) => (transport, self.local_transport.take()),
                None => {
                    let local = Arc::new(LocalLeaderTransport::new(config.leader.forward_timeout()));
                    (local.clone(), Some(local))
                }
            };
            let leader = LeaderRouting {
                node_id,
                coordinator: coordinator.clone(),
                transport,
                renew_interval: config.leader.renew_interval(),
            };
            (Some(coordinator), Some(leader), local_transport)
        } else {
            debug!(node_id, "HA disabled, plugin streams run on every node");
            (None, None, None)
        };

        let plugins = Arc::new(PluginEnv {
            backend: self.plugin_backend.take().unwrap_or_else(|| Arc::new(NoPlugins)),
            contexts: self.plugin_contexts.take().unwrap_or_else(|| Arc::new(NoPlugins)),
            streams: streams.clone(),
            publisher: publisher.clone(),
            leader,
        });
        let deps = HandlerDeps {
            store,
            publisher,
            oracle,
            stats: Arc::new(LiveStats::default()),
            plugins,
            comment_checker: self
                .comment_checker
                .take()
                .unwrap_or_else(|| Arc::new(OrgMemberCommentChecker)),
            watcher: self.resource_watcher.take(),
        };
        let registry = Arc::new(HandlerRegistry::new(
            config.features.clone(),
            &config.stream,
            deps,
        ));
        let service = Arc::new(LiveService::new(node_id, registry, coordinator));

        if let Some(transport) = &local_transport {
            transport.register(node_id, service.clone());
        }

        let node = LiveNode {
            node_id,
            config: Arc::new(config),
            service,
            hub,
            streams,
            local_transport,
            ready: AtomicBool::new(false),
            shutdown_signal: self.shutdown_signal.clone(),
        };
        info!(node_id, "Live node built");

        self.node = Some(Arc::new(node));
        Ok(self)
    }

    /// Spawns the `/metrics` endpoint when `monitoring.prometheus_enabled` is set.
    pub fn start_metrics_server(
        self,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        if let Some(port) = self.config.monitoring.metrics_port() {
            tokio::spawn(async move {
                metrics::start_server(port, shutdown_signal).await;
            });
        }
        self
    }

    /// Returns the built node instance after successful construction.
    ///
    /// # Errors
    /// Returns `SystemError::NodeStartFailed` if build hasn't completed
    pub fn ready(self) -> Result<Arc<LiveNode>> {
        self.node
            .ok_or_else(|| SystemError::NodeStartFailed("node was not built".to_string()).into())
    }
}
