//! Channel to handler resolution.
//!
//! Dispatch is an explicit match on scope, then namespace. Resolved handlers
//! are cached per org-qualified channel, so a path-bound handler is built once
//! and shared by every subscriber of that channel.


use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::config::FeatureConfig;
use crate::config::StreamConfig;
use crate::features::find_generator;
use crate::features::BroadcastRunner;
use crate::features::ChatRunner;
use crate::features::CommentPermissionChecker;
use crate::features::CommentRunner;
use crate::features::DashboardRunner;
use crate::features::MetricsSnapshotRunner;
use crate::features::NoticeLocks;
use crate::features::NoticeRunner;
use crate::features::ResourceWatcher;
use crate::features::TestDataRunner;
use crate::features::WatchRunner;
use crate::features::METRICS_SNAPSHOTS;
use crate::plugin::PluginEnv;
use crate::plugin::PluginRunner;
use crate::ChannelAddress;
use crate::ChannelPublisher;
use crate::Error;
use crate::Handler;
use crate::LiveStats;
use crate::MessageStore;
use crate::OrgId;
use crate::OrgRole;
use crate::PresenceOracle;
use crate::Result;
use crate::Scope;
use crate::NS_BROADCAST;
use crate::NS_CHAT;
use crate::NS_COMMENT;
use crate::NS_DASHBOARD;
use crate::NS_METRICS;
use crate::NS_NOTICE;
use crate::NS_TESTDATA;

/// Collaborators the handler families are built from
pub struct HandlerDeps {
    pub store: Arc<dyn MessageStore>,
    pub publisher: Arc<dyn ChannelPublisher>,
    pub oracle: Arc<dyn PresenceOracle>,
    pub stats: Arc<LiveStats>,
    pub plugins: Arc<PluginEnv>,
    pub comment_checker: Arc<dyn CommentPermissionChecker>,
    /// Required for `watch/...` channels
    pub watcher: Option<Arc<dyn ResourceWatcher>>,
}

pub struct HandlerRegistry {
    features: FeatureConfig,
    deps: HandlerDeps,
    notice_locks: Arc<NoticeLocks>,

    broadcast: Arc<BroadcastRunner>,
    comment: Arc<CommentRunner>,
    dashboard: Arc<DashboardRunner>,
    watch: Option<Arc<WatchRunner>>,

    cache: DashMap<String, Arc<Handler>>,
}

impl HandlerRegistry {
    pub fn new(
        features: FeatureConfig,
        stream_config: &StreamConfig,
        deps: HandlerDeps,
    ) -> Self {
        let broadcast = Arc::new(BroadcastRunner::new(deps.store.clone()));
        let comment = Arc::new(CommentRunner::new(
            deps.comment_checker.clone(),
            deps.publisher.clone(),
        ));
        let dashboard = Arc::new(DashboardRunner::new(
            deps.publisher.clone(),
            deps.oracle.clone(),
        ));
        let watch = match (&deps.watcher, features.watch_enabled) {
            (Some(watcher), true) => Some(Arc::new(WatchRunner::new(
                watcher.clone(),
                deps.publisher.clone(),
                deps.oracle.clone(),
                stream_config.idle_check_interval(),
                stream_config.idle_zero_threshold,
            ))),
            _ => None,
        };

        Self {
            features,
            deps,
            notice_locks: Arc::new(NoticeLocks::default()),
            broadcast,
            comment,
            dashboard,
            watch,
            cache: DashMap::new(),
        }
    }

    pub fn deps(&self) -> &HandlerDeps {
        &self.deps
    }

    pub fn comment(&self) -> &Arc<CommentRunner> {
        &self.comment
    }

    pub fn dashboard(&self) -> &Arc<DashboardRunner> {
        &self.dashboard
    }

    pub fn watch(&self) -> Option<&Arc<WatchRunner>> {
        self.watch.as_ref()
    }

    /// Resolve the handler of `address`, building and caching it on first use
    ///
    /// # Errors
    /// `NotFound` for unknown scopes, namespaces and paths; backend errors
    /// while resolving a datasource are passed through.
    pub async fn resolve(
        &self,
        address: &ChannelAddress,
    ) -> Result<Arc<Handler>> {
        let key = address.key();
        if let Some(handler) = self.cache.get(&key) {
            return Ok(handler.clone());
        }

        let handler = Arc::new(self.build(address).await?);
        debug!(channel = %key, family = handler.family(), "Handler resolved");
        Ok(self.cache.entry(key).or_insert(handler).clone())
    }

    /// Forget cached handlers bound to a datasource so the next subscribe
    /// resolves it again
    pub fn evict_datasource(
        &self,
        org_id: OrgId,
        uid: &str,
    ) -> usize {
        let prefix = format!("{}/{}/{}/", org_id, Scope::Datasource, uid);
        let before = self.cache.len();
        self.cache.retain(|key, _| !key.starts_with(&prefix));
        before - self.cache.len()
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    async fn build(
        &self,
        address: &ChannelAddress,
    ) -> Result<Handler> {
        let namespace = address.namespace();
        let path = address.path();

        match address.scope() {
            Scope::Grafana => self.grafana_handler(namespace, path).ok_or_else(|| not_found(address)),
            Scope::Plugin => {
                if !self.deps.plugins.backend.supports_streaming(namespace) {
                    return Err(not_found(address));
                }
                let runner = PluginRunner::new(namespace, None, self.deps.plugins.clone());
                Ok(Handler::Plugin(runner.handler_for_path(path)))
            }
            Scope::Datasource => {
                let plugin_id = self
                    .deps
                    .plugins
                    .contexts
                    .datasource_plugin_id(address.org_id(), namespace)
                    .await?
                    .ok_or_else(|| not_found(address))?;
                if !self.deps.plugins.backend.supports_streaming(&plugin_id) {
                    return Err(not_found(address));
                }
                let runner = PluginRunner::new(
                    plugin_id,
                    Some(namespace.to_string()),
                    self.deps.plugins.clone(),
                );
                Ok(Handler::Plugin(runner.handler_for_path(path)))
            }
            Scope::Watch => self
                .watch
                .clone()
                .map(Handler::Watch)
                .ok_or_else(|| not_found(address)),
            Scope::Stream => Err(not_found(address)),
        }
    }

    fn grafana_handler(
        &self,
        namespace: &str,
        path: &str,
    ) -> Option<Handler> {
        let handler = match namespace {
            NS_BROADCAST => Handler::Broadcast(self.broadcast.clone()),
            NS_CHAT if self.features.chat_enabled => Handler::Chat(ChatRunner),
            NS_COMMENT => Handler::Comment(self.comment.clone()),
            NS_DASHBOARD => Handler::Dashboard(self.dashboard.clone()),
            NS_METRICS if METRICS_SNAPSHOTS.contains(&path) => {
                Handler::MetricsSnapshot(MetricsSnapshotRunner::new(
                    path,
                    self.deps.stats.clone(),
                    self.deps.plugins.streams.clone(),
                ))
            }
            NS_NOTICE => Handler::Notice(NoticeRunner::new(
                OrgRole::parse(path)?,
                self.deps.store.clone(),
                self.notice_locks.clone(),
            )),
            NS_TESTDATA if self.features.testdata_enabled => Handler::TestData(TestDataRunner::new(
                find_generator(path)?,
                self.deps.plugins.streams.clone(),
                self.deps.publisher.clone(),
            )),
            _ => return None,
        };
        Some(handler)
    }
}

fn not_found(address: &ChannelAddress) -> Error {
    Error::NotFound(format!("no handler for channel {}", address))
}
