use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::stream::BoxStream;
use futures::StreamExt;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::denied_publish;
use super::subscribe_status;
use crate::channel_key;
use crate::stream::watch_idle;
use crate::stream::IdleOutcome;
use crate::ChannelHandler;
use crate::ChannelPublisher;
use crate::PresenceOracle;
use crate::Principal;
use crate::PublishEvent;
use crate::PublishReply;
use crate::Result;
use crate::Status;
use crate::StreamSender;
use crate::SubscribeEvent;
use crate::SubscribeReply;
use crate::ACTIVE_WATCHES;

/// What to watch, parsed from `watch/{group}/{version}/{resource}[/{namespace}]/{userUid}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    pub group: String,
    pub version: String,
    pub resource: String,
    pub namespace: Option<String>,
    pub user_uid: String,
}

impl WatchTarget {
    /// `channel` is org-less and includes the `watch` scope
    pub fn parse(channel: &str) -> Option<Self> {
        let mut parts = channel.split('/');
        if parts.next() != Some("watch") {
            return None;
        }
        let parts: Vec<&str> = parts.collect();
        let (group, version, resource, namespace, user_uid) = match parts.as_slice() {
            [g, v, r, u] => (g, v, r, None, u),
            [g, v, r, n, u] => (g, v, r, Some(n.to_string()), u),
            _ => return None,
        };
        Some(Self {
            group: group.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
            namespace,
            user_uid: user_uid.to_string(),
        })
    }
}

/// One upstream change, republished as `{"type": ..., "object": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub object: Value,
}

/// Upstream resource watch API
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceWatcher: Send + Sync + 'static {
    /// Open a watch. The stream ends when the upstream connection breaks.
    async fn watch(
        &self,
        principal: &Principal,
        target: WatchTarget,
    ) -> Result<BoxStream<'static, WatchEvent>>;
}

#[derive(Clone)]
struct WatchState {
    done: Arc<AtomicBool>,
    token: CancellationToken,
    /// `Some(opened)` once the upstream watch call has returned
    opened: watch::Receiver<Option<bool>>,
}

impl WatchState {
    fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    fn same(
        &self,
        other: &WatchState,
    ) -> bool {
        Arc::ptr_eq(&self.done, &other.done)
    }
}

/// Bridges upstream watches onto channels, one watch per channel and user
pub struct WatchRunner {
    watcher: Arc<dyn ResourceWatcher>,
    publisher: Arc<dyn ChannelPublisher>,
    oracle: Arc<dyn PresenceOracle>,
    watches: Arc<DashMap<String, WatchState>>,
    idle_period: Duration,
    idle_threshold: u32,
    root: CancellationToken,
}

impl WatchRunner {
    pub fn new(
        watcher: Arc<dyn ResourceWatcher>,
        publisher: Arc<dyn ChannelPublisher>,
        oracle: Arc<dyn PresenceOracle>,
        idle_period: Duration,
        idle_threshold: u32,
    ) -> Self {
        Self {
            watcher,
            publisher,
            oracle,
            watches: Arc::new(DashMap::new()),
            idle_period,
            idle_threshold,
            root: CancellationToken::new(),
        }
    }

    /// Number of watches that are still running
    pub fn active_watches(&self) -> usize {
        self.watches.iter().filter(|w| !w.is_done()).count()
    }

    /// Cancel every open watch
    pub fn stop_all(&self) {
        self.root.cancel();
    }

    fn spawn_bridge(
        &self,
        key: String,
        mut events: BoxStream<'static, WatchEvent>,
        sender: StreamSender,
        state: WatchState,
    ) {
        let watches = self.watches.clone();
        ACTIVE_WATCHES.inc();
        info!(channel = %key, "Watch opened");

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = state.token.cancelled() => {
                        debug!(channel = %key, "Watch canceled");
                        break;
                    }
                    next = events.next() => match next {
                        Some(event) => {
                            if let Err(e) = sender.send_json(&event).await {
                                warn!(channel = %key, "Failed to publish watch event: {:?}", e);
                            }
                        }
                        None => {
                            warn!(channel = %key, "Watch stream closed upstream");
                            break;
                        }
                    }
                }
            }

            state.done.store(true, Ordering::SeqCst);
            state.token.cancel();
            watches.remove_if(&key, |_, current| current.same(&state));
            ACTIVE_WATCHES.dec();
            info!(channel = %key, "Watch closed");
        });
    }

    fn spawn_idle_watchdog(
        &self,
        key: String,
        token: CancellationToken,
    ) {
        let oracle = self.oracle.clone();
        let period = self.idle_period;
        let threshold = self.idle_threshold;
        tokio::spawn(async move {
            if watch_idle(&key, oracle, period, threshold, token.clone()).await == IdleOutcome::Idle {
                debug!(channel = %key, "Watch has no subscribers");
                token.cancel();
            }
        });
    }
}

#[async_trait]
impl ChannelHandler for WatchRunner {
    async fn on_subscribe(
        &self,
        principal: &Principal,
        event: SubscribeEvent,
    ) -> Result<(SubscribeReply, Status)> {
        let Some(target) = WatchTarget::parse(&event.channel) else {
            return subscribe_status(Status::NotFound);
        };
        if !principal.is_admin() || target.user_uid != principal.uid {
            debug!(channel = %event.channel, user = %principal.uid, "Watch denied");
            return subscribe_status(Status::PermissionDenied);
        }

        let key = channel_key(principal.org_id, &event.channel);
        loop {
            let (opened_tx, opened_rx) = watch::channel(None);
            let state = WatchState {
                done: Arc::new(AtomicBool::new(false)),
                token: self.root.child_token(),
                opened: opened_rx,
            };
            let pending = match self.watches.entry(key.clone()) {
                Entry::Occupied(entry) if !entry.get().is_done() => Some(entry.get().clone()),
                Entry::Occupied(mut entry) => {
                    entry.insert(state.clone());
                    None
                }
                Entry::Vacant(entry) => {
                    entry.insert(state.clone());
                    None
                }
            };

            // Another subscriber is opening or holds the watch: share its outcome.
            if let Some(current) = pending {
                let mut opened = current.opened.clone();
                match opened.wait_for(Option::is_some).await.map(|o| *o) {
                    Ok(Some(true)) => {
                        debug!(channel = %key, "Already watching");
                        return Ok((SubscribeReply::with_presence(), Status::Ok));
                    }
                    Ok(_) => {}
                    Err(_) => {
                        self.watches.remove_if(&key, |_, c| c.same(&current));
                    }
                }
                debug!(channel = %key, "Pending watch did not open, retrying");
                continue;
            }

            let events = match self.watcher.watch(principal, target.clone()).await {
                Ok(events) => events,
                Err(e) => {
                    self.watches.remove_if(&key, |_, current| current.same(&state));
                    opened_tx.send_replace(Some(false));
                    return Err(e);
                }
            };
            opened_tx.send_replace(Some(true));

            let sender = StreamSender::new(self.publisher.clone(), principal.org_id, event.channel.as_str());
            self.spawn_idle_watchdog(key.clone(), state.token.clone());
            self.spawn_bridge(key, events, sender, state);
            return Ok((SubscribeReply::with_presence(), Status::Ok));
        }
    }

    async fn on_publish(
        &self,
        _principal: &Principal,
        _event: PublishEvent,
    ) -> Result<(PublishReply, Status)> {
        denied_publish()
    }
}
