use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::ChannelPublisher;
use super::PresenceOracle;
use crate::channel_key;
use crate::constants::HUB_CHANNEL_CAPACITY;
use crate::OrgId;
use crate::Result;

struct HubChannel {
    sender: broadcast::Sender<Bytes>,
    subscribers: Arc<AtomicUsize>,
}

/// In-process fan-out hub keyed by org-qualified channel
///
/// Each channel owns a `broadcast` sender. Subscriptions are counted through
/// RAII guards, which is what presence reads.
#[derive(Clone)]
pub struct LocalHub {
    channels: Arc<DashMap<String, HubChannel>>,
    capacity: usize,
}

/// A live subscription. Dropping it leaves the channel.
pub struct HubSubscription {
    receiver: broadcast::Receiver<Bytes>,
    guard: SubscriberGuard,
}

struct SubscriberGuard {
    key: String,
    channels: Arc<DashMap<String, HubChannel>>,
    subscribers: Arc<AtomicUsize>,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        let remaining = self.subscribers.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining == 0 {
            self.channels
                .remove_if(&self.key, |_, ch| ch.subscribers.load(Ordering::Acquire) == 0);
        }
        trace!(channel = %self.key, remaining, "Subscriber left");
    }
}

impl Default for LocalHub {
    fn default() -> Self {
        Self::new(HUB_CHANNEL_CAPACITY)
    }
}

impl LocalHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            capacity,
        }
    }

    pub fn subscribe(
        &self,
        org_id: OrgId,
        channel: &str,
    ) -> HubSubscription {
        let key = channel_key(org_id, channel);
        let entry = self.channels.entry(key.clone()).or_insert_with(|| {
            let (sender, _) = broadcast::channel(self.capacity);
            HubChannel {
                sender,
                subscribers: Arc::new(AtomicUsize::new(0)),
            }
        });
        // Counted while the shard lock is held, so a concurrent last-leave
        // cannot remove the entry between the two steps.
        entry.subscribers.fetch_add(1, Ordering::AcqRel);
        let receiver = entry.sender.subscribe();
        let subscribers = entry.subscribers.clone();
        drop(entry);

        debug!(channel = %key, "Subscriber joined");
        HubSubscription {
            receiver,
            guard: SubscriberGuard {
                key,
                channels: self.channels.clone(),
                subscribers,
            },
        }
    }

    pub fn subscriber_count(
        &self,
        channel_key: &str,
    ) -> usize {
        self.channels
            .get(channel_key)
            .map(|ch| ch.subscribers.load(Ordering::Acquire))
            .unwrap_or(0)
    }
}

impl HubSubscription {
    /// Next message, skipping over messages lost to lag. `None` once the
    /// channel is gone.
    pub async fn recv(&mut self) -> Option<Bytes> {
        loop {
            match self.receiver.recv().await {
                Ok(data) => return Some(data),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(channel = %self.guard.key, skipped = n, "Subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> BoxStream<'static, Bytes> {
        let HubSubscription { receiver, guard } = self;
        BroadcastStream::new(receiver)
            .filter_map(move |item| {
                let _keep = &guard;
                futures::future::ready(match item {
                    Ok(data) => Some(data),
                    Err(BroadcastStreamRecvError::Lagged(_)) => None,
                })
            })
            .boxed()
    }
}

#[async_trait]
impl ChannelPublisher for LocalHub {
    async fn publish(
        &self,
        org_id: OrgId,
        channel: &str,
        data: Bytes,
    ) -> Result<()> {
        let key = channel_key(org_id, channel);
        if let Some(ch) = self.channels.get(&key) {
            // Err only means nobody is receiving right now.
            let delivered = ch.sender.send(data).unwrap_or(0);
            trace!(channel = %key, delivered, "Published");
        }
        Ok(())
    }
}

#[async_trait]
impl PresenceOracle for LocalHub {
    async fn num_subscribers(
        &self,
        channel_key: &str,
    ) -> Result<usize> {
        Ok(self.subscriber_count(channel_key))
    }
}
