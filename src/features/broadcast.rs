use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::ChannelHandler;
use crate::MessageStore;
use crate::Principal;
use crate::PublishEvent;
use crate::PublishReply;
use crate::Result;
use crate::Status;
use crate::SubscribeEvent;
use crate::SubscribeReply;

/// Echo channel: every publish is stored, then sent to all subscribers.
/// New subscribers get the last stored message as their initial data.
pub struct BroadcastRunner {
    store: Arc<dyn MessageStore>,
}

impl BroadcastRunner {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ChannelHandler for BroadcastRunner {
    async fn on_subscribe(
        &self,
        principal: &Principal,
        event: SubscribeEvent,
    ) -> Result<(SubscribeReply, Status)> {
        let data = self.store.get(principal.org_id, &event.channel).await?;
        Ok((
            SubscribeReply {
                data,
                ..SubscribeReply::with_presence_and_join_leave()
            },
            Status::Ok,
        ))
    }

    async fn on_publish(
        &self,
        principal: &Principal,
        event: PublishEvent,
    ) -> Result<(PublishReply, Status)> {
        self.store
            .save(principal.org_id, &event.channel, event.data.clone())
            .await?;
        debug!(channel = %event.channel, org_id = principal.org_id, "Broadcast message stored");
        Ok((PublishReply::broadcast(event.data), Status::Ok))
    }
}
