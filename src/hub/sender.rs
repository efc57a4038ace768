use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;

use super::ChannelPublisher;
use crate::OrgId;
use crate::Result;

/// One-way emitter bound to a single channel, handed to stream bodies
#[derive(Clone)]
pub struct StreamSender {
    publisher: Arc<dyn ChannelPublisher>,
    org_id: OrgId,
    channel: String,
}

impl StreamSender {
    pub fn new(
        publisher: Arc<dyn ChannelPublisher>,
        org_id: OrgId,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            publisher,
            org_id,
            channel: channel.into(),
        }
    }

    pub fn org_id(&self) -> OrgId {
        self.org_id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub async fn send(
        &self,
        data: Bytes,
    ) -> Result<()> {
        self.publisher.publish(self.org_id, &self.channel, data).await
    }

    pub async fn send_json<T: Serialize + ?Sized>(
        &self,
        value: &T,
    ) -> Result<()> {
        self.send(Bytes::from(serde_json::to_vec(value)?)).await
    }
}

impl fmt::Debug for StreamSender {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("StreamSender")
            .field("org_id", &self.org_id)
            .field("channel", &self.channel)
            .finish()
    }
}
