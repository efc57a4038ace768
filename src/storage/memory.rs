use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use super::MessageStore;
use super::StoredMessage;
use crate::utils::time::now_ms;
use crate::OrgId;
use crate::Result;

/// Process-local store, lost on restart
#[derive(Debug, Default)]
pub struct MemoryMessageStore {
    messages: DashMap<(OrgId, String), StoredMessage>,
}

impl MemoryMessageStore {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn get(
        &self,
        org_id: OrgId,
        channel: &str,
    ) -> Result<Option<Bytes>> {
        Ok(self
            .messages
            .get(&(org_id, channel.to_string()))
            .map(|m| Bytes::from(m.data.clone())))
    }

    async fn save(
        &self,
        org_id: OrgId,
        channel: &str,
        data: Bytes,
    ) -> Result<()> {
        self.messages.insert(
            (org_id, channel.to_string()),
            StoredMessage {
                data: data.to_vec(),
                updated_at_ms: now_ms(),
            },
        );
        Ok(())
    }
}
