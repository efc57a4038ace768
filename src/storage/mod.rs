//! Last-message-per-channel storage.
//!
//! Used by recover-on-subscribe, the broadcast feature and the notice
//! runner. Keys are `(org_id, org-less channel)`.

mod memory;
mod sled_store;
pub use memory::*;
pub use sled_store::*;


use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;

use crate::config::StorageBackend;
use crate::config::StorageConfig;
use crate::OrgId;
use crate::Result;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageStore: Send + Sync + 'static {
    /// Last message saved on the channel, `None` if nothing was ever saved
    async fn get(
        &self,
        org_id: OrgId,
        channel: &str,
    ) -> Result<Option<Bytes>>;

    async fn save(
        &self,
        org_id: OrgId,
        channel: &str,
        data: Bytes,
    ) -> Result<()>;
}

/// Stored representation of a channel's last message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub data: Vec<u8>,
    pub updated_at_ms: u64,
}

/// Open the store selected by configuration
pub fn open_message_store(config: &StorageConfig) -> Result<Arc<dyn MessageStore>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryMessageStore::default())),
        StorageBackend::Sled => Ok(Arc::new(SledMessageStore::open(&config.db_path)?)),
    }
}
