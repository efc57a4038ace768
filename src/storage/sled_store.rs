use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;
use tracing::error;
use tracing::info;

use super::MessageStore;
use super::StoredMessage;
use crate::channel_key;
use crate::constants::MESSAGE_TREE;
use crate::utils::time::now_ms;
use crate::OrgId;
use crate::Result;
use crate::StorageError;

/// Durable store backed by a sled tree; values are bincode-encoded
/// [`StoredMessage`]s keyed by the org-qualified channel
pub struct SledMessageStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledMessageStore {
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path).map_err(StorageError::Sled)?;
        info!(path = %path.display(), "Opened sled message store");
        Self::with_db(db)
    }

    pub fn with_db(db: sled::Db) -> Result<Self> {
        let tree = db.open_tree(MESSAGE_TREE).map_err(StorageError::Sled)?;
        Ok(Self { db, tree })
    }

    pub fn flush(&self) -> Result<usize> {
        Ok(self.db.flush().map_err(StorageError::Sled)?)
    }
}

#[async_trait]
impl MessageStore for SledMessageStore {
    async fn get(
        &self,
        org_id: OrgId,
        channel: &str,
    ) -> Result<Option<Bytes>> {
        let key = channel_key(org_id, channel);
        match self.tree.get(key.as_bytes()).map_err(StorageError::Sled)? {
            Some(v) => {
                let stored: StoredMessage = bincode::deserialize(&v).map_err(|e| {
                    error!(channel = %key, "Corrupted stored message: {}", e);
                    StorageError::Bincode(e)
                })?;
                Ok(Some(Bytes::from(stored.data)))
            }
            None => Ok(None),
        }
    }

    async fn save(
        &self,
        org_id: OrgId,
        channel: &str,
        data: Bytes,
    ) -> Result<()> {
        let key = channel_key(org_id, channel);
        let stored = StoredMessage {
            data: data.to_vec(),
            updated_at_ms: now_ms(),
        };
        let v = bincode::serialize(&stored).map_err(StorageError::Bincode)?;
        self.tree.insert(key.as_bytes(), v).map_err(StorageError::Sled)?;
        debug!(channel = %key, "Saved last message");
        Ok(())
    }
}
