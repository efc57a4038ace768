use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::info;

use super::process;
use super::NoticeDocument;
use super::NoticeRequest;
use crate::channel_key;
use crate::features::denied_publish;
use crate::features::subscribe_status;
use crate::utils::time::now_ms;
use crate::ChannelHandler;
use crate::MessageStore;
use crate::OrgId;
use crate::OrgRole;
use crate::Principal;
use crate::PublishEvent;
use crate::PublishReply;
use crate::Result;
use crate::Status;
use crate::SubscribeEvent;
use crate::SubscribeReply;
use crate::ValidationError;

/// Serializes read-modify-write cycles per notice channel
#[derive(Debug, Default)]
pub struct NoticeLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl NoticeLocks {
    fn lock_for(
        &self,
        key: &str,
    ) -> Arc<Mutex<()>> {
        self.locks.entry(key.to_string()).or_default().clone()
    }
}

/// Notices for one role at `grafana/notice/{viewer|editor|admin}`
pub struct NoticeRunner {
    role: OrgRole,
    store: Arc<dyn MessageStore>,
    locks: Arc<NoticeLocks>,
}

impl NoticeRunner {
    pub fn new(
        role: OrgRole,
        store: Arc<dyn MessageStore>,
        locks: Arc<NoticeLocks>,
    ) -> Self {
        Self { role, store, locks }
    }

    pub fn role(&self) -> OrgRole {
        self.role
    }

    async fn load(
        &self,
        org_id: OrgId,
        channel: &str,
    ) -> Result<NoticeDocument> {
        match self.store.get(org_id, channel).await? {
            Some(data) => Ok(serde_json::from_slice(&data)?),
            None => Ok(NoticeDocument::default()),
        }
    }
}

fn stamp(request: NoticeRequest) -> NoticeRequest {
    let now = now_ms();
    match request {
        NoticeRequest::Add { mut notice } => {
            if notice.timestamp == 0 {
                notice.timestamp = now;
            }
            NoticeRequest::Add { notice }
        }
        NoticeRequest::IncludeKind { kind, notice } => {
            let mut notice = notice.unwrap_or_default();
            if notice.timestamp == 0 {
                notice.timestamp = now;
            }
            NoticeRequest::IncludeKind {
                kind,
                notice: Some(notice),
            }
        }
        other => other,
    }
}

#[async_trait]
impl ChannelHandler for NoticeRunner {
    async fn on_subscribe(
        &self,
        principal: &Principal,
        event: SubscribeEvent,
    ) -> Result<(SubscribeReply, Status)> {
        if !principal.has_role(self.role) {
            return subscribe_status(Status::PermissionDenied);
        }
        let data = self.store.get(principal.org_id, &event.channel).await?;
        Ok((
            SubscribeReply {
                data,
                ..Default::default()
            },
            Status::Ok,
        ))
    }

    async fn on_publish(
        &self,
        principal: &Principal,
        event: PublishEvent,
    ) -> Result<(PublishReply, Status)> {
        if !principal.is_admin() {
            return denied_publish();
        }
        let request: NoticeRequest = serde_json::from_slice(&event.data)
            .map_err(|_| ValidationError::InvalidNotice("malformed request"))?;
        let action = request.action();

        let key = channel_key(principal.org_id, &event.channel);
        let lock = self.locks.lock_for(&key);
        let _guard = lock.lock().await;

        let mut doc = self.load(principal.org_id, &event.channel).await?;
        if !process(&mut doc, stamp(request))? {
            debug!(channel = %key, action, "Notice document unchanged");
            return Ok((PublishReply::default(), Status::Ok));
        }

        let data = Bytes::from(serde_json::to_vec(&doc)?);
        self.store
            .save(principal.org_id, &event.channel, data.clone())
            .await?;
        info!(channel = %key, action, notices = doc.notices.len(), "Notice document updated");
        Ok((PublishReply::broadcast(data), Status::Ok))
    }
}
