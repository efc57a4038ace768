use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde_json::json;
use serde_json::Value;
use tracing::debug;

use super::denied_publish;
use super::subscribe_status;
use crate::ChannelHandler;
use crate::ChannelPublisher;
use crate::OrgId;
use crate::Principal;
use crate::PublishEvent;
use crate::PublishReply;
use crate::Result;
use crate::Status;
use crate::SubscribeEvent;
use crate::SubscribeReply;
use crate::NS_COMMENT;

/// Object kinds comments can be attached to
pub const COMMENT_OBJECT_TYPES: [&str; 2] = ["dashboard", "annotation"];

/// Read access to the object a comment stream belongs to
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommentPermissionChecker: Send + Sync + 'static {
    async fn can_read(
        &self,
        principal: &Principal,
        object_type: &str,
        object_id: &str,
    ) -> Result<bool>;
}

/// Lets every member of the channel's org read comments
#[derive(Debug, Default, Clone, Copy)]
pub struct OrgMemberCommentChecker;

#[async_trait]
impl CommentPermissionChecker for OrgMemberCommentChecker {
    async fn can_read(
        &self,
        _principal: &Principal,
        _object_type: &str,
        _object_id: &str,
    ) -> Result<bool> {
        Ok(true)
    }
}

/// Comment streams at `grafana/comment/{dashboard|annotation}/{id}`.
/// Comments are written elsewhere; this runner only fans them out.
pub struct CommentRunner {
    checker: Arc<dyn CommentPermissionChecker>,
    publisher: Arc<dyn ChannelPublisher>,
}

impl CommentRunner {
    pub fn new(
        checker: Arc<dyn CommentPermissionChecker>,
        publisher: Arc<dyn ChannelPublisher>,
    ) -> Self {
        Self { checker, publisher }
    }

    /// Push a freshly created comment to the object's subscribers
    pub async fn comment_created(
        &self,
        org_id: OrgId,
        object_type: &str,
        object_id: &str,
        comment: &Value,
    ) -> Result<()> {
        let channel = format!("grafana/{}/{}/{}", NS_COMMENT, object_type, object_id);
        let payload = json!({
            "event": "commentCreated",
            "commentCreated": comment,
        });
        self.publisher
            .publish(org_id, &channel, serde_json::to_vec(&payload)?.into())
            .await
    }
}

fn split_object(path: &str) -> Option<(&str, &str)> {
    let (object_type, object_id) = path.split_once('/')?;
    if !COMMENT_OBJECT_TYPES.contains(&object_type) || object_id.is_empty() || object_id.contains('/') {
        return None;
    }
    Some((object_type, object_id))
}

#[async_trait]
impl ChannelHandler for CommentRunner {
    async fn on_subscribe(
        &self,
        principal: &Principal,
        event: SubscribeEvent,
    ) -> Result<(SubscribeReply, Status)> {
        let Some((object_type, object_id)) = split_object(&event.path) else {
            return subscribe_status(Status::NotFound);
        };
        if !self.checker.can_read(principal, object_type, object_id).await? {
            debug!(channel = %event.channel, user = principal.user_id, "Comment read denied");
            return subscribe_status(Status::PermissionDenied);
        }
        Ok((SubscribeReply::default(), Status::Ok))
    }

    async fn on_publish(
        &self,
        _principal: &Principal,
        _event: PublishEvent,
    ) -> Result<(PublishReply, Status)> {
        denied_publish()
    }
}
