use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use super::denied_publish;
use super::subscribe_status;
use crate::channel_key;
use crate::utils::time::now_ms;
use crate::ChannelHandler;
use crate::ChannelPublisher;
use crate::OrgId;
use crate::OrgRole;
use crate::PresenceOracle;
use crate::Principal;
use crate::PublishEvent;
use crate::PublishReply;
use crate::Result;
use crate::Status;
use crate::SubscribeEvent;
use crate::SubscribeReply;
use crate::UserDisplay;
use crate::NS_DASHBOARD;

pub const ACTION_SAVED: &str = "saved";
pub const ACTION_DELETED: &str = "deleted";
pub const ACTION_EDITING_STARTED: &str = "editing-started";

const GITOPS_PATH: &str = "gitops";

/// Dashboard activity event, both client-published and server-generated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardEvent {
    pub uid: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserDisplay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(default)]
    pub timestamp: u64,
}

/// Dashboard activity at `grafana/dashboard/uid/{uid}` and the admin-only
/// change feed at `grafana/dashboard/gitops`
pub struct DashboardRunner {
    publisher: Arc<dyn ChannelPublisher>,
    oracle: Arc<dyn PresenceOracle>,
}

enum DashboardPath<'a> {
    Gitops,
    Uid(&'a str),
}

fn parse_path(path: &str) -> Option<DashboardPath<'_>> {
    if path == GITOPS_PATH {
        return Some(DashboardPath::Gitops);
    }
    match path.split_once('/') {
        Some(("uid", uid)) if !uid.is_empty() && !uid.contains('/') => Some(DashboardPath::Uid(uid)),
        _ => None,
    }
}

impl DashboardRunner {
    pub fn new(
        publisher: Arc<dyn ChannelPublisher>,
        oracle: Arc<dyn PresenceOracle>,
    ) -> Self {
        Self { publisher, oracle }
    }

    fn uid_channel(uid: &str) -> String {
        format!("grafana/{}/uid/{}", NS_DASHBOARD, uid)
    }

    fn gitops_channel() -> String {
        format!("grafana/{}/{}", NS_DASHBOARD, GITOPS_PATH)
    }

    /// True when at least one admin listens on the gitops feed of the org
    pub async fn has_gitops_observer(
        &self,
        org_id: OrgId,
    ) -> Result<bool> {
        let count = self
            .oracle
            .num_subscribers(&channel_key(org_id, &Self::gitops_channel()))
            .await?;
        Ok(count > 0)
    }

    pub async fn dashboard_saved(
        &self,
        org_id: OrgId,
        user: UserDisplay,
        uid: &str,
        version: i64,
        message: Option<String>,
    ) -> Result<()> {
        let event = DashboardEvent {
            uid: uid.to_string(),
            action: ACTION_SAVED.to_string(),
            user: Some(user),
            session_id: None,
            message,
            version: Some(version),
            timestamp: now_ms(),
        };
        self.notify(org_id, &event).await
    }

    pub async fn dashboard_deleted(
        &self,
        org_id: OrgId,
        user: UserDisplay,
        uid: &str,
    ) -> Result<()> {
        let event = DashboardEvent {
            uid: uid.to_string(),
            action: ACTION_DELETED.to_string(),
            user: Some(user),
            session_id: None,
            message: None,
            version: None,
            timestamp: now_ms(),
        };
        self.notify(org_id, &event).await
    }

    /// Publish on the dashboard's channel, and on the gitops feed when
    /// somebody is listening there
    async fn notify(
        &self,
        org_id: OrgId,
        event: &DashboardEvent,
    ) -> Result<()> {
        let data = Bytes::from(serde_json::to_vec(event)?);
        self.publisher
            .publish(org_id, &Self::uid_channel(&event.uid), data.clone())
            .await?;
        if self.has_gitops_observer(org_id).await? {
            debug!(org_id, uid = %event.uid, "Forwarding dashboard event to gitops feed");
            self.publisher
                .publish(org_id, &Self::gitops_channel(), data)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelHandler for DashboardRunner {
    async fn on_subscribe(
        &self,
        principal: &Principal,
        event: SubscribeEvent,
    ) -> Result<(SubscribeReply, Status)> {
        match parse_path(&event.path) {
            Some(DashboardPath::Gitops) if principal.is_admin() => {
                Ok((SubscribeReply::with_presence(), Status::Ok))
            }
            Some(DashboardPath::Gitops) => subscribe_status(Status::PermissionDenied),
            Some(DashboardPath::Uid(_)) => {
                Ok((SubscribeReply::with_presence_and_join_leave(), Status::Ok))
            }
            None => subscribe_status(Status::NotFound),
        }
    }

    async fn on_publish(
        &self,
        principal: &Principal,
        event: PublishEvent,
    ) -> Result<(PublishReply, Status)> {
        let uid = match parse_path(&event.path) {
            Some(DashboardPath::Uid(uid)) => uid,
            Some(DashboardPath::Gitops) => return denied_publish(),
            None => return Ok((PublishReply::default(), Status::NotFound)),
        };
        if !principal.has_role(OrgRole::Editor) {
            return denied_publish();
        }

        let Ok(mut activity) = serde_json::from_slice::<DashboardEvent>(&event.data) else {
            return Ok((PublishReply::default(), Status::NotFound));
        };
        if activity.uid != uid || activity.action != ACTION_EDITING_STARTED {
            debug!(channel = %event.channel, action = %activity.action, "Ignoring dashboard event");
            return Ok((PublishReply::default(), Status::NotFound));
        }

        activity.user = Some(UserDisplay::from(principal));
        activity.timestamp = now_ms();
        Ok((
            PublishReply::broadcast(serde_json::to_vec(&activity)?),
            Status::Ok,
        ))
    }
}
