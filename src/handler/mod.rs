//! Channel handler capability and the closed set of handler families.

use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::features::BroadcastRunner;
use crate::features::ChatRunner;
use crate::features::CommentRunner;
use crate::features::DashboardRunner;
use crate::features::MetricsSnapshotRunner;
use crate::features::NoticeRunner;
use crate::features::TestDataRunner;
use crate::features::WatchRunner;
use crate::plugin::PluginPathRunner;
use crate::Principal;
use crate::PublishEvent;
use crate::PublishReply;
use crate::Result;
use crate::Status;
use crate::SubscribeEvent;
use crate::SubscribeReply;

/// Pluggable subscribe/publish behavior bound to a channel.
///
/// `Err` is for failures (logged, mapped to a status by kind); a handler
/// that wants to refuse a call returns `Ok` with a non-OK [`Status`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChannelHandler: Send + Sync + 'static {
    async fn on_subscribe(
        &self,
        principal: &Principal,
        event: SubscribeEvent,
    ) -> Result<(SubscribeReply, Status)>;

    async fn on_publish(
        &self,
        principal: &Principal,
        event: PublishEvent,
    ) -> Result<(PublishReply, Status)>;
}

/// Every handler family the registry can resolve to
pub enum Handler {
    Broadcast(Arc<BroadcastRunner>),
    Chat(ChatRunner),
    Comment(Arc<CommentRunner>),
    Dashboard(Arc<DashboardRunner>),
    MetricsSnapshot(MetricsSnapshotRunner),
    Notice(NoticeRunner),
    Plugin(PluginPathRunner),
    TestData(TestDataRunner),
    Watch(Arc<WatchRunner>),
}

impl Handler {
    pub fn family(&self) -> &'static str {
        match self {
            Handler::Broadcast(_) => "broadcast",
            Handler::Chat(_) => "chat",
            Handler::Comment(_) => "comment",
            Handler::Dashboard(_) => "dashboard",
            Handler::MetricsSnapshot(_) => "metrics",
            Handler::Notice(_) => "notice",
            Handler::Plugin(_) => "plugin",
            Handler::TestData(_) => "testdata",
            Handler::Watch(_) => "watch",
        }
    }

    fn as_handler(&self) -> &dyn ChannelHandler {
        match self {
            Handler::Broadcast(h) => h.as_ref(),
            Handler::Chat(h) => h,
            Handler::Comment(h) => h.as_ref(),
            Handler::Dashboard(h) => h.as_ref(),
            Handler::MetricsSnapshot(h) => h,
            Handler::Notice(h) => h,
            Handler::Plugin(h) => h,
            Handler::TestData(h) => h,
            Handler::Watch(h) => h.as_ref(),
        }
    }
}

#[async_trait]
impl ChannelHandler for Handler {
    async fn on_subscribe(
        &self,
        principal: &Principal,
        event: SubscribeEvent,
    ) -> Result<(SubscribeReply, Status)> {
        self.as_handler().on_subscribe(principal, event).await
    }

    async fn on_publish(
        &self,
        principal: &Principal,
        event: PublishEvent,
    ) -> Result<(PublishReply, Status)> {
        self.as_handler().on_publish(principal, event).await
    }
}
