use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use super::denied_publish;
use super::subscribe_status;
use crate::stream::StreamManagerHandle;
use crate::ChannelHandler;
use crate::LiveStats;
use crate::Principal;
use crate::PublishEvent;
use crate::PublishReply;
use crate::Result;
use crate::Status;
use crate::SubscribeEvent;
use crate::SubscribeReply;

/// Snapshot names served under `grafana/metrics/`
pub const METRICS_SNAPSHOTS: [&str; 2] = ["live", "streams"];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StreamSummary {
    key: String,
    channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    plugin_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    datasource_uid: Option<String>,
}

/// Point-in-time JSON view of live usage, delivered as the subscribe reply
pub struct MetricsSnapshotRunner {
    name: String,
    stats: Arc<LiveStats>,
    streams: StreamManagerHandle,
}

impl MetricsSnapshotRunner {
    pub fn new(
        name: impl Into<String>,
        stats: Arc<LiveStats>,
        streams: StreamManagerHandle,
    ) -> Self {
        Self {
            name: name.into(),
            stats,
            streams,
        }
    }

    async fn snapshot(&self) -> Result<Option<Vec<u8>>> {
        let data = match self.name.as_str() {
            "live" => serde_json::to_vec(&self.stats.snapshot())?,
            "streams" => {
                let streams: Vec<StreamSummary> = self
                    .streams
                    .list_streams()
                    .await?
                    .into_iter()
                    .map(|s| StreamSummary {
                        key: s.key,
                        channel: s.meta.channel,
                        plugin_id: s.meta.plugin_id,
                        datasource_uid: s.meta.datasource_uid,
                    })
                    .collect();
                serde_json::to_vec(&streams)?
            }
            _ => return Ok(None),
        };
        Ok(Some(data))
    }
}

#[async_trait]
impl ChannelHandler for MetricsSnapshotRunner {
    async fn on_subscribe(
        &self,
        _principal: &Principal,
        _event: SubscribeEvent,
    ) -> Result<(SubscribeReply, Status)> {
        match self.snapshot().await? {
            Some(data) => Ok((
                SubscribeReply {
                    data: Some(data.into()),
                    ..Default::default()
                },
                Status::Ok,
            )),
            None => subscribe_status(Status::NotFound),
        }
    }

    async fn on_publish(
        &self,
        _principal: &Principal,
        _event: PublishEvent,
    ) -> Result<(PublishReply, Status)> {
        denied_publish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use tokio::sync::watch;

    use super::*;
    use crate::config::StreamConfig;
    use crate::stream::StreamManager;
    use crate::test_utils::ScriptedOracle;
    use crate::test_utils::viewer;
    use crate::Scope;

    fn handle() -> (StreamManagerHandle, watch::Sender<()>) {
        let (tx, rx) = watch::channel(());
        let (manager, handle) =
            StreamManager::new(StreamConfig::default(), ScriptedOracle::constant(1), rx);
        tokio::spawn(manager.run());
        (handle, tx)
    }

    #[tokio::test]
    async fn live_snapshot_reports_usage() {
        let (streams, _shutdown) = handle();
        let stats = Arc::new(LiveStats::default());
        stats.record_subscribe(Scope::Grafana);
        let runner = MetricsSnapshotRunner::new("live", stats, streams);

        let (reply, status) = runner
            .on_subscribe(&viewer(1), SubscribeEvent::new("grafana/metrics/live", "live"))
            .await
            .unwrap();

        assert_eq!(status, Status::Ok);
        let snapshot: Value = serde_json::from_slice(&reply.data.unwrap()).unwrap();
        assert_eq!(snapshot["subscribes"], 1);
        assert_eq!(snapshot["subscriptionsByScope"]["grafana"], 1);
    }

    #[tokio::test]
    async fn unknown_snapshot_and_publish_are_refused() {
        let (streams, _shutdown) = handle();
        let runner = MetricsSnapshotRunner::new("nope", Arc::new(LiveStats::default()), streams);

        let (_, status) = runner
            .on_subscribe(&viewer(1), SubscribeEvent::new("grafana/metrics/nope", "nope"))
            .await
            .unwrap();
        assert_eq!(status, Status::NotFound);

        let (_, status) = runner
            .on_publish(&viewer(1), PublishEvent::new("grafana/metrics/nope", "nope", "{}"))
            .await
            .unwrap();
        assert_eq!(status, Status::PermissionDenied);
    }
}
