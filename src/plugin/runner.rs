use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::interval_at;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::PluginBackend;
use super::PluginContextProvider;
use crate::channel_key;
use crate::stream::StreamManagerHandle;
use crate::stream::StreamMeta;
use crate::stream::StreamTask;
use crate::ChannelHandler;
use crate::ChannelPublisher;
use crate::LeaderCoordinator;
use crate::LeaderError;
use crate::LeaderLease;
use crate::LeaderSubscribeRequest;
use crate::LeaderTransport;
use crate::LeadershipToken;
use crate::NodeId;
use crate::Principal;
use crate::PublishEvent;
use crate::PublishReply;
use crate::Result;
use crate::Status;
use crate::StreamSender;
use crate::SubscribeEvent;
use crate::SubscribeReply;
use crate::LEADER_FORWARDS;

/// HA routing collaborators; absent on single-node deployments
#[derive(Clone)]
pub struct LeaderRouting {
    pub node_id: NodeId,
    pub coordinator: Arc<dyn LeaderCoordinator>,
    pub transport: Arc<dyn LeaderTransport>,
    /// How often a running leader stream re-checks its lease
    pub renew_interval: Duration,
}

/// Shared collaborators of every plugin runner
#[derive(Clone)]
pub struct PluginEnv {
    pub backend: Arc<dyn PluginBackend>,
    pub contexts: Arc<dyn PluginContextProvider>,
    pub streams: StreamManagerHandle,
    pub publisher: Arc<dyn ChannelPublisher>,
    pub leader: Option<LeaderRouting>,
}

/// Binds a plugin (optionally through a datasource) to the channel tree
pub struct PluginRunner {
    plugin_id: String,
    datasource_uid: Option<String>,
    env: Arc<PluginEnv>,
}

impl PluginRunner {
    pub fn new(
        plugin_id: impl Into<String>,
        datasource_uid: Option<String>,
        env: Arc<PluginEnv>,
    ) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            datasource_uid,
            env,
        }
    }

    pub fn handler_for_path(
        &self,
        path: &str,
    ) -> PluginPathRunner {
        PluginPathRunner {
            plugin_id: self.plugin_id.clone(),
            datasource_uid: self.datasource_uid.clone(),
            path: path.to_string(),
            env: self.env.clone(),
        }
    }
}

/// Channel handler for one plugin path
pub struct PluginPathRunner {
    plugin_id: String,
    datasource_uid: Option<String>,
    path: String,
    env: Arc<PluginEnv>,
}

impl PluginPathRunner {
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    async fn forward_to_leader(
        &self,
        routing: &LeaderRouting,
        principal: &Principal,
        event: SubscribeEvent,
        lease: LeaderLease,
    ) -> Result<(SubscribeReply, Status)> {
        debug!(
            channel = %event.channel,
            leader = lease.node_id,
            "Forwarding subscribe to channel leader"
        );
        let request = LeaderSubscribeRequest {
            org_id: principal.org_id,
            channel: event.channel.clone(),
            leader_node_id: lease.node_id,
            token: lease.token,
            principal: principal.clone(),
            event,
        };

        match routing.transport.forward_subscribe(request).await {
            Ok(response) => {
                LEADER_FORWARDS.with_label_values(&["ok"]).inc();
                Ok((response.reply, response.status))
            }
            Err(e) => {
                LEADER_FORWARDS.with_label_values(&["error"]).inc();
                error!(leader = lease.node_id, "Leader subscribe failed: {:?}", e);
                Err(e)
            }
        }
    }

    fn stream_task(
        &self,
        principal: Principal,
        channel: &str,
        fence: Option<Fence>,
    ) -> StreamTask {
        let meta = StreamMeta::new(principal.org_id, channel)
            .with_plugin(self.plugin_id.clone(), self.datasource_uid.clone());
        let sender = StreamSender::new(self.env.publisher.clone(), principal.org_id, channel);
        let env = self.env.clone();
        let plugin_id = self.plugin_id.clone();
        let datasource_uid = self.datasource_uid.clone();
        let path = self.path.clone();

        StreamTask::new(meta, move |token| {
            let env = env.clone();
            let principal = principal.clone();
            let plugin_id = plugin_id.clone();
            let datasource_uid = datasource_uid.clone();
            let path = path.clone();
            let sender = sender.clone();
            let fence = fence.clone();
            async move {
                // Re-resolved per attempt so datasource updates take effect
                let ctx = env
                    .contexts
                    .get_plugin_context(&principal, &plugin_id, datasource_uid)
                    .await?;
                let backend = env.backend.clone();
                let run = move |token: CancellationToken| async move {
                    backend.run_stream(token, ctx, path, sender).await
                };
                match fence {
                    Some(fence) => fence.guard(token, run).await,
                    None => run(token).await,
                }
            }
        })
    }
}

#[async_trait]
impl ChannelHandler for PluginPathRunner {
    async fn on_subscribe(
        &self,
        principal: &Principal,
        event: SubscribeEvent,
    ) -> Result<(SubscribeReply, Status)> {
        let ctx = self
            .env
            .contexts
            .get_plugin_context(principal, &self.plugin_id, self.datasource_uid.clone())
            .await?;
        let key = channel_key(principal.org_id, &event.channel);

        let mut fence = None;
        if let Some(routing) = &self.env.leader {
            match &event.leader_token {
                Some(token) => fence = Some(Fence::new(routing, &key, token.clone())),
                None => {
                    let candidate = LeadershipToken::generate();
                    let lease = routing
                        .coordinator
                        .get_or_create_leader(&key, routing.node_id, &candidate)
                        .await?;
                    if lease.node_id != routing.node_id {
                        return self.forward_to_leader(routing, principal, event, lease).await;
                    }
                    fence = Some(Fence::new(routing, &key, lease.token));
                }
            }
        }

        let (status, data) = self.env.backend.subscribe_stream(&ctx, &self.path).await?;
        if !status.is_ok() {
            debug!(channel = %key, status = status.as_str(), "Plugin refused subscription");
            return Ok((SubscribeReply::default(), status));
        }

        let task = self.stream_task(principal.clone(), &event.channel, fence);
        self.env.streams.submit_stream(key, task).await?;

        Ok((
            SubscribeReply {
                data,
                ..SubscribeReply::with_presence()
            },
            Status::Ok,
        ))
    }

    async fn on_publish(
        &self,
        principal: &Principal,
        event: PublishEvent,
    ) -> Result<(PublishReply, Status)> {
        let ctx = self
            .env
            .contexts
            .get_plugin_context(principal, &self.plugin_id, self.datasource_uid.clone())
            .await?;
        let (status, data) = self
            .env
            .backend
            .publish_stream(&ctx, &self.path, event.data)
            .await?;
        if !status.is_ok() {
            return Ok((PublishReply::default(), status));
        }
        Ok((PublishReply { data }, Status::Ok))
    }
}

/// Lease check wrapped around a leader's stream body
#[derive(Clone)]
struct Fence {
    coordinator: Arc<dyn LeaderCoordinator>,
    node_id: NodeId,
    key: String,
    token: LeadershipToken,
    renew_interval: Duration,
}

impl Fence {
    fn new(
        routing: &LeaderRouting,
        key: &str,
        token: LeadershipToken,
    ) -> Self {
        Self {
            coordinator: routing.coordinator.clone(),
            node_id: routing.node_id,
            key: key.to_string(),
            token,
            renew_interval: routing.renew_interval,
        }
    }

    /// Run the body while renewing the lease. Losing the lease stops the
    /// body and ends the stream with `NotLeader`. The lease is released once
    /// the stream is over; a restartable error keeps it for the next attempt.
    async fn guard<F, Fut>(
        &self,
        token: CancellationToken,
        run: F,
    ) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let body_token = token.child_token();
        let body = run(body_token.clone());
        tokio::pin!(body);

        let mut ticker = interval_at(Instant::now() + self.renew_interval, self.renew_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                result = &mut body => break result,
                _ = ticker.tick() => {
                    match self
                        .coordinator
                        .check_leadership(&self.key, self.node_id, &self.token)
                        .await
                    {
                        Ok(true) => {}
                        Ok(false) => {
                            info!(channel = %self.key, "Lost channel leadership, stopping stream");
                            body_token.cancel();
                            let _ = body.await;
                            break Err(LeaderError::NotLeader {
                                key: self.key.clone(),
                                node_id: self.node_id,
                            }
                            .into());
                        }
                        Err(e) => {
                            warn!(channel = %self.key, "Leadership check failed: {:?}", e);
                        }
                    }
                }
            }
        };

        let stream_over = match &result {
            Ok(()) => true,
            Err(e) => e.is_unrecoverable(),
        };
        if token.is_cancelled() || stream_over {
            if let Err(e) = self
                .coordinator
                .release(&self.key, self.node_id, &self.token)
                .await
            {
                warn!(channel = %self.key, "Failed to release leadership: {:?}", e);
            }
        }
        result
    }
}
