use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use prometheus::IntCounterVec;
use tracing::debug;
use tracing::error;
use tracing::warn;

use super::LiveStats;
use crate::channel_key;
use crate::ChannelAddress;
use crate::ChannelHandler;
use crate::Error;
use crate::ErrorKind;
use crate::HandlerRegistry;
use crate::LeaderCoordinator;
use crate::LeaderError;
use crate::LeaderSubscribeHandler;
use crate::LeaderSubscribeRequest;
use crate::LeaderSubscribeResponse;
use crate::LeadershipToken;
use crate::NodeId;
use crate::OrgId;
use crate::Principal;
use crate::PublishEvent;
use crate::PublishReply;
use crate::Result;
use crate::Status;
use crate::SubscribeEvent;
use crate::SubscribeReply;
use crate::PUBLISH_REQUESTS;
use crate::SUBSCRIBE_REQUESTS;

/// Dispatch façade in front of the handler registry.
///
/// Subscribe and publish return the handler's `(reply, status)`. Failures are
/// returned as `Err`; the transport reports them as `Status::from(e.kind())`.
pub struct LiveService {
    node_id: NodeId,
    registry: Arc<HandlerRegistry>,
    coordinator: Option<Arc<dyn LeaderCoordinator>>,
}

impl LiveService {
    pub fn new(
        node_id: NodeId,
        registry: Arc<HandlerRegistry>,
        coordinator: Option<Arc<dyn LeaderCoordinator>>,
    ) -> Self {
        Self {
            node_id,
            registry,
            coordinator,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> &Arc<LiveStats> {
        &self.registry.deps().stats
    }

    /// Subscribe `principal` to `raw_channel` (`{orgId}/{scope}/{namespace}/{path}`)
    pub async fn subscribe(
        &self,
        principal: &Principal,
        raw_channel: &str,
        data: Option<Bytes>,
    ) -> Result<(SubscribeReply, Status)> {
        let address = match ChannelAddress::parse(raw_channel) {
            Ok(address) => address,
            Err(e) => {
                record(&SUBSCRIBE_REQUESTS, "invalid", &Err(e.kind()));
                debug!(channel = raw_channel, "Rejecting subscribe: {}", e);
                return Err(e);
            }
        };

        let result = self.dispatch_subscribe(principal, &address, data, None).await;
        let outcome = result.as_ref().map(|(_, status)| *status).map_err(Error::kind);
        record(&SUBSCRIBE_REQUESTS, address.scope().as_str(), &outcome);
        if outcome == Ok(Status::Ok) {
            self.stats().record_subscribe(address.scope());
        }
        log_failure("subscribe", &address, &result);
        result
    }

    /// Publish `data` from `principal` to `raw_channel`
    ///
    /// When the handler replies with data, it is broadcast to the channel's
    /// subscribers after any store write the handler performed.
    pub async fn publish(
        &self,
        principal: &Principal,
        raw_channel: &str,
        data: Bytes,
    ) -> Result<(PublishReply, Status)> {
        let address = match ChannelAddress::parse(raw_channel) {
            Ok(address) => address,
            Err(e) => {
                record(&PUBLISH_REQUESTS, "invalid", &Err(e.kind()));
                debug!(channel = raw_channel, "Rejecting publish: {}", e);
                return Err(e);
            }
        };

        let result = self.dispatch_publish(principal, &address, data).await;
        let outcome = result.as_ref().map(|(_, status)| *status).map_err(Error::kind);
        record(&PUBLISH_REQUESTS, address.scope().as_str(), &outcome);
        log_failure("publish", &address, &result);
        result
    }

    /// Server-side publish with no permission checks
    pub async fn publish_server(
        &self,
        org_id: OrgId,
        channel: &str,
        data: Bytes,
    ) -> Result<()> {
        let address = ChannelAddress::parse_in_org(org_id, channel)?;
        self.registry
            .deps()
            .publisher
            .publish(org_id, &address.channel(), data)
            .await
    }

    /// Current subscriber count of an org-less channel
    pub async fn client_count(
        &self,
        org_id: OrgId,
        channel: &str,
    ) -> Result<usize> {
        self.registry
            .deps()
            .oracle
            .num_subscribers(&channel_key(org_id, channel))
            .await
    }

    /// Restart streams bound to the datasource so they pick up its new
    /// settings
    pub async fn handle_datasource_update(
        &self,
        org_id: OrgId,
        uid: &str,
    ) -> Result<()> {
        self.registry.evict_datasource(org_id, uid);
        self.registry
            .deps()
            .plugins
            .streams
            .restart_datasource(org_id, uid)
            .await
    }

    /// Stop streams bound to a deleted datasource; returns how many stopped
    pub async fn handle_datasource_delete(
        &self,
        org_id: OrgId,
        uid: &str,
    ) -> Result<usize> {
        self.registry.evict_datasource(org_id, uid);
        self.registry
            .deps()
            .plugins
            .streams
            .cancel_datasource(org_id, uid)
            .await
    }

    /// Cancel background work owned by the service itself
    pub fn stop(&self) {
        if let Some(watch) = self.registry.watch() {
            watch.stop_all();
        }
    }

    async fn dispatch_subscribe(
        &self,
        principal: &Principal,
        address: &ChannelAddress,
        data: Option<Bytes>,
        leader_token: Option<LeadershipToken>,
    ) -> Result<(SubscribeReply, Status)> {
        if principal.org_id != address.org_id() {
            debug!(channel = %address, org_id = principal.org_id, "Subscribe across orgs denied");
            return Ok((SubscribeReply::default(), Status::PermissionDenied));
        }

        let handler = self.registry.resolve(address).await?;
        let channel = address.channel();
        let event = SubscribeEvent {
            channel: channel.clone(),
            path: address.path().to_string(),
            data,
            leader_token,
        };
        let (mut reply, status) = handler.on_subscribe(principal, event).await?;

        if status.is_ok() && reply.recover {
            if reply.data.is_none() {
                reply.data = self
                    .registry
                    .deps()
                    .store
                    .get(address.org_id(), &channel)
                    .await?;
            }
            reply.recover = false;
        }
        Ok((reply, status))
    }

    async fn dispatch_publish(
        &self,
        principal: &Principal,
        address: &ChannelAddress,
        data: Bytes,
    ) -> Result<(PublishReply, Status)> {
        if principal.org_id != address.org_id() {
            debug!(channel = %address, org_id = principal.org_id, "Publish across orgs denied");
            return Ok((PublishReply::default(), Status::PermissionDenied));
        }

        let handler = self.registry.resolve(address).await?;
        let channel = address.channel();
        let event = PublishEvent::new(channel.as_str(), address.path(), data);
        let (reply, status) = handler.on_publish(principal, event).await?;
        if !status.is_ok() {
            return Ok((reply, status));
        }

        if let Some(data) = &reply.data {
            if let Err(e) = self
                .registry
                .deps()
                .publisher
                .publish(address.org_id(), &channel, data.clone())
                .await
            {
                warn!(channel = %address, "Broadcast failed: {:?}", e);
            }
        }
        self.stats().record_publish();
        Ok((reply, status))
    }
}

#[async_trait]
impl LeaderSubscribeHandler for LiveService {
    async fn handle_leader_subscribe(
        &self,
        request: LeaderSubscribeRequest,
    ) -> Result<LeaderSubscribeResponse> {
        let key = channel_key(request.org_id, &request.channel);
        let coordinator = self.coordinator.as_ref().ok_or(LeaderError::NoCoordinator)?;
        if !coordinator
            .check_leadership(&key, self.node_id, &request.token)
            .await?
        {
            warn!(channel = %key, node_id = self.node_id, "Forwarded subscribe with stale leadership token");
            return Err(LeaderError::NotLeader {
                key,
                node_id: self.node_id,
            }
            .into());
        }

        let address = ChannelAddress::parse_in_org(request.org_id, &request.channel)?;
        let (reply, status) = self
            .dispatch_subscribe(
                &request.principal,
                &address,
                request.event.data,
                Some(request.token),
            )
            .await?;
        Ok(LeaderSubscribeResponse { reply, status })
    }
}

fn record(
    counter: &IntCounterVec,
    scope: &str,
    outcome: &std::result::Result<Status, ErrorKind>,
) {
    let status = match outcome {
        Ok(status) => *status,
        Err(kind) => Status::from(*kind),
    };
    counter.with_label_values(&[scope, status.as_str()]).inc();
}

fn log_failure<T>(
    op: &str,
    address: &ChannelAddress,
    result: &Result<T>,
) {
    if let Err(e) = result {
        match e.kind() {
            ErrorKind::Internal | ErrorKind::Timeout => {
                error!(channel = %address, op, "Live {} failed: {:?}", op, e);
            }
            _ => debug!(channel = %address, op, "Live {} refused: {}", op, e),
        }
    }
}
