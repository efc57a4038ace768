//! Leader leases for multi-node deployments.
//!
//! One node per channel key owns the channel's backing stream. Ownership is
//! a lease `(key, node id, fencing token)`; every call a node makes as
//! leader presents the token, and a mismatch means the node is no longer
//! leader. Followers forward subscribes to the leader through a
//! [`LeaderTransport`].

mod coordinator;
mod transport;
pub use coordinator::*;
pub use transport::*;

#[cfg(test)]
mod coordinator_test;

use std::fmt;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::OrgId;
use crate::Principal;
use crate::Result;
use crate::Status;
use crate::SubscribeEvent;
use crate::SubscribeReply;

pub type NodeId = u32;

/// Opaque fencing credential minted per election attempt
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeadershipToken(String);

impl LeadershipToken {
    pub fn generate() -> Self {
        Self(nanoid::nanoid!())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LeadershipToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for LeadershipToken {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Current owner of a channel key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderLease {
    pub node_id: NodeId,
    pub token: LeadershipToken,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait LeaderCoordinator: Send + Sync + 'static {
    /// Return the lease for `channel_key`, creating it with the candidate's
    /// identity when none is held. Linearizable per key: racing candidates
    /// converge on one winner and losers get the winner's lease.
    async fn get_or_create_leader(
        &self,
        channel_key: &str,
        candidate: NodeId,
        candidate_token: &LeadershipToken,
    ) -> Result<LeaderLease>;

    /// True (and the lease renewed) when `node_id` with `token` still holds
    /// the lease
    async fn check_leadership(
        &self,
        channel_key: &str,
        node_id: NodeId,
        token: &LeadershipToken,
    ) -> Result<bool>;

    /// Drop the lease if it is still held with `token`
    async fn release(
        &self,
        channel_key: &str,
        node_id: NodeId,
        token: &LeadershipToken,
    ) -> Result<()>;
}

/// A subscribe forwarded from a follower to the leader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderSubscribeRequest {
    pub org_id: OrgId,
    /// Org-less channel
    pub channel: String,
    pub leader_node_id: NodeId,
    pub token: LeadershipToken,
    pub principal: Principal,
    pub event: SubscribeEvent,
}

/// Mirrors a local subscribe outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderSubscribeResponse {
    pub reply: SubscribeReply,
    pub status: Status,
}

/// Remote-call capability used to reach the leader
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LeaderTransport: Send + Sync + 'static {
    async fn forward_subscribe(
        &self,
        request: LeaderSubscribeRequest,
    ) -> Result<LeaderSubscribeResponse>;
}

/// Server side of [`LeaderTransport`], implemented by the live service
#[async_trait]
pub trait LeaderSubscribeHandler: Send + Sync + 'static {
    async fn handle_leader_subscribe(
        &self,
        request: LeaderSubscribeRequest,
    ) -> Result<LeaderSubscribeResponse>;
}
