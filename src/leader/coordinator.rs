use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;

use super::LeaderCoordinator;
use super::LeaderLease;
use super::LeadershipToken;
use super::NodeId;
use crate::Result;

#[derive(Debug, Clone)]
struct LeaseEntry {
    lease: LeaderLease,
    expires_at: Instant,
}

/// Lease table shared by every node of a deployment that lives in one
/// process (tests, single-host HA). Leases expire after `ttl` unless renewed
/// through [`LeaderCoordinator::check_leadership`].
#[derive(Debug)]
pub struct InMemoryLeaderCoordinator {
    leases: DashMap<String, LeaseEntry>,
    ttl: Duration,
}

impl InMemoryLeaderCoordinator {
    pub fn new(ttl: Duration) -> Self {
        Self {
            leases: DashMap::new(),
            ttl,
        }
    }

    /// Current holder of `channel_key`, ignoring expired leases
    pub fn leader_of(
        &self,
        channel_key: &str,
    ) -> Option<LeaderLease> {
        self.leases
            .get(channel_key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.lease.clone())
    }
}

#[async_trait]
impl LeaderCoordinator for InMemoryLeaderCoordinator {
    async fn get_or_create_leader(
        &self,
        channel_key: &str,
        candidate: NodeId,
        candidate_token: &LeadershipToken,
    ) -> Result<LeaderLease> {
        let now = Instant::now();
        let fresh = LeaseEntry {
            lease: LeaderLease {
                node_id: candidate,
                token: candidate_token.clone(),
            },
            expires_at: now + self.ttl,
        };

        // The shard lock held by `entry` makes check-then-insert atomic.
        let lease = match self.leases.entry(channel_key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at > now {
                    occupied.get().lease.clone()
                } else {
                    info!(channel = %channel_key, node_id = candidate, "Expired lease taken over");
                    occupied.insert(fresh.clone());
                    fresh.lease
                }
            }
            Entry::Vacant(vacant) => {
                info!(channel = %channel_key, node_id = candidate, "Leader elected");
                vacant.insert(fresh.clone());
                fresh.lease
            }
        };
        Ok(lease)
    }

    async fn check_leadership(
        &self,
        channel_key: &str,
        node_id: NodeId,
        token: &LeadershipToken,
    ) -> Result<bool> {
        let now = Instant::now();
        match self.leases.get_mut(channel_key) {
            Some(mut entry)
                if entry.expires_at > now
                    && entry.lease.node_id == node_id
                    && &entry.lease.token == token =>
            {
                entry.expires_at = now + self.ttl;
                Ok(true)
            }
            _ => {
                debug!(channel = %channel_key, node_id, "Leadership check failed");
                Ok(false)
            }
        }
    }

    async fn release(
        &self,
        channel_key: &str,
        node_id: NodeId,
        token: &LeadershipToken,
    ) -> Result<()> {
        let released = self
            .leases
            .remove_if(channel_key, |_, e| {
                e.lease.node_id == node_id && &e.lease.token == token
            })
            .is_some();
        if released {
            info!(channel = %channel_key, node_id, "Leadership released");
        }
        Ok(())
    }
}
