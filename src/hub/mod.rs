//! Fan-out and presence collaborators.
//!
//! The engine never writes to sockets. It hands payloads to a
//! [`ChannelPublisher`] and asks a [`PresenceOracle`] how many subscribers a
//! channel has. [`LocalHub`] implements both in process.

mod local;
mod sender;
pub use local::*;
pub use sender::*;


use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)]
use mockall::automock;

use crate::OrgId;
use crate::Result;

/// Publish bytes to every current subscriber of a channel
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChannelPublisher: Send + Sync + 'static {
    /// `channel` is org-less (`{scope}/{namespace}/{path}`)
    async fn publish(
        &self,
        org_id: OrgId,
        channel: &str,
        data: Bytes,
    ) -> Result<()>;
}

/// Channel-scoped subscriber counts
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PresenceOracle: Send + Sync + 'static {
    /// `channel_key` is org-qualified (`{orgId}/{scope}/{namespace}/{path}`)
    async fn num_subscribers(
        &self,
        channel_key: &str,
    ) -> Result<usize>;
}
