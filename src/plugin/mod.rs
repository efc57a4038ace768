//! Streaming plugin bridge.
//!
//! Plugin backends are external collaborators: the engine asks them whether a
//! subscriber may attach, forwards publishes, and runs their long-lived
//! stream bodies under the stream manager. In HA mode the body only runs on
//! the channel's leader.

mod runner;
pub use runner::*;


use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)]
use mockall::automock;
use tokio_util::sync::CancellationToken;

use crate::Error;
use crate::OrgId;
use crate::Principal;
use crate::Result;
use crate::Status;
use crate::StreamSender;

/// Identity and target a plugin call runs with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginContext {
    pub org_id: OrgId,
    pub plugin_id: String,
    pub datasource_uid: Option<String>,
    pub user: Principal,
}

/// Streaming capability of installed plugins
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PluginBackend: Send + Sync + 'static {
    /// True when the plugin exposes a streaming handler
    fn supports_streaming(
        &self,
        plugin_id: &str,
    ) -> bool;

    /// Decide whether the caller may subscribe to `path`; may return
    /// initial data
    async fn subscribe_stream(
        &self,
        ctx: &PluginContext,
        path: &str,
    ) -> Result<(Status, Option<Bytes>)>;

    /// Handle a client publish; returned data is broadcast verbatim
    async fn publish_stream(
        &self,
        ctx: &PluginContext,
        path: &str,
        data: Bytes,
    ) -> Result<(Status, Option<Bytes>)>;

    /// Long-running producer for `path`. Must return promptly once `token`
    /// is canceled. `Ok` means the upstream ended for good.
    async fn run_stream(
        &self,
        token: CancellationToken,
        ctx: PluginContext,
        path: String,
        sender: StreamSender,
    ) -> Result<()>;
}

/// Resolves plugin contexts and datasource ownership
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PluginContextProvider: Send + Sync + 'static {
    /// Fails with `NotFound` when the plugin or datasource is unknown
    async fn get_plugin_context(
        &self,
        principal: &Principal,
        plugin_id: &str,
        datasource_uid: Option<String>,
    ) -> Result<PluginContext>;

    /// Plugin id backing the datasource, `None` when it does not exist
    async fn datasource_plugin_id(
        &self,
        org_id: OrgId,
        datasource_uid: &str,
    ) -> Result<Option<String>>;
}

/// Backend and context provider for deployments without streaming plugins.
/// Every plugin and datasource channel resolves as not found.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPlugins;

#[async_trait]
impl PluginBackend for NoPlugins {
    fn supports_streaming(
        &self,
        _plugin_id: &str,
    ) -> bool {
        false
    }

    async fn subscribe_stream(
        &self,
        _ctx: &PluginContext,
        _path: &str,
    ) -> Result<(Status, Option<Bytes>)> {
        Ok((Status::NotFound, None))
    }

    async fn publish_stream(
        &self,
        _ctx: &PluginContext,
        _path: &str,
        _data: Bytes,
    ) -> Result<(Status, Option<Bytes>)> {
        Ok((Status::NotFound, None))
    }

    async fn run_stream(
        &self,
        _token: CancellationToken,
        ctx: PluginContext,
        _path: String,
        _sender: StreamSender,
    ) -> Result<()> {
        Err(Error::NotFound(format!("plugin {} is not installed", ctx.plugin_id)))
    }
}

#[async_trait]
impl PluginContextProvider for NoPlugins {
    async fn get_plugin_context(
        &self,
        _principal: &Principal,
        plugin_id: &str,
        _datasource_uid: Option<String>,
    ) -> Result<PluginContext> {
        Err(Error::NotFound(format!("plugin {} is not installed", plugin_id)))
    }

    async fn datasource_plugin_id(
        &self,
        _org_id: OrgId,
        _datasource_uid: &str,
    ) -> Result<Option<String>> {
        Ok(None)
    }
}
