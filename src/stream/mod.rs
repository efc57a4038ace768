//! Background stream lifecycle.
//!
//! - [`SupervisedTask`]: runs one stream body until canceled, restarting it
//!   after errors and panics.
//! - [`watch_idle`]: presence-based idle detection.
//! - [`StreamManager`]: the single loop owning every registration, so at most
//!   one stream runs per channel key.

mod manager;
mod supervised;
mod watchdog;
pub use manager::*;
pub use supervised::*;
pub use watchdog::*;


use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::OrgId;
use crate::Result;

/// A stream body. Invoked once per (re)start with a token that is canceled
/// when the stream must stop; it must return promptly once canceled.
pub type StreamBody = Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// What a stream serves, used to target datasource restarts and listings
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamMeta {
    pub org_id: OrgId,
    pub channel: String,
    pub plugin_id: Option<String>,
    pub datasource_uid: Option<String>,
}

impl StreamMeta {
    pub fn new(
        org_id: OrgId,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            org_id,
            channel: channel.into(),
            ..Default::default()
        }
    }

    pub fn with_plugin(
        mut self,
        plugin_id: impl Into<String>,
        datasource_uid: Option<String>,
    ) -> Self {
        self.plugin_id = Some(plugin_id.into());
        self.datasource_uid = datasource_uid;
        self
    }
}

/// Submission payload of [`StreamManagerHandle::submit_stream`]
#[derive(Clone)]
pub struct StreamTask {
    pub meta: StreamMeta,
    pub body: StreamBody,
}

impl StreamTask {
    pub fn new<F, Fut>(
        meta: StreamMeta,
        body: F,
    ) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            meta,
            body: Arc::new(move |token| body(token).boxed()),
        }
    }
}

impl fmt::Debug for StreamTask {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("StreamTask").field("meta", &self.meta).finish()
    }
}
