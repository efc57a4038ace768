use std::collections::VecDeque;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::plugin::PluginBackend;
use crate::plugin::PluginContext;
use crate::plugin::PluginContextProvider;
use crate::ChannelPublisher;
use crate::Error;
use crate::OrgId;
use crate::PresenceOracle;
use crate::Principal;
use crate::Result;
use crate::Status;
use crate::StreamSender;

/// Presence oracle answering from a script, one entry per call. `None`
/// entries answer with an error. Once exhausted it keeps answering `fallback`.
pub struct ScriptedOracle {
    script: Mutex<VecDeque<Option<usize>>>,
    fallback: usize,
    calls: AtomicUsize,
}

impl ScriptedOracle {
    pub fn new(
        script: Vec<Option<usize>>,
        fallback: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
        })
    }

    /// Always answers `count`
    pub fn constant(count: usize) -> Arc<Self> {
        Self::new(vec![], count)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PresenceOracle for ScriptedOracle {
    async fn num_subscribers(
        &self,
        _channel_key: &str,
    ) -> Result<usize> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().pop_front() {
            Some(Some(n)) => Ok(n),
            Some(None) => Err(Error::Fatal("presence unavailable".into())),
            None => Ok(self.fallback),
        }
    }
}

/// Publisher that remembers everything it was asked to publish
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(OrgId, String, Bytes)>>,
}

impl RecordingPublisher {
    pub fn published(&self) -> Vec<(OrgId, String, Bytes)> {
        self.published.lock().clone()
    }

    pub fn published_on(
        &self,
        channel: &str,
    ) -> Vec<Bytes> {
        self.published
            .lock()
            .iter()
            .filter(|(_, c, _)| c == channel)
            .map(|(_, _, d)| d.clone())
            .collect()
    }
}

#[async_trait]
impl ChannelPublisher for RecordingPublisher {
    async fn publish(
        &self,
        org_id: OrgId,
        channel: &str,
        data: Bytes,
    ) -> Result<()> {
        self.published.lock().push((org_id, channel.to_string(), data));
        Ok(())
    }
}

/// Streaming plugin backend with scripted answers. `run_stream` emits one
/// frame, then waits for cancellation unless upstream is set to end.
pub struct FakePluginBackend {
    streaming: bool,
    upstream_ends: bool,
    subscribe_status: Mutex<Status>,
    initial_data: Option<Bytes>,
    publish_reply: (Status, Option<Bytes>),
    subscribe_calls: AtomicUsize,
    run_calls: AtomicUsize,
}

impl FakePluginBackend {
    pub fn new() -> Self {
        Self {
            streaming: true,
            upstream_ends: false,
            subscribe_status: Mutex::new(Status::Ok),
            initial_data: Some(Bytes::from_static(b"{\"init\":true}")),
            publish_reply: (Status::Ok, None),
            subscribe_calls: AtomicUsize::new(0),
            run_calls: AtomicUsize::new(0),
        }
    }

    pub fn without_streaming(mut self) -> Self {
        self.streaming = false;
        self
    }

    /// `run_stream` returns right after its first frame
    pub fn with_ending_upstream(mut self) -> Self {
        self.upstream_ends = true;
        self
    }

    pub fn with_publish_reply(
        mut self,
        status: Status,
        data: Option<Bytes>,
    ) -> Self {
        self.publish_reply = (status, data);
        self
    }

    pub fn set_subscribe_status(
        &self,
        status: Status,
    ) {
        *self.subscribe_status.lock() = status;
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn run_calls(&self) -> usize {
        self.run_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PluginBackend for FakePluginBackend {
    fn supports_streaming(
        &self,
        _plugin_id: &str,
    ) -> bool {
        self.streaming
    }

    async fn subscribe_stream(
        &self,
        _ctx: &PluginContext,
        _path: &str,
    ) -> Result<(Status, Option<Bytes>)> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let status = *self.subscribe_status.lock();
        Ok((status, self.initial_data.clone()))
    }

    async fn publish_stream(
        &self,
        _ctx: &PluginContext,
        _path: &str,
        _data: Bytes,
    ) -> Result<(Status, Option<Bytes>)> {
        Ok(self.publish_reply.clone())
    }

    async fn run_stream(
        &self,
        token: CancellationToken,
        _ctx: PluginContext,
        _path: String,
        sender: StreamSender,
    ) -> Result<()> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        sender.send(Bytes::from_static(b"tick")).await?;
        if !self.upstream_ends {
            token.cancelled().await;
        }
        Ok(())
    }
}

/// Context provider backed by a datasource uid to plugin id map
#[derive(Default)]
pub struct StaticContexts {
    datasources: DashMap<String, String>,
}

impl StaticContexts {
    pub fn with_datasource(
        self,
        uid: &str,
        plugin_id: &str,
    ) -> Self {
        self.datasources.insert(uid.to_string(), plugin_id.to_string());
        self
    }

    pub fn remove_datasource(
        &self,
        uid: &str,
    ) {
        self.datasources.remove(uid);
    }
}

#[async_trait]
impl PluginContextProvider for StaticContexts {
    async fn get_plugin_context(
        &self,
        principal: &Principal,
        plugin_id: &str,
        datasource_uid: Option<String>,
    ) -> Result<PluginContext> {
        if let Some(uid) = &datasource_uid {
            if !self.datasources.contains_key(uid) {
                return Err(Error::NotFound(format!("datasource {uid}")));
            }
        }
        Ok(PluginContext {
            org_id: principal.org_id,
            plugin_id: plugin_id.to_string(),
            datasource_uid,
            user: principal.clone(),
        })
    }

    async fn datasource_plugin_id(
        &self,
        _org_id: OrgId,
        datasource_uid: &str,
    ) -> Result<Option<String>> {
        Ok(self.datasources.get(datasource_uid).map(|p| p.value().clone()))
    }
}
