//! Stream manager
//!
//! A single dispatcher loop owns the map from channel key to registration.
//! Submissions, idle expiry, task completion and datasource events all reach
//! it as commands, so registration decisions are serialized without a lock.
//!
//! ```text
//! StreamManagerHandle::submit_stream ──┐
//! watchdog (Expire) ───────────────────┤
//! supervisor (Finished) ───────────────┼─> StreamManager::run [1 task]
//! datasource update/delete ────────────┘       ├─> SupervisedTask per key
//!                                              └─> watch_idle per key
//! ```

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::sync::Notify;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::watch_idle;
use super::IdleOutcome;
use super::StreamMeta;
use super::StreamTask;
use super::SupervisedTask;
use super::TaskExit;
use crate::config::StreamConfig;
use crate::metrics::ACTIVE_STREAMS;
use crate::metrics::SUBMIT_TIMEOUTS;
use crate::Error;
use crate::OrgId;
use crate::PresenceOracle;
use crate::Result;
use crate::SystemError;

/// Result of a successful submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A new stream was registered and spawned
    Started,
    /// A stream for the key was already registered; nothing was spawned
    AlreadyRunning,
}

/// Snapshot of one registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub key: String,
    pub id: u64,
    pub meta: StreamMeta,
}

pub(crate) enum StreamCommand {
    Submit {
        key: String,
        task: StreamTask,
        ack: oneshot::Sender<SubmitOutcome>,
    },
    /// Sent by the watchdog of registration `id`
    Expire { key: String, id: u64 },
    /// Sent by the supervisor of registration `id`
    Finished { key: String, id: u64, exit: TaskExit },
    RestartDatasource { org_id: OrgId, uid: String },
    CancelDatasource {
        org_id: OrgId,
        uid: String,
        ack: oneshot::Sender<usize>,
    },
    List { ack: oneshot::Sender<Vec<StreamInfo>> },
}

struct Registration {
    id: u64,
    token: CancellationToken,
    restart: Arc<Notify>,
    meta: StreamMeta,
}

pub struct StreamManager {
    config: StreamConfig,
    oracle: Arc<dyn PresenceOracle>,
    streams: HashMap<String, Registration>,
    next_id: u64,

    command_rx: mpsc::Receiver<StreamCommand>,
    /// Handed to supervisors and watchdogs so they can report back
    command_tx: mpsc::Sender<StreamCommand>,

    /// Parent of every registration token
    root: CancellationToken,
    shutdown: watch::Receiver<()>,

    active_count: Arc<AtomicUsize>,
}

/// Cloneable handle used by handlers to talk to the manager loop
#[derive(Clone)]
pub struct StreamManagerHandle {
    command_tx: mpsc::Sender<StreamCommand>,
    submit_timeout: Duration,
    active_count: Arc<AtomicUsize>,
}

impl StreamManager {
    /// Create a new stream manager
    ///
    /// Returns (manager, handle) pair; spawn `manager.run()` to serve the handle.
    pub fn new(
        config: StreamConfig,
        oracle: Arc<dyn PresenceOracle>,
        shutdown: watch::Receiver<()>,
    ) -> (Self, StreamManagerHandle) {
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer_size);
        let active_count = Arc::new(AtomicUsize::new(0));

        let handle = StreamManagerHandle {
            command_tx: command_tx.clone(),
            submit_timeout: config.submit_timeout(),
            active_count: active_count.clone(),
        };
        let manager = Self {
            config,
            oracle,
            streams: HashMap::new(),
            next_id: 1,
            command_rx,
            command_tx,
            root: CancellationToken::new(),
            shutdown,
            active_count,
        };

        (manager, handle)
    }

    /// Main loop, runs for the lifetime of the node. On shutdown every
    /// registration is canceled with no idle grace period.
    pub async fn run(mut self) {
        info!("Stream manager started");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.changed() => {
                    info!("Stream manager shutting down");
                    break;
                }

                Some(command) = self.command_rx.recv() => {
                    self.handle_command(command);
                }
            }
        }

        let count = self.streams.len();
        for (_, registration) in self.streams.drain() {
            registration.token.cancel();
        }
        self.root.cancel();
        self.update_count();
        info!(canceled = count, "Stream manager stopped");
    }

    fn handle_command(
        &mut self,
        command: StreamCommand,
    ) {
        match command {
            StreamCommand::Submit { key, task, ack } => {
                let outcome = self.handle_submit(key, task);
                let _ = ack.send(outcome);
            }
            StreamCommand::Expire { key, id } => {
                if self.remove_if_current(&key, id) {
                    info!(channel = %key, "Stream stopped, no subscribers");
                }
            }
            StreamCommand::Finished { key, id, exit } => {
                if self.remove_if_current(&key, id) {
                    info!(channel = %key, ?exit, "Stream finished");
                }
            }
            StreamCommand::RestartDatasource { org_id, uid } => {
                for (key, registration) in self.streams.iter() {
                    if registration.meta.org_id == org_id
                        && registration.meta.datasource_uid.as_deref() == Some(uid.as_str())
                    {
                        debug!(channel = %key, "Restarting stream for updated datasource");
                        registration.restart.notify_one();
                    }
                }
            }
            StreamCommand::CancelDatasource { org_id, uid, ack } => {
                let keys: Vec<String> = self
                    .streams
                    .iter()
                    .filter(|(_, r)| {
                        r.meta.org_id == org_id && r.meta.datasource_uid.as_deref() == Some(uid.as_str())
                    })
                    .map(|(k, _)| k.clone())
                    .collect();
                for key in &keys {
                    if let Some(registration) = self.streams.remove(key) {
                        registration.token.cancel();
                        info!(channel = %key, "Stream stopped, datasource deleted");
                    }
                }
                self.update_count();
                let _ = ack.send(keys.len());
            }
            StreamCommand::List { ack } => {
                let mut streams: Vec<StreamInfo> = self
                    .streams
                    .iter()
                    .map(|(key, r)| StreamInfo {
                        key: key.clone(),
                        id: r.id,
                        meta: r.meta.clone(),
                    })
                    .collect();
                streams.sort_by(|a, b| a.key.cmp(&b.key));
                let _ = ack.send(streams);
            }
        }
    }

    fn handle_submit(
        &mut self,
        key: String,
        task: StreamTask,
    ) -> SubmitOutcome {
        if self.streams.contains_key(&key) {
            debug!(channel = %key, "Stream already running");
            return SubmitOutcome::AlreadyRunning;
        }

        let id = self.next_id;
        self.next_id += 1;
        let token = self.root.child_token();
        let restart = Arc::new(Notify::new());

        let supervised = SupervisedTask::new(
            key.clone(),
            token.clone(),
            task.body,
            self.config.restart_backoff.clone(),
        )
        .with_restart(restart.clone());
        let tx = self.command_tx.clone();
        let finished_key = key.clone();
        tokio::spawn(async move {
            let exit = AssertUnwindSafe(supervised.run())
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    error!(channel = %finished_key, "Stream supervisor panicked");
                    TaskExit::Unrecoverable("supervisor panicked".into())
                });
            let _ = tx
                .send(StreamCommand::Finished {
                    key: finished_key,
                    id,
                    exit,
                })
                .await;
        });

        let tx = self.command_tx.clone();
        let oracle = self.oracle.clone();
        let period = self.config.idle_check_interval();
        let threshold = self.config.idle_zero_threshold;
        let watchdog_token = token.clone();
        let idle_key = key.clone();
        tokio::spawn(async move {
            if watch_idle(&idle_key, oracle, period, threshold, watchdog_token).await
                == IdleOutcome::Idle
            {
                let _ = tx.send(StreamCommand::Expire { key: idle_key, id }).await;
            }
        });

        info!(channel = %key, id, "Stream started");
        self.streams.insert(
            key,
            Registration {
                id,
                token,
                restart,
                meta: task.meta,
            },
        );
        self.update_count();
        SubmitOutcome::Started
    }

    /// Remove the registration, then cancel it. Ignores stale reports from a
    /// registration that was already replaced.
    fn remove_if_current(
        &mut self,
        key: &str,
        id: u64,
    ) -> bool {
        if self.streams.get(key).map(|r| r.id) != Some(id) {
            return false;
        }
        if let Some(registration) = self.streams.remove(key) {
            registration.token.cancel();
        }
        self.update_count();
        true
    }

    fn update_count(&self) {
        self.active_count.store(self.streams.len(), Ordering::Relaxed);
        ACTIVE_STREAMS.set(self.streams.len() as i64);
    }
}

impl StreamManagerHandle {
    /// Ensure a stream runs for `key`
    ///
    /// Idempotent: when `key` is already registered this returns
    /// [`SubmitOutcome::AlreadyRunning`] and `task` is dropped unused.
    /// Returns once the stream is scheduled, not once it produced data.
    ///
    /// # Errors
    /// - [`Error::SubmitTimeout`] if the manager did not acknowledge within
    ///   the configured bound (retryable)
    /// - [`SystemError::StreamManagerStopped`] after shutdown
    pub async fn submit_stream(
        &self,
        key: impl Into<String>,
        task: StreamTask,
    ) -> Result<SubmitOutcome> {
        let key = key.into();
        let (ack_tx, ack_rx) = oneshot::channel();
        let command = StreamCommand::Submit {
            key: key.clone(),
            task,
            ack: ack_tx,
        };

        let submit = async {
            self.command_tx
                .send(command)
                .await
                .map_err(|_| SystemError::StreamManagerStopped)?;
            ack_rx.await.map_err(|_| SystemError::StreamManagerStopped)
        };

        match timeout(self.submit_timeout, submit).await {
            Ok(outcome) => Ok(outcome?),
            Err(_) => {
                warn!(channel = %key, "Stream submission timed out");
                SUBMIT_TIMEOUTS.inc();
                Err(Error::SubmitTimeout {
                    key,
                    duration: self.submit_timeout,
                })
            }
        }
    }

    /// Restart the body of every stream bound to the datasource, so it picks
    /// up a fresh plugin context
    pub async fn restart_datasource(
        &self,
        org_id: OrgId,
        uid: &str,
    ) -> Result<()> {
        self.command_tx
            .send(StreamCommand::RestartDatasource {
                org_id,
                uid: uid.to_string(),
            })
            .await
            .map_err(|_| SystemError::StreamManagerStopped.into())
    }

    /// Stop every stream bound to the datasource; returns how many stopped
    pub async fn cancel_datasource(
        &self,
        org_id: OrgId,
        uid: &str,
    ) -> Result<usize> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.command_tx
            .send(StreamCommand::CancelDatasource {
                org_id,
                uid: uid.to_string(),
                ack: ack_tx,
            })
            .await
            .map_err(|_| SystemError::StreamManagerStopped)?;
        Ok(ack_rx.await.map_err(|_| SystemError::StreamManagerStopped)?)
    }

    pub async fn list_streams(&self) -> Result<Vec<StreamInfo>> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.command_tx
            .send(StreamCommand::List { ack: ack_tx })
            .await
            .map_err(|_| SystemError::StreamManagerStopped)?;
        Ok(ack_rx.await.map_err(|_| SystemError::StreamManagerStopped)?)
    }

    /// Number of registered streams, as last published by the manager loop
    pub fn active_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}
