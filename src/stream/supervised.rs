use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Notify;
use tokio::time::sleep;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::StreamBody;
use crate::config::BackoffPolicy;
use crate::metrics::STREAM_RESTARTS;

/// Why a supervised task stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskExit {
    /// The owning token was canceled (idle, delete or shutdown)
    Canceled,
    /// The body returned `Ok` on its own: upstream ended
    Completed,
    /// The body failed with an error that restarting cannot fix
    Unrecoverable(String),
}

/// Runs a stream body in a loop until its token is canceled
///
/// - body `Ok` while not canceled: upstream ended, stop
/// - body error or panic: log, back off, run again
/// - unrecoverable error (not found, permission denied, lost leadership): stop
/// - `restart` notification: cancel the current attempt and run again at once
pub struct SupervisedTask {
    key: String,
    token: CancellationToken,
    restart: Arc<Notify>,
    body: StreamBody,
    backoff: BackoffPolicy,
}

impl SupervisedTask {
    pub fn new(
        key: impl Into<String>,
        token: CancellationToken,
        body: StreamBody,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            key: key.into(),
            token,
            restart: Arc::new(Notify::new()),
            body,
            backoff,
        }
    }

    /// Share a restart trigger with the owner of the task
    pub fn with_restart(
        mut self,
        restart: Arc<Notify>,
    ) -> Self {
        self.restart = restart;
        self
    }

    pub async fn run(self) -> TaskExit {
        let mut failures: u32 = 0;
        debug!(channel = %self.key, "Stream supervisor started");

        loop {
            if self.token.is_cancelled() {
                return TaskExit::Canceled;
            }

            let attempt = self.token.child_token();
            let started = Instant::now();
            let body = self.body.clone();
            let body_token = attempt.clone();
            let run = AssertUnwindSafe(async move { body(body_token).await }).catch_unwind();
            tokio::pin!(run);

            let outcome = tokio::select! {
                outcome = &mut run => outcome,
                _ = self.restart.notified() => {
                    info!(channel = %self.key, "Restarting stream on request");
                    attempt.cancel();
                    let _ = run.await;
                    STREAM_RESTARTS.with_label_values(&["requested"]).inc();
                    failures = 0;
                    continue;
                }
            };

            if self.token.is_cancelled() {
                debug!(channel = %self.key, "Stream canceled");
                return TaskExit::Canceled;
            }

            let reason = match outcome {
                Ok(Ok(())) => {
                    info!(channel = %self.key, "Stream body finished, upstream ended");
                    return TaskExit::Completed;
                }
                Ok(Err(e)) if e.is_unrecoverable() => {
                    warn!(channel = %self.key, error = %e, "Stream stopped on unrecoverable error");
                    return TaskExit::Unrecoverable(e.to_string());
                }
                Ok(Err(e)) => {
                    warn!(channel = %self.key, error = %e, "Stream body failed, restarting");
                    "error"
                }
                Err(_) => {
                    warn!(channel = %self.key, "Stream body panicked, restarting");
                    "panic"
                }
            };
            STREAM_RESTARTS.with_label_values(&[reason]).inc();

            if started.elapsed() >= Duration::from_millis(self.backoff.max_delay_ms) {
                failures = 0;
            }
            let delay = self.backoff.delay(failures);
            failures = failures.saturating_add(1);

            tokio::select! {
                _ = self.token.cancelled() => return TaskExit::Canceled,
                _ = sleep(delay) => {}
            }
        }
    }
}
