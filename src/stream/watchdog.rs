use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval_at;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::PresenceOracle;
use crate::Result;

/// Consecutive zero-subscriber observations of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZeroStreak {
    threshold: u32,
    zeros: u32,
}

impl ZeroStreak {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            zeros: 0,
        }
    }

    /// Record one presence check. Returns true once `threshold` consecutive
    /// zero observations were made. A non-zero count resets the streak; an
    /// oracle error leaves it untouched.
    pub fn observe(
        &mut self,
        observation: &Result<usize>,
    ) -> bool {
        match observation {
            Ok(0) => self.zeros += 1,
            Ok(_) => self.zeros = 0,
            Err(_) => {}
        }
        self.zeros >= self.threshold
    }

    pub fn zeros(&self) -> u32 {
        self.zeros
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleOutcome {
    /// The channel had no subscribers for `threshold` consecutive checks
    Idle,
    /// The token was canceled first
    Canceled,
}

/// Tick every `period` and ask the oracle for the channel's subscriber
/// count until the channel is idle or `token` is canceled. The first check
/// happens one period after the call.
pub async fn watch_idle(
    channel_key: &str,
    oracle: Arc<dyn PresenceOracle>,
    period: Duration,
    threshold: u32,
    token: CancellationToken,
) -> IdleOutcome {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut streak = ZeroStreak::new(threshold);

    loop {
        tokio::select! {
            _ = token.cancelled() => return IdleOutcome::Canceled,
            _ = ticker.tick() => {}
        }

        let observation = tokio::select! {
            _ = token.cancelled() => return IdleOutcome::Canceled,
            observation = oracle.num_subscribers(channel_key) => observation,
        };
        if let Err(e) = &observation {
            warn!(channel = %channel_key, error = %e, "Presence check inconclusive");
        }

        if streak.observe(&observation) {
            debug!(channel = %channel_key, zeros = streak.zeros(), "Channel idle");
            return IdleOutcome::Idle;
        }
        trace!(channel = %channel_key, zeros = streak.zeros(), "Presence checked");
    }
}
