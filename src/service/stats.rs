use std::collections::BTreeMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use serde::Deserialize;
use serde::Serialize;

use crate::Scope;

/// Usage counters of one live service
#[derive(Debug, Default)]
pub struct LiveStats {
    subscribes: AtomicU64,
    publishes: AtomicU64,
    subscriptions_by_scope: DashMap<&'static str, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStatsSnapshot {
    pub subscribes: u64,
    pub publishes: u64,
    pub subscriptions_by_scope: BTreeMap<String, u64>,
}

impl LiveStats {
    /// Count a subscription that was answered with an OK status
    pub fn record_subscribe(
        &self,
        scope: Scope,
    ) {
        self.subscribes.fetch_add(1, Ordering::Relaxed);
        *self.subscriptions_by_scope.entry(scope.as_str()).or_insert(0) += 1;
    }

    pub fn record_publish(&self) {
        self.publishes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LiveStatsSnapshot {
        LiveStatsSnapshot {
            subscribes: self.subscribes.load(Ordering::Relaxed),
            publishes: self.publishes.load(Ordering::Relaxed),
            subscriptions_by_scope: self
                .subscriptions_by_scope
                .iter()
                .map(|e| (e.key().to_string(), *e.value()))
                .collect(),
        }
    }
}
