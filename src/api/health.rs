//! Shared lookup counters for the /health endpoint.
//! Updated by the VIN lookup path in `routes`.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Default)]
pub struct HealthState {
    /// VIN lookups requested (cache hits included).
    pub lookups_total: AtomicU64,
    pub cache_hits: AtomicU64,
    /// Lookups that ended in an upstream error other than not-found.
    pub upstream_failures: AtomicU64,
    /// Unix seconds of the last successful upstream decode (0 = none).
    pub last_upstream_success_at: AtomicU64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub lookups_total: u64,
    pub cache_hits: u64,
    pub upstream_failures: u64,
    pub last_upstream_success_at: Option<u64>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_lookup(&self) {
        self.lookups_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_failure(&self) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_success(&self, unix_secs: u64) {
        self.last_upstream_success_at.store(unix_secs, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let last = self.last_upstream_success_at.load(Ordering::Relaxed);
        HealthSnapshot {
            lookups_total: self.lookups_total.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
            last_upstream_success_at: (last > 0).then_some(last),
        }
    }
}
