//! Upstream VIN decode latency, recorded around every provider call
//! (cache hits excluded).

use std::sync::Mutex;
use std::time::Duration;

use hdrhistogram::Histogram;
use serde::Serialize;

/// Tracks 1ms to 10min at 3 significant figures.
const MAX_TRACKABLE_MS: u64 = 600_000;

pub struct UpstreamLatency {
    inner: Mutex<Histogram<u64>>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencySnapshot {
    pub samples: u64,
    pub p50_ms: Option<u64>,
    pub p95_ms: Option<u64>,
    pub p99_ms: Option<u64>,
    pub max_ms: Option<u64>,
}

impl UpstreamLatency {
    pub fn new() -> Self {
        let histogram = Histogram::new_with_bounds(1, MAX_TRACKABLE_MS, 3)
            .expect("valid histogram bounds");
        Self {
            inner: Mutex::new(histogram),
        }
    }

    pub fn record(&self, d: Duration) {
        let ms = (d.as_millis().min(u128::from(MAX_TRACKABLE_MS)) as u64).max(1);
        if let Ok(mut h) = self.inner.lock() {
            let _ = h.record(ms);
        }
    }

    pub fn snapshot(&self) -> LatencySnapshot {
        let Ok(h) = self.inner.lock() else {
            return LatencySnapshot::default();
        };
        if h.len() == 0 {
            return LatencySnapshot::default();
        }
        LatencySnapshot {
            samples: h.len(),
            p50_ms: Some(h.value_at_quantile(0.5)),
            p95_ms: Some(h.value_at_quantile(0.95)),
            p99_ms: Some(h.value_at_quantile(0.99)),
            max_ms: Some(h.max()),
        }
    }
}

impl Default for UpstreamLatency {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_reports_no_percentiles() {
        let s = UpstreamLatency::new().snapshot();
        assert_eq!(s.samples, 0);
        assert!(s.p50_ms.is_none());
    }

    #[test]
    fn records_and_reports_percentiles() {
        let lat = UpstreamLatency::new();
        for ms in 1..=100 {
            lat.record(Duration::from_millis(ms));
        }
        let s = lat.snapshot();
        assert_eq!(s.samples, 100);
        assert_eq!(s.p50_ms, Some(50));
        assert_eq!(s.max_ms, Some(100));
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let lat = UpstreamLatency::new();
        lat.record(Duration::from_millis(12));
        let v = serde_json::to_value(lat.snapshot()).unwrap();
        assert_eq!(v["samples"], 1);
        assert!(v.get("p50Ms").is_some());
        assert!(v.get("maxMs").is_some());
        assert!(v.get("p50_ms").is_none());
    }

    #[test]
    fn sub_millisecond_calls_count_as_one() {
        let lat = UpstreamLatency::new();
        lat.record(Duration::from_micros(200));
        assert_eq!(lat.snapshot().max_ms, Some(1));
    }
}
