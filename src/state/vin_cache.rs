use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::types::VehicleRecord;

#[derive(Debug, Clone)]
struct CachedDecode {
    vehicle: VehicleRecord,
    stored_at: Instant,
}

// ---------------------------------------------------------------------------
// VinCache
// ---------------------------------------------------------------------------

/// Process-wide cache of successful VIN decodes, keyed by normalized VIN.
/// Only successes are stored; not-found and upstream failures always go back
/// to the provider. A zero TTL disables the cache.
pub struct VinCache {
    entries: DashMap<String, CachedDecode>,
    ttl: Duration,
}

impl VinCache {
    pub fn new(ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            entries: DashMap::new(),
            ttl,
        })
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Fresh entry for `vin`, evicting it if it has expired.
    pub fn get(&self, vin: &str) -> Option<VehicleRecord> {
        if !self.is_enabled() {
            return None;
        }
        let hit = self.entries.get(vin).map(|e| (e.stored_at, e.vehicle.clone()))?;
        if hit.0.elapsed() < self.ttl {
            return Some(hit.1);
        }
        // Re-check under the shard lock: a concurrent insert may have refreshed it.
        let ttl = self.ttl;
        self.entries.remove_if(vin, |_, e| e.stored_at.elapsed() >= ttl);
        None
    }

    pub fn insert(&self, vin: &str, vehicle: VehicleRecord) {
        if !self.is_enabled() {
            return;
        }
        self.entries.insert(
            vin.to_string(),
            CachedDecode {
                vehicle,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let ttl = self.ttl;
        let mut removed = 0;
        self.entries.retain(|_, e| {
            let fresh = e.stored_at.elapsed() < ttl;
            if !fresh {
                removed += 1;
            }
            fresh
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
