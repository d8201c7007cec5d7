//! Process-wide counters (SPEC_FULL.md §C). §7 requires every internal
//! failure to be "observable via metrics" even when it degrades gracefully
//! rather than surfacing to a user; this is the sink for those counters.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    pub tick_overruns: AtomicU64,
    pub scheduler_drops: AtomicU64,
    pub backpressure_disconnects: AtomicU64,
    pub auth_funnel_rejections: AtomicU64,
    pub handoff_timeouts: AtomicU64,
    pub bus_publish_failures: AtomicU64,
    pub persistence_write_failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr_tick_overruns(&self) {
        self.tick_overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_scheduler_drops(&self, by: u64) {
        self.scheduler_drops.fetch_add(by, Ordering::Relaxed);
    }

    pub fn incr_backpressure_disconnects(&self) {
        self.backpressure_disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_auth_funnel_rejections(&self) {
        self.auth_funnel_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_handoff_timeouts(&self) {
        self.handoff_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_bus_publish_failures(&self) {
        self.bus_publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_persistence_write_failures(&self) {
        self.persistence_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tick_overruns: self.tick_overruns.load(Ordering::Relaxed),
            scheduler_drops: self.scheduler_drops.load(Ordering::Relaxed),
            backpressure_disconnects: self.backpressure_disconnects.load(Ordering::Relaxed),
            auth_funnel_rejections: self.auth_funnel_rejections.load(Ordering::Relaxed),
            handoff_timeouts: self.handoff_timeouts.load(Ordering::Relaxed),
            bus_publish_failures: self.bus_publish_failures.load(Ordering::Relaxed),
            persistence_write_failures: self.persistence_write_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub tick_overruns: u64,
    pub scheduler_drops: u64,
    pub backpressure_disconnects: u64,
    pub auth_funnel_rejections: u64,
    pub handoff_timeouts: u64,
    pub bus_publish_failures: u64,
    pub persistence_write_failures: u64,
}
