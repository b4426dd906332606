use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct DispatchMetrics {
    pub events: AtomicU64,
    pub warp_matched: AtomicU64,
    pub warp_missed: AtomicU64,
    pub warp_abandoned: AtomicU64,
    pub warp_cancelled: AtomicU64,
    /// Deferral episodes: key/button input held back behind a warp.
    pub deferred: AtomicU64,
    pub stalled: AtomicU64,
    pub rewritten: AtomicU64,
    pub idle_units: AtomicU64,
    pub repeats: AtomicU64,
    pub failovers: AtomicU64,
    /// Envelopes for sessions that no longer exist.
    pub orphaned: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchMetricsSnapshot {
    pub events: u64,
    pub warp_matched: u64,
    pub warp_missed: u64,
    pub warp_abandoned: u64,
    pub warp_cancelled: u64,
    pub deferred: u64,
    pub stalled: u64,
    pub rewritten: u64,
    pub idle_units: u64,
    pub repeats: u64,
    pub failovers: u64,
    pub orphaned: u64,
}

impl DispatchMetrics {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatchMetricsSnapshot {
        DispatchMetricsSnapshot {
            events: self.events.load(Ordering::Relaxed),
            warp_matched: self.warp_matched.load(Ordering::Relaxed),
            warp_missed: self.warp_missed.load(Ordering::Relaxed),
            warp_abandoned: self.warp_abandoned.load(Ordering::Relaxed),
            warp_cancelled: self.warp_cancelled.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            stalled: self.stalled.load(Ordering::Relaxed),
            rewritten: self.rewritten.load(Ordering::Relaxed),
            idle_units: self.idle_units.load(Ordering::Relaxed),
            repeats: self.repeats.load(Ordering::Relaxed),
            failovers: self.failovers.load(Ordering::Relaxed),
            orphaned: self.orphaned.load(Ordering::Relaxed),
        }
    }
}
