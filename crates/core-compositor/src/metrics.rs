//! Compositor path metrics.
//!
//! Distinct from the redraw mask counters (what producers asked for); these
//! record what the compositor actually did with each request.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct CompositorMetrics {
    pub full: AtomicU64,
    pub partial_line: AtomicU64,
    pub partial_rect: AtomicU64,
    pub scroll: AtomicU64,
    /// Scroll requests of at least a screenful repainted as full.
    pub scroll_escalated: AtomicU64,
    /// Title repainted inside a full copy of the main area.
    pub title_with_main: AtomicU64,
    /// Title repainted and copied on its own.
    pub title_separate: AtomicU64,
    /// Offscreen-to-window copies issued.
    pub copies: AtomicU64,
    pub warps_real: AtomicU64,
    pub warps_fake: AtomicU64,
    pub warps_clamped: AtomicU64,
    pub warps_outside: AtomicU64,
    /// Partial-line requests marked on sibling sessions.
    pub propagated: AtomicU64,
    /// Passes discarded because the session had no offscreen buffer.
    pub skipped_no_buffer: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompositorMetricsSnapshot {
    pub full: u64,
    pub partial_line: u64,
    pub partial_rect: u64,
    pub scroll: u64,
    pub scroll_escalated: u64,
    pub title_with_main: u64,
    pub title_separate: u64,
    pub copies: u64,
    pub warps_real: u64,
    pub warps_fake: u64,
    pub warps_clamped: u64,
    pub warps_outside: u64,
    pub propagated: u64,
    pub skipped_no_buffer: u64,
}

impl CompositorMetrics {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CompositorMetricsSnapshot {
        CompositorMetricsSnapshot {
            full: self.full.load(Ordering::Relaxed),
            partial_line: self.partial_line.load(Ordering::Relaxed),
            partial_rect: self.partial_rect.load(Ordering::Relaxed),
            scroll: self.scroll.load(Ordering::Relaxed),
            scroll_escalated: self.scroll_escalated.load(Ordering::Relaxed),
            title_with_main: self.title_with_main.load(Ordering::Relaxed),
            title_separate: self.title_separate.load(Ordering::Relaxed),
            copies: self.copies.load(Ordering::Relaxed),
            warps_real: self.warps_real.load(Ordering::Relaxed),
            warps_fake: self.warps_fake.load(Ordering::Relaxed),
            warps_clamped: self.warps_clamped.load(Ordering::Relaxed),
            warps_outside: self.warps_outside.load(Ordering::Relaxed),
            propagated: self.propagated.load(Ordering::Relaxed),
            skipped_no_buffer: self.skipped_no_buffer.load(Ordering::Relaxed),
        }
    }
}
