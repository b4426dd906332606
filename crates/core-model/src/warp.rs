use crate::layout::SubWindowKind;
use tracing::{debug, info};

/// Where an outstanding warp is expected to land, in sub-window-local
/// pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarpTarget {
    pub kind: SubWindowKind,
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarpOutcome {
    /// No warp outstanding; the event is ordinary user motion.
    Idle,
    /// The event is the echo of our warp; the warp is cleared.
    Matched,
    /// Near miss, still waiting.
    Miss { misses: u32 },
    /// More near misses than the retry bound tolerates; the warp is cleared.
    Abandoned { misses: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    FocusLost,
    Stalled,
    Superseded,
}

impl CancelReason {
    fn as_str(self) -> &'static str {
        match self {
            CancelReason::FocusLost => "focus_lost",
            CancelReason::Stalled => "stalled",
            CancelReason::Superseded => "superseded",
        }
    }
}

/// Per-session warp synchronizer record: at most one outstanding warp.
#[derive(Debug, Clone)]
pub struct WarpState {
    target: Option<WarpTarget>,
    misses: u32,
    retry_limit: u32,
}

impl WarpState {
    pub fn new(retry_limit: u32) -> Self {
        Self {
            target: None,
            misses: 0,
            retry_limit: retry_limit.max(1),
        }
    }

    pub fn expecting(&self) -> bool {
        self.target.is_some()
    }

    pub fn target(&self) -> Option<WarpTarget> {
        self.target
    }

    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    /// Record a new outstanding warp. Refused while one is pending; callers
    /// cancel explicitly first.
    pub fn arm(&mut self, target: WarpTarget) -> bool {
        if self.target.is_some() {
            return false;
        }
        debug!(target: "dispatch.warp", kind = ?target.kind, x = target.x, y = target.y, "warp_armed");
        self.target = Some(target);
        self.misses = 0;
        true
    }

    /// Compare a motion/enter event (already resolved to a sub-window and
    /// local coordinates) against the outstanding target.
    pub fn observe(&mut self, kind: SubWindowKind, x: i32, y: i32) -> WarpOutcome {
        let Some(t) = self.target else {
            return WarpOutcome::Idle;
        };
        if t.kind == kind && t.x == x && t.y == y {
            debug!(target: "dispatch.warp", misses = self.misses, "warp_matched");
            self.target = None;
            self.misses = 0;
            return WarpOutcome::Matched;
        }
        self.misses += 1;
        if self.misses > self.retry_limit {
            let misses = self.misses;
            info!(target: "dispatch.warp", misses, "warp_abandoned");
            self.target = None;
            self.misses = 0;
            return WarpOutcome::Abandoned { misses };
        }
        WarpOutcome::Miss {
            misses: self.misses,
        }
    }

    /// Drop the outstanding warp. Returns whether one was pending.
    pub fn cancel(&mut self, reason: CancelReason) -> bool {
        if self.target.take().is_some() {
            info!(target: "dispatch.warp", reason = reason.as_str(), misses = self.misses, "warp_cancelled");
            self.misses = 0;
            true
        } else {
            false
        }
    }
}
