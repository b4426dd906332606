//! Redraw mask model.
//!
//! Producers (editing, scrolling, exposure handling) record one pending
//! [`RedrawRequest`] per sub-window; the compositor consumes and resets them.
//! Recording merges with whatever is already pending so there is never more
//! than one outstanding request per sub-window.
//!
//! Merge rules (`a.merge(b)`):
//! - `Full` with anything is `Full`.
//! - `PartialLine { l1 }` + `PartialLine { l2 }` => `PartialLine { min }`
//!   (a partial line repaints from its line to the bottom of the region).
//! - `PartialRect` on the same line keeps the smaller column; on different
//!   lines, or mixed with `PartialLine`, it widens to `PartialLine` from the
//!   smaller line.
//! - `Scroll` + `Scroll` adds the counts; a net zero scroll vanishes.
//! - `Scroll` mixed with any partial request escalates to `Full`: partial
//!   coordinates are not stable across a blit.
//!
//! Lines are content lines of the region (document lines for text regions);
//! the compositor maps them onto screen rows.

use crate::layout::SubWindowKind;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedrawRequest {
    #[default]
    None,
    Full,
    /// Repaint one line from `col` to the right edge.
    PartialRect { line: usize, col: usize },
    /// Repaint from `line` to the bottom of the region.
    PartialLine { line: usize },
    /// Content moved by `lines` (positive: view advanced toward the end).
    Scroll { lines: i64 },
}

impl RedrawRequest {
    pub fn is_none(&self) -> bool {
        matches!(self, RedrawRequest::None)
    }

    pub fn is_partial(&self) -> bool {
        matches!(
            self,
            RedrawRequest::PartialRect { .. } | RedrawRequest::PartialLine { .. }
        )
    }

    pub fn merge(self, next: RedrawRequest) -> RedrawRequest {
        use RedrawRequest::*;
        match (self, next) {
            (None, r) | (r, None) => r,
            (Full, _) | (_, Full) => Full,
            (Scroll { lines: a }, Scroll { lines: b }) => {
                let lines = a + b;
                if lines == 0 { None } else { Scroll { lines } }
            }
            (Scroll { .. }, _) | (_, Scroll { .. }) => Full,
            (PartialRect { line: l1, col: c1 }, PartialRect { line: l2, col: c2 }) => {
                if l1 == l2 {
                    PartialRect {
                        line: l1,
                        col: c1.min(c2),
                    }
                } else {
                    PartialLine { line: l1.min(l2) }
                }
            }
            (PartialLine { line: l1 }, PartialLine { line: l2 })
            | (PartialLine { line: l1 }, PartialRect { line: l2, .. })
            | (PartialRect { line: l1, .. }, PartialLine { line: l2 }) => {
                PartialLine { line: l1.min(l2) }
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct RedrawMetrics {
    marks: AtomicU64,
    merges: AtomicU64,
    subsumed: AtomicU64,
    escalated: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RedrawMetricsSnapshot {
    pub marks: u64,
    pub merges: u64,
    /// Pending partial/scroll requests cleared by a `Full`.
    pub subsumed: u64,
    /// Scroll + partial combinations escalated to `Full`.
    pub escalated: u64,
}

impl RedrawMetrics {
    pub fn snapshot(&self) -> RedrawMetricsSnapshot {
        RedrawMetricsSnapshot {
            marks: self.marks.load(Ordering::Relaxed),
            merges: self.merges.load(Ordering::Relaxed),
            subsumed: self.subsumed.load(Ordering::Relaxed),
            escalated: self.escalated.load(Ordering::Relaxed),
        }
    }
}

/// Pending requests for every sub-window of one session, plus the title
/// sub-region of the main area.
#[derive(Debug, Default)]
pub struct RedrawMask {
    slots: [RedrawRequest; SubWindowKind::ALL.len()],
    title: bool,
    metrics: RedrawMetrics,
}

impl RedrawMask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, kind: SubWindowKind, req: RedrawRequest) {
        if req.is_none() {
            return;
        }
        let slot = &mut self.slots[kind.index()];
        let prev = *slot;
        let merged = prev.merge(req);
        self.metrics.marks.fetch_add(1, Ordering::Relaxed);
        if !prev.is_none() {
            self.metrics.merges.fetch_add(1, Ordering::Relaxed);
            if merged == RedrawRequest::Full && prev != RedrawRequest::Full {
                if req == RedrawRequest::Full {
                    self.metrics.subsumed.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.metrics.escalated.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        tracing::trace!(target: "session", ?kind, ?prev, ?req, ?merged, "redraw_mark");
        *slot = merged;
    }

    pub fn mark_full_all(&mut self) {
        for kind in SubWindowKind::ALL {
            self.mark(kind, RedrawRequest::Full);
        }
        self.title = true;
    }

    pub fn mark_title(&mut self) {
        self.title = true;
    }

    pub fn title_pending(&self) -> bool {
        self.title
    }

    pub fn get(&self, kind: SubWindowKind) -> RedrawRequest {
        self.slots[kind.index()]
    }

    /// Consume the request for `kind`, leaving `None`.
    pub fn take(&mut self, kind: SubWindowKind) -> RedrawRequest {
        std::mem::take(&mut self.slots[kind.index()])
    }

    pub fn take_title(&mut self) -> bool {
        std::mem::take(&mut self.title)
    }

    /// Discard everything pending (used when there is nothing to draw into).
    pub fn clear(&mut self) {
        self.slots = Default::default();
        self.title = false;
    }

    pub fn is_empty(&self) -> bool {
        !self.title && self.slots.iter().all(RedrawRequest::is_none)
    }

    pub fn pending(&self) -> impl Iterator<Item = (SubWindowKind, RedrawRequest)> + '_ {
        SubWindowKind::ALL
            .into_iter()
            .map(|k| (k, self.get(k)))
            .filter(|(_, r)| !r.is_none())
    }

    pub fn metrics_snapshot(&self) -> RedrawMetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RedrawRequest::*;

    #[test]
    fn partial_merges() {
        assert_eq!(
            PartialRect { line: 4, col: 9 }.merge(PartialRect { line: 4, col: 2 }),
            PartialRect { line: 4, col: 2 }
        );
        assert_eq!(
            PartialRect { line: 4, col: 9 }.merge(PartialRect { line: 2, col: 20 }),
            PartialLine { line: 2 }
        );
        assert_eq!(
            PartialLine { line: 7 }.merge(PartialRect { line: 3, col: 1 }),
            PartialLine { line: 3 }
        );
    }

    #[test]
    fn scroll_accumulates_and_cancels() {
        assert_eq!(
            Scroll { lines: 3 }.merge(Scroll { lines: 2 }),
            Scroll { lines: 5 }
        );
        assert_eq!(Scroll { lines: 3 }.merge(Scroll { lines: -3 }), None);
        assert_eq!(Scroll { lines: 1 }.merge(PartialLine { line: 0 }), Full);
    }

    #[test]
    fn mask_take_resets_and_counts() {
        let mut m = RedrawMask::new();
        m.mark(SubWindowKind::Main, PartialLine { line: 5 });
        m.mark(SubWindowKind::Main, Full);
        m.mark(SubWindowKind::Transcript, Scroll { lines: 1 });
        m.mark(SubWindowKind::Transcript, PartialLine { line: 1 });
        let snap = m.metrics_snapshot();
        assert_eq!(snap.subsumed, 1);
        assert_eq!(snap.escalated, 1);
        assert_eq!(m.pending().count(), 2);
        assert_eq!(m.take(SubWindowKind::Main), Full);
        assert!(m.get(SubWindowKind::Main).is_none());
        m.take(SubWindowKind::Transcript);
        assert!(m.is_empty());
    }
}
