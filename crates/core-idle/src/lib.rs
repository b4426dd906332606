//! Background task scheduler.
//!
//! Idle work is whatever the [`BackgroundWork`] flags of any session say is
//! outstanding. The dispatcher calls [`IdleScheduler::run_one_idle_unit`]
//! only when no event is ready; each call performs exactly one bounded unit,
//! chosen by priority:
//!
//! 1. key-definition loading,
//! 2. find/substitute continuation (cursor move and redraw on completion),
//! 3. one block of read-ahead, with progress reports at geometric line
//!    thresholds,
//! 4. one screenful of background scroll on a sibling session.
//!
//! Within a tier the active session goes first, then the ring order.
//! Collaborator failures clear the failing flag so a broken job can never
//! keep the loop spinning.
//!
//! [`BackgroundWork`]: core_model::BackgroundWork

mod collaborator;
mod progress;

pub use collaborator::{IdleCollaborator, Progress, ReadAhead, SearchKind, SearchStep};
pub use progress::ProgressThresholds;

use ahash::AHashMap;
use core_config::Config;
use core_events::SessionId;
use core_model::{BackgroundWork, DocId, ScrollCommand, ScrollDirection, SessionSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, trace, warn};

/// What one idle unit did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleUnit {
    Keydefs {
        session: SessionId,
        done: bool,
    },
    Search {
        session: SessionId,
        kind: SearchKind,
        done: bool,
        /// Cursor repositioned; the caller requests a warp.
        moved: bool,
    },
    ReadAhead {
        session: SessionId,
        doc: DocId,
        loaded: usize,
        total: usize,
        eof: bool,
    },
    BackgroundScroll {
        session: SessionId,
        lines: usize,
    },
    /// The collaborator failed; the flag was cleared.
    Failed {
        session: SessionId,
    },
}

impl IdleUnit {
    pub fn session(&self) -> SessionId {
        match self {
            IdleUnit::Keydefs { session, .. }
            | IdleUnit::Search { session, .. }
            | IdleUnit::ReadAhead { session, .. }
            | IdleUnit::BackgroundScroll { session, .. }
            | IdleUnit::Failed { session } => *session,
        }
    }
}

/// Per-unit work limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleBudget {
    pub read_ahead_block: usize,
    pub search: usize,
    pub keydefs: usize,
    pub progress_first: usize,
    pub progress_factor: usize,
}

impl Default for IdleBudget {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl IdleBudget {
    pub fn from_config(cfg: &Config) -> Self {
        let idle = &cfg.file.idle;
        Self {
            read_ahead_block: idle.read_ahead_block.max(1),
            search: idle.search_budget.max(1),
            keydefs: idle.keydef_budget.max(1),
            progress_first: idle.progress_first,
            progress_factor: cfg.effective.progress_factor,
        }
    }
}

#[derive(Debug, Default)]
pub struct IdleMetrics {
    pub keydef_units: AtomicU64,
    pub search_units: AtomicU64,
    pub read_ahead_units: AtomicU64,
    pub scroll_units: AtomicU64,
    pub progress_reports: AtomicU64,
    pub failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdleMetricsSnapshot {
    pub keydef_units: u64,
    pub search_units: u64,
    pub read_ahead_units: u64,
    pub scroll_units: u64,
    pub progress_reports: u64,
    pub failures: u64,
}

impl IdleMetrics {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IdleMetricsSnapshot {
        IdleMetricsSnapshot {
            keydef_units: self.keydef_units.load(Ordering::Relaxed),
            search_units: self.search_units.load(Ordering::Relaxed),
            read_ahead_units: self.read_ahead_units.load(Ordering::Relaxed),
            scroll_units: self.scroll_units.load(Ordering::Relaxed),
            progress_reports: self.progress_reports.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default)]
pub struct IdleScheduler {
    budget: IdleBudget,
    progress: AHashMap<DocId, ProgressThresholds>,
    metrics: IdleMetrics,
}

/// Pure: idle work exists iff some session has a background flag set.
pub fn has_idle_work(sessions: &SessionSet) -> bool {
    sessions.has_idle_work()
}

impl IdleScheduler {
    pub fn new(budget: IdleBudget) -> Self {
        Self {
            budget,
            progress: AHashMap::new(),
            metrics: IdleMetrics::default(),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(IdleBudget::from_config(cfg))
    }

    pub fn budget(&self) -> IdleBudget {
        self.budget
    }

    pub fn metrics_snapshot(&self) -> IdleMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn has_idle_work(&self, sessions: &SessionSet) -> bool {
        has_idle_work(sessions)
    }

    /// Perform one bounded unit of background work. Returns `None` when
    /// nothing is outstanding.
    pub fn run_one_idle_unit(
        &mut self,
        sessions: &mut SessionSet,
        collab: &mut dyn IdleCollaborator,
    ) -> Option<IdleUnit> {
        let order = session_order(sessions);
        let unit = if let Some(id) = pick(sessions, &order, BackgroundWork::keydefs) {
            self.keydefs(sessions, id, collab)
        } else if let Some(id) = pick(sessions, &order, |w| w.find() || w.substitute()) {
            self.search(sessions, id, collab)
        } else if let Some(id) = pick(sessions, &order, BackgroundWork::read_ahead) {
            self.read_ahead(sessions, id, collab)
        } else if let Some(id) = pick_sibling(sessions, &order, |w| w.scroll_remaining() > 0) {
            self.background_scroll(sessions, id)
        } else {
            None
        };
        if let Some(u) = &unit {
            trace!(target: "idle", unit = ?u, "idle_unit");
        }
        unit
    }

    fn keydefs(
        &mut self,
        sessions: &mut SessionSet,
        id: SessionId,
        collab: &mut dyn IdleCollaborator,
    ) -> Option<IdleUnit> {
        IdleMetrics::bump(&self.metrics.keydef_units);
        let r = collab.load_keydefs(id, self.budget.keydefs);
        let s = sessions.get_mut(id)?;
        match r {
            Ok(p) => {
                let done = p == Progress::Done;
                if done {
                    s.work.set_keydefs(false);
                    debug!(target: "idle", session = %id, "keydefs_loaded");
                }
                Some(IdleUnit::Keydefs { session: id, done })
            }
            Err(e) => {
                s.work.set_keydefs(false);
                self.failed(id, "keydefs", &e)
            }
        }
    }

    fn search(
        &mut self,
        sessions: &mut SessionSet,
        id: SessionId,
        collab: &mut dyn IdleCollaborator,
    ) -> Option<IdleUnit> {
        IdleMetrics::bump(&self.metrics.search_units);
        let s = sessions.get_mut(id)?;
        let kind = if s.work.find() {
            SearchKind::Find
        } else {
            SearchKind::Substitute
        };
        let clear = |w: &mut BackgroundWork| match kind {
            SearchKind::Find => w.set_find(false),
            SearchKind::Substitute => w.set_substitute(false),
        };
        let step = match collab.continue_search(id, s.doc(), kind, self.budget.search) {
            Ok(step) => step,
            Err(e) => {
                clear(&mut s.work);
                return self.failed(id, "search", &e);
            }
        };
        let SearchStep::Done {
            cursor,
            edited,
            message,
        } = step
        else {
            return Some(IdleUnit::Search {
                session: id,
                kind,
                done: false,
                moved: false,
            });
        };
        clear(&mut s.work);
        if let Some(lines) = edited {
            s.note_edit(lines);
        }
        let moved = cursor.is_some_and(|(line, col)| s.move_cursor(line, col));
        if let Some(msg) = message {
            s.set_command_output(msg);
        }
        debug!(target: "idle", session = %id, ?kind, moved, "search_finished");
        Some(IdleUnit::Search {
            session: id,
            kind,
            done: true,
            moved,
        })
    }

    fn read_ahead(
        &mut self,
        sessions: &mut SessionSet,
        id: SessionId,
        collab: &mut dyn IdleCollaborator,
    ) -> Option<IdleUnit> {
        IdleMetrics::bump(&self.metrics.read_ahead_units);
        let doc = sessions.get(id)?.doc();
        let ra = match collab.read_ahead(doc, self.budget.read_ahead_block) {
            Ok(ra) => ra,
            Err(e) => {
                if let Some(s) = sessions.get_mut(id) {
                    s.work.set_read_ahead(false);
                }
                return self.failed(id, "read_ahead", &e);
            }
        };
        let budget = self.budget;
        let report = self
            .progress
            .entry(doc)
            .or_insert_with(|| ProgressThresholds::new(budget.progress_first, budget.progress_factor))
            .crossed(ra.total);
        // Every view of the document sees the new length and the EOF state.
        for s in sessions.iter_mut().filter(|s| s.doc() == doc) {
            if ra.eof {
                s.work.set_at_eof(true);
            }
            if let Err(e) = s.set_total_lines(ra.total) {
                warn!(target: "idle.readahead", session = %s.id(), error = %e, "resize_failed");
            }
        }
        if report && let Some(s) = sessions.get_mut(id) {
            IdleMetrics::bump(&self.metrics.progress_reports);
            s.set_command_output(format!("{} lines read", ra.total));
            info!(target: "idle.readahead", %doc, total = ra.total, "progress");
        }
        if ra.eof {
            debug!(target: "idle.readahead", %doc, total = ra.total, "eof");
        }
        Some(IdleUnit::ReadAhead {
            session: id,
            doc,
            loaded: ra.loaded,
            total: ra.total,
            eof: ra.eof,
        })
    }

    fn background_scroll(&mut self, sessions: &mut SessionSet, id: SessionId) -> Option<IdleUnit> {
        IdleMetrics::bump(&self.metrics.scroll_units);
        let s = sessions.get_mut(id)?;
        let screen = s.view.rows.max(1);
        let lines = s.work.take_scroll(screen);
        let moved = s.apply_scroll(ScrollCommand::new(ScrollDirection::Down, lines));
        if !moved {
            // Bottom of the document: nothing left to scroll into.
            s.work.set_scroll_remaining(0);
        }
        debug!(target: "idle", session = %id, lines, moved, "background_scroll");
        Some(IdleUnit::BackgroundScroll {
            session: id,
            lines: if moved { lines } else { 0 },
        })
    }

    fn failed(&self, id: SessionId, what: &'static str, e: &anyhow::Error) -> Option<IdleUnit> {
        IdleMetrics::bump(&self.metrics.failures);
        warn!(target: "idle", session = %id, what, error = %e, "idle_unit_failed");
        Some(IdleUnit::Failed { session: id })
    }
}

/// Active session first, then the rest in ring order.
fn session_order(sessions: &SessionSet) -> Vec<SessionId> {
    let mut ids: Vec<SessionId> = sessions.poll_order().into_iter().collect();
    if let Some(active) = sessions.active_id()
        && let Some(pos) = ids.iter().position(|id| *id == active)
    {
        ids[..=pos].rotate_right(1);
    }
    ids
}

fn pick(
    sessions: &SessionSet,
    order: &[SessionId],
    has: impl Fn(&BackgroundWork) -> bool,
) -> Option<SessionId> {
    order
        .iter()
        .copied()
        .find(|id| sessions.get(*id).is_some_and(|s| has(&s.work)))
}

/// Like [`pick`], skipping the active session.
fn pick_sibling(
    sessions: &SessionSet,
    order: &[SessionId],
    has: impl Fn(&BackgroundWork) -> bool,
) -> Option<SessionId> {
    let active = sessions.active_id();
    order
        .iter()
        .copied()
        .filter(|id| Some(*id) != active)
        .find(|id| sessions.get(*id).is_some_and(|s| has(&s.work)))
}
