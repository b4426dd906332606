//! Event Dispatcher and Warp Synchronizer.
//!
//! [`Dispatcher::next_event`] is the single suspension point of the core. It
//! drains the runtime channel into per-session lanes and hands out exactly one
//! [`Dispatch`] per call:
//!
//! * injected (self-generated) events first, then each session's lane in
//!   round-robin order, rotating after every non-warp event;
//! * while a session has a warp outstanding only motion, crossing, focus and
//!   exposure events leave its lane; key and button input waits, bounded by
//!   the warp's retry limit and by the stall timeout;
//! * child-process output and alternate-command lines;
//! * scrollbar auto-repeat ticks while an arrow or the gutter is held;
//! * otherwise one unit of idle work, then a re-poll.
//!
//! Structure events (map, unmap, configure, expose) and focus changes are
//! applied to the owning session before the event is returned, so the caller
//! only has to composite. Transport failures remove the session and report
//! the failover target.

mod metrics;
mod rewrite;

pub use metrics::{DispatchMetrics, DispatchMetricsSnapshot};
pub use rewrite::rewrite_motion;

use ahash::AHashMap;
use core_config::Config;
use core_display::{DisplayError, DisplayResult};
use core_events::{Button, Event, EventKind, Inbound, SessionId};
use core_idle::{IdleCollaborator, IdleMetricsSnapshot, IdleScheduler, IdleUnit};
use core_model::{
    CancelReason, DisplaySession, Located, ScrollCommand, SessionSet, WarpOutcome, WarpTarget,
};
use core_scrollbar::{AutoRepeat, Phase};
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// One unit handed to the event-handling loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// A windowing event for `session`, resolved to the sub-window it
    /// addresses. `self_generated` marks warp echoes and injected position
    /// updates, which must not re-trigger cursor-dependent behaviour.
    Display {
        session: SessionId,
        event: Event,
        at: Located,
        self_generated: bool,
    },
    /// A scrollbar press, drag step or auto-repeat tick. The caller feeds
    /// the command through `DisplaySession::apply_scroll`.
    Scroll {
        session: SessionId,
        command: ScrollCommand,
        repeat: bool,
    },
    ChildOutput(Vec<u8>),
    ChildClosed,
    Command(String),
    /// The session's connection failed and it was removed. `failover` is the
    /// session now active; `None` when no session remains.
    ConnectionLost {
        session: SessionId,
        failover: Option<SessionId>,
    },
    /// Every producer is gone and nothing is pending.
    Closed,
}

/// What the dispatcher needs from its owner while idle.
pub trait DispatchHost {
    fn collaborator(&mut self) -> &mut dyn IdleCollaborator;

    /// Runs after every idle unit so its redraws reach the screen before the
    /// next poll. Returns sessions whose connection failed meanwhile.
    fn after_idle(
        &mut self,
        sessions: &mut SessionSet,
        unit: &IdleUnit,
    ) -> SmallVec<[(SessionId, DisplayError); 1]> {
        let _ = (sessions, unit);
        SmallVec::new()
    }
}

/// Host that only runs idle work, without compositing.
pub struct IdleOnly<'a>(pub &'a mut dyn IdleCollaborator);

impl DispatchHost for IdleOnly<'_> {
    fn collaborator(&mut self) -> &mut dyn IdleCollaborator {
        self.0
    }
}

#[derive(Debug, Default)]
struct Lane {
    queue: VecDeque<Event>,
    /// Set when input first waited behind an outstanding warp.
    deferred_since: Option<Instant>,
}

#[derive(Debug, Clone, Copy)]
struct RepeatTimer {
    session: SessionId,
    due: Instant,
}

pub struct Dispatcher {
    rx: Receiver<Inbound>,
    closed: bool,
    lanes: AHashMap<SessionId, Lane>,
    other: VecDeque<Inbound>,
    lost: VecDeque<SessionId>,
    command_enabled: bool,
    stall_timeout: Duration,
    cadence: AutoRepeat,
    repeat: Option<RepeatTimer>,
    idle: IdleScheduler,
    metrics: DispatchMetrics,
}

impl Dispatcher {
    pub fn new(rx: Receiver<Inbound>, cfg: &Config) -> Self {
        Self {
            rx,
            closed: false,
            lanes: AHashMap::new(),
            other: VecDeque::new(),
            lost: VecDeque::new(),
            command_enabled: true,
            stall_timeout: cfg.file.warp.stall_timeout(),
            cadence: AutoRepeat::from_config(
                &cfg.file.scrollbar,
                cfg.effective.repeat_start_ms,
                cfg.effective.repeat_min_ms,
            ),
            repeat: None,
            idle: IdleScheduler::from_config(cfg),
            metrics: DispatchMetrics::default(),
        }
    }

    pub fn metrics_snapshot(&self) -> DispatchMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn idle_metrics(&self) -> IdleMetricsSnapshot {
        self.idle.metrics_snapshot()
    }

    /// False once the alternate command source reached end-of-stream.
    pub fn command_source_enabled(&self) -> bool {
        self.command_enabled
    }

    /// Events waiting in a session's lane (deferred input included).
    pub fn queued(&self, session: SessionId) -> usize {
        self.lanes.get(&session).map_or(0, |l| l.queue.len())
    }

    /// Session whose scrollbar is auto-repeating.
    pub fn repeating(&self) -> Option<SessionId> {
        self.repeat.map(|r| r.session)
    }

    /// Report a transport failure seen outside the dispatcher (e.g. while
    /// compositing); the session is removed on the next call.
    pub fn connection_failed(&mut self, session: SessionId, error: &DisplayError) {
        if error.is_fatal() {
            if !self.lost.contains(&session) {
                self.lost.push_back(session);
            }
        } else {
            warn!(target: "dispatch", %session, %error, "display_error");
        }
    }

    /// Wait for the next unit of work, running idle work while nothing is
    /// ready.
    pub async fn next_event(
        &mut self,
        sessions: &mut SessionSet,
        host: &mut dyn DispatchHost,
    ) -> Dispatch {
        loop {
            self.drain();
            if let Some(d) = self.take_lost(sessions) {
                return d;
            }
            self.expire_stalls(sessions);
            if let Some(d) = self.next_display(sessions) {
                return d;
            }
            if let Some(d) = self.take_lost(sessions) {
                return d;
            }
            if let Some(d) = self.next_other() {
                return d;
            }
            if let Some(d) = self.fire_repeat(sessions) {
                return d;
            }
            if sessions.has_idle_work()
                && let Some(unit) = self.idle.run_one_idle_unit(sessions, host.collaborator())
            {
                DispatchMetrics::bump(&self.metrics.idle_units);
                for (id, e) in host.after_idle(sessions, &unit) {
                    self.connection_failed(id, &e);
                }
                tokio::task::yield_now().await;
                continue;
            }

            let deadline = self.next_deadline();
            if self.closed {
                match deadline {
                    Some(at) => {
                        tokio::time::sleep_until(at).await;
                        continue;
                    }
                    None => {
                        debug!(target: "dispatch", "channel_closed");
                        return Dispatch::Closed;
                    }
                }
            }
            let msg = match deadline {
                Some(at) => tokio::select! {
                    m = self.rx.recv() => m,
                    () = tokio::time::sleep_until(at) => continue,
                },
                None => self.rx.recv().await,
            };
            match msg {
                Some(m) => self.route(m),
                None => self.closed = true,
            }
        }
    }

    fn drain(&mut self) {
        while let Ok(m) = self.rx.try_recv() {
            self.route(m);
        }
    }

    fn route(&mut self, msg: Inbound) {
        match msg {
            Inbound::Display { session, event } => {
                self.lanes.entry(session).or_default().queue.push_back(event);
            }
            Inbound::DisplayLost { session } => {
                if !self.lost.contains(&session) {
                    self.lost.push_back(session);
                }
            }
            Inbound::Command(line) if !self.command_enabled => {
                trace!(target: "dispatch", %line, "command_after_eof_dropped");
            }
            Inbound::CommandEof => {
                if self.command_enabled {
                    self.command_enabled = false;
                    info!(target: "dispatch", "command_source_disabled");
                }
            }
            other => self.other.push_back(other),
        }
    }

    fn next_other(&mut self) -> Option<Dispatch> {
        match self.other.pop_front()? {
            Inbound::ChildOutput(bytes) => Some(Dispatch::ChildOutput(bytes)),
            Inbound::ChildClosed => Some(Dispatch::ChildClosed),
            Inbound::Command(line) => Some(Dispatch::Command(line)),
            // Routed elsewhere.
            Inbound::Display { .. } | Inbound::DisplayLost { .. } | Inbound::CommandEof => None,
        }
    }

    fn take_lost(&mut self, sessions: &mut SessionSet) -> Option<Dispatch> {
        while let Some(id) = self.lost.pop_front() {
            self.lanes.remove(&id);
            if self.repeat.is_some_and(|r| r.session == id) {
                self.repeat = None;
            }
            let (removed, failover) = sessions.remove(id);
            if removed.is_none() {
                continue;
            }
            DispatchMetrics::bump(&self.metrics.failovers);
            warn!(target: "dispatch", session = %id, failover = ?failover, "connection_lost");
            return Some(Dispatch::ConnectionLost {
                session: id,
                failover,
            });
        }
        None
    }

    /// Abandon warps that have held input back for longer than the stall
    /// timeout.
    fn expire_stalls(&mut self, sessions: &mut SessionSet) {
        let now = Instant::now();
        for (id, lane) in self.lanes.iter_mut() {
            let Some(since) = lane.deferred_since else {
                continue;
            };
            let Some(s) = sessions.get_mut(*id) else {
                continue;
            };
            if !s.warp.expecting() {
                lane.deferred_since = None;
                continue;
            }
            if now.duration_since(since) >= self.stall_timeout {
                s.warp.cancel(CancelReason::Stalled);
                s.cursor.last_target = None;
                lane.deferred_since = None;
                DispatchMetrics::bump(&self.metrics.stalled);
                info!(target: "dispatch.warp", session = %id, held = lane.queue.len(), "warp_stalled");
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        let stall = self
            .lanes
            .values()
            .filter_map(|l| l.deferred_since)
            .map(|since| since + self.stall_timeout)
            .min();
        match (stall, self.repeat.map(|r| r.due)) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn next_display(&mut self, sessions: &mut SessionSet) -> Option<Dispatch> {
        let orphaned = &self.metrics.orphaned;
        self.lanes.retain(|id, lane| {
            let keep = sessions.get(*id).is_some();
            if !keep {
                debug!(target: "dispatch", session = %id, dropped = lane.queue.len(), "orphaned_lane");
                orphaned.fetch_add(lane.queue.len() as u64, std::sync::atomic::Ordering::Relaxed);
            }
            keep
        });
        for id in sessions.poll_order() {
            let Some(s) = sessions.get_mut(id) else {
                continue;
            };
            if let Some(event) = s.pop_injected() {
                DispatchMetrics::bump(&self.metrics.events);
                let at = locate(s, &event);
                trace!(target: "dispatch", session = %id, ?event, "injected");
                return Some(Dispatch::Display {
                    session: id,
                    event,
                    at,
                    self_generated: true,
                });
            }
            let Some(event) = self.take_ready(id, s) else {
                continue;
            };
            if let Some(d) = self.process(sessions, id, event) {
                return Some(d);
            }
        }
        None
    }

    /// Next event of the lane that may be delivered now.
    fn take_ready(&mut self, id: SessionId, s: &DisplaySession) -> Option<Event> {
        let lane = self.lanes.get_mut(&id)?;
        if !s.warp.expecting() {
            lane.deferred_since = None;
            return lane.queue.pop_front();
        }
        let pos = lane
            .queue
            .iter()
            .position(|e| e.class().accepted_during_warp());
        let held = pos.unwrap_or(lane.queue.len());
        if held > 0 && lane.deferred_since.is_none() {
            lane.deferred_since = Some(Instant::now());
            DispatchMetrics::bump(&self.metrics.deferred);
            debug!(target: "dispatch.warp", session = %id, held, "input_deferred");
        }
        pos.and_then(|p| lane.queue.remove(p))
    }

    /// Apply an event's side effects to its session and build the dispatch.
    /// `None` when the session was lost while handling it.
    fn process(
        &mut self,
        sessions: &mut SessionSet,
        id: SessionId,
        mut event: Event,
    ) -> Option<Dispatch> {
        DispatchMetrics::bump(&self.metrics.events);
        let s = sessions.get_mut(id)?;

        if let EventKind::Motion { pos, state } = event.kind
            && state.any_button()
        {
            if dragging(s) {
                let at = locate(s, &event);
                let d = match s.scrollbar_drag((pos.root_x, pos.root_y)) {
                    Some(command) => Dispatch::Scroll {
                        session: id,
                        command,
                        repeat: false,
                    },
                    None => Dispatch::Display {
                        session: id,
                        event,
                        at,
                        self_generated: false,
                    },
                };
                sessions.rotate();
                return Some(d);
            }
            match s.top_origin() {
                Ok(origin) => {
                    if let Some((rewritten, at)) = rewrite_motion(s, origin, &event) {
                        DispatchMetrics::bump(&self.metrics.rewritten);
                        trace!(target: "dispatch.rewrite", session = %id, from = %event.window, to = %rewritten.window, x = at.x, y = at.y, "motion_rewritten");
                        event = rewritten;
                    }
                }
                Err(e) => {
                    self.connection_failed(id, &e);
                    if e.is_fatal() {
                        return None;
                    }
                }
            }
        }

        let at = locate(s, &event);
        let mut self_generated = false;
        let mut scroll = None;
        let mut focused = false;
        match &event.kind {
            EventKind::Motion { .. } | EventKind::Enter { .. } => {
                self_generated = self.observe_warp(s, at);
            }
            EventKind::FocusIn => {
                s.set_focused(true);
                focused = true;
            }
            EventKind::FocusOut => {
                s.set_focused(false);
                if s.warp.cancel(CancelReason::FocusLost) {
                    DispatchMetrics::bump(&self.metrics.warp_cancelled);
                    s.cursor.last_target = None;
                }
            }
            EventKind::Map => {
                if !self.survive(id, "map", s.on_map()) {
                    return None;
                }
            }
            EventKind::Unmap => s.on_unmap(),
            EventKind::Configure { area } => {
                if !self.survive(id, "configure", s.on_configure(*area)) {
                    return None;
                }
            }
            EventKind::Expose { area, .. } => s.on_expose(event.window, *area),
            EventKind::ButtonPress {
                button: Button::Left,
                ..
            } if at.kind.is_gutter() => {
                scroll = s.scrollbar_press(at);
                if s.scrollbar_held() {
                    self.start_repeat(id);
                }
            }
            EventKind::ButtonRelease { .. } => {
                if s.scrollbar_release() {
                    debug!(target: "scrollbar", session = %id, "released");
                }
                if self.repeat.is_some_and(|r| r.session == id) {
                    self.repeat = None;
                }
            }
            _ => {}
        }

        if focused && sessions.set_active(id) {
            debug!(target: "dispatch", session = %id, "active_session");
        }
        if !self_generated {
            sessions.rotate();
        }
        Some(match scroll {
            Some(command) => Dispatch::Scroll {
                session: id,
                command,
                repeat: false,
            },
            None => Dispatch::Display {
                session: id,
                event,
                at,
                self_generated,
            },
        })
    }

    /// Match a motion/enter event against the outstanding warp. Returns
    /// whether the event is the warp's own echo.
    fn observe_warp(&self, s: &mut DisplaySession, at: Located) -> bool {
        let here = WarpTarget {
            kind: at.kind,
            x: at.x,
            y: at.y,
        };
        match s.warp.observe(at.kind, at.x, at.y) {
            WarpOutcome::Matched => {
                DispatchMetrics::bump(&self.metrics.warp_matched);
                s.cursor.last_target = Some(here);
                true
            }
            WarpOutcome::Miss { misses } => {
                DispatchMetrics::bump(&self.metrics.warp_missed);
                trace!(target: "dispatch.warp", session = %s.id(), misses, "warp_miss");
                false
            }
            WarpOutcome::Abandoned { .. } => {
                DispatchMetrics::bump(&self.metrics.warp_abandoned);
                s.cursor.last_target = None;
                false
            }
            WarpOutcome::Idle => {
                // The user moved the pointer away from where we left it.
                if s.cursor.last_target.is_some_and(|t| t != here) {
                    s.cursor.last_target = None;
                }
                false
            }
        }
    }

    /// Log a structure-handling error. Returns false when the session's
    /// connection is gone.
    fn survive<T>(&mut self, id: SessionId, what: &'static str, r: DisplayResult<T>) -> bool {
        match r {
            Ok(_) => true,
            Err(e) => {
                warn!(target: "dispatch", session = %id, what, error = %e, "structure_failed");
                self.connection_failed(id, &e);
                !e.is_fatal()
            }
        }
    }

    fn start_repeat(&mut self, session: SessionId) {
        self.cadence.reset();
        let delay = self.cadence.next_delay();
        self.repeat = Some(RepeatTimer {
            session,
            due: Instant::now() + delay,
        });
        debug!(target: "scrollbar", %session, delay_ms = delay.as_millis() as u64, "repeat_armed");
    }

    fn fire_repeat(&mut self, sessions: &mut SessionSet) -> Option<Dispatch> {
        let timer = self.repeat?;
        if Instant::now() < timer.due {
            return None;
        }
        let id = timer.session;
        let Some(s) = sessions.get_mut(id).filter(|s| s.scrollbar_held()) else {
            self.repeat = None;
            return None;
        };
        let command = s.scrollbar_repeat();
        let delay = self.cadence.next_delay();
        self.repeat = Some(RepeatTimer {
            session: id,
            due: Instant::now() + delay,
        });
        DispatchMetrics::bump(&self.metrics.repeats);
        trace!(target: "scrollbar", session = %id, ?command, next_ms = delay.as_millis() as u64, "repeat");
        command.map(|command| Dispatch::Scroll {
            session: id,
            command,
            repeat: true,
        })
    }
}

fn locate(s: &DisplaySession, event: &Event) -> Located {
    let (x, y) = event.pointer().map_or((0, 0), |p| (p.x, p.y));
    s.locate(event.window, x, y)
}

fn dragging(s: &DisplaySession) -> bool {
    s.scrollbars()
        .and_then(|b| b.active().map(|a| b.get(a).phase() == Phase::SliderDragging))
        .unwrap_or(false)
}
