//! Event-handling loop.
//!
//! The runtime owns the session ring, the dispatcher and the line store. Each
//! dispatch is turned into session changes, then every pending redraw is
//! composited before the next one is taken.

use crate::keys::{Action, KeyDefError, parse_command};
use crate::store::LineStore;
use anyhow::{Context, Result, anyhow};
use core_compositor::Compositor;
use core_config::Config;
use core_display::term::{SharedRoutes, SharedScreen, TermDisplay, lock};
use core_display::headless::{HeadlessDisplay, HeadlessHandle};
use core_display::{DisplayError, DisplayResult, DisplayServer};
use core_dispatch::{Dispatch, DispatchHost, Dispatcher};
use core_events::{
    Button, ClientMessage, Event, EventKind, Inbound, KeySym, NamedKey, Rect, SessionId,
};
use core_idle::{IdleCollaborator, IdleUnit};
use core_input::{AsyncInputShutdown, is_interrupt};
use core_model::{
    CellMetrics, ContentProvider, DisplaySession, DocId, Located, ScrollCommand, ScrollDirection,
    SessionOptions, SessionSet, SubWindowKind,
};
use smallvec::SmallVec;
use std::collections::hash_map::Entry;
use std::fmt;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

const WHEEL_LINES: usize = 3;

/// Opens display connections for new sessions.
pub trait DisplayFactory {
    /// Connect `session`; returns the server and the top-level area to
    /// request.
    fn connect(
        &mut self,
        session: SessionId,
        tx: &Sender<Inbound>,
    ) -> Result<(Box<dyn DisplayServer>, Rect)>;

    /// Adjust session options to the server's units.
    fn tune(&self, _opts: &mut SessionOptions) {}

    /// Servers that never report Map themselves are mapped on open.
    fn maps_on_open(&self) -> bool {
        false
    }
}

/// Recording servers, one per session, cascaded across a virtual screen.
pub struct HeadlessFactory {
    screen: (u32, u32),
    size: (u32, u32),
    handles: Vec<HeadlessHandle>,
}

impl HeadlessFactory {
    pub fn new(screen: (u32, u32), size: (u32, u32)) -> Self {
        Self {
            screen,
            size,
            handles: Vec::new(),
        }
    }

    pub fn handles(&self) -> &[HeadlessHandle] {
        &self.handles
    }
}

impl Default for HeadlessFactory {
    fn default() -> Self {
        Self::new((1024, 768), (800, 600))
    }
}

impl DisplayFactory for HeadlessFactory {
    fn connect(
        &mut self,
        session: SessionId,
        tx: &Sender<Inbound>,
    ) -> Result<(Box<dyn DisplayServer>, Rect)> {
        let (display, handle) = HeadlessDisplay::new(self.screen.0, self.screen.1);
        let offset = 24 * self.handles.len() as i32;
        self.handles.push(handle);
        let area = Rect::new(offset, offset, self.size.0, self.size.1);
        Ok((Box::new(display.with_echo(session, tx.clone())), area))
    }

    fn maps_on_open(&self) -> bool {
        true
    }
}

/// Sessions share the terminal, each in its own horizontal band.
pub struct TermFactory {
    screen: SharedScreen,
    routes: SharedRoutes,
}

impl TermFactory {
    pub fn new(screen: SharedScreen, routes: SharedRoutes) -> Self {
        Self { screen, routes }
    }
}

impl DisplayFactory for TermFactory {
    fn connect(
        &mut self,
        session: SessionId,
        tx: &Sender<Inbound>,
    ) -> Result<(Box<dyn DisplayServer>, Rect)> {
        let (width, height) = lock(&self.routes).screen();
        let display = TermDisplay::new(
            session,
            self.screen.clone(),
            self.routes.clone(),
            tx.clone(),
        );
        Ok((Box::new(display), Rect::new(0, 0, width, height)))
    }

    fn tune(&self, opts: &mut SessionOptions) {
        opts.cell = CellMetrics::UNIT;
        opts.scrollbar.thickness = 1;
        opts.scrollbar.arrow_size = 1;
        opts.scrollbar.min_slider = 1;
        info!(target: "config", "terminal_cell_units");
    }
}

/// Idle-time side of the runtime: the collaborator plus compositing of
/// whatever an idle unit changed.
pub struct Host {
    store: LineStore,
    compositor: Compositor,
}

impl DispatchHost for Host {
    fn collaborator(&mut self) -> &mut dyn IdleCollaborator {
        &mut self.store
    }

    fn after_idle(
        &mut self,
        sessions: &mut SessionSet,
        unit: &IdleUnit,
    ) -> SmallVec<[(SessionId, DisplayError); 1]> {
        let warp = matches!(unit, IdleUnit::Search { moved: true, .. });
        if warp {
            sessions.set_active(unit.session());
        }
        self.compositor.apply_all(sessions, &self.store, warp)
    }
}

pub enum LoopControl {
    Continue { warp: bool },
    Break { reason: ShutdownReason },
}

impl LoopControl {
    const IDLE: LoopControl = LoopControl::Continue { warp: false };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    CtrlC,
    ActionQuit,
    CommandQuit,
    WindowClosed,
    ConnectionLost,
    ChannelClosed,
    SmokeComplete,
}

impl ShutdownReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownReason::CtrlC => "ctrl_c",
            ShutdownReason::ActionQuit => "action_quit",
            ShutdownReason::CommandQuit => "command_quit",
            ShutdownReason::WindowClosed => "window_closed",
            ShutdownReason::ConnectionLost => "connection_lost",
            ShutdownReason::ChannelClosed => "channel_closed",
            ShutdownReason::SmokeComplete => "smoke_complete",
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn log_shutdown_stage(reason: ShutdownReason, stage: &'static str) {
    info!(
        target: "runtime.shutdown",
        reason = reason.as_str(),
        stage = stage,
        "shutdown_stage"
    );
}

pub struct Runtime<F: DisplayFactory> {
    config: Config,
    sessions: SessionSet,
    dispatcher: Dispatcher,
    host: Host,
    factory: F,
    doc: DocId,
    transcript: Option<DocId>,
    /// Find prompts being typed, per session.
    prompts: ahash::AHashMap<SessionId, String>,
    tx: Option<Sender<Inbound>>,
    source_handles: Vec<JoinHandle<()>>,
    input_task: Option<JoinHandle<()>>,
    input_shutdown: Option<AsyncInputShutdown>,
    child: Option<Child>,
}

impl<F: DisplayFactory> Runtime<F> {
    pub fn new(
        config: Config,
        store: LineStore,
        doc: DocId,
        transcript: Option<DocId>,
        factory: F,
        tx: Sender<Inbound>,
        rx: Receiver<Inbound>,
    ) -> Self {
        let dispatcher = Dispatcher::new(rx, &config);
        let compositor = Compositor::from_config(&config);
        Self {
            config,
            sessions: SessionSet::new(),
            dispatcher,
            host: Host { store, compositor },
            factory,
            doc,
            transcript,
            prompts: ahash::AHashMap::new(),
            tx: Some(tx),
            source_handles: Vec::new(),
            input_task: None,
            input_shutdown: None,
            child: None,
        }
    }

    pub fn attach_sources(&mut self, handles: Vec<JoinHandle<()>>) {
        self.source_handles.extend(handles);
    }

    pub fn attach_input(&mut self, task: JoinHandle<()>, shutdown: AsyncInputShutdown) {
        self.input_task = Some(task);
        self.input_shutdown = Some(shutdown);
    }

    pub fn attach_child(&mut self, child: Child) {
        self.child = Some(child);
    }

    pub fn sessions(&self) -> &SessionSet {
        &self.sessions
    }

    pub fn store(&self) -> &LineStore {
        &self.host.store
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Open a session on the document. With `from`, the new session is a
    /// carbon copy of that sibling and scrolls through the document in the
    /// background.
    pub fn open_session(&mut self, from: Option<SessionId>) -> Result<SessionId> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| anyhow!("runtime is shutting down"))?;
        let id = self.sessions.allocate_id();
        let (display, area) = self.factory.connect(id, tx)?;
        let store = &self.host.store;
        let mut opts = SessionOptions::from_config(&self.config, self.doc, area);
        opts.transcript = self.transcript;
        opts.title = store.name(self.doc).unwrap_or("warpedit").to_string();
        self.factory.tune(&mut opts);
        let mut session = DisplaySession::open(id, display, opts)?;
        session
            .set_total_lines(store.line_count(self.doc))
            .context("size new session")?;
        if let Some(t) = self.transcript {
            session.transcript_grew(store.line_count(t));
        }
        session.work.set_read_ahead(store.is_loading(self.doc));
        session.work.set_keydefs(!store.keydefs().done());
        if self.factory.maps_on_open() {
            session.on_map().context("map new session")?;
        }
        if let Some(src) = from.and_then(|f| self.sessions.get(f)) {
            session.move_cursor(src.cursor.line, src.cursor.col);
            session.work.set_scroll_remaining(src.view.total_lines);
        }
        let id = self.sessions.push(session);
        info!(target: "runtime", session = %id, sibling_of = ?from, "session_ready");
        Ok(id)
    }

    pub async fn run(&mut self) -> ShutdownReason {
        self.composite(false);

        let loop_span = tracing::debug_span!(target: "runtime", "event_loop");
        let _enter_loop = loop_span.enter();

        let reason = loop {
            let dispatch = self
                .dispatcher
                .next_event(&mut self.sessions, &mut self.host)
                .await;
            trace!(target: "runtime", ?dispatch, "dispatch");
            match self.handle(dispatch) {
                LoopControl::Break { reason } => break reason,
                LoopControl::Continue { warp } => self.composite(warp),
            }
        };

        self.finalize_shutdown(reason).await;
        reason
    }

    /// Composite once and shut down.
    pub async fn smoke(&mut self) -> ShutdownReason {
        self.composite(false);
        let reason = ShutdownReason::SmokeComplete;
        self.finalize_shutdown(reason).await;
        reason
    }

    fn composite(&mut self, warp: bool) {
        let failed = self
            .host
            .compositor
            .apply_all(&mut self.sessions, &self.host.store, warp);
        for (id, e) in failed {
            warn!(target: "runtime", session = %id, error = %e, "composite_failed");
            self.dispatcher.connection_failed(id, &e);
        }
    }

    /// Non-fatal display errors are logged; fatal ones retire the session.
    fn settle(&mut self, session: SessionId, r: DisplayResult<()>) {
        if let Err(e) = r {
            self.dispatcher.connection_failed(session, &e);
        }
    }

    fn handle(&mut self, dispatch: Dispatch) -> LoopControl {
        match dispatch {
            Dispatch::Display {
                session,
                event,
                at,
                self_generated,
            } => self.handle_display(session, &event, at, self_generated),
            Dispatch::Scroll {
                session, command, ..
            } => {
                if let Some(s) = self.sessions.get_mut(session) {
                    s.work.set_scroll_hold(true);
                    s.apply_scroll(command);
                }
                LoopControl::IDLE
            }
            Dispatch::ChildOutput(bytes) => {
                self.child_output(&bytes);
                LoopControl::IDLE
            }
            Dispatch::ChildClosed => {
                info!(target: "runtime", "child_closed");
                if let Some(s) = self.sessions.active_mut() {
                    s.set_command_output("child process exited");
                }
                LoopControl::IDLE
            }
            Dispatch::Command(line) => self.handle_command(&line),
            Dispatch::ConnectionLost { session, failover } => {
                self.prompts.remove(&session);
                if failover.is_none() && self.sessions.is_empty() {
                    return LoopControl::Break {
                        reason: ShutdownReason::ConnectionLost,
                    };
                }
                info!(target: "runtime", %session, ?failover, "session_lost");
                LoopControl::IDLE
            }
            Dispatch::Closed => LoopControl::Break {
                reason: ShutdownReason::ChannelClosed,
            },
        }
    }

    fn handle_display(
        &mut self,
        session: SessionId,
        event: &Event,
        at: Located,
        self_generated: bool,
    ) -> LoopControl {
        match event.kind {
            EventKind::KeyPress { key, state } => {
                if is_interrupt(key, state) {
                    return LoopControl::Break {
                        reason: ShutdownReason::CtrlC,
                    };
                }
                self.sessions.set_active(session);
                if self.prompts.contains_key(&session) {
                    self.prompt_key(session, key);
                    return LoopControl::IDLE;
                }
                match self.host.store.keydefs().lookup(key).cloned() {
                    Some(action) => self.perform(session, action, ShutdownReason::ActionQuit),
                    None => {
                        trace!(target: "runtime", %session, ?key, "unbound_key");
                        LoopControl::IDLE
                    }
                }
            }
            EventKind::ButtonPress { button, .. } if !self_generated => {
                self.sessions.set_active(session);
                self.button(session, button, at);
                LoopControl::IDLE
            }
            EventKind::ClientMessage(ClientMessage::DeleteWindow) => self.close_session(session),
            _ => LoopControl::IDLE,
        }
    }

    fn button(&mut self, session: SessionId, button: Button, at: Located) {
        let Some(s) = self.sessions.get_mut(session) else {
            return;
        };
        if at.kind != SubWindowKind::Main {
            return;
        }
        match button {
            Button::WheelUp | Button::WheelDown => {
                let direction = if button == Button::WheelUp {
                    ScrollDirection::Up
                } else {
                    ScrollDirection::Down
                };
                s.work.set_scroll_hold(true);
                s.apply_scroll(ScrollCommand::new(direction, WHEEL_LINES));
            }
            Button::Left => {
                let title = s.layout().title_height() as i32;
                let cell = s.cell();
                if at.y < title || at.x < 0 {
                    return;
                }
                let row = ((at.y - title) / cell.height.max(1) as i32) as usize;
                let col = (at.x / cell.width.max(1) as i32) as usize;
                // The pointer is already on the new cursor; no warp.
                s.move_cursor(s.view.top_line + row, s.view.left_col + col);
            }
            _ => {}
        }
    }

    fn prompt_key(&mut self, session: SessionId, key: KeySym) {
        let Entry::Occupied(mut entry) = self.prompts.entry(session) else {
            return;
        };
        match key {
            KeySym::Char(c) => entry.get_mut().push(c),
            KeySym::Named(NamedKey::Backspace) => {
                entry.get_mut().pop();
            }
            KeySym::Named(NamedKey::Esc) => {
                entry.remove();
                if let Some(s) = self.sessions.get_mut(session) {
                    s.set_command_input("");
                }
                return;
            }
            KeySym::Named(NamedKey::Enter) => {
                let pattern = entry.remove();
                if let Some(s) = self.sessions.get_mut(session) {
                    s.set_command_input("");
                }
                if !pattern.is_empty() {
                    self.start_find(session, &pattern);
                }
                return;
            }
            _ => {}
        }
        let text = format!("/{}", entry.get());
        if let Some(s) = self.sessions.get_mut(session) {
            s.set_command_input(text);
        }
    }

    fn handle_command(&mut self, line: &str) -> LoopControl {
        let Some(id) = self.sessions.active_id() else {
            return LoopControl::IDLE;
        };
        match parse_command(line) {
            Ok(action) => self.perform(id, action, ShutdownReason::CommandQuit),
            Err(KeyDefError::Empty) => LoopControl::IDLE,
            Err(e) => {
                debug!(target: "runtime", line, error = %e, "command_rejected");
                if let Some(s) = self.sessions.get_mut(id) {
                    s.set_command_output(e.to_string());
                }
                LoopControl::IDLE
            }
        }
    }

    fn perform(&mut self, session: SessionId, action: Action, quit: ShutdownReason) -> LoopControl {
        match action {
            Action::Quit => return LoopControl::Break { reason: quit },
            Action::Find(None) => {
                self.prompts.insert(session, String::new());
                if let Some(s) = self.sessions.get_mut(session) {
                    s.set_command_input("/");
                }
                return LoopControl::IDLE;
            }
            Action::Find(Some(pattern)) => {
                self.start_find(session, &pattern);
                return LoopControl::IDLE;
            }
            Action::Substitute {
                pattern,
                replacement,
            } => {
                self.start_substitute(session, &pattern, &replacement);
                return LoopControl::IDLE;
            }
            Action::Sibling => {
                if let Err(e) = self.open_session(Some(session)) {
                    warn!(target: "runtime", %session, error = %e, "sibling_failed");
                    if let Some(s) = self.sessions.get_mut(session) {
                        s.set_command_output(format!("cannot open sibling: {e}"));
                    }
                }
                return LoopControl::IDLE;
            }
            Action::Resume => {
                let doc = self.doc;
                for s in self.sessions.iter_mut().filter(|s| s.doc() == doc) {
                    s.work.set_scroll_hold(false);
                }
                return LoopControl::IDLE;
            }
            Action::ToggleScrollbars => {
                let r = self.sessions.get_mut(session).map(|s| {
                    let on = s.scrollbars().is_none();
                    s.set_scrollbars_enabled(on)
                });
                self.settle(session, r.unwrap_or(Ok(())));
                return LoopControl::IDLE;
            }
            Action::AutoHide => {
                let r = self.sessions.get_mut(session).map(|s| {
                    let on = !s.scrollbars().is_some_and(|b| b.auto_hide());
                    s.set_auto_hide(on)
                });
                self.settle(session, r.unwrap_or(Ok(())));
                return LoopControl::IDLE;
            }
            _ => {}
        }

        let store = &self.host.store;
        let Some(s) = self.sessions.get_mut(session) else {
            return LoopControl::IDLE;
        };
        let doc = s.doc();
        let (line, col) = (s.cursor.line, s.cursor.col);
        let page = s.view.rows.max(1);
        let moved = match action {
            Action::CursorUp => s.move_cursor(line.saturating_sub(1), col),
            Action::CursorDown => s.move_cursor(line + 1, col),
            Action::CursorLeft => s.move_cursor(line, col.saturating_sub(1)),
            Action::CursorRight => s.move_cursor(line, (col + 1).min(store.line_len(doc, line))),
            Action::LineStart => s.move_cursor(line, 0),
            Action::LineEnd => s.move_cursor(line, store.line_len(doc, line)),
            Action::PageUp => {
                s.apply_scroll(ScrollCommand::new(ScrollDirection::Up, page));
                s.move_cursor(line.saturating_sub(page), col)
            }
            Action::PageDown => {
                s.apply_scroll(ScrollCommand::new(ScrollDirection::Down, page));
                s.move_cursor(line + page, col)
            }
            Action::Goto(n) => s.move_cursor(n.saturating_sub(1), 0),
            Action::Scroll(cmd) => {
                s.work.set_scroll_hold(true);
                s.apply_scroll(cmd);
                false
            }
            _ => false,
        };
        LoopControl::Continue { warp: moved }
    }

    fn start_find(&mut self, session: SessionId, pattern: &str) {
        let Some(s) = self.sessions.get_mut(session) else {
            return;
        };
        let from = (s.cursor.line, s.cursor.col);
        match self.host.store.start_find(session, s.doc(), pattern, from) {
            Ok(()) => {
                s.work.set_find(true);
                s.set_command_output(format!("/{pattern}"));
            }
            Err(e) => s.set_command_output(format!("bad pattern: {e}")),
        }
    }

    fn start_substitute(&mut self, session: SessionId, pattern: &str, replacement: &str) {
        let Some(s) = self.sessions.get_mut(session) else {
            return;
        };
        match self
            .host
            .store
            .start_substitute(session, s.doc(), pattern, replacement)
        {
            Ok(()) => s.work.set_substitute(true),
            Err(e) => s.set_command_output(format!("bad pattern: {e}")),
        }
    }

    fn child_output(&mut self, bytes: &[u8]) {
        let Some(t) = self.transcript else {
            trace!(target: "runtime", len = bytes.len(), "child_output_dropped");
            return;
        };
        let total = self.host.store.append_output(t, bytes);
        for s in self.sessions.iter_mut() {
            s.transcript_grew(total);
        }
    }

    fn close_session(&mut self, session: SessionId) -> LoopControl {
        let (removed, active) = self.sessions.remove(session);
        self.prompts.remove(&session);
        // Dropping the session releases its windows on the server.
        drop(removed);
        info!(target: "runtime", %session, ?active, "session_closed");
        if self.sessions.is_empty() {
            return LoopControl::Break {
                reason: ShutdownReason::WindowClosed,
            };
        }
        LoopControl::IDLE
    }

    async fn finalize_shutdown(&mut self, reason: ShutdownReason) {
        log_shutdown_stage(reason, "begin");
        if let Some(tx) = self.tx.take() {
            trace!(
                target: "runtime.shutdown",
                reason = reason.as_str(),
                "dropping_runtime_sender"
            );
            drop(tx);
        }

        if let Some(mut child) = self.child.take()
            && let Err(err) = child.start_kill()
        {
            warn!(target: "runtime.shutdown", ?err, "child_kill_failed");
        }

        while let Some(handle) = self.source_handles.pop() {
            match tokio::time::timeout(Duration::from_millis(200), handle).await {
                Ok(Ok(_)) => trace!(
                    target: "runtime.shutdown",
                    reason = reason.as_str(),
                    "event_source_task_stopped"
                ),
                Ok(Err(err)) if err.is_cancelled() => trace!(
                    target: "runtime.shutdown",
                    reason = reason.as_str(),
                    "event_source_task_cancelled"
                ),
                Ok(Err(err)) => error!(
                    target: "runtime.shutdown",
                    reason = reason.as_str(),
                    ?err,
                    "event_source_task_error"
                ),
                Err(_) => warn!(
                    target: "runtime.shutdown",
                    reason = reason.as_str(),
                    "event_source_task_timeout"
                ),
            }
        }

        if let Some(shutdown) = self.input_shutdown.take() {
            trace!(
                target: "runtime.shutdown",
                reason = reason.as_str(),
                "input_task_shutdown_signal"
            );
            shutdown.signal();
        }

        if let Some(handle) = self.input_task.take() {
            match handle.await {
                Ok(_) => trace!(
                    target: "runtime.shutdown",
                    reason = reason.as_str(),
                    "input_task_joined"
                ),
                Err(err) if err.is_cancelled() => trace!(
                    target: "runtime.shutdown",
                    reason = reason.as_str(),
                    "input_task_cancelled"
                ),
                Err(err) => error!(
                    target: "runtime.shutdown",
                    reason = reason.as_str(),
                    ?err,
                    "input_task_join_failed"
                ),
            }
        }

        info!(
            target: "runtime",
            dispatch = ?self.dispatcher.metrics_snapshot(),
            idle = ?self.dispatcher.idle_metrics(),
            compositor = ?self.host.compositor.metrics_snapshot(),
            "metrics"
        );
        log_shutdown_stage(reason, "complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_display::headless::Op;
    use core_events::{EVENT_CHANNEL_CAP, ModMask, WindowId};
    use core_idle::Progress;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc::channel;

    fn numbered(n: usize) -> String {
        (0..n).map(|i| format!("line {i}\n")).collect()
    }

    fn runtime_with(
        text: &str,
        transcript: bool,
    ) -> (Runtime<HeadlessFactory>, Sender<Inbound>, SessionId) {
        let mut store = LineStore::new();
        while store.load_keydefs(SessionId(0), usize::MAX).unwrap() != Progress::Done {}
        let doc = store.open_text("doc", text);
        let transcript = transcript.then(|| store.new_transcript());
        let (tx, rx) = channel(EVENT_CHANNEL_CAP);
        let mut rt = Runtime::new(
            Config::default(),
            store,
            doc,
            transcript,
            HeadlessFactory::default(),
            tx.clone(),
            rx,
        );
        let id = rt.open_session(None).unwrap();
        (rt, tx, id)
    }

    fn runtime(text: &str) -> (Runtime<HeadlessFactory>, Sender<Inbound>, SessionId) {
        runtime_with(text, false)
    }

    fn main_window(rt: &Runtime<HeadlessFactory>, id: SessionId) -> WindowId {
        rt.sessions().get(id).unwrap().window(SubWindowKind::Main).unwrap()
    }

    async fn key(tx: &Sender<Inbound>, id: SessionId, window: WindowId, key: KeySym, state: ModMask) {
        let e = Event::new(window, EventKind::KeyPress { key, state }, 1);
        tx.send(Inbound::display(id, e)).await.unwrap();
    }

    async fn chars(tx: &Sender<Inbound>, id: SessionId, window: WindowId, text: &str) {
        for c in text.chars() {
            key(tx, id, window, KeySym::Char(c), ModMask::empty()).await;
        }
    }

    /// Send `line` on the command source after `ms`, leaving idle time in
    /// between.
    fn later(tx: &Sender<Inbound>, ms: u64, line: &str) {
        let tx = tx.clone();
        let line = line.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            let _ = tx.send(Inbound::Command(line)).await;
        });
    }

    #[tokio::test]
    async fn cursor_keys_move_and_q_quits() {
        let (mut rt, tx, id) = runtime(&numbered(100));
        let main = main_window(&rt, id);
        for k in [NamedKey::Down, NamedKey::Down, NamedKey::Right] {
            key(&tx, id, main, KeySym::Named(k), ModMask::empty()).await;
        }
        chars(&tx, id, main, "q").await;
        assert_eq!(rt.run().await, ShutdownReason::ActionQuit);
        let s = rt.sessions().get(id).unwrap();
        assert_eq!((s.cursor.line, s.cursor.col), (2, 1));
    }

    #[tokio::test]
    async fn ctrl_c_interrupts() {
        let (mut rt, tx, id) = runtime("x\n");
        let main = main_window(&rt, id);
        key(&tx, id, main, KeySym::Char('c'), ModMask::CTRL).await;
        assert_eq!(rt.run().await, ShutdownReason::CtrlC);
    }

    #[tokio::test(start_paused = true)]
    async fn find_runs_in_idle_time() {
        let (mut rt, tx, id) = runtime(&numbered(100));
        tx.send(Inbound::Command("find line 42".into())).await.unwrap();
        later(&tx, 50, "quit");
        assert_eq!(rt.run().await, ShutdownReason::CommandQuit);
        let s = rt.sessions().get(id).unwrap();
        assert_eq!((s.cursor.line, s.cursor.col), (42, 0));
        assert!(!s.work.find());
    }

    #[tokio::test(start_paused = true)]
    async fn find_prompt_is_typed_into_command_input() {
        let (mut rt, tx, id) = runtime(&numbered(100));
        let main = main_window(&rt, id);
        chars(&tx, id, main, "/line 77").await;
        key(&tx, id, main, KeySym::Named(NamedKey::Enter), ModMask::empty()).await;
        later(&tx, 50, "quit");
        rt.run().await;
        let s = rt.sessions().get(id).unwrap();
        assert_eq!(s.cursor.line, 77);
        assert_eq!(s.command_input(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn missing_pattern_is_reported() {
        let (mut rt, tx, id) = runtime(&numbered(10));
        tx.send(Inbound::Command("find zebra".into())).await.unwrap();
        later(&tx, 50, "quit");
        rt.run().await;
        let s = rt.sessions().get(id).unwrap();
        assert_eq!(s.command_output(), "pattern not found: zebra");
        assert_eq!(s.cursor.line, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn substitute_edits_and_marks_modified() {
        let (mut rt, tx, id) = runtime(&numbered(20));
        tx.send(Inbound::Command("substitute ^line 1$/LINE ONE".into()))
            .await
            .unwrap();
        later(&tx, 50, "quit");
        rt.run().await;
        assert_eq!(rt.store().line(DocId(1), 1).as_deref(), Some("LINE ONE"));
        let s = rt.sessions().get(id).unwrap();
        assert!(s.modified());
        assert_eq!(s.command_output(), "1 substitutions");
    }

    #[tokio::test(start_paused = true)]
    async fn sibling_scrolls_to_the_end_in_the_background() {
        let (mut rt, tx, _id) = runtime(&numbered(100));
        tx.send(Inbound::Command("sibling".into())).await.unwrap();
        later(&tx, 50, "quit");
        rt.run().await;
        assert_eq!(rt.sessions().len(), 2);
        let sibling = rt.sessions().iter().last().unwrap();
        assert!(sibling.view.top_line > 0);
        assert_eq!(sibling.view.top_line, sibling.view.max_top());
        assert_eq!(sibling.work.scroll_remaining(), 0);
    }

    #[tokio::test]
    async fn child_output_reaches_the_transcript() {
        let (mut rt, tx, id) = runtime_with("x\n", true);
        tx.send(Inbound::ChildOutput(b"hello\nwor".to_vec())).await.unwrap();
        tx.send(Inbound::ChildOutput(b"ld\n".to_vec())).await.unwrap();
        tx.send(Inbound::ChildClosed).await.unwrap();
        tx.send(Inbound::Command("quit".into())).await.unwrap();
        rt.run().await;
        let s = rt.sessions().get(id).unwrap();
        assert_eq!(s.transcript.unwrap().view.total_lines, 2);
        assert_eq!(s.command_output(), "child process exited");
        assert_eq!(rt.store().line(DocId(2), 1).as_deref(), Some("world"));
    }

    #[tokio::test]
    async fn bad_commands_are_reported_not_fatal() {
        let (mut rt, tx, id) = runtime("x\n");
        tx.send(Inbound::Command("teleport".into())).await.unwrap();
        tx.send(Inbound::Command("quit".into())).await.unwrap();
        assert_eq!(rt.run().await, ShutdownReason::CommandQuit);
        let s = rt.sessions().get(id).unwrap();
        assert_eq!(s.command_output(), "unknown action `teleport`");
    }

    #[tokio::test]
    async fn closing_the_last_window_ends_the_loop() {
        let (mut rt, tx, id) = runtime("x\n");
        let top = rt.sessions().get(id).unwrap().top_window();
        let e = Event::new(top, EventKind::ClientMessage(ClientMessage::DeleteWindow), 1);
        tx.send(Inbound::display(id, e)).await.unwrap();
        assert_eq!(rt.run().await, ShutdownReason::WindowClosed);
        assert!(rt.sessions().is_empty());
    }

    #[tokio::test]
    async fn smoke_composites_once() {
        let (mut rt, _tx, _id) = runtime(&numbered(5));
        assert_eq!(rt.smoke().await, ShutdownReason::SmokeComplete);
        let ops = rt.factory().handles()[0].ops();
        assert!(ops.iter().any(Op::is_copy));
    }
}
