use crate::key_token::{map_button, map_key_event, map_mod_mask};
use crate::{
    INPUT_STARTS, INPUT_STOP_CHANNEL, INPUT_STOP_ERROR, INPUT_STOP_SIGNAL, INPUT_STOP_STREAM,
    KEY_EVENTS, POINTER_EVENTS,
};
use core_display::term::{Route, SharedRoutes, SharedScreen, announce_placement, lock};
use core_events::{
    Button, CHANNEL_SEND_FAILURES, Event, EventKind, Inbound, KeySym, ModMask, PointerPos,
};
use crossterm::event::{
    Event as CEvent, EventStream, KeyEvent as CKeyEvent, MouseEvent as CMouseEvent,
    MouseEventKind as CMouseKind,
};
use std::io;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::{Notify, mpsc::Sender};
use tokio::task;
use tokio_stream::StreamExt;
use tracing::{info, trace, warn};

#[derive(Clone, Debug)]
pub struct AsyncInputShutdown {
    notify: Arc<Notify>,
}

impl AsyncInputShutdown {
    pub fn signal(&self) {
        self.notify.notify_one();
    }
}

#[derive(Clone, Debug)]
struct ShutdownListener {
    notify: Arc<Notify>,
}

impl ShutdownListener {
    fn new_pair() -> (AsyncInputShutdown, Self) {
        let notify = Arc::new(Notify::new());
        (
            AsyncInputShutdown {
                notify: notify.clone(),
            },
            ShutdownListener { notify },
        )
    }

    async fn wait(&self) {
        self.notify.notified().await;
    }
}

/// Spawn the task translating `EventStream` output into display events.
pub(crate) fn spawn_term_event_task(
    sender: Sender<Inbound>,
    routes: SharedRoutes,
    screen: SharedScreen,
) -> (task::JoinHandle<()>, AsyncInputShutdown) {
    let (shutdown, listener) = ShutdownListener::new_pair();
    let handle = task::spawn(async move {
        let span = tracing::debug_span!(target: "input.thread", "term_input_task");
        let _enter = span.enter();
        TermEventTask::new(sender, EventStream::new(), listener, routes, Some(screen))
            .run()
            .await;
    });
    (handle, shutdown)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ExitReason {
    Running,
    ShutdownSignal,
    ChannelClosed,
    StreamEnded,
    StreamError,
}

impl ExitReason {
    fn as_str(&self) -> &'static str {
        match self {
            ExitReason::Running => "running",
            ExitReason::ShutdownSignal => "shutdown_signal",
            ExitReason::ChannelClosed => "channel_closed",
            ExitReason::StreamEnded => "stream_ended",
            ExitReason::StreamError => "stream_error",
        }
    }
}

struct TermEventTask<S>
where
    S: tokio_stream::Stream<Item = io::Result<CEvent>> + Send + Unpin + 'static,
{
    sender: Sender<Inbound>,
    stream: S,
    shutdown: ShutdownListener,
    routes: SharedRoutes,
    screen: Option<SharedScreen>,
    /// Buttons currently held.
    held: ModMask,
    /// Top-level window receiving all pointer events while a button is held.
    grab: Option<Route>,
    /// Top-level window the pointer was last inside.
    hover: Option<Route>,
    exit_reason: ExitReason,
    stream_error: Option<io::ErrorKind>,
}

impl<S> TermEventTask<S>
where
    S: tokio_stream::Stream<Item = io::Result<CEvent>> + Send + Unpin + 'static,
{
    fn new(
        sender: Sender<Inbound>,
        stream: S,
        shutdown: ShutdownListener,
        routes: SharedRoutes,
        screen: Option<SharedScreen>,
    ) -> Self {
        Self {
            sender,
            stream,
            shutdown,
            routes,
            screen,
            held: ModMask::empty(),
            grab: None,
            hover: None,
            exit_reason: ExitReason::Running,
            stream_error: None,
        }
    }

    async fn run(mut self) {
        info!(target: "input.thread", "term_input_task_started");
        INPUT_STARTS.fetch_add(1, Ordering::Relaxed);
        self.exit_reason = ExitReason::StreamEnded;
        loop {
            let maybe_result = tokio::select! {
                biased;
                _ = self.shutdown.wait() => {
                    self.exit_reason = ExitReason::ShutdownSignal;
                    break;
                }
                result = self.stream.next() => result,
            };
            let Some(result) = maybe_result else {
                break;
            };
            let keep_going = match result {
                Ok(CEvent::Key(key)) => self.handle_key(key).await,
                Ok(CEvent::Mouse(mouse)) => self.handle_mouse(mouse).await,
                Ok(CEvent::Resize(w, h)) => {
                    self.handle_resize(u32::from(w), u32::from(h));
                    true
                }
                Ok(CEvent::FocusGained) => self.broadcast(EventKind::FocusIn).await,
                Ok(CEvent::FocusLost) => self.broadcast(EventKind::FocusOut).await,
                Ok(CEvent::Paste(_)) => true,
                Err(err) => {
                    self.exit_reason = ExitReason::StreamError;
                    self.stream_error = Some(err.kind());
                    break;
                }
            };
            if !keep_going {
                break;
            }
        }

        let reason = match self.exit_reason {
            ExitReason::Running => ExitReason::StreamEnded,
            other => other,
        };
        let counter = match reason {
            ExitReason::ShutdownSignal => Some(&INPUT_STOP_SIGNAL),
            ExitReason::ChannelClosed => Some(&INPUT_STOP_CHANNEL),
            ExitReason::StreamEnded => Some(&INPUT_STOP_STREAM),
            ExitReason::StreamError => Some(&INPUT_STOP_ERROR),
            ExitReason::Running => None,
        };
        if let Some(c) = counter {
            c.fetch_add(1, Ordering::Relaxed);
        }
        if matches!(reason, ExitReason::StreamError) {
            warn!(target: "input.thread", error_kind = ?self.stream_error, "term_input_task_stream_error");
        }
        info!(target: "input.thread", reason = reason.as_str(), "term_input_task_stopped");
    }

    fn now(&self) -> u32 {
        lock(&self.routes).now_ms()
    }

    /// Keyboard input goes to the top-level window under the pointer, or the
    /// first session when the pointer is outside every band.
    fn keyboard_target(&self) -> Option<Route> {
        let routes = lock(&self.routes);
        let (x, y) = routes.pointer();
        routes.hit(x, y).or_else(|| routes.routes().first().copied())
    }

    async fn handle_key(&mut self, key: CKeyEvent) -> bool {
        let Some(parts) = map_key_event(&key) else {
            return true;
        };
        let Some(route) = self.keyboard_target() else {
            trace!(target: "input.event", "key_without_window");
            return true;
        };
        let kind = if parts.release {
            EventKind::KeyRelease {
                key: parts.key,
                state: parts.state | self.held,
            }
        } else {
            EventKind::KeyPress {
                key: parts.key,
                state: parts.state | self.held,
            }
        };
        trace!(target: "input.event", kind = "key", session = %route.session, key = ?parts.key);
        let sent = self.send(route, kind).await;
        if sent {
            KEY_EVENTS.fetch_add(1, Ordering::Relaxed);
        }
        sent
    }

    async fn handle_mouse(&mut self, mouse: CMouseEvent) -> bool {
        let (rx, ry) = (i32::from(mouse.column), i32::from(mouse.row));
        let mods = map_mod_mask(mouse.modifiers);
        let hit = {
            let mut routes = lock(&self.routes);
            routes.set_pointer(rx, ry);
            routes.hit(rx, ry)
        };
        // Crossing events when the pointer changes bands without a grab.
        if self.grab.is_none() && hit.map(|r| r.window) != self.hover.map(|r| r.window) {
            if let Some(prev) = self.hover {
                let pos = local(prev, rx, ry);
                if !self
                    .send(prev, EventKind::Leave { pos, state: mods | self.held })
                    .await
                {
                    return false;
                }
            }
            if let Some(next) = hit {
                let pos = local(next, rx, ry);
                if !self
                    .send(next, EventKind::Enter { pos, state: mods | self.held })
                    .await
                {
                    return false;
                }
            }
            self.hover = hit;
        }
        let Some(target) = self.grab.or(hit) else {
            return true;
        };
        let pos = local(target, rx, ry);
        let state = mods | self.held;
        let kinds: Vec<EventKind> = match mouse.kind {
            CMouseKind::Down(b) => {
                let button = map_button(b);
                self.held |= button.mask();
                self.grab = Some(target);
                vec![EventKind::ButtonPress { button, pos, state }]
            }
            CMouseKind::Up(b) => {
                let button = map_button(b);
                self.held.remove(button.mask());
                if !self.held.any_button() {
                    self.grab = None;
                }
                vec![EventKind::ButtonRelease { button, pos, state }]
            }
            CMouseKind::Drag(_) | CMouseKind::Moved => vec![EventKind::Motion { pos, state }],
            CMouseKind::ScrollUp => wheel(Button::WheelUp, pos, state),
            CMouseKind::ScrollDown => wheel(Button::WheelDown, pos, state),
            CMouseKind::ScrollLeft | CMouseKind::ScrollRight => Vec::new(),
        };
        for kind in kinds {
            if !self.send(target, kind).await {
                return false;
            }
            POINTER_EVENTS.fetch_add(1, Ordering::Relaxed);
        }
        true
    }

    fn handle_resize(&mut self, width: u32, height: u32) {
        let (changed, time) = {
            let mut routes = lock(&self.routes);
            (routes.retile(width, height), routes.now_ms())
        };
        if let Some(screen) = &self.screen {
            lock(screen).sync_toplevels();
        }
        trace!(target: "input.event", width, height, changed = changed.len(), "resize");
        announce_placement(&self.sender, &changed, time);
    }

    async fn broadcast(&mut self, kind: EventKind) -> bool {
        let routes: Vec<Route> = lock(&self.routes).routes().to_vec();
        for route in routes {
            if !self.send(route, kind.clone()).await {
                return false;
            }
        }
        true
    }

    async fn send(&mut self, route: Route, kind: EventKind) -> bool {
        let event = Event::new(route.window, kind, self.now());
        match self.sender.send(Inbound::display(route.session, event)).await {
            Ok(()) => true,
            Err(_) => {
                CHANNEL_SEND_FAILURES.fetch_add(1, Ordering::Relaxed);
                if !matches!(self.exit_reason, ExitReason::ShutdownSignal) {
                    self.exit_reason = ExitReason::ChannelClosed;
                }
                false
            }
        }
    }
}

fn local(route: Route, rx: i32, ry: i32) -> PointerPos {
    PointerPos::new(rx - route.area.x, ry - route.area.y, rx, ry)
}

fn wheel(button: Button, pos: PointerPos, state: ModMask) -> Vec<EventKind> {
    vec![
        EventKind::ButtonPress { button, pos, state },
        EventKind::ButtonRelease { button, pos, state },
    ]
}

/// True for the key chord that quits regardless of session state.
pub fn is_interrupt(key: KeySym, state: ModMask) -> bool {
    matches!(key, KeySym::Char('c')) && state.contains(ModMask::CTRL)
}
