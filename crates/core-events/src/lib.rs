//! Core event types and channel helpers for warpedit.
//!
//! The display core consumes a windowing-server event stream. Its wire
//! encoding is irrelevant here: every backend (the crossterm server, the
//! headless recorder used by tests) translates its native events into the
//! tagged [`Event`] union below, carrying only what the core needs: the kind,
//! the target window, geometry, modifier state, a timestamp, and whether the
//! server marked the event as synthetic.
//!
//! All producers (display connections, the child-process transport, the
//! alternate command source) push [`Inbound`] envelopes into one bounded
//! channel. The dispatcher drains that channel into per-session queues.

use std::fmt;
use std::sync::atomic::AtomicU64;

pub mod sources;
pub use sources::{
    AsyncEventSource, ChildTransportSource, CommandSource, EventSourceRegistry,
};

// -------------------------------------------------------------------------------------------------
// Channel Policy
// -------------------------------------------------------------------------------------------------
// One bounded mpsc channel carries every inbound envelope. Producers await `send` so a slow
// consumer applies backpressure to the child-process reader instead of growing memory without
// bound. Display events are never dropped: warp matching depends on seeing every motion event.
// -------------------------------------------------------------------------------------------------
pub const EVENT_CHANNEL_CAP: usize = 8192;

// -------------------------------------------------------------------------------------------------
// Telemetry
// -------------------------------------------------------------------------------------------------
pub static CHANNEL_SEND_FAILURES: AtomicU64 = AtomicU64::new(0);
pub static CHILD_OUTPUT_CHUNKS: AtomicU64 = AtomicU64::new(0);
pub static CHILD_OUTPUT_BYTES: AtomicU64 = AtomicU64::new(0);
pub static COMMAND_LINES: AtomicU64 = AtomicU64::new(0);
pub static SOURCE_STARTS: AtomicU64 = AtomicU64::new(0);

/// Identifier of a window (top-level or sub-window) on the windowing server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u32);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Identifier of one Display Session (one connection / window set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Axis-aligned rectangle in pixel units. Width/height of zero is a valid
/// (empty) rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    /// Half-open containment: the right and bottom edges are outside.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Rect::new(x0, y0, (x1 - x0) as u32, (y1 - y0) as u32))
    }

    /// Smallest rectangle covering both. Empty rectangles are the identity.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = self.right().max(other.right());
        let y1 = self.bottom().max(other.bottom());
        Rect::new(x0, y0, (x1 - x0) as u32, (y1 - y0) as u32)
    }
}

bitflags::bitflags! {
    /// Modifier and pointer-button state reported with input events.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ModMask: u16 {
        const SHIFT   = 0x0001;
        const LOCK    = 0x0002;
        const CTRL    = 0x0004;
        const ALT     = 0x0008;
        const SUPER   = 0x0010;
        const BUTTON1 = 0x0100;
        const BUTTON2 = 0x0200;
        const BUTTON3 = 0x0400;
    }
}

impl ModMask {
    pub const BUTTONS: ModMask = ModMask::BUTTON1
        .union(ModMask::BUTTON2)
        .union(ModMask::BUTTON3);

    /// True while any pointer button is held down.
    pub fn any_button(self) -> bool {
        self.intersects(Self::BUTTONS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Left,
    Middle,
    Right,
    WheelUp,
    WheelDown,
}

impl Button {
    /// State bit reported in motion events while this button is held.
    /// Wheel "buttons" never stay down.
    pub fn mask(self) -> ModMask {
        match self {
            Button::Left => ModMask::BUTTON1,
            Button::Middle => ModMask::BUTTON2,
            Button::Right => ModMask::BUTTON3,
            Button::WheelUp | Button::WheelDown => ModMask::empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    Enter,
    Esc,
    Backspace,
    Tab,
    F(u8),
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
}

/// Logical key identity carried by key events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySym {
    Char(char),
    Named(NamedKey),
}

/// Pointer coordinates: window-relative plus root (screen) relative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PointerPos {
    pub x: i32,
    pub y: i32,
    pub root_x: i32,
    pub root_y: i32,
}

impl PointerPos {
    pub const fn new(x: i32, y: i32, root_x: i32, root_y: i32) -> Self {
        Self {
            x,
            y,
            root_x,
            root_y,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Window manager asks the client to close this window.
    DeleteWindow,
    TakeFocus,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Expose { area: Rect, count: u32 },
    Motion { pos: PointerPos, state: ModMask },
    Enter { pos: PointerPos, state: ModMask },
    Leave { pos: PointerPos, state: ModMask },
    FocusIn,
    FocusOut,
    Map,
    Unmap,
    Configure { area: Rect },
    PropertyChange { name: String },
    ButtonPress { button: Button, pos: PointerPos, state: ModMask },
    ButtonRelease { button: Button, pos: PointerPos, state: ModMask },
    KeyPress { key: KeySym, state: ModMask },
    KeyRelease { key: KeySym, state: ModMask },
    ClientMessage(ClientMessage),
}

/// Coarse event class used by dispatch filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventClass {
    Motion,
    Crossing,
    Focus,
    Exposure,
    Structure,
    Property,
    Button,
    Key,
    Client,
}

impl EventClass {
    /// Classes accepted while a pointer warp is outstanding. Keyboard and
    /// button input (and everything else) waits until the warp settles so it
    /// is never attributed to a stale cursor position.
    pub fn accepted_during_warp(self) -> bool {
        matches!(
            self,
            EventClass::Motion | EventClass::Crossing | EventClass::Focus | EventClass::Exposure
        )
    }
}

/// One windowing-server event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub window: WindowId,
    pub kind: EventKind,
    /// Server timestamp in milliseconds.
    pub time: u32,
    /// Set by the server when the event was generated by a client request
    /// rather than by hardware.
    pub synthetic: bool,
}

impl Event {
    pub fn new(window: WindowId, kind: EventKind, time: u32) -> Self {
        Self {
            window,
            kind,
            time,
            synthetic: false,
        }
    }

    pub fn synthetic(mut self) -> Self {
        self.synthetic = true;
        self
    }

    pub fn class(&self) -> EventClass {
        match self.kind {
            EventKind::Motion { .. } => EventClass::Motion,
            EventKind::Enter { .. } | EventKind::Leave { .. } => EventClass::Crossing,
            EventKind::FocusIn | EventKind::FocusOut => EventClass::Focus,
            EventKind::Expose { .. } => EventClass::Exposure,
            EventKind::Map | EventKind::Unmap | EventKind::Configure { .. } => {
                EventClass::Structure
            }
            EventKind::PropertyChange { .. } => EventClass::Property,
            EventKind::ButtonPress { .. } | EventKind::ButtonRelease { .. } => EventClass::Button,
            EventKind::KeyPress { .. } | EventKind::KeyRelease { .. } => EventClass::Key,
            EventKind::ClientMessage(_) => EventClass::Client,
        }
    }

    /// Pointer position for pointer-carrying events.
    pub fn pointer(&self) -> Option<PointerPos> {
        match &self.kind {
            EventKind::Motion { pos, .. }
            | EventKind::Enter { pos, .. }
            | EventKind::Leave { pos, .. }
            | EventKind::ButtonPress { pos, .. }
            | EventKind::ButtonRelease { pos, .. } => Some(*pos),
            _ => None,
        }
    }

    pub fn pointer_mut(&mut self) -> Option<&mut PointerPos> {
        match &mut self.kind {
            EventKind::Motion { pos, .. }
            | EventKind::Enter { pos, .. }
            | EventKind::Leave { pos, .. }
            | EventKind::ButtonPress { pos, .. }
            | EventKind::ButtonRelease { pos, .. } => Some(pos),
            _ => None,
        }
    }

    /// Modifier/button state; empty for events that carry none.
    pub fn state(&self) -> ModMask {
        match &self.kind {
            EventKind::Motion { state, .. }
            | EventKind::Enter { state, .. }
            | EventKind::Leave { state, .. }
            | EventKind::ButtonPress { state, .. }
            | EventKind::ButtonRelease { state, .. }
            | EventKind::KeyPress { state, .. }
            | EventKind::KeyRelease { state, .. } => *state,
            _ => ModMask::empty(),
        }
    }

    /// True for the two event kinds a pointer warp produces on the server.
    pub fn is_warp_candidate(&self) -> bool {
        matches!(self.kind, EventKind::Motion { .. } | EventKind::Enter { .. })
    }
}

/// Envelope pushed by every producer into the runtime channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Display { session: SessionId, event: Event },
    /// The display-server connection for `session` failed.
    DisplayLost { session: SessionId },
    ChildOutput(Vec<u8>),
    ChildClosed,
    /// One line from the alternate command source (newline stripped).
    Command(String),
    CommandEof,
}

impl Inbound {
    pub fn display(session: SessionId, event: Event) -> Self {
        Inbound::Display { session, event }
    }
}

/// Helper result type for producers.
pub type EventResult<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    fn motion(x: i32, y: i32, state: ModMask) -> Event {
        Event::new(
            WindowId(1),
            EventKind::Motion {
                pos: PointerPos::new(x, y, x, y),
                state,
            },
            0,
        )
    }

    #[test]
    fn warp_filter_accepts_pointer_and_expose_only() {
        let key = Event::new(
            WindowId(1),
            EventKind::KeyPress {
                key: KeySym::Char('a'),
                state: ModMask::empty(),
            },
            0,
        );
        assert!(!key.class().accepted_during_warp());
        assert!(motion(1, 1, ModMask::empty()).class().accepted_during_warp());
        let expose = Event::new(
            WindowId(1),
            EventKind::Expose {
                area: Rect::new(0, 0, 4, 4),
                count: 0,
            },
            0,
        );
        assert!(expose.class().accepted_during_warp());
        let press = Event::new(
            WindowId(1),
            EventKind::ButtonPress {
                button: Button::Left,
                pos: PointerPos::default(),
                state: ModMask::empty(),
            },
            0,
        );
        assert!(!press.class().accepted_during_warp());
    }

    #[test]
    fn button_state_detection() {
        assert!(motion(0, 0, ModMask::BUTTON1 | ModMask::SHIFT).state().any_button());
        assert!(!motion(0, 0, ModMask::SHIFT).state().any_button());
        assert_eq!(Button::WheelUp.mask(), ModMask::empty());
    }

    #[test]
    fn rect_intersect_and_union() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 10, 10);
        assert_eq!(a.intersect(&b), Some(Rect::new(5, 5, 5, 5)));
        assert_eq!(a.union(&b), Rect::new(0, 0, 15, 15));
        assert_eq!(a.intersect(&Rect::new(10, 0, 2, 2)), None);
        assert_eq!(Rect::default().union(&b), b);
        assert!(a.contains(9, 9));
        assert!(!a.contains(10, 9));
    }

    #[test]
    fn pointer_mut_rewrites_in_place() {
        let mut ev = motion(3, 4, ModMask::empty());
        if let Some(pos) = ev.pointer_mut() {
            pos.x = 30;
        }
        assert_eq!(ev.pointer().map(|p| p.x), Some(30));
        assert!(ev.is_warp_candidate());
    }
}
