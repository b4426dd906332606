//! Motion rewriting during an implicit pointer grab.
//!
//! While a button is down the server keeps reporting motion relative to the
//! sub-window that received the press. These helpers re-address such an
//! event to the sub-window actually under the pointer, using the root
//! coordinates and the layout's known offsets.

use core_events::{Event, EventKind, WindowId};
use core_model::{DisplaySession, Located, WindowRef};

/// Re-address a button-held motion event. `origin` is the root position of
/// the session's top-level window. Returns `None` when the event needs no
/// rewriting (no button held, not motion, or already addressed to the
/// sub-window under the pointer).
pub fn rewrite_motion(
    session: &DisplaySession,
    origin: (i32, i32),
    event: &Event,
) -> Option<(Event, Located)> {
    let EventKind::Motion { pos, state } = event.kind else {
        return None;
    };
    if !state.any_button() {
        return None;
    }
    let from = match session.resolve(event.window) {
        WindowRef::Sub(kind) => kind,
        // Top-level and unknown windows are hit-tested by `locate` already.
        WindowRef::TopLevel | WindowRef::Unknown => return None,
    };
    let at = session.locate_top(pos.root_x - origin.0, pos.root_y - origin.1);
    if at.kind == from && at.x == pos.x && at.y == pos.y {
        return None;
    }
    let window: WindowId = session.window(at.kind)?;
    let mut out = event.clone();
    out.window = window;
    if let Some(p) = out.pointer_mut() {
        p.x = at.x;
        p.y = at.y;
    }
    Some((out, at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_display::headless::HeadlessDisplay;
    use core_events::{ModMask, PointerPos, Rect, SessionId};
    use core_model::{DocId, SessionOptions, SubWindowKind};

    fn session() -> DisplaySession {
        let (display, _h) = HeadlessDisplay::new(1024, 768);
        let opts = SessionOptions::new(DocId(1), Rect::new(100, 50, 800, 600));
        DisplaySession::open(SessionId(1), Box::new(display), opts).unwrap()
    }

    fn motion(window: WindowId, x: i32, y: i32, root: (i32, i32), state: ModMask) -> Event {
        Event::new(
            window,
            EventKind::Motion {
                pos: PointerPos::new(x, y, root.0, root.1),
                state,
            },
            1,
        )
    }

    #[test]
    fn drag_into_command_output_is_readdressed() {
        let s = session();
        let main = s.window(SubWindowKind::Main).unwrap();
        let out_rect = s.layout().rect(SubWindowKind::CommandOutput);
        // Relative to main, but physically inside the command-output row.
        let root = (100 + 40, 50 + out_rect.y + 3);
        let e = motion(main, 40, out_rect.y + 3, root, ModMask::BUTTON1);
        let (rewritten, at) = rewrite_motion(&s, (100, 50), &e).unwrap();
        assert_eq!(at.kind, SubWindowKind::CommandOutput);
        assert_eq!(rewritten.window, s.window(SubWindowKind::CommandOutput).unwrap());
        let p = rewritten.pointer().unwrap();
        assert_eq!((p.x, p.y), (40, 3));
        assert_eq!((p.root_x, p.root_y), root);
    }

    #[test]
    fn without_a_button_nothing_changes() {
        let s = session();
        let main = s.window(SubWindowKind::Main).unwrap();
        let e = motion(main, 40, 580, (140, 630), ModMask::empty());
        assert!(rewrite_motion(&s, (100, 50), &e).is_none());
    }

    #[test]
    fn motion_already_in_place_is_left_alone() {
        let s = session();
        let main = s.window(SubWindowKind::Main).unwrap();
        let e = motion(main, 40, 30, (140, 80), ModMask::BUTTON1);
        assert!(rewrite_motion(&s, (100, 50), &e).is_none());
    }
}
