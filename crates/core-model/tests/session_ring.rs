use core_display::headless::{HeadlessDisplay, HeadlessHandle};
use core_events::{Rect, SessionId};
use core_model::{DisplaySession, DocId, SessionOptions, SessionSet};
use pretty_assertions::assert_eq;

fn session(set: &mut SessionSet) -> (SessionId, HeadlessHandle) {
    let (display, handle) = HeadlessDisplay::new(1024, 768);
    let id = set.allocate_id();
    let s = DisplaySession::open(
        id,
        Box::new(display),
        SessionOptions::new(DocId(1), Rect::new(0, 0, 640, 480)),
    )
    .unwrap();
    set.push(s);
    (id, handle)
}

#[test]
fn poll_order_rotates() {
    let mut set = SessionSet::new();
    let (a, _ha) = session(&mut set);
    let (b, _hb) = session(&mut set);
    let (c, _hc) = session(&mut set);
    assert_eq!(set.poll_order().as_slice(), &[a, b, c]);
    set.rotate();
    assert_eq!(set.poll_order().as_slice(), &[b, c, a]);
    set.rotate();
    set.rotate();
    assert_eq!(set.poll_order().as_slice(), &[a, b, c]);
}

#[test]
fn removing_active_fails_over_to_next() {
    let mut set = SessionSet::new();
    let (a, _ha) = session(&mut set);
    let (b, _hb) = session(&mut set);
    assert_eq!(set.active_id(), Some(a));
    let (gone, active) = set.remove(a);
    assert!(gone.is_some());
    assert_eq!(active, Some(b));
    let (_, active) = set.remove(b);
    assert_eq!(active, None);
    assert!(set.is_empty());
}

#[test]
fn idle_work_is_the_or_over_sessions() {
    let mut set = SessionSet::new();
    let (a, _ha) = session(&mut set);
    let (b, _hb) = session(&mut set);
    assert!(!set.has_idle_work());
    set.get_mut(b).unwrap().work.set_scroll_remaining(10);
    assert!(set.has_idle_work());
    set.get_mut(b).unwrap().work.set_scroll_hold(true);
    assert!(!set.has_idle_work());
    set.get_mut(a).unwrap().work.set_keydefs(true);
    assert!(set.has_idle_work());
}

#[test]
fn active_session_background_scroll_is_not_idle_work() {
    let mut set = SessionSet::new();
    let (a, _ha) = session(&mut set);
    let (b, _hb) = session(&mut set);
    set.get_mut(a).unwrap().work.set_scroll_remaining(10);
    assert!(!set.has_idle_work());
    set.set_active(b);
    assert!(set.has_idle_work());
}
