use core_compositor::Compositor;
use core_display::Drawable;
use core_display::headless::{HeadlessDisplay, HeadlessHandle, Op};
use core_events::{Rect, SessionId};
use core_model::{
    DisplaySession, DocId, RedrawRequest, ScrollCommand, ScrollDirection, SessionOptions,
    SessionSet, SubWindowKind,
};
use pretty_assertions::assert_eq;

struct Fixture {
    set: SessionSet,
    lines: Vec<String>,
    compositor: Compositor,
}

impl Fixture {
    fn new() -> Self {
        Self {
            set: SessionSet::new(),
            lines: (0..100).map(|i| format!("line {i}")).collect(),
            compositor: Compositor::new(3),
        }
    }

    /// Open a mapped session on `doc`, scrolled to `top`, with nothing
    /// pending.
    fn open(&mut self, doc: u32, height: u32, top: usize) -> (SessionId, HeadlessHandle) {
        let (display, handle) = HeadlessDisplay::new(1024, 768);
        let id = self.set.allocate_id();
        let opts = SessionOptions::new(DocId(doc), Rect::new(0, 0, 800, height));
        let mut s = DisplaySession::open(id, Box::new(display), opts).unwrap();
        s.on_map().unwrap();
        s.set_total_lines(self.lines.len()).unwrap();
        if top > 0 {
            s.apply_scroll(ScrollCommand::new(ScrollDirection::Down, top));
        }
        self.compositor.apply(&mut s, &self.lines, false).unwrap();
        self.set.push(s);
        handle.clear_ops();
        (id, handle)
    }

    fn session(&mut self, id: SessionId) -> &mut DisplaySession {
        self.set.get_mut(id).unwrap()
    }
}

#[test]
fn edit_marks_sibling_from_first_visible_impacted_line() {
    let mut f = Fixture::new();
    let (a, _ha) = f.open(1, 600, 0);
    let (b, _hb) = f.open(1, 315, 5);
    assert_eq!(f.session(b).view.visible(), 5..21);

    f.session(a).note_edit(10..11);
    let marked = f.compositor.propagate(&mut f.set, a, &f.lines);
    assert_eq!(marked, 1);
    assert_eq!(
        f.session(b).redraw.get(SubWindowKind::Main),
        RedrawRequest::PartialLine { line: 10 }
    );
    // The impact is consumed.
    assert_eq!(f.compositor.propagate(&mut f.set, a, &f.lines), 0);
}

#[test]
fn edit_above_sibling_view_starts_at_its_top() {
    let mut f = Fixture::new();
    let (a, _ha) = f.open(1, 600, 0);
    let (b, _hb) = f.open(1, 315, 5);
    f.session(a).note_edit(2..8);
    f.compositor.propagate(&mut f.set, a, &f.lines);
    assert_eq!(
        f.session(b).redraw.get(SubWindowKind::Main),
        RedrawRequest::PartialLine { line: 5 }
    );
}

#[test]
fn other_documents_and_disjoint_views_are_untouched() {
    let mut f = Fixture::new();
    let (a, _ha) = f.open(1, 600, 0);
    let (other_doc, _hc) = f.open(2, 600, 0);
    let (far, _hd) = f.open(1, 315, 40);
    f.session(a).note_edit(10..11);
    assert_eq!(f.compositor.propagate(&mut f.set, a, &f.lines), 0);
    assert!(f.session(other_doc).redraw.is_empty());
    assert!(f.session(far).redraw.is_empty());
}

#[test]
fn apply_all_copies_only_the_sibling_tail() {
    let mut f = Fixture::new();
    let (a, ha) = f.open(1, 600, 0);
    let (b, hb) = f.open(1, 315, 5);
    assert_eq!(f.set.active_id(), Some(a));

    f.session(a).note_edit(10..11);
    let failed = f.compositor.apply_all(&mut f.set, &f.lines, false);
    assert!(failed.is_empty());

    let main_b = f.session(b).window(SubWindowKind::Main).unwrap();
    let copies: Vec<_> = hb
        .ops()
        .into_iter()
        .filter_map(|op| match op {
            Op::CopyArea {
                dst: Drawable::Window(w),
                area,
                ..
            } if w == main_b => Some(area),
            _ => None,
        })
        .collect();
    assert_eq!(copies, vec![Rect::new(0, 96, 789, 176)]);
    assert!(f.session(b).redraw.is_empty());
    // The editing session repainted its own tail and its title.
    assert!(ha.ops().iter().any(Op::is_copy));
    assert_eq!(f.compositor.metrics_snapshot().propagated, 1);
}

#[test]
fn lost_sibling_is_reported_without_stopping_the_others() {
    let mut f = Fixture::new();
    let (a, _ha) = f.open(1, 600, 0);
    let (b, hb) = f.open(1, 315, 5);
    let (c, hc) = f.open(1, 315, 5);
    hb.sever();
    f.session(a).note_edit(10..11);
    let failed = f.compositor.apply_all(&mut f.set, &f.lines, false);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, b);
    assert!(failed[0].1.is_fatal());
    assert!(f.session(c).redraw.is_empty());
    assert!(hc.ops().iter().any(Op::is_copy));
}
