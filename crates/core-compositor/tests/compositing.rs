use core_compositor::{Compositor, TitleCopy};
use core_display::Drawable;
use core_display::Paint;
use core_display::headless::{HeadlessDisplay, HeadlessHandle, Op};
use core_events::{Rect, SessionId, WindowId};
use core_model::{
    DisplaySession, DocId, RedrawRequest, ScrollCommand, ScrollDirection, SessionOptions,
    SubWindowKind,
};
use pretty_assertions::assert_eq;

fn doc(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("line {i}")).collect()
}

fn open() -> (DisplaySession, HeadlessHandle) {
    let (display, handle) = HeadlessDisplay::new(1024, 768);
    let mut opts = SessionOptions::new(DocId(1), Rect::new(0, 0, 800, 600));
    opts.title = "notes.txt".into();
    let mut s = DisplaySession::open(SessionId(1), Box::new(display), opts).unwrap();
    s.on_map().unwrap();
    (s, handle)
}

fn copies_to(handle: &HeadlessHandle, window: WindowId) -> Vec<(Rect, i32, i32)> {
    handle
        .ops()
        .into_iter()
        .filter_map(|op| match op {
            Op::CopyArea {
                dst: Drawable::Window(w),
                area,
                dst_x,
                dst_y,
                ..
            } if w == window => Some((area, dst_x, dst_y)),
            _ => None,
        })
        .collect()
}

fn texts(handle: &HeadlessHandle) -> Vec<String> {
    handle
        .ops()
        .into_iter()
        .filter_map(|op| match op {
            Op::DrawText { text, .. } => Some(text),
            _ => None,
        })
        .collect()
}

#[test]
fn full_repaint_carries_title_in_one_copy() {
    let (mut s, h) = open();
    let lines = doc(100);
    let c = Compositor::new(3);
    h.clear_ops();
    let report = c.apply(&mut s, &lines, false).unwrap();
    let main = s.window(SubWindowKind::Main).unwrap();
    assert_eq!(copies_to(&h, main), vec![(Rect::new(0, 0, 789, 544), 0, 0)]);
    assert_eq!(report.title, TitleCopy::WithMain);
    // main, command input, command output and both gutters
    assert_eq!(report.copies, 5);
    assert!(texts(&h).iter().any(|t| t == "notes.txt"));
    assert!(s.redraw.is_empty());
}

#[test]
fn title_alone_is_copied_separately() {
    let (mut s, h) = open();
    let lines = doc(100);
    let c = Compositor::new(3);
    c.apply(&mut s, &lines, false).unwrap();
    h.clear_ops();
    s.set_modified(true);
    let report = c.apply(&mut s, &lines, false).unwrap();
    let main = s.window(SubWindowKind::Main).unwrap();
    assert_eq!(copies_to(&h, main), vec![(Rect::new(0, 0, 789, 16), 0, 0)]);
    assert_eq!(report.title, TitleCopy::Separate);
    assert_eq!(texts(&h), vec!["notes.txt [+]".to_string()]);
}

#[test]
fn partial_line_copies_only_the_tail() {
    let (mut s, h) = open();
    let lines = doc(100);
    let c = Compositor::new(3);
    c.apply(&mut s, &lines, false).unwrap();
    h.clear_ops();
    s.redraw
        .mark(SubWindowKind::Main, RedrawRequest::PartialLine { line: 10 });
    let report = c.apply(&mut s, &lines, false).unwrap();
    let main = s.window(SubWindowKind::Main).unwrap();
    assert_eq!(
        copies_to(&h, main),
        vec![(Rect::new(0, 176, 789, 368), 0, 176)]
    );
    assert_eq!(report.title, TitleCopy::None);
    let t = texts(&h);
    assert_eq!(t.first().map(String::as_str), Some("line 10"));
    assert_eq!(t.len(), 23);
}

#[test]
fn scroll_blits_then_paints_rows_scrolled_in() {
    let (mut s, h) = open();
    let lines = doc(100);
    let c = Compositor::new(3);
    c.apply(&mut s, &lines, false).unwrap();
    h.clear_ops();
    assert!(s.apply_scroll(ScrollCommand::new(ScrollDirection::Down, 3)));
    let report = c.apply(&mut s, &lines, false).unwrap();
    let pix = s.offscreen().unwrap().drawable();
    let blit = h.ops().into_iter().find(|op| {
        matches!(op, Op::CopyArea { src, dst, .. } if *src == pix && *dst == pix)
    });
    assert_eq!(
        blit,
        Some(Op::CopyArea {
            src: pix,
            dst: pix,
            area: Rect::new(0, 64, 789, 480),
            dst_x: 0,
            dst_y: 16,
        })
    );
    let t = texts(&h);
    for expected in ["line 33", "line 34", "line 35"] {
        assert!(t.iter().any(|x| x == expected), "missing {expected}");
    }
    assert!(!t.iter().any(|x| x == "line 10"));
    // Content scrolled, so the title follows with its own copy.
    assert_eq!(report.title, TitleCopy::Separate);
    let main = s.window(SubWindowKind::Main).unwrap();
    assert_eq!(copies_to(&h, main).len(), 2);
}

#[test]
fn screenful_scroll_escalates_to_full() {
    let (mut s, h) = open();
    let lines = doc(100);
    let c = Compositor::new(3);
    c.apply(&mut s, &lines, false).unwrap();
    h.clear_ops();
    s.apply_scroll(ScrollCommand::new(ScrollDirection::Down, 40));
    let report = c.apply(&mut s, &lines, false).unwrap();
    assert!(report.painted.contains(&(SubWindowKind::Main, RedrawRequest::Full)));
    assert_eq!(report.title, TitleCopy::WithMain);
    assert_eq!(c.metrics_snapshot().scroll_escalated, 1);
}

#[test]
fn cursor_cell_is_drawn_inverse() {
    let (mut s, h) = open();
    let lines = doc(100);
    let c = Compositor::new(3);
    c.apply(&mut s, &lines, false).unwrap();
    h.clear_ops();
    assert!(s.move_cursor(2, 3));
    c.apply(&mut s, &lines, false).unwrap();
    let pix = s.offscreen().unwrap().drawable();
    assert!(h.ops().contains(&Op::DrawText {
        target: pix,
        x: 24,
        y: 48,
        text: "e".into(),
        paint: Paint::Inverse,
    }));
}

#[test]
fn missing_buffer_turns_requests_into_noops() {
    let (mut s, h) = open();
    let lines = doc(100);
    let c = Compositor::new(3);
    s.on_unmap();
    h.clear_ops();
    s.redraw.mark(SubWindowKind::Main, RedrawRequest::Full);
    let report = c.apply(&mut s, &lines, false).unwrap();
    assert!(report.skipped);
    assert!(h.ops().is_empty());
    assert!(s.redraw.is_empty());

    s.on_map().unwrap();
    let report = c.apply(&mut s, &lines, false).unwrap();
    assert!(!report.skipped);
    assert_eq!(report.copies, 5);
}

#[test]
fn failed_allocation_degrades_instead_of_failing() {
    let (mut s, h) = open();
    let lines = doc(10);
    let c = Compositor::new(3);
    s.on_unmap();
    h.fail_pixmaps(true);
    s.on_map().unwrap();
    assert!(s.offscreen().is_none());
    let report = c.apply(&mut s, &lines, false).unwrap();
    assert!(report.skipped);
    assert_eq!(c.metrics_snapshot().skipped_no_buffer, 1);
}

#[test]
fn severed_connection_is_fatal() {
    let (mut s, h) = open();
    let lines = doc(10);
    let c = Compositor::new(3);
    h.sever();
    let err = c.apply(&mut s, &lines, false).unwrap_err();
    assert!(err.is_fatal());
}
