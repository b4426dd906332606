//! Property tests for redraw mask merging and background-work aggregation.

use core_model::{BackgroundWork, RedrawMask, RedrawRequest, SubWindowKind};
use proptest::prelude::*;

fn request() -> impl Strategy<Value = RedrawRequest> {
    prop_oneof![
        Just(RedrawRequest::None),
        Just(RedrawRequest::Full),
        (0usize..200, 0usize..80).prop_map(|(line, col)| RedrawRequest::PartialRect { line, col }),
        (0usize..200).prop_map(|line| RedrawRequest::PartialLine { line }),
        (-50i64..50).prop_map(|lines| RedrawRequest::Scroll { lines }),
    ]
}

#[derive(Debug, Clone)]
enum FlagOp {
    ReadAhead(bool),
    Eof(bool),
    Find(bool),
    Substitute(bool),
    Keydefs(bool),
    Scroll(usize),
    Take(usize),
    Hold(bool),
}

fn flag_op() -> impl Strategy<Value = FlagOp> {
    prop_oneof![
        any::<bool>().prop_map(FlagOp::ReadAhead),
        any::<bool>().prop_map(FlagOp::Eof),
        any::<bool>().prop_map(FlagOp::Find),
        any::<bool>().prop_map(FlagOp::Substitute),
        any::<bool>().prop_map(FlagOp::Keydefs),
        (0usize..40).prop_map(FlagOp::Scroll),
        (0usize..40).prop_map(FlagOp::Take),
        any::<bool>().prop_map(FlagOp::Hold),
    ]
}

proptest! {
    // A later Full leaves exactly Full pending, whatever came before.
    #[test]
    fn full_subsumes_everything(before in prop::collection::vec(request(), 0..12)) {
        let mut m = RedrawMask::new();
        for r in &before {
            m.mark(SubWindowKind::Main, *r);
        }
        m.mark(SubWindowKind::Main, RedrawRequest::Full);
        prop_assert_eq!(m.get(SubWindowKind::Main), RedrawRequest::Full);
        // Idempotent: a second Full changes nothing.
        m.mark(SubWindowKind::Main, RedrawRequest::Full);
        prop_assert_eq!(m.take(SubWindowKind::Main), RedrawRequest::Full);
        prop_assert!(m.get(SubWindowKind::Main).is_none());
    }

    // Once Full is pending, nothing after it can weaken it.
    #[test]
    fn full_is_absorbing(after in prop::collection::vec(request(), 0..12)) {
        let mut m = RedrawMask::new();
        m.mark(SubWindowKind::Transcript, RedrawRequest::Full);
        for r in &after {
            m.mark(SubWindowKind::Transcript, *r);
        }
        prop_assert_eq!(m.get(SubWindowKind::Transcript), RedrawRequest::Full);
    }

    // Marks on one sub-window never leak into another.
    #[test]
    fn slots_are_independent(reqs in prop::collection::vec(request(), 1..12)) {
        let mut m = RedrawMask::new();
        for r in &reqs {
            m.mark(SubWindowKind::Main, *r);
        }
        prop_assert!(m.get(SubWindowKind::CommandInput).is_none());
        prop_assert!(m.get(SubWindowKind::Transcript).is_none());
    }

    // The cached aggregate always equals the pure definition.
    #[test]
    fn pending_matches_flags(ops in prop::collection::vec(flag_op(), 0..32)) {
        let mut w = BackgroundWork::new();
        for op in ops {
            match op {
                FlagOp::ReadAhead(b) => w.set_read_ahead(b),
                FlagOp::Eof(b) => w.set_at_eof(b),
                FlagOp::Find(b) => w.set_find(b),
                FlagOp::Substitute(b) => w.set_substitute(b),
                FlagOp::Keydefs(b) => w.set_keydefs(b),
                FlagOp::Scroll(n) => w.set_scroll_remaining(n),
                FlagOp::Take(n) => { w.take_scroll(n); }
                FlagOp::Hold(b) => w.set_scroll_hold(b),
            }
            prop_assert_eq!(w.pending(), w.compute());
            let expected = w.read_ahead() || w.find() || w.substitute() || w.keydefs()
                || w.scroll_remaining() > 0;
            prop_assert_eq!(w.pending(), expected);
        }
    }
}
