use core_display::headless::HeadlessDisplay;
use core_events::{Rect, SessionId};
use core_idle::{
    IdleBudget, IdleCollaborator, IdleScheduler, Progress, ReadAhead, SearchKind, SearchStep,
    has_idle_work,
};
use core_model::{DisplaySession, DocId, SessionOptions, SessionSet};
use proptest::prelude::*;

/// Completes everything in one step; read-ahead hands out fixed blocks.
struct Eager {
    remaining: usize,
}

impl IdleCollaborator for Eager {
    fn load_keydefs(&mut self, _s: SessionId, _budget: usize) -> anyhow::Result<Progress> {
        Ok(Progress::Done)
    }

    fn continue_search(
        &mut self,
        _s: SessionId,
        _doc: DocId,
        _kind: SearchKind,
        _budget: usize,
    ) -> anyhow::Result<SearchStep> {
        Ok(SearchStep::Done {
            cursor: Some((1, 1)),
            edited: None,
            message: None,
        })
    }

    fn read_ahead(&mut self, _doc: DocId, block: usize) -> anyhow::Result<ReadAhead> {
        let loaded = block.min(self.remaining);
        self.remaining -= loaded;
        Ok(ReadAhead {
            loaded,
            total: 100 + (1000 - self.remaining),
            eof: self.remaining == 0,
        })
    }
}

#[derive(Debug, Clone)]
struct Flags {
    read_ahead: bool,
    find: bool,
    substitute: bool,
    keydefs: bool,
    scroll: usize,
    hold: bool,
}

fn flags() -> impl Strategy<Value = Flags> {
    (
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        0usize..400,
        any::<bool>(),
    )
        .prop_map(|(read_ahead, find, substitute, keydefs, scroll, hold)| Flags {
            read_ahead,
            find,
            substitute,
            keydefs,
            scroll,
            hold,
        })
}

fn build(all: &[Flags]) -> SessionSet {
    let mut set = SessionSet::new();
    for f in all {
        let (display, _h) = HeadlessDisplay::new(1024, 768);
        let id = set.allocate_id();
        let opts = SessionOptions::new(DocId(1), Rect::new(0, 0, 800, 600));
        let mut s = DisplaySession::open(id, Box::new(display), opts).unwrap();
        s.set_total_lines(100).unwrap();
        s.work.set_read_ahead(f.read_ahead);
        s.work.set_find(f.find);
        s.work.set_substitute(f.substitute);
        s.work.set_keydefs(f.keydefs);
        s.work.set_scroll_remaining(f.scroll);
        s.work.set_scroll_hold(f.hold);
        set.push(s);
    }
    set
}

proptest! {
    #[test]
    fn idle_work_matches_flags(all in prop::collection::vec(flags(), 1..4)) {
        let set = build(&all);
        // The first session is active; its background scroll does not count.
        let expected = all.iter().enumerate().any(|(i, f)| {
            f.read_ahead || f.find || f.substitute || f.keydefs || (i > 0 && f.scroll > 0 && !f.hold)
        });
        prop_assert_eq!(has_idle_work(&set), expected);
    }

    #[test]
    fn draining_terminates(all in prop::collection::vec(flags(), 1..4)) {
        let mut set = build(&all);
        let mut sched = IdleScheduler::new(IdleBudget {
            read_ahead_block: 256,
            ..IdleBudget::default()
        });
        let mut collab = Eager { remaining: 1000 };
        let mut units = 0;
        while sched.run_one_idle_unit(&mut set, &mut collab).is_some() {
            units += 1;
            prop_assert!(units <= 64, "idle work did not drain");
        }
        prop_assert!(!has_idle_work(&set));
    }
}
