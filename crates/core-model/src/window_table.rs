use crate::layout::SubWindowKind;
use ahash::AHashMap;
use core_events::WindowId;

/// What a window identifier refers to within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowRef {
    /// The session's top-level window; pointer events need a layout hit test.
    TopLevel,
    Sub(SubWindowKind),
    Unknown,
}

/// Window identifier to sub-window lookup for one session.
#[derive(Debug, Clone)]
pub struct WindowTable {
    top: WindowId,
    map: AHashMap<WindowId, SubWindowKind>,
    by_kind: [Option<WindowId>; SubWindowKind::ALL.len()],
}

impl WindowTable {
    pub fn new(top: WindowId) -> Self {
        Self {
            top,
            map: AHashMap::new(),
            by_kind: [None; SubWindowKind::ALL.len()],
        }
    }

    pub fn top(&self) -> WindowId {
        self.top
    }

    pub fn insert(&mut self, window: WindowId, kind: SubWindowKind) {
        if let Some(old) = self.by_kind[kind.index()].replace(window) {
            self.map.remove(&old);
        }
        self.map.insert(window, kind);
    }

    pub fn window(&self, kind: SubWindowKind) -> Option<WindowId> {
        self.by_kind[kind.index()]
    }

    pub fn resolve(&self, window: WindowId) -> WindowRef {
        if window == self.top {
            return WindowRef::TopLevel;
        }
        match self.map.get(&window) {
            Some(kind) => WindowRef::Sub(*kind),
            None => WindowRef::Unknown,
        }
    }

    pub fn windows(&self) -> impl Iterator<Item = (SubWindowKind, WindowId)> + '_ {
        SubWindowKind::ALL
            .into_iter()
            .filter_map(|k| self.window(k).map(|w| (k, w)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_top_sub_and_unknown() {
        let mut t = WindowTable::new(WindowId(1));
        t.insert(WindowId(2), SubWindowKind::Main);
        t.insert(WindowId(3), SubWindowKind::VerticalGutter);
        assert_eq!(t.resolve(WindowId(1)), WindowRef::TopLevel);
        assert_eq!(t.resolve(WindowId(3)), WindowRef::Sub(SubWindowKind::VerticalGutter));
        assert_eq!(t.resolve(WindowId(9)), WindowRef::Unknown);
        assert_eq!(t.window(SubWindowKind::Main), Some(WindowId(2)));
    }

    #[test]
    fn reinsert_replaces_old_id() {
        let mut t = WindowTable::new(WindowId(1));
        t.insert(WindowId(2), SubWindowKind::Transcript);
        t.insert(WindowId(5), SubWindowKind::Transcript);
        assert_eq!(t.resolve(WindowId(2)), WindowRef::Unknown);
        assert_eq!(t.windows().count(), 1);
    }
}
