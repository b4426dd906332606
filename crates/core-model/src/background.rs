/// Outstanding low-priority work for one session.
///
/// Fields change only through the setters so the aggregate flag is always
/// recomputed; [`BackgroundWork::compute`] is the pure definition the
/// aggregate must equal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackgroundWork {
    read_ahead: bool,
    at_eof: bool,
    find: bool,
    substitute: bool,
    keydefs: bool,
    scroll_remaining: usize,
    scroll_hold: bool,
    any: bool,
}

impl BackgroundWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pure definition of "this session has idle work".
    pub fn compute(&self) -> bool {
        self.foreground() || (self.scroll_remaining > 0 && !self.scroll_hold)
    }

    /// Idle work other than background scroll. Background scroll belongs
    /// to siblings, so this is all that counts for the active session.
    pub fn foreground(&self) -> bool {
        (self.read_ahead && !self.at_eof) || self.find || self.substitute || self.keydefs
    }

    /// Cached aggregate; always equal to [`compute`](Self::compute).
    pub fn pending(&self) -> bool {
        self.any
    }

    fn refresh(&mut self) {
        self.any = self.compute();
    }

    pub fn read_ahead(&self) -> bool {
        self.read_ahead && !self.at_eof
    }

    pub fn at_eof(&self) -> bool {
        self.at_eof
    }

    pub fn find(&self) -> bool {
        self.find
    }

    pub fn substitute(&self) -> bool {
        self.substitute
    }

    pub fn keydefs(&self) -> bool {
        self.keydefs
    }

    pub fn scroll_remaining(&self) -> usize {
        if self.scroll_hold {
            0
        } else {
            self.scroll_remaining
        }
    }

    pub fn scroll_hold(&self) -> bool {
        self.scroll_hold
    }

    pub fn set_read_ahead(&mut self, on: bool) {
        self.read_ahead = on;
        self.refresh();
    }

    pub fn set_at_eof(&mut self, eof: bool) {
        self.at_eof = eof;
        self.refresh();
    }

    pub fn set_find(&mut self, on: bool) {
        self.find = on;
        self.refresh();
    }

    pub fn set_substitute(&mut self, on: bool) {
        self.substitute = on;
        self.refresh();
    }

    pub fn set_keydefs(&mut self, on: bool) {
        self.keydefs = on;
        self.refresh();
    }

    pub fn set_scroll_remaining(&mut self, lines: usize) {
        self.scroll_remaining = lines;
        self.refresh();
    }

    /// Consume up to `lines` of pending background scroll; returns the
    /// amount taken.
    pub fn take_scroll(&mut self, lines: usize) -> usize {
        let n = lines.min(self.scroll_remaining);
        self.scroll_remaining -= n;
        self.refresh();
        n
    }

    /// User-initiated hold suspends background scrolling without losing it.
    pub fn set_scroll_hold(&mut self, hold: bool) {
        self.scroll_hold = hold;
        self.refresh();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_suppresses_read_ahead() {
        let mut w = BackgroundWork::new();
        w.set_read_ahead(true);
        assert!(w.pending());
        w.set_at_eof(true);
        assert!(!w.pending());
    }

    #[test]
    fn hold_suppresses_background_scroll() {
        let mut w = BackgroundWork::new();
        w.set_scroll_remaining(40);
        assert!(w.pending());
        w.set_scroll_hold(true);
        assert!(!w.pending());
        assert_eq!(w.scroll_remaining(), 0);
        w.set_scroll_hold(false);
        assert_eq!(w.take_scroll(100), 40);
        assert!(!w.pending());
    }

    #[test]
    fn foreground_ignores_background_scroll() {
        let mut w = BackgroundWork::new();
        w.set_scroll_remaining(40);
        assert!(w.pending());
        assert!(!w.foreground());
        w.set_find(true);
        assert!(w.foreground());
    }
}
