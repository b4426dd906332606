use core_events::SessionId;
use core_model::DocId;
use std::ops::Range;

/// Outcome of one bounded slice of key-definition loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    More,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchKind {
    Find,
    Substitute,
}

/// Outcome of one bounded slice of find/substitute work.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SearchStep {
    /// Budget exhausted, more to scan.
    #[default]
    Continue,
    Done {
        /// New cursor position, if the search landed somewhere.
        cursor: Option<(usize, usize)>,
        /// Lines rewritten by a substitute.
        edited: Option<Range<usize>>,
        /// Shown on the command-output row.
        message: Option<String>,
    },
}

/// One block of read-ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadAhead {
    pub loaded: usize,
    /// Lines available after this block.
    pub total: usize,
    pub eof: bool,
}

/// The editing/search side of idle work. Each call must do a bounded
/// amount of work (the budget is a line or definition count) and return.
pub trait IdleCollaborator {
    fn load_keydefs(&mut self, session: SessionId, budget: usize) -> anyhow::Result<Progress>;

    fn continue_search(
        &mut self,
        session: SessionId,
        doc: DocId,
        kind: SearchKind,
        budget: usize,
    ) -> anyhow::Result<SearchStep>;

    fn read_ahead(&mut self, doc: DocId, block: usize) -> anyhow::Result<ReadAhead>;
}
