use std::borrow::Cow;
use std::fmt;

/// Identity of a document shown by one or more sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocId(pub u32);

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.0)
    }
}

/// Read access to document text for painting. Implemented by the
/// line-store collaborator; the display core never edits through it.
pub trait ContentProvider {
    /// Lines currently loaded (read-ahead may still be extending this).
    fn line_count(&self, doc: DocId) -> usize;
    fn line(&self, doc: DocId, index: usize) -> Option<Cow<'_, str>>;
}

/// Provider with no documents. Useful for sessions that only show command
/// rows and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoContent;

impl ContentProvider for NoContent {
    fn line_count(&self, _doc: DocId) -> usize {
        0
    }

    fn line(&self, _doc: DocId, _index: usize) -> Option<Cow<'_, str>> {
        None
    }
}

impl<T: AsRef<str>> ContentProvider for Vec<T> {
    fn line_count(&self, _doc: DocId) -> usize {
        self.len()
    }

    fn line(&self, _doc: DocId, index: usize) -> Option<Cow<'_, str>> {
        self.get(index).map(|l| Cow::Borrowed(l.as_ref()))
    }
}
