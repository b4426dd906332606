//! Minimal line-store document collaborator.
//!
//! Holds documents as vectors of lines, reads files in blocks from idle
//! time, runs regex find/substitute jobs a bounded number of lines per
//! unit, and accumulates child-process output into a transcript document.

use crate::keys::{DEFAULT_KEYDEFS, KeyDefs};
use ahash::AHashMap;
use anyhow::{Context, Result, anyhow};
use core_events::SessionId;
use core_idle::{IdleCollaborator, Progress, ReadAhead, SearchKind, SearchStep};
use core_model::{ContentProvider, DocId};
use regex::Regex;
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::Range;
use std::path::Path;
use tracing::{debug, info};

struct Doc {
    name: String,
    lines: Vec<String>,
    reader: Option<Box<dyn BufRead + Send>>,
    /// The last line has not seen its newline yet.
    partial: bool,
}

impl Doc {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lines: Vec::new(),
            reader: None,
            partial: false,
        }
    }
}

#[derive(Debug)]
enum JobKind {
    Find,
    Substitute { replacement: String, count: usize },
}

#[derive(Debug)]
struct SearchJob {
    doc: DocId,
    regex: Regex,
    kind: JobKind,
    /// Find: line the search started on. Substitute: always 0.
    start: usize,
    /// Character column on `start` that a find must move past.
    col: usize,
    scanned: usize,
    edited: Option<Range<usize>>,
}

/// Byte offset of character `col`, or the line length past the end.
fn byte_at(line: &str, col: usize) -> usize {
    line.char_indices().nth(col).map_or(line.len(), |(b, _)| b)
}

fn char_col(line: &str, byte: usize) -> usize {
    line[..byte].chars().count()
}

pub struct LineStore {
    docs: AHashMap<DocId, Doc>,
    next_doc: u32,
    jobs: AHashMap<SessionId, SearchJob>,
    keydefs: KeyDefs,
}

impl Default for LineStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LineStore {
    pub fn new() -> Self {
        Self::with_keydefs(DEFAULT_KEYDEFS)
    }

    pub fn with_keydefs(text: &str) -> Self {
        Self {
            docs: AHashMap::new(),
            next_doc: 1,
            jobs: AHashMap::new(),
            keydefs: KeyDefs::new(text),
        }
    }

    fn insert(&mut self, doc: Doc) -> DocId {
        let id = DocId(self.next_doc);
        self.next_doc += 1;
        self.docs.insert(id, doc);
        id
    }

    /// Open `path` for block-wise reading. Nothing is read yet.
    pub fn open_file(&mut self, path: &Path) -> Result<DocId> {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let id = self.open_reader(&path.display().to_string(), BufReader::new(file));
        info!(target: "runtime", doc = %id, path = %path.display(), "document_opened");
        Ok(id)
    }

    /// A document backed by an in-memory reader, loaded block-wise like a
    /// file.
    pub fn open_reader(&mut self, name: &str, reader: impl BufRead + Send + 'static) -> DocId {
        let mut doc = Doc::new(name);
        doc.reader = Some(Box::new(reader));
        self.insert(doc)
    }

    /// A fully loaded document.
    pub fn open_text(&mut self, name: &str, text: &str) -> DocId {
        let mut doc = Doc::new(name);
        doc.lines = text.lines().map(str::to_string).collect();
        self.insert(doc)
    }

    pub fn new_transcript(&mut self) -> DocId {
        self.insert(Doc::new("*transcript*"))
    }

    pub fn name(&self, doc: DocId) -> Option<&str> {
        self.docs.get(&doc).map(|d| d.name.as_str())
    }

    pub fn is_loading(&self, doc: DocId) -> bool {
        self.docs.get(&doc).is_some_and(|d| d.reader.is_some())
    }

    /// Characters on `line`, zero past the end.
    pub fn line_len(&self, doc: DocId, line: usize) -> usize {
        self.docs
            .get(&doc)
            .and_then(|d| d.lines.get(line))
            .map_or(0, |l| l.chars().count())
    }

    /// Append child output to a transcript. Returns the new line count.
    pub fn append_output(&mut self, doc: DocId, bytes: &[u8]) -> usize {
        let Some(d) = self.docs.get_mut(&doc) else {
            return 0;
        };
        if bytes.is_empty() {
            return d.lines.len();
        }
        let text = String::from_utf8_lossy(bytes);
        for (i, piece) in text.split('\n').enumerate() {
            let piece = piece.strip_suffix('\r').unwrap_or(piece);
            match d.lines.last_mut() {
                Some(line) if i == 0 && d.partial => line.push_str(piece),
                _ => d.lines.push(piece.to_string()),
            }
        }
        // `split` always yields a final piece; it is empty when the chunk
        // ended on a newline.
        if text.ends_with('\n') {
            d.lines.pop();
            d.partial = false;
        } else {
            d.partial = true;
        }
        d.lines.len()
    }

    pub fn keydefs(&self) -> &KeyDefs {
        &self.keydefs
    }

    /// Begin a find on `doc` from the cursor position.
    pub fn start_find(
        &mut self,
        session: SessionId,
        doc: DocId,
        pattern: &str,
        from: (usize, usize),
    ) -> Result<(), regex::Error> {
        let regex = Regex::new(pattern)?;
        debug!(target: "runtime", %session, pattern, line = from.0, "find_started");
        self.jobs.insert(
            session,
            SearchJob {
                doc,
                regex,
                kind: JobKind::Find,
                start: from.0,
                col: from.1,
                scanned: 0,
                edited: None,
            },
        );
        Ok(())
    }

    pub fn start_substitute(
        &mut self,
        session: SessionId,
        doc: DocId,
        pattern: &str,
        replacement: &str,
    ) -> Result<(), regex::Error> {
        let regex = Regex::new(pattern)?;
        debug!(target: "runtime", %session, pattern, "substitute_started");
        self.jobs.insert(
            session,
            SearchJob {
                doc,
                regex,
                kind: JobKind::Substitute {
                    replacement: replacement.to_string(),
                    count: 0,
                },
                start: 0,
                col: 0,
                scanned: 0,
                edited: None,
            },
        );
        Ok(())
    }

    fn step_find(job: &mut SearchJob, lines: &[String], budget: usize) -> SearchStep {
        let total = lines.len();
        // The start line is visited twice: past the cursor first, then from
        // its beginning after wrapping around.
        let mut left = budget;
        while job.scanned <= total && total > 0 {
            if left == 0 {
                return SearchStep::Continue;
            }
            left -= 1;
            let index = (job.start + job.scanned) % total;
            let line = &lines[index];
            let from = if job.scanned == 0 {
                byte_at(line, job.col + 1)
            } else {
                0
            };
            job.scanned += 1;
            if from > line.len() {
                continue;
            }
            if let Some(m) = job.regex.find_at(line, from) {
                return SearchStep::Done {
                    cursor: Some((index, char_col(line, m.start()))),
                    edited: None,
                    message: None,
                };
            }
        }
        SearchStep::Done {
            cursor: None,
            edited: None,
            message: Some(format!("pattern not found: {}", job.regex.as_str())),
        }
    }

    fn step_substitute(job: &mut SearchJob, lines: &mut [String], budget: usize) -> SearchStep {
        let JobKind::Substitute { replacement, count } = &mut job.kind else {
            return SearchStep::default();
        };
        let end = (job.scanned + budget).min(lines.len());
        for (index, line) in lines.iter_mut().enumerate().take(end).skip(job.scanned) {
            let hits = job.regex.find_iter(line).count();
            if hits == 0 {
                continue;
            }
            *line = job.regex.replace_all(line, replacement.as_str()).into_owned();
            *count += hits;
            job.edited = Some(match job.edited.take() {
                Some(r) => r.start..index + 1,
                None => index..index + 1,
            });
        }
        job.scanned = end;
        if end < lines.len() {
            return SearchStep::Continue;
        }
        let edited = job.edited.take();
        SearchStep::Done {
            cursor: edited.as_ref().map(|r| (r.start, 0)),
            message: Some(format!("{count} substitutions")),
            edited,
        }
    }
}

impl ContentProvider for LineStore {
    fn line_count(&self, doc: DocId) -> usize {
        self.docs.get(&doc).map_or(0, |d| d.lines.len())
    }

    fn line(&self, doc: DocId, index: usize) -> Option<Cow<'_, str>> {
        self.docs
            .get(&doc)?
            .lines
            .get(index)
            .map(|l| Cow::Borrowed(l.as_str()))
    }
}

impl IdleCollaborator for LineStore {
    fn load_keydefs(&mut self, _session: SessionId, budget: usize) -> Result<Progress> {
        Ok(if self.keydefs.load(budget) {
            Progress::Done
        } else {
            Progress::More
        })
    }

    fn continue_search(
        &mut self,
        session: SessionId,
        doc: DocId,
        kind: SearchKind,
        budget: usize,
    ) -> Result<SearchStep> {
        let job = self
            .jobs
            .get_mut(&session)
            .ok_or_else(|| anyhow!("no {kind:?} job for {session}"))?;
        if job.doc != doc {
            return Err(anyhow!("{kind:?} job for {session} is on {}", job.doc));
        }
        let d = self
            .docs
            .get_mut(&doc)
            .ok_or_else(|| anyhow!("unknown document {doc}"))?;
        let is_find = matches!(job.kind, JobKind::Find);
        let step = match (kind, is_find) {
            (SearchKind::Find, true) => Self::step_find(job, &d.lines, budget),
            (SearchKind::Substitute, false) => Self::step_substitute(job, &mut d.lines, budget),
            _ => return Err(anyhow!("{session} has no {kind:?} job")),
        };
        if matches!(step, SearchStep::Done { .. }) {
            self.jobs.remove(&session);
        }
        Ok(step)
    }

    fn read_ahead(&mut self, doc: DocId, block: usize) -> Result<ReadAhead> {
        let d = self
            .docs
            .get_mut(&doc)
            .ok_or_else(|| anyhow!("unknown document {doc}"))?;
        let Some(reader) = d.reader.as_mut() else {
            return Ok(ReadAhead {
                loaded: 0,
                total: d.lines.len(),
                eof: true,
            });
        };
        let mut loaded = 0;
        let mut eof = false;
        let mut buf = String::new();
        while loaded < block {
            buf.clear();
            let n = reader
                .read_line(&mut buf)
                .with_context(|| format!("read {}", d.name))?;
            if n == 0 {
                eof = true;
                break;
            }
            let line = buf.strip_suffix('\n').unwrap_or(&buf);
            let line = line.strip_suffix('\r').unwrap_or(line);
            d.lines.push(line.to_string());
            loaded += 1;
        }
        if eof {
            d.reader = None;
        }
        Ok(ReadAhead {
            loaded,
            total: d.lines.len(),
            eof,
        })
    }
}
