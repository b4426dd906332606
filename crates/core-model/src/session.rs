//! Display session: one windowing-server connection, its sub-windows, the
//! shared offscreen buffer, and every per-session record the dispatcher and
//! compositor mutate.

use crate::background::BackgroundWork;
use crate::content::DocId;
use crate::layout::{CellMetrics, Layout, LayoutParams, SubWindowKind};
use crate::redraw::{RedrawMask, RedrawRequest};
use crate::view::{CursorRecord, ViewState, compute_scroll_intent};
use crate::warp::WarpState;
use crate::window_table::{WindowRef, WindowTable};
use anyhow::Context;
use core_config::{Config, ScrollbarConfig};
use core_display::{DisplayResult, DisplayServer, Pixmap};
use core_events::{Event, Rect, SessionId, WindowId};
use core_scrollbar::{Axis, Extents, ScrollCommand, ScrollDirection, Scrollbars};
use std::collections::VecDeque;
use std::ops::Range;
use tracing::{debug, info, warn};

/// Everything needed to open a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub doc: DocId,
    /// Requested top-level area.
    pub area: Rect,
    pub cell: CellMetrics,
    pub title_rows: u32,
    pub transcript: Option<DocId>,
    pub scrollbar: ScrollbarConfig,
    pub retry_limit: u32,
    pub title: String,
}

impl SessionOptions {
    pub fn new(doc: DocId, area: Rect) -> Self {
        Self {
            doc,
            area,
            cell: CellMetrics::new(8, 16),
            title_rows: 1,
            transcript: None,
            scrollbar: ScrollbarConfig::default(),
            retry_limit: 5,
            title: String::new(),
        }
    }

    pub fn from_config(cfg: &Config, doc: DocId, area: Rect) -> Self {
        Self {
            title_rows: cfg.file.display.title_rows,
            scrollbar: cfg.file.scrollbar.clone(),
            retry_limit: cfg.effective.retry_limit,
            ..Self::new(doc, area)
        }
    }
}

/// A pointer position resolved to the sub-window it falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Located {
    pub kind: SubWindowKind,
    /// Sub-window-local coordinates.
    pub x: i32,
    pub y: i32,
}

/// Secondary text view onto a child-process transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscriptView {
    pub doc: DocId,
    pub view: ViewState,
    /// Keep the newest output visible as the transcript grows.
    pub follow: bool,
}

pub struct DisplaySession {
    id: SessionId,
    display: Box<dyn DisplayServer>,
    windows: WindowTable,
    layout: Layout,
    size: (u32, u32),
    cell: CellMetrics,
    title_rows: u32,
    scrollbar_cfg: ScrollbarConfig,
    offscreen: Option<Pixmap>,
    pub redraw: RedrawMask,
    pub warp: WarpState,
    pub cursor: CursorRecord,
    pub work: BackgroundWork,
    pub view: ViewState,
    pub transcript: Option<TranscriptView>,
    scrollbars: Option<Scrollbars>,
    scrollbars_disabled: bool,
    doc: DocId,
    title: String,
    modified: bool,
    edit_impact: Option<Range<usize>>,
    mapped: bool,
    focused: bool,
    command_input: String,
    command_output: String,
    injected: VecDeque<Event>,
}

impl std::fmt::Debug for DisplaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplaySession")
            .field("id", &self.id)
            .field("doc", &self.doc)
            .field("top", &self.windows.top())
            .field("size", &self.size)
            .field("mapped", &self.mapped)
            .field("view", &self.view)
            .finish_non_exhaustive()
    }
}

impl DisplaySession {
    /// Create the top-level window and every sub-window, then lay them out.
    /// The session starts unmapped; the server's Map event allocates the
    /// offscreen buffer.
    pub fn open(
        id: SessionId,
        mut display: Box<dyn DisplayServer>,
        opts: SessionOptions,
    ) -> anyhow::Result<Self> {
        let top = display
            .create_window(None, opts.area)
            .context("create top-level window")?;
        let mut windows = WindowTable::new(top);
        for kind in SubWindowKind::ALL {
            if kind == SubWindowKind::Transcript && opts.transcript.is_none() {
                continue;
            }
            let w = display
                .create_window(Some(top), Rect::default())
                .with_context(|| format!("create {kind:?} sub-window"))?;
            windows.insert(w, kind);
        }
        if let Err(e) = display.set_title(top, &opts.title) {
            if e.is_fatal() {
                return Err(e).context("set window title");
            }
            warn!(target: "session", %id, error = %e, "set_title_failed");
        }
        let (width, height) = (opts.area.width, opts.area.height);
        let params = LayoutParams {
            width,
            height,
            cell: opts.cell,
            title_rows: opts.title_rows,
            transcript: opts.transcript.is_some(),
            vertical_gutter: None,
            horizontal_gutter: None,
        };
        let mut session = Self {
            id,
            display,
            windows,
            layout: Layout::compute(params),
            size: (width, height),
            cell: opts.cell,
            title_rows: opts.title_rows,
            scrollbar_cfg: opts.scrollbar,
            offscreen: None,
            redraw: RedrawMask::new(),
            warp: WarpState::new(opts.retry_limit),
            cursor: CursorRecord::default(),
            work: BackgroundWork::new(),
            view: ViewState::default(),
            transcript: opts.transcript.map(|doc| TranscriptView {
                doc,
                view: ViewState::default(),
                follow: true,
            }),
            scrollbars: None,
            scrollbars_disabled: false,
            doc: opts.doc,
            title: opts.title,
            modified: false,
            edit_impact: None,
            mapped: false,
            focused: false,
            command_input: String::new(),
            command_output: String::new(),
            injected: VecDeque::new(),
        };
        if session.scrollbar_cfg.enabled {
            session.create_scrollbars();
        }
        session.regenerate_layout(width, height)?;
        info!(target: "session", %id, doc = %session.doc, %top, width, height, "session_opened");
        Ok(session)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn doc(&self) -> DocId {
        self.doc
    }

    pub fn top_window(&self) -> WindowId {
        self.windows.top()
    }

    pub fn windows(&self) -> &WindowTable {
        &self.windows
    }

    pub fn window(&self, kind: SubWindowKind) -> Option<WindowId> {
        self.windows.window(kind)
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn cell(&self) -> CellMetrics {
        self.cell
    }

    pub fn display(&self) -> &dyn DisplayServer {
        self.display.as_ref()
    }

    pub fn display_mut(&mut self) -> &mut dyn DisplayServer {
        self.display.as_mut()
    }

    pub fn offscreen(&self) -> Option<Pixmap> {
        self.offscreen
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn set_focused(&mut self, focused: bool) {
        self.focused = focused;
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Title line as painted: name plus the modified marker.
    pub fn title_text(&self) -> String {
        if self.modified {
            format!("{} [+]", self.title)
        } else {
            self.title.clone()
        }
    }

    pub fn set_title(&mut self, title: impl Into<String>) -> DisplayResult<()> {
        self.title = title.into();
        let top = self.windows.top();
        self.display.set_title(top, &self.title)?;
        self.redraw.mark_title();
        Ok(())
    }

    pub fn modified(&self) -> bool {
        self.modified
    }

    pub fn set_modified(&mut self, modified: bool) {
        if self.modified != modified {
            self.modified = modified;
            self.redraw.mark_title();
        }
    }

    pub fn command_input(&self) -> &str {
        &self.command_input
    }

    pub fn command_output(&self) -> &str {
        &self.command_output
    }

    pub fn set_command_input(&mut self, text: impl Into<String>) {
        self.command_input = text.into();
        self.redraw.mark(SubWindowKind::CommandInput, RedrawRequest::Full);
    }

    pub fn set_command_output(&mut self, text: impl Into<String>) {
        self.command_output = text.into();
        self.redraw.mark(SubWindowKind::CommandOutput, RedrawRequest::Full);
    }

    /// Queue an event the dispatcher hands out before anything from the
    /// server (used for the fake position update after a no-op warp).
    pub fn inject(&mut self, event: Event) {
        self.injected.push_back(event);
    }

    pub fn pop_injected(&mut self) -> Option<Event> {
        self.injected.pop_front()
    }

    pub fn has_injected(&self) -> bool {
        !self.injected.is_empty()
    }

    // ---- window lookup ------------------------------------------------

    pub fn resolve(&self, window: WindowId) -> WindowRef {
        self.windows.resolve(window)
    }

    /// Resolve a window-relative point to the sub-window it addresses.
    /// Points on the top-level window are hit-tested against the layout;
    /// unknown windows fall back to the main text area.
    pub fn locate(&self, window: WindowId, x: i32, y: i32) -> Located {
        match self.windows.resolve(window) {
            WindowRef::Sub(kind) => Located { kind, x, y },
            WindowRef::TopLevel => self.locate_top(x, y),
            WindowRef::Unknown => {
                warn!(target: "session", session = %self.id, %window, "unknown_window");
                Located {
                    kind: SubWindowKind::Main,
                    x,
                    y,
                }
            }
        }
    }

    /// Hit-test a top-level-relative point.
    pub fn locate_top(&self, x: i32, y: i32) -> Located {
        let region = self
            .layout
            .hit(x, y)
            .copied()
            .or_else(|| self.layout.region(SubWindowKind::Main).copied());
        match region {
            Some(r) => Located {
                kind: r.kind,
                x: x - r.rect.x,
                y: y - r.rect.y,
            },
            None => Located {
                kind: SubWindowKind::Main,
                x,
                y,
            },
        }
    }

    /// Root-relative origin of the top-level window.
    pub fn top_origin(&self) -> DisplayResult<(i32, i32)> {
        self.display.window_origin(self.windows.top())
    }

    // ---- offscreen buffer ----------------------------------------------

    /// Allocate the offscreen buffer if the session is mapped and has none.
    /// Allocation failure leaves the buffer absent (compositing becomes a
    /// no-op); only transport errors propagate.
    pub fn ensure_offscreen(&mut self) -> DisplayResult<Option<Pixmap>> {
        if self.offscreen.is_some() || !self.mapped {
            return Ok(self.offscreen);
        }
        let (w, h) = self.size;
        match self.display.create_pixmap(w, h) {
            Ok(p) => {
                debug!(target: "session", session = %self.id, width = w, height = h, "offscreen_allocated");
                self.offscreen = Some(p);
                self.redraw.mark_full_all();
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(target: "session", session = %self.id, error = %e, "offscreen_allocation_failed");
            }
        }
        Ok(self.offscreen)
    }

    pub fn free_offscreen(&mut self) {
        if let Some(p) = self.offscreen.take() {
            self.display.free_pixmap(p.id);
            debug!(target: "session", session = %self.id, "offscreen_freed");
        }
    }

    // ---- structure events ----------------------------------------------

    pub fn on_map(&mut self) -> DisplayResult<()> {
        self.mapped = true;
        self.ensure_offscreen()?;
        self.redraw.mark_full_all();
        Ok(())
    }

    pub fn on_unmap(&mut self) {
        self.mapped = false;
        self.free_offscreen();
        self.redraw.clear();
    }

    /// Top-level resize. Returns whether the layout changed.
    pub fn on_configure(&mut self, area: Rect) -> DisplayResult<bool> {
        if (area.width, area.height) == self.size {
            return Ok(false);
        }
        self.regenerate_layout(area.width, area.height)?;
        Ok(true)
    }

    /// Mark the part of the session covered by an exposed area of `window`.
    pub fn on_expose(&mut self, window: WindowId, area: Rect) {
        match self.windows.resolve(window) {
            WindowRef::Sub(kind) => self.expose_region(kind, area),
            WindowRef::TopLevel => {
                let hits: Vec<_> = self
                    .layout
                    .regions()
                    .iter()
                    .filter_map(|r| {
                        r.rect.intersect(&area).map(|i| {
                            (r.kind, Rect::new(i.x - r.rect.x, i.y - r.rect.y, i.width, i.height))
                        })
                    })
                    .collect();
                for (kind, local) in hits {
                    self.expose_region(kind, local);
                }
            }
            WindowRef::Unknown => {
                warn!(target: "session", session = %self.id, %window, "expose_unknown_window");
                self.expose_region(SubWindowKind::Main, area);
            }
        }
    }

    fn expose_region(&mut self, kind: SubWindowKind, area: Rect) {
        let rect = self.layout.rect(kind);
        let whole = Rect::new(0, 0, rect.width, rect.height);
        if !kind.is_text() || area.intersect(&whole) == Some(whole) {
            self.redraw.mark(kind, RedrawRequest::Full);
            return;
        }
        let ch = self.cell.height.max(1) as i32;
        let mut y = area.y.max(0);
        if kind == SubWindowKind::Main {
            let title_h = self.layout.title_height() as i32;
            if y < title_h {
                self.redraw.mark_title();
            }
            if area.bottom() <= title_h {
                return;
            }
            y = (y - title_h).max(0);
        }
        let top = match kind {
            SubWindowKind::Transcript => self.transcript.map(|t| t.view.top_line).unwrap_or(0),
            _ => self.view.top_line,
        };
        let line = top + (y / ch) as usize;
        self.redraw.mark(kind, RedrawRequest::PartialLine { line });
    }

    // ---- layout ----------------------------------------------------------

    fn layout_params(&self, width: u32, height: u32) -> LayoutParams {
        let (v, h) = match &self.scrollbars {
            Some(bars) => (
                bars.shown(self.view.vertical_extents()).then_some(self.scrollbar_cfg.thickness),
                bars.shown(self.view.horizontal_extents()).then_some(self.scrollbar_cfg.thickness),
            ),
            None => (None, None),
        };
        LayoutParams {
            width,
            height,
            cell: self.cell,
            title_rows: self.title_rows,
            transcript: self.transcript.is_some(),
            vertical_gutter: v,
            horizontal_gutter: h,
        }
    }

    /// Recompute sub-window rectangles for a top-level size, place every
    /// sub-window, resize the offscreen buffer and force a full repaint.
    pub fn regenerate_layout(&mut self, width: u32, height: u32) -> DisplayResult<()> {
        self.layout = Layout::compute(self.layout_params(width, height));
        for (kind, window) in self.windows.windows() {
            let rect = self.layout.rect(kind);
            self.display.place_window(window, rect)?;
        }
        let (rows, cols) = self.layout.text_grid(SubWindowKind::Main);
        self.view.rows = rows;
        self.view.cols = cols;
        self.view.top_line = self.view.top_line.min(self.view.max_top());
        self.view.left_col = self.view.left_col.min(self.view.max_left());
        if let Some(t) = self.transcript.as_mut() {
            let (rows, cols) = self.layout.text_grid(SubWindowKind::Transcript);
            t.view.rows = rows;
            t.view.cols = cols;
            t.view.top_line = t.view.top_line.min(t.view.max_top());
        }
        if let Some(bars) = self.scrollbars.as_mut() {
            bars.vertical
                .set_length(self.layout.rect(SubWindowKind::VerticalGutter).height);
            bars.horizontal
                .set_length(self.layout.rect(SubWindowKind::HorizontalGutter).width);
        }
        if self.size != (width, height) {
            self.size = (width, height);
            self.free_offscreen();
            self.ensure_offscreen()?;
        }
        debug!(target: "session", session = %self.id, width, height, rows, cols, "layout_regenerated");
        self.redraw.mark_full_all();
        Ok(())
    }

    /// Regenerate the layout if gutter visibility no longer matches the
    /// content extents (auto-hide).
    fn refresh_gutter_visibility(&mut self) -> DisplayResult<()> {
        let want = self.layout_params(self.size.0, self.size.1);
        let have = self.layout.params();
        if want.vertical_gutter != have.vertical_gutter
            || want.horizontal_gutter != have.horizontal_gutter
        {
            self.regenerate_layout(self.size.0, self.size.1)?;
        }
        Ok(())
    }

    // ---- content and view --------------------------------------------

    /// Document length changed (read-ahead, edits).
    pub fn set_total_lines(&mut self, total: usize) -> DisplayResult<()> {
        if self.view.total_lines == total {
            return Ok(());
        }
        self.view.total_lines = total;
        if self.view.top_line > self.view.max_top() {
            let target = self.view.max_top();
            let delta = target as i64 - self.view.top_line as i64;
            self.view.top_line = target;
            self.redraw.mark(SubWindowKind::Main, RedrawRequest::Scroll { lines: delta });
        }
        self.redraw.mark(SubWindowKind::VerticalGutter, RedrawRequest::Full);
        self.refresh_gutter_visibility()
    }

    /// Widest line observed by the painter.
    pub fn note_width(&mut self, cols: usize) -> DisplayResult<()> {
        if cols <= self.view.widest {
            return Ok(());
        }
        self.view.widest = cols;
        self.redraw.mark(SubWindowKind::HorizontalGutter, RedrawRequest::Full);
        self.refresh_gutter_visibility()
    }

    /// The single execution path for scroll commands from the keyboard and
    /// from the scrollbars. Returns whether the view moved.
    pub fn apply_scroll(&mut self, cmd: ScrollCommand) -> bool {
        match cmd.direction.axis() {
            Axis::Vertical => {
                let old = self.view.top_line as i64;
                let new = (old + cmd.signed()).clamp(0, self.view.max_top() as i64);
                if new == old {
                    return false;
                }
                self.view.top_line = new as usize;
                self.redraw.mark(SubWindowKind::Main, RedrawRequest::Scroll { lines: new - old });
                self.redraw.mark(SubWindowKind::VerticalGutter, RedrawRequest::Full);
            }
            Axis::Horizontal => {
                let old = self.view.left_col as i64;
                let new = (old + cmd.signed()).clamp(0, self.view.max_left() as i64);
                if new == old {
                    return false;
                }
                self.view.left_col = new as usize;
                self.redraw.mark(SubWindowKind::Main, RedrawRequest::Full);
                self.redraw.mark(SubWindowKind::HorizontalGutter, RedrawRequest::Full);
            }
        }
        debug!(target: "session", session = %self.id, ?cmd, top = self.view.top_line, left = self.view.left_col, "scrolled");
        true
    }

    /// Move the text cursor, scrolling to keep it visible. Returns whether
    /// the cursor moved.
    pub fn move_cursor(&mut self, line: usize, col: usize) -> bool {
        let line = line.min(self.view.total_lines.saturating_sub(1));
        if (line, col) == (self.cursor.line, self.cursor.col) {
            return false;
        }
        let old = (self.cursor.line, self.cursor.col);
        self.redraw.mark(
            SubWindowKind::Main,
            RedrawRequest::PartialRect { line: old.0, col: old.1 },
        );
        self.cursor.line = line;
        self.cursor.col = col;
        self.redraw
            .mark(SubWindowKind::Main, RedrawRequest::PartialRect { line, col });
        if let Some(first) = compute_scroll_intent(self.view.top_line, line, self.view.rows, 0) {
            let delta = first as i64 - self.view.top_line as i64;
            let dir = if delta < 0 {
                ScrollDirection::Up
            } else {
                ScrollDirection::Down
            };
            self.apply_scroll(ScrollCommand::new(dir, delta.unsigned_abs() as usize));
        }
        if self.view.cols > 0 {
            let left = self.view.left_col;
            let new_left = if col < left {
                col
            } else if col >= left + self.view.cols {
                col + 1 - self.view.cols
            } else {
                left
            };
            if new_left != left {
                self.view.left_col = new_left;
                self.redraw.mark(SubWindowKind::Main, RedrawRequest::Full);
                self.redraw.mark(SubWindowKind::HorizontalGutter, RedrawRequest::Full);
            }
        }
        true
    }

    /// Record that `lines` of this session's document changed. The main
    /// area repaints from the first changed line; the compositor later
    /// propagates the range to siblings on the same document.
    pub fn note_edit(&mut self, lines: Range<usize>) {
        if lines.is_empty() {
            return;
        }
        if lines.start < self.view.visible().end {
            let line = lines.start.max(self.view.top_line);
            self.redraw.mark(SubWindowKind::Main, RedrawRequest::PartialLine { line });
        }
        self.edit_impact = Some(match self.edit_impact.take() {
            Some(prev) => prev.start.min(lines.start)..prev.end.max(lines.end),
            None => lines,
        });
        self.set_modified(true);
    }

    pub fn edit_impact(&self) -> Option<Range<usize>> {
        self.edit_impact.clone()
    }

    pub fn take_edit_impact(&mut self) -> Option<Range<usize>> {
        self.edit_impact.take()
    }

    /// Transcript document grew to `total` lines.
    pub fn transcript_grew(&mut self, total: usize) {
        let Some(t) = self.transcript.as_mut() else {
            return;
        };
        let old_total = t.view.total_lines;
        t.view.total_lines = total;
        if t.follow && t.view.top_line < t.view.max_top() {
            let delta = (t.view.max_top() - t.view.top_line) as i64;
            t.view.top_line = t.view.max_top();
            self.redraw
                .mark(SubWindowKind::Transcript, RedrawRequest::Scroll { lines: delta });
        }
        let first_new = old_total.saturating_sub(1);
        if let Some(t) = self.transcript
            && first_new < t.view.visible().end
        {
            let line = first_new.max(t.view.top_line);
            self.redraw
                .mark(SubWindowKind::Transcript, RedrawRequest::PartialLine { line });
        }
    }

    // ---- scrollbars ------------------------------------------------------

    fn create_scrollbars(&mut self) {
        let probe = Layout::compute(LayoutParams {
            vertical_gutter: Some(self.scrollbar_cfg.thickness),
            horizontal_gutter: Some(self.scrollbar_cfg.thickness),
            ..self.layout_params(self.size.0, self.size.1)
        });
        let v_len = probe.rect(SubWindowKind::VerticalGutter).height;
        let h_len = probe.rect(SubWindowKind::HorizontalGutter).width;
        match Scrollbars::new(&self.scrollbar_cfg, v_len, h_len) {
            Ok(bars) => self.scrollbars = Some(bars),
            Err(e) => {
                warn!(target: "scrollbar", session = %self.id, error = %e, "scrollbars_disabled");
                self.scrollbars = None;
                self.scrollbars_disabled = true;
            }
        }
    }

    pub fn scrollbars(&self) -> Option<&Scrollbars> {
        self.scrollbars.as_ref()
    }

    pub fn scrollbars_mut(&mut self) -> Option<&mut Scrollbars> {
        self.scrollbars.as_mut()
    }

    /// True once scrollbar state creation failed; scrollbars stay off.
    pub fn scrollbars_disabled(&self) -> bool {
        self.scrollbars_disabled
    }

    /// Toggle scrollbars. Turning them back on starts from fresh state.
    pub fn set_scrollbars_enabled(&mut self, on: bool) -> DisplayResult<()> {
        if self.scrollbars_disabled || on == self.scrollbars.is_some() {
            return Ok(());
        }
        if on {
            self.create_scrollbars();
        } else {
            self.scrollbars = None;
        }
        info!(target: "scrollbar", session = %self.id, on, "scrollbars_toggled");
        self.regenerate_layout(self.size.0, self.size.1)
    }

    /// Switching auto-hide regenerates the layout and forces a full repaint.
    pub fn set_auto_hide(&mut self, on: bool) -> DisplayResult<()> {
        let Some(bars) = self.scrollbars.as_mut() else {
            return Ok(());
        };
        if bars.auto_hide() == on {
            return Ok(());
        }
        bars.set_auto_hide(on);
        self.regenerate_layout(self.size.0, self.size.1)
    }

    pub fn extents(&self, axis: Axis) -> Extents {
        match axis {
            Axis::Vertical => self.view.vertical_extents(),
            Axis::Horizontal => self.view.horizontal_extents(),
        }
    }

    fn gutter_axis(kind: SubWindowKind) -> Option<Axis> {
        match kind {
            SubWindowKind::VerticalGutter => Some(Axis::Vertical),
            SubWindowKind::HorizontalGutter => Some(Axis::Horizontal),
            _ => None,
        }
    }

    fn gutter_kind(axis: Axis) -> SubWindowKind {
        match axis {
            Axis::Vertical => SubWindowKind::VerticalGutter,
            Axis::Horizontal => SubWindowKind::HorizontalGutter,
        }
    }

    /// Button press at a gutter-local point.
    pub fn scrollbar_press(&mut self, at: Located) -> Option<ScrollCommand> {
        let axis = Self::gutter_axis(at.kind)?;
        let pos = match axis {
            Axis::Vertical => at.y,
            Axis::Horizontal => at.x,
        };
        let ext = self.extents(axis);
        let cmd = self.scrollbars.as_mut()?.get_mut(axis).press(pos, ext);
        self.redraw.mark(at.kind, RedrawRequest::Full);
        cmd
    }

    /// Auto-repeat tick for the held axis.
    pub fn scrollbar_repeat(&mut self) -> Option<ScrollCommand> {
        let axis = self.scrollbars.as_ref()?.active()?;
        let ext = self.extents(axis);
        self.scrollbars.as_mut()?.get_mut(axis).repeat(ext)
    }

    /// Pointer motion while dragging; `at` may lie outside the gutter after
    /// rewriting, so only the coordinate along the axis is used.
    pub fn scrollbar_drag(&mut self, root: (i32, i32)) -> Option<ScrollCommand> {
        let axis = self.scrollbars.as_ref()?.active()?;
        let gutter = self.layout.rect(Self::gutter_kind(axis));
        let origin = self.top_origin().ok()?;
        let pos = match axis {
            Axis::Vertical => root.1 - origin.1 - gutter.y,
            Axis::Horizontal => root.0 - origin.0 - gutter.x,
        };
        let ext = self.extents(axis);
        self.scrollbars.as_mut()?.get_mut(axis).drag(pos, ext)
    }

    /// Release ends any scrollbar interaction and resynchronises the slider.
    pub fn scrollbar_release(&mut self) -> bool {
        let Some(bars) = self.scrollbars.as_mut() else {
            return false;
        };
        let Some(axis) = bars.active() else {
            return false;
        };
        if bars.get_mut(axis).release() {
            self.redraw.mark(Self::gutter_kind(axis), RedrawRequest::Full);
            return true;
        }
        false
    }

    pub fn scrollbar_held(&self) -> bool {
        self.scrollbars
            .as_ref()
            .and_then(|b| b.active().map(|a| b.get(a).phase().repeats()))
            .unwrap_or(false)
    }
}

impl Drop for DisplaySession {
    fn drop(&mut self) {
        self.free_offscreen();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_display::headless::{HeadlessDisplay, HeadlessHandle, Op};
    use pretty_assertions::assert_eq;

    fn open(lines: usize) -> (DisplaySession, HeadlessHandle) {
        let (display, handle) = HeadlessDisplay::new(1024, 768);
        let opts = SessionOptions::new(DocId(1), Rect::new(0, 0, 800, 600));
        let mut s = DisplaySession::open(SessionId(1), Box::new(display), opts).unwrap();
        s.set_total_lines(lines).unwrap();
        s.on_map().unwrap();
        (s, handle)
    }

    #[test]
    fn open_creates_subwindows_and_waits_for_map() {
        let (display, handle) = HeadlessDisplay::new(1024, 768);
        let opts = SessionOptions::new(DocId(1), Rect::new(0, 0, 800, 600));
        let s = DisplaySession::open(SessionId(1), Box::new(display), opts).unwrap();
        let creates = handle
            .ops()
            .iter()
            .filter(|o| matches!(o, Op::CreateWindow { .. }))
            .count();
        // top + main, input, output, two gutters
        assert_eq!(creates, 6);
        assert!(s.offscreen().is_none());
        assert_eq!(s.view.rows, 33);
    }

    #[test]
    fn map_allocates_and_unmap_frees() {
        let (mut s, handle) = open(100);
        assert!(s.offscreen().is_some());
        assert_eq!(s.redraw.get(SubWindowKind::Main), RedrawRequest::Full);
        s.on_unmap();
        assert!(s.offscreen().is_none());
        assert!(s.redraw.is_empty());
        assert_eq!(handle.live_pixmaps(), 0);
    }

    #[test]
    fn scroll_clamps_into_document() {
        let (mut s, _h) = open(100);
        s.redraw.clear();
        assert!(s.apply_scroll(ScrollCommand::new(ScrollDirection::Down, 500)));
        assert_eq!(s.view.top_line, 100 - 33);
        assert_eq!(
            s.redraw.get(SubWindowKind::Main),
            RedrawRequest::Scroll { lines: 67 }
        );
        assert!(!s.apply_scroll(ScrollCommand::new(ScrollDirection::Down, 1)));
    }

    #[test]
    fn unknown_window_locates_to_main() {
        let (s, _h) = open(10);
        let at = s.locate(WindowId(0xdead), 4, 5);
        assert_eq!(at, Located { kind: SubWindowKind::Main, x: 4, y: 5 });
    }

    #[test]
    fn top_level_points_hit_test_into_subwindows() {
        let (s, _h) = open(100);
        let gutter = s.layout().rect(SubWindowKind::VerticalGutter);
        let at = s.locate(s.top_window(), gutter.x + 2, gutter.y + 7);
        assert_eq!(at.kind, SubWindowKind::VerticalGutter);
        assert_eq!((at.x, at.y), (2, 7));
    }

    #[test]
    fn edit_marks_and_records_impact() {
        let (mut s, _h) = open(100);
        s.redraw.clear();
        s.note_edit(10..12);
        s.note_edit(4..5);
        assert_eq!(s.edit_impact(), Some(4..12));
        assert_eq!(
            s.redraw.get(SubWindowKind::Main),
            RedrawRequest::PartialLine { line: 4 }
        );
        assert!(s.redraw.title_pending());
        assert!(s.modified());
    }

    #[test]
    fn expose_inside_text_is_partial() {
        let (mut s, _h) = open(100);
        s.redraw.clear();
        let main = s.window(SubWindowKind::Main).unwrap();
        s.on_expose(main, Rect::new(0, 16 + 5 * 16, 100, 20));
        assert_eq!(
            s.redraw.get(SubWindowKind::Main),
            RedrawRequest::PartialLine { line: 5 }
        );
        assert!(!s.redraw.title_pending());
    }

    #[test]
    fn short_gutter_disables_scrollbars_for_good() {
        let (display, _h) = HeadlessDisplay::new(1024, 768);
        let opts = SessionOptions::new(DocId(1), Rect::new(0, 0, 30, 120));
        let mut s = DisplaySession::open(SessionId(1), Box::new(display), opts).unwrap();
        assert!(s.scrollbars().is_none());
        assert!(s.scrollbars_disabled());
        s.set_scrollbars_enabled(true).unwrap();
        assert!(s.scrollbars().is_none());
    }

    #[test]
    fn auto_hide_toggle_regenerates_layout() {
        let (mut s, _h) = open(10);
        assert!(s.layout().region(SubWindowKind::VerticalGutter).is_some());
        s.redraw.clear();
        s.set_auto_hide(true).unwrap();
        assert!(s.layout().region(SubWindowKind::VerticalGutter).is_none());
        assert_eq!(s.redraw.get(SubWindowKind::CommandInput), RedrawRequest::Full);
    }
}
