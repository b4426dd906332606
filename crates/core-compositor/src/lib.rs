//! Redraw compositor.
//!
//! [`Compositor::apply`] consumes a session's [`RedrawMask`]: each pending
//! request is painted into the session's single offscreen pixmap (full
//! clear and redraw, a partial line/rect repaint, or a scroll blit plus the
//! rows scrolled in), then exactly the changed rectangle is copied to the
//! sub-window. The title is the leading sub-region of the main area: it is
//! repainted whenever main scrolls, the modified flag changes, or main is
//! repainted in full, and in that last case it rides along in the single
//! full copy.
//!
//! When a warp is requested and the pointer is over the session, the
//! compositor computes the cursor's pixel position, preflights it against
//! the physical screen (reporting any clamp), and either issues a real
//! pointer warp (arming the session's warp synchronizer) or, when nothing
//! changed since the last report, queues a synthetic enter event instead.
//!
//! Edits recorded through `DisplaySession::note_edit` are propagated to
//! siblings on the same document by [`Compositor::apply_all`].
//!
//! A session without an offscreen buffer discards its requests; the buffer
//! is recreated (with a full repaint) when the session is mapped again.
//!
//! [`RedrawMask`]: core_model::RedrawMask

mod metrics;
mod paint;
mod propagate;
mod warp;

pub use metrics::{CompositorMetrics, CompositorMetricsSnapshot};
pub use warp::{WarpDecision, clamp_to_screen, cursor_point};

use core_config::Config;
use core_display::{DisplayError, DisplayResult, Drawable};
use core_events::{Rect, SessionId, WindowId};
use core_model::{ContentProvider, DisplaySession, RedrawRequest, SessionSet, SubWindowKind};
use core_scrollbar::Axis;
use paint::{TextFrame, TextPaint};
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

/// How the title sub-region reached the screen in one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TitleCopy {
    #[default]
    None,
    /// Included in the full copy of the main area.
    WithMain,
    Separate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Requests executed, after escalation.
    pub painted: SmallVec<[(SubWindowKind, RedrawRequest); 6]>,
    pub title: TitleCopy,
    pub copies: u32,
    pub warp: WarpDecision,
    /// No offscreen buffer: everything pending was discarded.
    pub skipped: bool,
}

#[derive(Debug, Default)]
pub struct Compositor {
    clamp_inset: u32,
    metrics: CompositorMetrics,
}

/// Non-fatal display errors are logged and painting continues; transport
/// errors end the pass.
fn tolerate<T: Default>(session: SessionId, what: &'static str, r: DisplayResult<T>) -> DisplayResult<T> {
    match r {
        Ok(v) => Ok(v),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!(target: "compositor", %session, what, error = %e, "paint_failed");
            Ok(T::default())
        }
    }
}

impl Compositor {
    pub fn new(clamp_inset: u32) -> Self {
        Self {
            clamp_inset,
            metrics: CompositorMetrics::default(),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.effective.clamp_inset)
    }

    pub fn metrics_snapshot(&self) -> CompositorMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Composite one session and optionally settle the pointer on its cursor.
    pub fn apply(
        &self,
        session: &mut DisplaySession,
        content: &dyn ContentProvider,
        warp_requested: bool,
    ) -> DisplayResult<ApplyReport> {
        let mut report = ApplyReport::default();
        if session.offscreen().is_none() {
            if !session.redraw.is_empty() {
                CompositorMetrics::bump(&self.metrics.skipped_no_buffer);
                debug!(target: "compositor", session = %session.id(), "no_offscreen_buffer");
            }
            session.redraw.clear();
            report.skipped = true;
            return Ok(report);
        }
        session.set_total_lines(content.line_count(session.doc()))?;
        if let Some(t) = session.transcript {
            let total = content.line_count(t.doc);
            if total != t.view.total_lines {
                session.transcript_grew(total);
            }
        }
        // A pass can change gutter visibility (widest line grew under
        // auto-hide), which regenerates the layout and re-marks everything.
        for _ in 0..2 {
            if session.redraw.is_empty() {
                break;
            }
            // Layout regeneration may have replaced the buffer.
            let Some(pix) = session.offscreen() else {
                session.redraw.clear();
                break;
            };
            self.pass(session, pix.drawable(), content, &mut report)?;
        }
        if warp_requested {
            report.warp = warp::decide(session, self.clamp_inset, &self.metrics)?;
        }
        session.display_mut().flush()?;
        trace!(target: "compositor", session = %session.id(), copies = report.copies, "apply_done");
        Ok(report)
    }

    fn pass(
        &self,
        session: &mut DisplaySession,
        pix: Drawable,
        content: &dyn ContentProvider,
        report: &mut ApplyReport,
    ) -> DisplayResult<()> {
        let id = session.id();
        let mut title = session.redraw.take_title();
        let mut title_done = false;
        for kind in SubWindowKind::ALL {
            let req = session.redraw.take(kind);
            if req.is_none() {
                continue;
            }
            let Some(window) = session.window(kind) else {
                continue;
            };
            let region = session.layout().rect(kind);
            if region.is_empty() {
                continue;
            }
            let out = match kind {
                SubWindowKind::Main | SubWindowKind::Transcript => {
                    let Some(frame) = text_frame(session, kind, region) else {
                        continue;
                    };
                    let (eff, escalated) = paint::effective(kind, req, frame.rows);
                    if escalated {
                        CompositorMetrics::bump(&self.metrics.scroll_escalated);
                        debug!(target: "compositor", session = %id, ?kind, ?req, "scroll_escalated");
                    }
                    report.painted.push((kind, eff));
                    let title_arg = if kind == SubWindowKind::Main {
                        match eff {
                            RedrawRequest::Full => {
                                title_done = true;
                                Some((session.title_text(), title_rect(session)))
                            }
                            RedrawRequest::Scroll { .. } => {
                                title = true;
                                None
                            }
                            _ => None,
                        }
                    } else {
                        None
                    };
                    let out = self.paint_text(session, pix, &frame, content, eff, title_arg)?;
                    if kind == SubWindowKind::Main {
                        session.note_width(out.widest)?;
                    }
                    out
                }
                SubWindowKind::CommandInput | SubWindowKind::CommandOutput => {
                    report.painted.push((kind, RedrawRequest::Full));
                    let text = if kind == SubWindowKind::CommandInput {
                        session.command_input().to_string()
                    } else {
                        session.command_output().to_string()
                    };
                    let cell = session.cell();
                    let r = paint::command_row(session.display_mut(), pix, region, &text, cell);
                    TextPaint {
                        dirty: tolerate(id, "command_row", r.map(Some))?,
                        widest: 0,
                    }
                }
                SubWindowKind::VerticalGutter | SubWindowKind::HorizontalGutter => {
                    let axis = if kind == SubWindowKind::VerticalGutter {
                        Axis::Vertical
                    } else {
                        Axis::Horizontal
                    };
                    let ext = session.extents(axis);
                    let Some(bars) = session.scrollbars_mut() else {
                        continue;
                    };
                    let bar = bars.get_mut(axis);
                    bar.update(ext);
                    let rects = bar.rects();
                    report.painted.push((kind, RedrawRequest::Full));
                    let r = paint::gutter(session.display_mut(), pix, region, &rects);
                    TextPaint {
                        dirty: tolerate(id, "gutter", r.map(Some))?,
                        widest: 0,
                    }
                }
            };
            if let Some(dirty) = out.dirty {
                self.copy(session, pix, window, region, dirty, report)?;
            }
        }

        if title_done {
            CompositorMetrics::bump(&self.metrics.title_with_main);
            report.title = TitleCopy::WithMain;
        } else if title {
            let rect = title_rect(session);
            if let Some(window) = session.window(SubWindowKind::Main)
                && !rect.is_empty()
            {
                let text = session.title_text();
                let cell = session.cell();
                let r = paint::paint_title(session.display_mut(), pix, rect, &text, cell);
                tolerate(id, "title", r)?;
                let main = session.layout().rect(SubWindowKind::Main);
                self.copy(session, pix, window, main, rect, report)?;
                CompositorMetrics::bump(&self.metrics.title_separate);
                report.title = TitleCopy::Separate;
            }
        }
        Ok(())
    }

    fn paint_text(
        &self,
        session: &mut DisplaySession,
        pix: Drawable,
        frame: &TextFrame,
        content: &dyn ContentProvider,
        req: RedrawRequest,
        title: Option<(String, Rect)>,
    ) -> DisplayResult<TextPaint> {
        let id = session.id();
        let canvas = session.display_mut();
        let r = match req {
            RedrawRequest::None => return Ok(TextPaint::default()),
            RedrawRequest::Full => {
                CompositorMetrics::bump(&self.metrics.full);
                let title = title.as_ref().map(|(t, r)| (t.as_str(), *r));
                paint::text_full(canvas, pix, frame, content, title)
            }
            RedrawRequest::PartialLine { line } => {
                CompositorMetrics::bump(&self.metrics.partial_line);
                paint::text_partial_line(canvas, pix, frame, content, line)
            }
            RedrawRequest::PartialRect { line, col } => {
                CompositorMetrics::bump(&self.metrics.partial_rect);
                paint::text_partial_rect(canvas, pix, frame, content, line, col)
            }
            RedrawRequest::Scroll { lines } => {
                CompositorMetrics::bump(&self.metrics.scroll);
                paint::text_scroll(canvas, pix, frame, content, lines)
            }
        };
        tolerate(id, "text", r)
    }

    /// Copy `dirty` (pixmap coordinates) into `window`, whose area in the
    /// pixmap is `region`.
    fn copy(
        &self,
        session: &mut DisplaySession,
        pix: Drawable,
        window: WindowId,
        region: Rect,
        dirty: Rect,
        report: &mut ApplyReport,
    ) -> DisplayResult<()> {
        let id = session.id();
        let r = session.display_mut().copy_area(
            pix,
            Drawable::Window(window),
            dirty,
            dirty.x - region.x,
            dirty.y - region.y,
        );
        tolerate(id, "copy", r)?;
        CompositorMetrics::bump(&self.metrics.copies);
        report.copies += 1;
        Ok(())
    }

    /// Mark siblings on the same document whose view intersects the edit
    /// impact recorded on `from`.
    pub fn propagate(
        &self,
        sessions: &mut SessionSet,
        from: SessionId,
        content: &dyn ContentProvider,
    ) -> usize {
        propagate::propagate(sessions, from, content, &self.metrics)
    }

    /// Composite the active session (with the warp decision), propagate
    /// edits from every session, then composite whatever siblings now have
    /// pending. Returns sessions whose connection failed.
    pub fn apply_all(
        &self,
        sessions: &mut SessionSet,
        content: &dyn ContentProvider,
        warp_requested: bool,
    ) -> SmallVec<[(SessionId, DisplayError); 1]> {
        let mut failed = SmallVec::new();
        let active = sessions.active_id();
        if let Some(id) = active
            && let Some(s) = sessions.get_mut(id)
            && let Err(e) = self.apply(s, content, warp_requested)
        {
            failed.push((id, e));
        }
        for id in sessions.ids() {
            self.propagate(sessions, id, content);
        }
        for id in sessions.ids() {
            if failed.iter().any(|(f, _)| *f == id) {
                continue;
            }
            let Some(s) = sessions.get_mut(id) else {
                continue;
            };
            if s.redraw.is_empty() {
                continue;
            }
            if let Err(e) = self.apply(s, content, false) {
                failed.push((id, e));
            }
        }
        failed
    }
}

fn title_rect(session: &DisplaySession) -> Rect {
    let main = session.layout().rect(SubWindowKind::Main);
    Rect::new(main.x, main.y, main.width, session.layout().title_height())
}

fn text_frame(session: &DisplaySession, kind: SubWindowKind, region: Rect) -> Option<TextFrame> {
    let layout = session.layout();
    let (rows, cols) = layout.text_grid(kind);
    let title_h = if kind == SubWindowKind::Main {
        layout.title_height()
    } else {
        0
    };
    let text = Rect::new(
        region.x,
        region.y + title_h as i32,
        region.width,
        region.height.saturating_sub(title_h),
    );
    let (view, doc, cursor) = match kind {
        SubWindowKind::Main => (
            session.view,
            session.doc(),
            Some((session.cursor.line, session.cursor.col)),
        ),
        SubWindowKind::Transcript => {
            let t = session.transcript?;
            (t.view, t.doc, None)
        }
        _ => return None,
    };
    Some(TextFrame {
        region,
        text,
        rows,
        cols,
        view,
        doc,
        cursor,
        cell: session.cell(),
    })
}
