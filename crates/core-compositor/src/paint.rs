//! Region painters. Each paints into the offscreen pixmap and returns the
//! pixmap rectangle that changed; the caller copies exactly that rectangle
//! to the sub-window.

use core_display::{Canvas, DisplayResult, Drawable, Paint};
use core_events::Rect;
use core_model::{CellMetrics, ContentProvider, DocId, RedrawRequest, SubWindowKind, ViewState};
use core_scrollbar::ScrollbarRects;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Everything a text-region paint needs, copied out of the session so the
/// display can be borrowed mutably while painting.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TextFrame {
    /// Whole sub-window, pixmap coordinates.
    pub region: Rect,
    /// Text area (region minus the title rows for main).
    pub text: Rect,
    pub rows: usize,
    pub cols: usize,
    pub view: ViewState,
    pub doc: DocId,
    pub cursor: Option<(usize, usize)>,
    pub cell: CellMetrics,
}

impl TextFrame {
    fn row_rect(&self, row: usize) -> Rect {
        let ch = self.cell.height;
        Rect::new(self.text.x, self.text.y + (row as u32 * ch) as i32, self.text.width, ch)
    }

    /// Rows from `row` to the bottom of the text area, leftover pixels included.
    fn tail_rect(&self, row: usize) -> Rect {
        let off = row as u32 * self.cell.height;
        Rect::new(
            self.text.x,
            self.text.y + off as i32,
            self.text.width,
            self.text.height.saturating_sub(off),
        )
    }
}

/// Outcome of painting one text request.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TextPaint {
    /// Pixmap rectangle to copy, if anything changed.
    pub dirty: Option<Rect>,
    /// Widest line seen, in columns.
    pub widest: usize,
}

/// Display columns `[start, start + width)` of `line`. A wide character cut
/// by the left edge leaves blanks for its visible half; one cut by the right
/// edge is dropped.
pub(crate) fn columns(line: &str, start: usize, width: usize) -> String {
    let end = start + width;
    let mut out = String::new();
    let mut col = 0;
    for ch in line.chars() {
        if col >= end {
            break;
        }
        let w = ch.width().unwrap_or(0);
        if col >= start {
            if col + w <= end {
                out.push(ch);
            }
        } else if col + w > start {
            out.extend(std::iter::repeat_n(' ', col + w - start));
        }
        col += w;
    }
    out
}

pub(crate) fn paint_title(
    canvas: &mut dyn Canvas,
    pix: Drawable,
    rect: Rect,
    text: &str,
    cell: CellMetrics,
) -> DisplayResult<()> {
    if rect.is_empty() {
        return Ok(());
    }
    canvas.fill_rect(pix, rect, Paint::Title)?;
    let cols = (rect.width / cell.width.max(1)) as usize;
    canvas.draw_text(pix, rect.x, rect.y, &columns(text, 0, cols), Paint::Title)
}

/// Paint `rows` of a text frame; returns the widest line seen.
fn paint_rows(
    canvas: &mut dyn Canvas,
    pix: Drawable,
    f: &TextFrame,
    content: &dyn ContentProvider,
    rows: std::ops::Range<usize>,
) -> DisplayResult<usize> {
    let mut widest = 0;
    for row in rows {
        let rect = f.row_rect(row);
        canvas.fill_rect(pix, rect, Paint::Background)?;
        let line = f.view.top_line + row;
        let text = content.line(f.doc, line);
        if let Some(text) = &text {
            widest = widest.max(text.width());
            let visible = columns(text, f.view.left_col, f.cols);
            if !visible.is_empty() {
                canvas.draw_text(pix, rect.x, rect.y, &visible, Paint::Text)?;
            }
        }
        paint_cursor(canvas, pix, f, line, text.as_deref(), f.view.left_col)?;
    }
    Ok(widest)
}

/// Overlay the cursor cell if it sits on `line` at or right of `from_col`.
fn paint_cursor(
    canvas: &mut dyn Canvas,
    pix: Drawable,
    f: &TextFrame,
    line: usize,
    text: Option<&str>,
    from_col: usize,
) -> DisplayResult<()> {
    let Some((cl, cc)) = f.cursor else {
        return Ok(());
    };
    let left = f.view.left_col;
    if cl != line || cc < from_col || cc < left || cc >= left + f.cols {
        return Ok(());
    }
    let Some(row) = f.view.row_of(line) else {
        return Ok(());
    };
    let r = f.row_rect(row);
    let x = r.x + ((cc - left) as u32 * f.cell.width) as i32;
    canvas.fill_rect(pix, Rect::new(x, r.y, f.cell.width, f.cell.height), Paint::Inverse)?;
    let glyph = text.map(|t| columns(t, cc, 1)).unwrap_or_default();
    if !glyph.is_empty() {
        canvas.draw_text(pix, x, r.y, &glyph, Paint::Inverse)?;
    }
    Ok(())
}

/// Full repaint of a text region (title included for main).
pub(crate) fn text_full(
    canvas: &mut dyn Canvas,
    pix: Drawable,
    f: &TextFrame,
    content: &dyn ContentProvider,
    title: Option<(&str, Rect)>,
) -> DisplayResult<TextPaint> {
    canvas.fill_rect(pix, f.region, Paint::Background)?;
    if let Some((text, rect)) = title {
        paint_title(canvas, pix, rect, text, f.cell)?;
    }
    let widest = paint_rows(canvas, pix, f, content, 0..f.rows)?;
    Ok(TextPaint {
        dirty: Some(f.region),
        widest,
    })
}

/// Repaint from document line `line` to the bottom of the region.
pub(crate) fn text_partial_line(
    canvas: &mut dyn Canvas,
    pix: Drawable,
    f: &TextFrame,
    content: &dyn ContentProvider,
    line: usize,
) -> DisplayResult<TextPaint> {
    let top = f.view.top_line;
    if line >= top + f.rows {
        return Ok(TextPaint::default());
    }
    let r0 = line.saturating_sub(top);
    let tail = f.tail_rect(r0);
    canvas.fill_rect(pix, tail, Paint::Background)?;
    let widest = paint_rows(canvas, pix, f, content, r0..f.rows)?;
    Ok(TextPaint {
        dirty: Some(tail),
        widest,
    })
}

/// Repaint one line from document column `col` to the right edge.
pub(crate) fn text_partial_rect(
    canvas: &mut dyn Canvas,
    pix: Drawable,
    f: &TextFrame,
    content: &dyn ContentProvider,
    line: usize,
    col: usize,
) -> DisplayResult<TextPaint> {
    let Some(row) = f.view.row_of(line) else {
        return Ok(TextPaint::default());
    };
    let left = f.view.left_col;
    let c0 = col.saturating_sub(left);
    if c0 >= f.cols {
        return Ok(TextPaint::default());
    }
    let r = f.row_rect(row);
    let x_off = c0 as u32 * f.cell.width;
    let area = Rect::new(r.x + x_off as i32, r.y, r.width.saturating_sub(x_off), r.height);
    canvas.fill_rect(pix, area, Paint::Background)?;
    let text = content.line(f.doc, line);
    let mut widest = 0;
    if let Some(text) = &text {
        widest = text.width();
        let visible = columns(text, left + c0, f.cols - c0);
        if !visible.is_empty() {
            canvas.draw_text(pix, area.x, area.y, &visible, Paint::Text)?;
        }
    }
    paint_cursor(canvas, pix, f, line, text.as_deref(), left + c0)?;
    Ok(TextPaint {
        dirty: Some(area),
        widest,
    })
}

/// Blit the surviving rows by `lines` and repaint the rows scrolled in.
/// Callers escalate scrolls of a screenful or more to a full repaint.
pub(crate) fn text_scroll(
    canvas: &mut dyn Canvas,
    pix: Drawable,
    f: &TextFrame,
    content: &dyn ContentProvider,
    lines: i64,
) -> DisplayResult<TextPaint> {
    let n = lines.unsigned_abs() as usize;
    debug_assert!(n < f.rows);
    let ch = f.cell.height;
    let keep = (f.rows - n) as u32 * ch;
    let shift = (n as u32 * ch) as i32;
    let exposed = if lines > 0 {
        let src = Rect::new(f.text.x, f.text.y + shift, f.text.width, keep);
        canvas.copy_area(pix, pix, src, f.text.x, f.text.y)?;
        canvas.fill_rect(pix, f.tail_rect(f.rows - n), Paint::Background)?;
        (f.rows - n)..f.rows
    } else {
        let src = Rect::new(f.text.x, f.text.y, f.text.width, keep);
        canvas.copy_area(pix, pix, src, f.text.x, f.text.y + shift)?;
        0..n
    };
    let widest = paint_rows(canvas, pix, f, content, exposed)?;
    Ok(TextPaint {
        dirty: Some(f.text),
        widest,
    })
}

/// Single-line command rows always repaint whole.
pub(crate) fn command_row(
    canvas: &mut dyn Canvas,
    pix: Drawable,
    region: Rect,
    text: &str,
    cell: CellMetrics,
) -> DisplayResult<Rect> {
    canvas.fill_rect(pix, region, Paint::Background)?;
    let cols = (region.width / cell.width.max(1)) as usize;
    let visible = columns(text, 0, cols);
    if !visible.is_empty() {
        canvas.draw_text(pix, region.x, region.y, &visible, Paint::Text)?;
    }
    Ok(region)
}

/// Scrollbar gutter: track, both arrows and the slider. `rects` are
/// gutter-local.
pub(crate) fn gutter(
    canvas: &mut dyn Canvas,
    pix: Drawable,
    region: Rect,
    rects: &ScrollbarRects,
) -> DisplayResult<Rect> {
    let at = |r: Rect| Rect::new(region.x + r.x, region.y + r.y, r.width, r.height);
    canvas.fill_rect(pix, region, Paint::Gutter)?;
    canvas.fill_rect(pix, at(rects.arrow_back), Paint::Arrow)?;
    canvas.fill_rect(pix, at(rects.arrow_forward), Paint::Arrow)?;
    if !rects.slider.is_empty() {
        canvas.fill_rect(pix, at(rects.slider), Paint::Slider)?;
    }
    Ok(region)
}

/// The request actually executed for `req` on a region of `rows` text rows.
/// Non-text regions only repaint whole; scrolls of a screenful or more
/// become full repaints. The flag reports a scroll escalation.
pub(crate) fn effective(kind: SubWindowKind, req: RedrawRequest, rows: usize) -> (RedrawRequest, bool) {
    if !kind.is_text() || rows == 0 {
        return (RedrawRequest::Full, false);
    }
    match req {
        RedrawRequest::Scroll { lines } if lines.unsigned_abs() as usize >= rows => {
            (RedrawRequest::Full, true)
        }
        other => (other, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_slice_by_display_width() {
        assert_eq!(columns("hello world", 6, 5), "world");
        assert_eq!(columns("hello", 3, 10), "lo");
        assert_eq!(columns("abc", 5, 3), "");
        // Wide char straddling the left edge leaves a blank.
        assert_eq!(columns("a漢b", 2, 3), " b");
        // Wide char cut by the right edge is dropped.
        assert_eq!(columns("a漢b", 0, 2), "a");
    }

    #[test]
    fn non_text_regions_always_full() {
        assert_eq!(
            effective(SubWindowKind::CommandInput, RedrawRequest::PartialLine { line: 0 }, 1),
            (RedrawRequest::Full, false)
        );
        assert_eq!(
            effective(SubWindowKind::Main, RedrawRequest::Scroll { lines: -40 }, 33),
            (RedrawRequest::Full, true)
        );
        assert_eq!(
            effective(SubWindowKind::Main, RedrawRequest::Scroll { lines: 3 }, 33),
            (RedrawRequest::Scroll { lines: 3 }, false)
        );
    }
}
