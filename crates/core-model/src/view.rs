use crate::warp::WarpTarget;
use core_scrollbar::Extents;

/// Viewport of a text region onto its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewState {
    pub top_line: usize,
    pub left_col: usize,
    pub rows: usize,
    pub cols: usize,
    pub total_lines: usize,
    /// Widest line seen while painting; drives the horizontal scrollbar.
    pub widest: usize,
}

impl ViewState {
    pub fn max_top(&self) -> usize {
        self.total_lines.saturating_sub(self.rows)
    }

    pub fn max_left(&self) -> usize {
        self.widest.saturating_sub(self.cols)
    }

    /// Visible document lines, half-open.
    pub fn visible(&self) -> std::ops::Range<usize> {
        self.top_line..self.top_line + self.rows
    }

    pub fn vertical_extents(&self) -> Extents {
        Extents::new(self.total_lines, self.rows, self.top_line)
    }

    pub fn horizontal_extents(&self) -> Extents {
        Extents::new(self.widest, self.cols, self.left_col)
    }

    /// Screen row of a document line, if visible.
    pub fn row_of(&self, line: usize) -> Option<usize> {
        self.visible()
            .contains(&line)
            .then(|| line - self.top_line)
    }
}

/// Logical text cursor and the pointer position last reported for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorRecord {
    pub line: usize,
    pub col: usize,
    /// Where the pointer was last put (or found) for this cursor.
    pub last_target: Option<WarpTarget>,
}

/// Desired new first visible line keeping `cursor_line` inside the viewport
/// with `margin` rows of context (clamped to half the height). `None` when no
/// scroll is needed.
pub fn compute_scroll_intent(
    first: usize,
    cursor_line: usize,
    text_height: usize,
    margin: usize,
) -> Option<usize> {
    if text_height == 0 {
        return None;
    }
    let m = margin.min(text_height / 2);
    let bottom = first + text_height;
    if cursor_line < first + m {
        let new_first = cursor_line.saturating_sub(m);
        (new_first != first).then_some(new_first)
    } else if cursor_line + m >= bottom {
        let new_first = cursor_line + m + 1 - text_height;
        (new_first != first).then_some(new_first)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scroll_intent_keeps_cursor_in_band() {
        assert_eq!(compute_scroll_intent(0, 5, 10, 0), None);
        assert_eq!(compute_scroll_intent(0, 10, 10, 0), Some(1));
        assert_eq!(compute_scroll_intent(20, 3, 10, 0), Some(3));
        assert_eq!(compute_scroll_intent(0, 8, 10, 2), Some(1));
        assert_eq!(compute_scroll_intent(0, 8, 0, 2), None);
    }

    #[test]
    fn rows_map_only_when_visible() {
        let v = ViewState {
            top_line: 5,
            rows: 16,
            total_lines: 100,
            ..Default::default()
        };
        assert_eq!(v.row_of(10), Some(5));
        assert_eq!(v.row_of(21), None);
        assert_eq!(v.row_of(4), None);
        assert_eq!(v.max_top(), 84);
    }
}
