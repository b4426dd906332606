//! Sub-window layout.
//!
//! A session's top-level window is carved into sub-windows stacked top to
//! bottom: the primary text area (with the title rows as its leading
//! sub-region and the vertical gutter to its right), the horizontal gutter,
//! the optional transcript, then the single-line command output and command
//! input. Text regions are sized in whole character cells; gutters take the
//! configured thickness in pixels.
//!
//! Invariants:
//! * Regions never overlap and all lie inside the top-level window.
//! * Every [`SubWindowKind`] except hidden gutters and an absent transcript
//!   has exactly one region.
//! * Degenerate (tiny) windows yield empty rectangles rather than panics.

use core_events::Rect;
use smallvec::SmallVec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubWindowKind {
    Main,
    CommandInput,
    CommandOutput,
    Transcript,
    VerticalGutter,
    HorizontalGutter,
}

impl SubWindowKind {
    pub const ALL: [SubWindowKind; 6] = [
        SubWindowKind::Main,
        SubWindowKind::CommandInput,
        SubWindowKind::CommandOutput,
        SubWindowKind::Transcript,
        SubWindowKind::VerticalGutter,
        SubWindowKind::HorizontalGutter,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    /// Regions that show scrollable document lines and support partial and
    /// scroll repaints. Everything else always repaints whole.
    pub fn is_text(self) -> bool {
        matches!(self, SubWindowKind::Main | SubWindowKind::Transcript)
    }

    pub fn is_gutter(self) -> bool {
        matches!(
            self,
            SubWindowKind::VerticalGutter | SubWindowKind::HorizontalGutter
        )
    }
}

/// Character cell size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellMetrics {
    pub width: u32,
    pub height: u32,
}

impl CellMetrics {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// One cell per pixel (terminal backends).
    pub const UNIT: CellMetrics = CellMetrics::new(1, 1);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutRegion {
    pub kind: SubWindowKind,
    /// Top-level-relative pixels.
    pub rect: Rect,
}

/// Inputs to a layout computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutParams {
    pub width: u32,
    pub height: u32,
    pub cell: CellMetrics,
    pub title_rows: u32,
    pub transcript: bool,
    /// Gutter thickness when shown.
    pub vertical_gutter: Option<u32>,
    pub horizontal_gutter: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    params: LayoutParams,
    regions: SmallVec<[LayoutRegion; 6]>,
}

impl Layout {
    pub fn compute(params: LayoutParams) -> Self {
        let LayoutParams {
            width,
            height,
            cell,
            title_rows,
            transcript,
            vertical_gutter,
            horizontal_gutter,
        } = params;
        let ch = cell.height.max(1);
        let title_h = title_rows * ch;
        let vbar = vertical_gutter.unwrap_or(0).min(width);
        let hbar = horizontal_gutter.unwrap_or(0);
        // Two single-line command rows at the bottom.
        let bottom_h = 2 * ch;
        let avail = height.saturating_sub(title_h + bottom_h + hbar);
        let avail_rows = avail / ch;
        let (main_rows, transcript_rows) = if transcript {
            let t = avail_rows / 3;
            (avail_rows - t, t)
        } else {
            (avail_rows, 0)
        };
        let main_w = width - vbar;
        let main_h = title_h + main_rows * ch;

        let mut regions = SmallVec::new();
        let mut y = 0i32;
        regions.push(LayoutRegion {
            kind: SubWindowKind::Main,
            rect: Rect::new(0, y, main_w, main_h),
        });
        if vertical_gutter.is_some() {
            regions.push(LayoutRegion {
                kind: SubWindowKind::VerticalGutter,
                rect: Rect::new(main_w as i32, y + title_h as i32, vbar, main_rows * ch),
            });
        }
        y += main_h as i32;
        if horizontal_gutter.is_some() {
            regions.push(LayoutRegion {
                kind: SubWindowKind::HorizontalGutter,
                rect: Rect::new(0, y, main_w, hbar),
            });
            y += hbar as i32;
        }
        if transcript {
            let h = transcript_rows * ch;
            regions.push(LayoutRegion {
                kind: SubWindowKind::Transcript,
                rect: Rect::new(0, y, width, h),
            });
            y += h as i32;
        }
        regions.push(LayoutRegion {
            kind: SubWindowKind::CommandOutput,
            rect: Rect::new(0, y, width, ch.min(height.saturating_sub(y as u32))),
        });
        y += ch as i32;
        regions.push(LayoutRegion {
            kind: SubWindowKind::CommandInput,
            rect: Rect::new(0, y, width, ch.min(height.saturating_sub(y.max(0) as u32))),
        });
        Self { params, regions }
    }

    pub fn params(&self) -> LayoutParams {
        self.params
    }

    pub fn regions(&self) -> &[LayoutRegion] {
        &self.regions
    }

    pub fn region(&self, kind: SubWindowKind) -> Option<&LayoutRegion> {
        self.regions.iter().find(|r| r.kind == kind)
    }

    pub fn rect(&self, kind: SubWindowKind) -> Rect {
        self.region(kind).map(|r| r.rect).unwrap_or_default()
    }

    /// Sub-window under a top-level-relative point.
    pub fn hit(&self, x: i32, y: i32) -> Option<&LayoutRegion> {
        self.regions.iter().find(|r| r.rect.contains(x, y))
    }

    /// Pixel height of the title sub-region at the top of the main area.
    pub fn title_height(&self) -> u32 {
        (self.params.title_rows * self.params.cell.height.max(1)).min(self.rect(SubWindowKind::Main).height)
    }

    /// Text rows and columns of a text region (title excluded for main).
    pub fn text_grid(&self, kind: SubWindowKind) -> (usize, usize) {
        let r = self.rect(kind);
        let cell = self.params.cell;
        let h = if kind == SubWindowKind::Main {
            r.height.saturating_sub(self.title_height())
        } else {
            r.height
        };
        (
            (h / cell.height.max(1)) as usize,
            (r.width / cell.width.max(1)) as usize,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn params() -> LayoutParams {
        LayoutParams {
            width: 800,
            height: 600,
            cell: CellMetrics::new(8, 16),
            title_rows: 1,
            transcript: false,
            vertical_gutter: Some(11),
            horizontal_gutter: Some(11),
        }
    }

    #[test]
    fn stacks_regions_without_overlap() {
        let l = Layout::compute(params());
        assert_eq!(l.rect(SubWindowKind::Main), Rect::new(0, 0, 789, 16 + 33 * 16));
        assert_eq!(l.rect(SubWindowKind::VerticalGutter), Rect::new(789, 16, 11, 33 * 16));
        assert_eq!(l.rect(SubWindowKind::HorizontalGutter), Rect::new(0, 544, 789, 11));
        assert_eq!(l.rect(SubWindowKind::CommandOutput), Rect::new(0, 555, 800, 16));
        assert_eq!(l.rect(SubWindowKind::CommandInput), Rect::new(0, 571, 800, 16));
        let rs = l.regions();
        for (i, a) in rs.iter().enumerate() {
            for b in &rs[i + 1..] {
                assert!(a.rect.intersect(&b.rect).is_none(), "{a:?} overlaps {b:?}");
            }
        }
        assert_eq!(l.text_grid(SubWindowKind::Main), (33, 98));
    }

    #[test]
    fn transcript_takes_a_third() {
        let l = Layout::compute(LayoutParams {
            transcript: true,
            vertical_gutter: None,
            horizontal_gutter: None,
            ..params()
        });
        let (main_rows, _) = l.text_grid(SubWindowKind::Main);
        let (t_rows, _) = l.text_grid(SubWindowKind::Transcript);
        assert_eq!(main_rows + t_rows, 34);
        assert_eq!(t_rows, 11);
        assert!(l.region(SubWindowKind::VerticalGutter).is_none());
    }

    #[test]
    fn hit_resolves_title_as_main() {
        let l = Layout::compute(params());
        assert_eq!(l.hit(5, 3).map(|r| r.kind), Some(SubWindowKind::Main));
        assert_eq!(l.hit(795, 100).map(|r| r.kind), Some(SubWindowKind::VerticalGutter));
        assert_eq!(l.hit(5, 580).map(|r| r.kind), Some(SubWindowKind::CommandInput));
    }

    #[test]
    fn tiny_window_degrades() {
        let l = Layout::compute(LayoutParams {
            width: 5,
            height: 3,
            ..params()
        });
        assert_eq!(l.text_grid(SubWindowKind::Main).0, 0);
        assert!(l.rect(SubWindowKind::VerticalGutter).width <= 5);
    }
}
