//! Windowing-server interface.
//!
//! The display core never talks to a concrete server. It drives a
//! [`DisplayServer`]: window creation and placement, offscreen pixmap
//! allocation, pointer query and warp, plus the drawing primitives in
//! [`Canvas`]. Two implementations ship here:
//!
//! * [`headless::HeadlessDisplay`] records every call and models a pointer and
//!   a window tree in memory. Tests across the workspace assert against it.
//! * [`term::TermScreen`] / [`term::TermDisplay`] render onto a terminal via
//!   crossterm, treating one cell as one pixel unit and tiling one top-level
//!   window per session.
//!
//! Each session owns one connection (`Box<dyn DisplayServer>`). Connection
//! failures surface as [`DisplayError::ConnectionLost`], which the dispatcher
//! treats as fatal for that session only.

use core_events::{Rect, WindowId};
use std::fmt;

pub mod capabilities;
pub mod headless;
pub mod term;

pub use capabilities::DisplayCapabilities;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixmapId(pub u32);

/// Offscreen pixel buffer owned by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pixmap {
    pub id: PixmapId,
    pub width: u32,
    pub height: u32,
}

impl Pixmap {
    pub fn drawable(&self) -> Drawable {
        Drawable::Pixmap(self.id)
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }
}

/// Anything drawing primitives can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Drawable {
    Window(WindowId),
    Pixmap(PixmapId),
}

impl fmt::Display for Drawable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Drawable::Window(w) => write!(f, "window:{w}"),
            Drawable::Pixmap(p) => write!(f, "pixmap:{}", p.0),
        }
    }
}

/// Logical paints; each backend maps them to its own colors/attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Paint {
    Background,
    Text,
    /// Reverse video (text cursor, selection).
    Inverse,
    Title,
    Gutter,
    Slider,
    Arrow,
}

/// Result of a pointer query relative to one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PointerQuery {
    pub root_x: i32,
    pub root_y: i32,
    /// Position relative to the queried window's origin.
    pub win_x: i32,
    pub win_y: i32,
    /// True when the pointer lies within the queried window's area.
    pub inside: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("display connection lost")]
    ConnectionLost,
    #[error("pixmap allocation failed ({width}x{height})")]
    PixmapAllocation { width: u32, height: u32 },
    #[error("unknown drawable {0}")]
    UnknownDrawable(Drawable),
    #[error("unknown window {0}")]
    UnknownWindow(WindowId),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DisplayError {
    /// Transport errors end the session; everything else degrades.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DisplayError::ConnectionLost | DisplayError::Io(_))
    }
}

pub type DisplayResult<T> = Result<T, DisplayError>;

/// Drawing primitives. The core only ever invokes these; it never draws
/// pixels itself.
pub trait Canvas {
    fn fill_rect(&mut self, target: Drawable, rect: Rect, paint: Paint) -> DisplayResult<()>;
    /// Draw `text` with its top-left corner at (`x`, `y`).
    fn draw_text(
        &mut self,
        target: Drawable,
        x: i32,
        y: i32,
        text: &str,
        paint: Paint,
    ) -> DisplayResult<()>;
    /// Copy `area` of `src` so its top-left lands at (`dst_x`, `dst_y`) in `dst`.
    /// Overlapping copies within one drawable behave like `memmove`.
    fn copy_area(
        &mut self,
        src: Drawable,
        dst: Drawable,
        area: Rect,
        dst_x: i32,
        dst_y: i32,
    ) -> DisplayResult<()>;
}

/// One connection to a windowing server.
pub trait DisplayServer: Canvas {
    fn capabilities(&self) -> DisplayCapabilities;
    /// Physical screen size in pixels.
    fn screen_size(&self) -> (u32, u32);
    /// Create a window. `parent == None` creates a top-level window whose
    /// placement is decided by the server; children are placed relative to
    /// their parent.
    fn create_window(&mut self, parent: Option<WindowId>, area: Rect) -> DisplayResult<WindowId>;
    /// Move/resize a child window relative to its parent.
    fn place_window(&mut self, window: WindowId, area: Rect) -> DisplayResult<()>;
    /// Root-relative origin of `window`.
    fn window_origin(&self, window: WindowId) -> DisplayResult<(i32, i32)>;
    fn query_pointer(&mut self, window: WindowId) -> DisplayResult<PointerQuery>;
    /// Programmatically move the pointer to (`x`, `y`) relative to `window`.
    /// The server answers with a motion (or enter) event at the new position.
    fn warp_pointer(&mut self, window: WindowId, x: i32, y: i32) -> DisplayResult<()>;
    fn create_pixmap(&mut self, width: u32, height: u32) -> DisplayResult<Pixmap>;
    fn free_pixmap(&mut self, pixmap: PixmapId);
    fn set_title(&mut self, window: WindowId, title: &str) -> DisplayResult<()>;
    fn flush(&mut self) -> DisplayResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(DisplayError::ConnectionLost.is_fatal());
        assert!(
            !DisplayError::PixmapAllocation {
                width: 1,
                height: 1
            }
            .is_fatal()
        );
        assert!(!DisplayError::UnknownWindow(WindowId(9)).is_fatal());
    }

    #[test]
    fn drawable_display_format() {
        assert_eq!(Drawable::Pixmap(PixmapId(3)).to_string(), "pixmap:3");
        assert_eq!(Drawable::Window(WindowId(0x20)).to_string(), "window:0x20");
    }
}
