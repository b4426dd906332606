//! Per-session display model.
//!
//! A [`DisplaySession`] owns one server connection, its sub-windows and
//! offscreen buffer, and the records the dispatcher and compositor share:
//! the [`RedrawMask`], the [`WarpState`], the [`BackgroundWork`] flags and the
//! cursor. [`SessionSet`] is the explicit ring of sibling sessions.

mod background;
mod content;
mod layout;
mod redraw;
mod session;
mod sessions;
mod view;
mod warp;
mod window_table;

pub use background::BackgroundWork;
pub use content::{ContentProvider, DocId, NoContent};
pub use core_scrollbar::{Axis, ScrollCommand, ScrollDirection};
pub use layout::{CellMetrics, Layout, LayoutParams, LayoutRegion, SubWindowKind};
pub use redraw::{RedrawMask, RedrawMetricsSnapshot, RedrawRequest};
pub use session::{DisplaySession, Located, SessionOptions, TranscriptView};
pub use sessions::SessionSet;
pub use view::{CursorRecord, ViewState, compute_scroll_intent};
pub use warp::{CancelReason, WarpOutcome, WarpState, WarpTarget};
pub use window_table::{WindowRef, WindowTable};
