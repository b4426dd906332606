//! Warp decision: where the pointer should go for the text cursor, whether
//! the move would leave the physical screen, and whether a real move is
//! needed at all.

use crate::metrics::CompositorMetrics;
use core_display::DisplayResult;
use core_events::{Event, EventKind, ModMask, PointerPos};
use core_model::{CancelReason, DisplaySession, SubWindowKind, WarpTarget};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WarpDecision {
    #[default]
    NotRequested,
    /// The pointer is not over this session's window; it is left alone.
    PointerOutside,
    /// The server cannot move the pointer.
    Unsupported,
    /// Cursor unchanged since the last report: a synthetic enter was queued
    /// instead of moving the pointer.
    Fake { target: WarpTarget },
    Real {
        target: WarpTarget,
        /// Root coordinates actually requested.
        root: (i32, i32),
        clamped: bool,
    },
}

/// Clamp a root-relative point to `[inset, dim - 1 - inset]` on both axes.
/// Returns the clamped point and whether either coordinate moved.
pub fn clamp_to_screen(x: i32, y: i32, screen: (u32, u32), inset: u32) -> ((i32, i32), bool) {
    let clamp = |v: i32, dim: u32| {
        let lo = inset as i32;
        let hi = (dim as i32 - 1 - inset as i32).max(lo);
        v.clamp(lo, hi)
    };
    let cx = clamp(x, screen.0);
    let cy = clamp(y, screen.1);
    ((cx, cy), (cx, cy) != (x, y))
}

/// Top-level-relative centre of the cursor cell. A cursor scrolled out of
/// view is pulled to the nearest visible line and column.
pub fn cursor_point(session: &DisplaySession) -> (i32, i32) {
    let layout = session.layout();
    let main = layout.rect(SubWindowKind::Main);
    let cell = session.cell();
    let v = session.view;
    let row = if v.rows == 0 {
        0
    } else {
        session
            .cursor
            .line
            .clamp(v.top_line, v.top_line + v.rows - 1)
            - v.top_line
    };
    let col = if v.cols == 0 {
        0
    } else {
        session
            .cursor
            .col
            .clamp(v.left_col, v.left_col + v.cols - 1)
            - v.left_col
    };
    let x = main.x + (col as u32 * cell.width + cell.width / 2) as i32;
    let y = main.y
        + (layout.title_height() + row as u32 * cell.height + cell.height / 2) as i32;
    (x, y)
}

pub(crate) fn decide(
    session: &mut DisplaySession,
    inset: u32,
    metrics: &CompositorMetrics,
) -> DisplayResult<WarpDecision> {
    let top = session.top_window();
    let q = session.display_mut().query_pointer(top)?;
    if !q.inside {
        CompositorMetrics::bump(&metrics.warps_outside);
        debug!(target: "compositor.warp", session = %session.id(), "pointer_outside");
        return Ok(WarpDecision::PointerOutside);
    }
    let caps = session.display().capabilities();
    let (x, y) = cursor_point(session);
    let (ox, oy) = session.top_origin()?;
    let screen = session.display().screen_size();
    let ((rx, ry), clamped) = clamp_to_screen(ox + x, oy + y, screen, inset);
    if clamped {
        CompositorMetrics::bump(&metrics.warps_clamped);
        info!(target: "compositor.warp", session = %session.id(), want_x = ox + x, want_y = oy + y, x = rx, y = ry, "warp_clamped");
    }
    let at = session.locate_top(rx - ox, ry - oy);
    let target = WarpTarget {
        kind: at.kind,
        x: at.x,
        y: at.y,
    };

    if !clamped && session.cursor.last_target == Some(target) {
        // Pointer consumers still get a position report, without jitter.
        if let Some(window) = session.window(target.kind) {
            let pos = PointerPos::new(target.x, target.y, rx, ry);
            let ev = Event::new(
                window,
                EventKind::Enter {
                    pos,
                    state: ModMask::empty(),
                },
                0,
            )
            .synthetic();
            session.inject(ev);
        }
        CompositorMetrics::bump(&metrics.warps_fake);
        debug!(target: "compositor.warp", session = %session.id(), ?target, "warp_fake");
        return Ok(WarpDecision::Fake { target });
    }

    if !caps.can_warp_pointer {
        debug!(target: "compositor.warp", session = %session.id(), "warp_unsupported");
        return Ok(WarpDecision::Unsupported);
    }
    if session.warp.expecting() {
        session.warp.cancel(CancelReason::Superseded);
    }
    session.display_mut().warp_pointer(top, rx - ox, ry - oy)?;
    if caps.warp_is_observable() {
        session.warp.arm(target);
    }
    session.cursor.last_target = Some(target);
    CompositorMetrics::bump(&metrics.warps_real);
    debug!(target: "compositor.warp", session = %session.id(), x = rx, y = ry, clamped, "warp_issued");
    Ok(WarpDecision::Real {
        target,
        root: (rx, ry),
        clamped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn far_target_clamps_three_pixels_inside() {
        assert_eq!(clamp_to_screen(5000, 5000, (1024, 768), 3), ((1020, 764), true));
        assert_eq!(clamp_to_screen(-20, 10, (1024, 768), 3), ((3, 10), true));
        assert_eq!(clamp_to_screen(500, 300, (1024, 768), 3), ((500, 300), false));
    }

    #[test]
    fn degenerate_screen_does_not_panic() {
        let ((x, y), clamped) = clamp_to_screen(10, 10, (4, 4), 3);
        assert_eq!((x, y), (3, 3));
        assert!(clamped);
    }
}
