use crate::metrics::CompositorMetrics;
use core_events::SessionId;
use core_model::{ContentProvider, RedrawRequest, SessionSet, SubWindowKind};
use tracing::{debug, warn};

/// Push the edit impact recorded on `from` to every sibling showing the same
/// document. Siblings whose visible lines intersect the edited range get a
/// partial-line request starting at the first impacted visible line.
/// Returns how many siblings were marked.
pub(crate) fn propagate(
    sessions: &mut SessionSet,
    from: SessionId,
    content: &dyn ContentProvider,
    metrics: &CompositorMetrics,
) -> usize {
    let Some(src) = sessions.get_mut(from) else {
        return 0;
    };
    let Some(range) = src.take_edit_impact() else {
        return 0;
    };
    let doc = src.doc();
    let total = content.line_count(doc);
    let mut marked = 0;
    for s in sessions.iter_mut() {
        if s.id() == from || s.doc() != doc {
            continue;
        }
        if let Err(e) = s.set_total_lines(total) {
            warn!(target: "compositor.propagate", session = %s.id(), error = %e, "sibling_resize_failed");
        }
        let visible = s.view.visible();
        if range.start >= visible.end || range.end <= visible.start {
            continue;
        }
        let line = range.start.max(visible.start);
        s.redraw
            .mark(SubWindowKind::Main, RedrawRequest::PartialLine { line });
        CompositorMetrics::bump(&metrics.propagated);
        debug!(target: "compositor.propagate", from = %from, to = %s.id(), line, "edit_propagated");
        marked += 1;
    }
    marked
}
