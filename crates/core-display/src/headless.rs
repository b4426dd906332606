//! In-memory display server.
//!
//! `HeadlessDisplay` keeps a window tree, a pointer and a screen size, and
//! appends every request to an [`Op`] log. A cloneable [`HeadlessHandle`]
//! shares the same state so callers can inspect the log, move the pointer,
//! inject allocation failures or sever the connection after the display has
//! been boxed into a session.
//!
//! Warps are echoed: each `warp_pointer` call queues a motion event for the
//! deepest window under the new pointer position. The echoes are collected in
//! the shared state (see [`HeadlessHandle::take_echoes`]) and, when a sender
//! is attached, pushed straight into the runtime channel.

use crate::{
    Canvas, DisplayCapabilities, DisplayError, DisplayResult, DisplayServer, Drawable, Paint,
    Pixmap, PixmapId, PointerQuery,
};
use ahash::AHashMap;
use core_events::{
    Event, EventKind, Inbound, ModMask, PointerPos, Rect, SessionId, WindowId,
};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::Sender;
use tracing::{debug, warn};

/// One recorded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    CreateWindow {
        id: WindowId,
        parent: Option<WindowId>,
        area: Rect,
    },
    PlaceWindow {
        window: WindowId,
        area: Rect,
    },
    WarpPointer {
        window: WindowId,
        x: i32,
        y: i32,
    },
    CreatePixmap {
        id: PixmapId,
        width: u32,
        height: u32,
    },
    FreePixmap(PixmapId),
    FillRect {
        target: Drawable,
        rect: Rect,
        paint: Paint,
    },
    DrawText {
        target: Drawable,
        x: i32,
        y: i32,
        text: String,
        paint: Paint,
    },
    CopyArea {
        src: Drawable,
        dst: Drawable,
        area: Rect,
        dst_x: i32,
        dst_y: i32,
    },
    SetTitle {
        window: WindowId,
        title: String,
    },
    Flush,
}

impl Op {
    pub fn is_warp(&self) -> bool {
        matches!(self, Op::WarpPointer { .. })
    }

    pub fn is_copy(&self) -> bool {
        matches!(self, Op::CopyArea { .. })
    }

    /// Target drawable of a drawing op.
    pub fn target(&self) -> Option<Drawable> {
        match self {
            Op::FillRect { target, .. } | Op::DrawText { target, .. } => Some(*target),
            Op::CopyArea { dst, .. } => Some(*dst),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct WinRec {
    parent: Option<WindowId>,
    area: Rect,
    depth: u32,
}

#[derive(Debug)]
struct State {
    ops: Vec<Op>,
    windows: AHashMap<WindowId, WinRec>,
    pixmaps: AHashMap<PixmapId, (u32, u32)>,
    screen: (u32, u32),
    pointer: (i32, i32),
    next_window: u32,
    next_pixmap: u32,
    time: u32,
    capabilities: DisplayCapabilities,
    fail_pixmaps: bool,
    lost: bool,
    echoes: Vec<Event>,
    echo_tx: Option<(SessionId, Sender<Inbound>)>,
}

impl State {
    fn origin(&self, window: WindowId) -> DisplayResult<(i32, i32)> {
        let mut cur = Some(window);
        let (mut x, mut y) = (0, 0);
        while let Some(id) = cur {
            let rec = self
                .windows
                .get(&id)
                .ok_or(DisplayError::UnknownWindow(id))?;
            x += rec.area.x;
            y += rec.area.y;
            cur = rec.parent;
        }
        Ok((x, y))
    }

    fn root_rect(&self, window: WindowId) -> DisplayResult<Rect> {
        let (x, y) = self.origin(window)?;
        let rec = self
            .windows
            .get(&window)
            .ok_or(DisplayError::UnknownWindow(window))?;
        Ok(Rect::new(x, y, rec.area.width, rec.area.height))
    }

    /// Deepest window containing the root point.
    fn window_at(&self, rx: i32, ry: i32) -> Option<WindowId> {
        let mut best: Option<(WindowId, u32)> = None;
        for (id, rec) in &self.windows {
            let Ok(r) = self.root_rect(*id) else { continue };
            if !r.contains(rx, ry) {
                continue;
            }
            let better = match best {
                None => true,
                Some((bid, bdepth)) => rec.depth > bdepth || (rec.depth == bdepth && *id > bid),
            };
            if better {
                best = Some((*id, rec.depth));
            }
        }
        best.map(|(id, _)| id)
    }

    fn check_live(&self) -> DisplayResult<()> {
        if self.lost {
            Err(DisplayError::ConnectionLost)
        } else {
            Ok(())
        }
    }

    fn check_drawable(&self, d: Drawable) -> DisplayResult<()> {
        let known = match d {
            Drawable::Window(w) => self.windows.contains_key(&w),
            Drawable::Pixmap(p) => self.pixmaps.contains_key(&p),
        };
        if known {
            Ok(())
        } else {
            Err(DisplayError::UnknownDrawable(d))
        }
    }

    fn tick(&mut self) -> u32 {
        self.time = self.time.wrapping_add(1);
        self.time
    }
}

fn lock(state: &Arc<Mutex<State>>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct HeadlessDisplay {
    state: Arc<Mutex<State>>,
}

/// Shared view onto a [`HeadlessDisplay`]'s state.
#[derive(Clone)]
pub struct HeadlessHandle {
    state: Arc<Mutex<State>>,
}

impl HeadlessDisplay {
    pub fn new(width: u32, height: u32) -> (Self, HeadlessHandle) {
        let state = Arc::new(Mutex::new(State {
            ops: Vec::new(),
            windows: AHashMap::new(),
            pixmaps: AHashMap::new(),
            screen: (width, height),
            pointer: (0, 0),
            next_window: 0x100,
            next_pixmap: 1,
            time: 0,
            capabilities: DisplayCapabilities::default(),
            fail_pixmaps: false,
            lost: false,
            echoes: Vec::new(),
            echo_tx: None,
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            HeadlessHandle { state },
        )
    }

    /// Push warp echoes into `tx` as well as recording them.
    pub fn with_echo(self, session: SessionId, tx: Sender<Inbound>) -> Self {
        lock(&self.state).echo_tx = Some((session, tx));
        self
    }
}

impl HeadlessHandle {
    pub fn ops(&self) -> Vec<Op> {
        lock(&self.state).ops.clone()
    }

    pub fn take_ops(&self) -> Vec<Op> {
        std::mem::take(&mut lock(&self.state).ops)
    }

    pub fn clear_ops(&self) {
        lock(&self.state).ops.clear();
    }

    pub fn warp_count(&self) -> usize {
        lock(&self.state).ops.iter().filter(|o| o.is_warp()).count()
    }

    /// Move the pointer (root coordinates) without generating events.
    pub fn set_pointer(&self, x: i32, y: i32) {
        lock(&self.state).pointer = (x, y);
    }

    pub fn pointer(&self) -> (i32, i32) {
        lock(&self.state).pointer
    }

    pub fn set_screen(&self, width: u32, height: u32) {
        lock(&self.state).screen = (width, height);
    }

    pub fn set_capabilities(&self, caps: DisplayCapabilities) {
        lock(&self.state).capabilities = caps;
    }

    pub fn fail_pixmaps(&self, fail: bool) {
        lock(&self.state).fail_pixmaps = fail;
    }

    /// Every subsequent request fails with `ConnectionLost`.
    pub fn sever(&self) {
        lock(&self.state).lost = true;
    }

    pub fn take_echoes(&self) -> Vec<Event> {
        std::mem::take(&mut lock(&self.state).echoes)
    }

    pub fn root_rect(&self, window: WindowId) -> Option<Rect> {
        lock(&self.state).root_rect(window).ok()
    }

    pub fn window_at(&self, x: i32, y: i32) -> Option<WindowId> {
        lock(&self.state).window_at(x, y)
    }

    pub fn live_pixmaps(&self) -> usize {
        lock(&self.state).pixmaps.len()
    }
}

impl Canvas for HeadlessDisplay {
    fn fill_rect(&mut self, target: Drawable, rect: Rect, paint: Paint) -> DisplayResult<()> {
        let mut st = lock(&self.state);
        st.check_live()?;
        st.check_drawable(target)?;
        st.ops.push(Op::FillRect {
            target,
            rect,
            paint,
        });
        Ok(())
    }

    fn draw_text(
        &mut self,
        target: Drawable,
        x: i32,
        y: i32,
        text: &str,
        paint: Paint,
    ) -> DisplayResult<()> {
        let mut st = lock(&self.state);
        st.check_live()?;
        st.check_drawable(target)?;
        st.ops.push(Op::DrawText {
            target,
            x,
            y,
            text: text.to_string(),
            paint,
        });
        Ok(())
    }

    fn copy_area(
        &mut self,
        src: Drawable,
        dst: Drawable,
        area: Rect,
        dst_x: i32,
        dst_y: i32,
    ) -> DisplayResult<()> {
        let mut st = lock(&self.state);
        st.check_live()?;
        st.check_drawable(src)?;
        st.check_drawable(dst)?;
        st.ops.push(Op::CopyArea {
            src,
            dst,
            area,
            dst_x,
            dst_y,
        });
        Ok(())
    }
}

impl DisplayServer for HeadlessDisplay {
    fn capabilities(&self) -> DisplayCapabilities {
        lock(&self.state).capabilities
    }

    fn screen_size(&self) -> (u32, u32) {
        lock(&self.state).screen
    }

    fn create_window(&mut self, parent: Option<WindowId>, area: Rect) -> DisplayResult<WindowId> {
        let mut st = lock(&self.state);
        st.check_live()?;
        let depth = match parent {
            Some(p) => {
                st.windows
                    .get(&p)
                    .ok_or(DisplayError::UnknownWindow(p))?
                    .depth
                    + 1
            }
            None => 0,
        };
        let id = WindowId(st.next_window);
        st.next_window += 1;
        st.windows.insert(
            id,
            WinRec {
                parent,
                area,
                depth,
            },
        );
        st.ops.push(Op::CreateWindow { id, parent, area });
        Ok(id)
    }

    fn place_window(&mut self, window: WindowId, area: Rect) -> DisplayResult<()> {
        let mut st = lock(&self.state);
        st.check_live()?;
        let rec = st
            .windows
            .get_mut(&window)
            .ok_or(DisplayError::UnknownWindow(window))?;
        rec.area = area;
        st.ops.push(Op::PlaceWindow { window, area });
        Ok(())
    }

    fn window_origin(&self, window: WindowId) -> DisplayResult<(i32, i32)> {
        let st = lock(&self.state);
        st.check_live()?;
        st.origin(window)
    }

    fn query_pointer(&mut self, window: WindowId) -> DisplayResult<PointerQuery> {
        let st = lock(&self.state);
        st.check_live()?;
        let r = st.root_rect(window)?;
        let (rx, ry) = st.pointer;
        Ok(PointerQuery {
            root_x: rx,
            root_y: ry,
            win_x: rx - r.x,
            win_y: ry - r.y,
            inside: r.contains(rx, ry),
        })
    }

    fn warp_pointer(&mut self, window: WindowId, x: i32, y: i32) -> DisplayResult<()> {
        let mut st = lock(&self.state);
        st.check_live()?;
        let (ox, oy) = st.origin(window)?;
        let (rx, ry) = (ox + x, oy + y);
        st.pointer = (rx, ry);
        st.ops.push(Op::WarpPointer { window, x, y });
        if !st.capabilities.echoes_warp {
            return Ok(());
        }
        let target = st.window_at(rx, ry).unwrap_or(window);
        let (tx_, ty_) = st.origin(target)?;
        let time = st.tick();
        let echo = Event::new(
            target,
            EventKind::Motion {
                pos: PointerPos::new(rx - tx_, ry - ty_, rx, ry),
                state: ModMask::empty(),
            },
            time,
        );
        debug!(target: "display", window = %target, x = rx - tx_, y = ry - ty_, "headless_warp_echo");
        if let Some((session, tx)) = &st.echo_tx
            && tx.try_send(Inbound::display(*session, echo.clone())).is_err()
        {
            warn!(target: "display", %session, "headless_warp_echo_dropped");
        }
        st.echoes.push(echo);
        Ok(())
    }

    fn create_pixmap(&mut self, width: u32, height: u32) -> DisplayResult<Pixmap> {
        let mut st = lock(&self.state);
        st.check_live()?;
        if st.fail_pixmaps || width == 0 || height == 0 {
            return Err(DisplayError::PixmapAllocation { width, height });
        }
        let id = PixmapId(st.next_pixmap);
        st.next_pixmap += 1;
        st.pixmaps.insert(id, (width, height));
        st.ops.push(Op::CreatePixmap { id, width, height });
        Ok(Pixmap { id, width, height })
    }

    fn free_pixmap(&mut self, pixmap: PixmapId) {
        let mut st = lock(&self.state);
        if st.pixmaps.remove(&pixmap).is_some() {
            st.ops.push(Op::FreePixmap(pixmap));
        }
    }

    fn set_title(&mut self, window: WindowId, title: &str) -> DisplayResult<()> {
        let mut st = lock(&self.state);
        st.check_live()?;
        st.ops.push(Op::SetTitle {
            window,
            title: title.to_string(),
        });
        Ok(())
    }

    fn flush(&mut self) -> DisplayResult<()> {
        let mut st = lock(&self.state);
        st.check_live()?;
        st.ops.push(Op::Flush);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn child_origins_accumulate() {
        let (mut d, h) = HeadlessDisplay::new(200, 100);
        let top = d.create_window(None, Rect::new(10, 5, 100, 50)).unwrap();
        let child = d.create_window(Some(top), Rect::new(4, 2, 20, 10)).unwrap();
        assert_eq!(d.window_origin(child).unwrap(), (14, 7));
        assert_eq!(h.window_at(15, 8), Some(child));
        assert_eq!(h.window_at(11, 6), Some(top));
        assert_eq!(h.window_at(0, 0), None);
    }

    #[test]
    fn warp_echoes_motion_to_deepest_window() {
        let (mut d, h) = HeadlessDisplay::new(200, 100);
        let top = d.create_window(None, Rect::new(0, 0, 100, 50)).unwrap();
        let child = d.create_window(Some(top), Rect::new(10, 10, 20, 10)).unwrap();
        d.warp_pointer(top, 12, 15).unwrap();
        let echoes = h.take_echoes();
        assert_eq!(echoes.len(), 1);
        assert_eq!(echoes[0].window, child);
        assert_eq!(echoes[0].pointer().map(|p| (p.x, p.y)), Some((2, 5)));
        assert_eq!(h.pointer(), (12, 15));
        let q = d.query_pointer(child).unwrap();
        assert!(q.inside);
        assert_eq!((q.win_x, q.win_y), (2, 5));
    }

    #[test]
    fn no_echo_when_server_does_not_report_warps() {
        let (mut d, h) = HeadlessDisplay::new(200, 100);
        h.set_capabilities(DisplayCapabilities::new(true, false));
        let top = d.create_window(None, Rect::new(0, 0, 100, 50)).unwrap();
        d.warp_pointer(top, 1, 1).unwrap();
        assert!(h.take_echoes().is_empty());
        assert_eq!(h.warp_count(), 1);
    }

    #[test]
    fn pixmap_failure_and_severed_connection() {
        let (mut d, h) = HeadlessDisplay::new(200, 100);
        h.fail_pixmaps(true);
        assert!(matches!(
            d.create_pixmap(10, 10),
            Err(DisplayError::PixmapAllocation { .. })
        ));
        h.fail_pixmaps(false);
        let pm = d.create_pixmap(10, 10).unwrap();
        assert_eq!(h.live_pixmaps(), 1);
        d.free_pixmap(pm.id);
        assert_eq!(h.live_pixmaps(), 0);
        h.sever();
        assert!(matches!(d.flush(), Err(DisplayError::ConnectionLost)));
    }

    #[test]
    fn drawing_to_unknown_pixmap_is_rejected() {
        let (mut d, _h) = HeadlessDisplay::new(10, 10);
        let err = d
            .fill_rect(Drawable::Pixmap(PixmapId(77)), Rect::new(0, 0, 1, 1), Paint::Text)
            .unwrap_err();
        assert!(matches!(err, DisplayError::UnknownDrawable(_)));
    }
}
