//! Crossterm display server.
//!
//! The terminal plays the windowing server: one cell is one pixel unit, every
//! session gets one top-level window, and top-level windows are tiled as
//! horizontal bands over the terminal. Child windows, pixmaps and drawing
//! requests are modelled as cell grids in a [`TermScreen`] shared by all
//! session connections; `flush` composites the window tree into a frame and
//! writes only the rows that changed since the previous frame.
//!
//! The [`Routes`] table (top-level placement, pointer position, timestamps)
//! is shared with the terminal input task so mouse events can be hit-tested
//! against the current tiling. A warp moves the recorded pointer and reports
//! a motion event through the runtime channel, mirroring what a real server
//! does after a programmatic pointer move.

use crate::{
    Canvas, DisplayCapabilities, DisplayError, DisplayResult, DisplayServer, Drawable, Paint,
    Pixmap, PixmapId, PointerQuery,
};
use ahash::AHashMap;
use anyhow::Result;
use core_events::{Event, EventKind, Inbound, ModMask, PointerPos, Rect, SessionId, WindowId};
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture},
    execute, queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor},
    terminal::{
        EnterAlternateScreen, LeaveAlternateScreen, SetTitle, disable_raw_mode, enable_raw_mode,
    },
};
use std::io::{Write, stdout};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::mpsc::Sender;
use tracing::{debug, trace, warn};
use unicode_width::UnicodeWidthChar;

// -------------------------------------------------------------------------------------------------
// Routes
// -------------------------------------------------------------------------------------------------

/// Placement of one session's top-level window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub session: SessionId,
    pub window: WindowId,
    pub area: Rect,
}

#[derive(Debug)]
pub struct Routes {
    entries: Vec<Route>,
    pointer: (i32, i32),
    screen: (u32, u32),
    epoch: Instant,
}

pub type SharedRoutes = Arc<Mutex<Routes>>;

/// Lock helper that recovers from poisoning; the protected data stays
/// consistent across every mutation below.
pub fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Routes {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            entries: Vec::new(),
            pointer: (0, 0),
            screen: (width, height),
            epoch: Instant::now(),
        }
    }

    pub fn shared(width: u32, height: u32) -> SharedRoutes {
        Arc::new(Mutex::new(Self::new(width, height)))
    }

    pub fn routes(&self) -> &[Route] {
        &self.entries
    }

    pub fn screen(&self) -> (u32, u32) {
        self.screen
    }

    pub fn pointer(&self) -> (i32, i32) {
        self.pointer
    }

    pub fn set_pointer(&mut self, x: i32, y: i32) {
        self.pointer = (x, y);
    }

    /// Milliseconds since the table was created; used as event timestamps.
    pub fn now_ms(&self) -> u32 {
        self.epoch.elapsed().as_millis() as u32
    }

    pub fn hit(&self, x: i32, y: i32) -> Option<Route> {
        self.entries.iter().copied().find(|r| r.area.contains(x, y))
    }

    pub fn find(&self, window: WindowId) -> Option<Route> {
        self.entries.iter().copied().find(|r| r.window == window)
    }

    pub fn add(&mut self, session: SessionId, window: WindowId) -> Vec<Route> {
        self.entries.push(Route {
            session,
            window,
            area: Rect::default(),
        });
        self.retile(self.screen.0, self.screen.1)
    }

    pub fn remove_session(&mut self, session: SessionId) -> Vec<Route> {
        self.entries.retain(|r| r.session != session);
        self.retile(self.screen.0, self.screen.1)
    }

    /// Split the screen into equal horizontal bands, the last one taking the
    /// remainder. Returns the routes whose area changed.
    pub fn retile(&mut self, width: u32, height: u32) -> Vec<Route> {
        self.screen = (width, height);
        let n = self.entries.len() as u32;
        if n == 0 {
            return Vec::new();
        }
        let band = (height / n).max(1);
        let mut changed = Vec::new();
        for (i, route) in self.entries.iter_mut().enumerate() {
            let i = i as u32;
            let y = (i * band).min(height.saturating_sub(1));
            let h = if i + 1 == n {
                height.saturating_sub(y).max(1)
            } else {
                band
            };
            let area = Rect::new(0, y as i32, width, h);
            if route.area != area {
                route.area = area;
                changed.push(*route);
            }
        }
        changed
    }
}

/// Emit configure + expose for each changed top-level placement.
pub fn announce_placement(tx: &Sender<Inbound>, changed: &[Route], time: u32) {
    for route in changed {
        let configure = Event::new(route.window, EventKind::Configure { area: route.area }, time);
        let expose = Event::new(
            route.window,
            EventKind::Expose {
                area: Rect::new(0, 0, route.area.width, route.area.height),
                count: 0,
            },
            time,
        );
        for ev in [configure, expose] {
            if tx.try_send(Inbound::display(route.session, ev)).is_err() {
                warn!(target: "display", session = %route.session, "placement_event_dropped");
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------
// Cell grids
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cell {
    ch: char,
    paint: Paint,
}

/// Continuation half of a wide character.
const WIDE_TAIL: char = '\0';

const BLANK: Cell = Cell {
    ch: ' ',
    paint: Paint::Background,
};

#[derive(Debug, Clone)]
struct Grid {
    width: u32,
    height: u32,
    cells: Vec<Cell>,
}

impl Grid {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cells: vec![BLANK; (width as usize) * (height as usize)],
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        if self.width == width && self.height == height {
            return;
        }
        let mut next = Grid::new(width, height);
        for y in 0..self.height.min(height) {
            for x in 0..self.width.min(width) {
                next.set(x as i32, y as i32, self.get(x as i32, y as i32));
            }
        }
        *self = next;
    }

    fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    fn idx(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    fn get(&self, x: i32, y: i32) -> Cell {
        self.idx(x, y).map(|i| self.cells[i]).unwrap_or(BLANK)
    }

    fn set(&mut self, x: i32, y: i32, cell: Cell) {
        if let Some(i) = self.idx(x, y) {
            self.cells[i] = cell;
        }
    }

    fn fill(&mut self, rect: Rect, paint: Paint) {
        let Some(r) = rect.intersect(&self.bounds()) else {
            return;
        };
        for y in r.y..r.bottom() {
            for x in r.x..r.right() {
                self.set(x, y, Cell { ch: ' ', paint });
            }
        }
    }

    fn text(&mut self, x: i32, y: i32, text: &str, paint: Paint) {
        let mut cx = x;
        for ch in text.chars() {
            let w = UnicodeWidthChar::width(ch).unwrap_or(0) as i32;
            if w == 0 {
                continue;
            }
            self.set(cx, y, Cell { ch, paint });
            if w == 2 {
                self.set(cx + 1, y, Cell { ch: WIDE_TAIL, paint });
            }
            cx += w;
        }
    }

    fn region(&self, area: Rect) -> Vec<Cell> {
        let mut out = Vec::with_capacity((area.width as usize) * (area.height as usize));
        for y in area.y..area.bottom() {
            for x in area.x..area.right() {
                out.push(self.get(x, y));
            }
        }
        out
    }

    fn paste(&mut self, cells: &[Cell], width: u32, dst_x: i32, dst_y: i32) {
        if width == 0 {
            return;
        }
        for (i, cell) in cells.iter().enumerate() {
            let dx = (i as u32 % width) as i32;
            let dy = (i as u32 / width) as i32;
            self.set(dst_x + dx, dst_y + dy, *cell);
        }
    }
}

// -------------------------------------------------------------------------------------------------
// Shared screen
// -------------------------------------------------------------------------------------------------

#[derive(Debug)]
struct TermWin {
    parent: Option<WindowId>,
    /// Parent-relative for children; ignored for top-level (routes decide).
    area: Rect,
    grid: Grid,
}

/// Window tree, pixmaps and the last frame written to the terminal.
pub struct TermScreen {
    windows: AHashMap<WindowId, TermWin>,
    order: Vec<WindowId>,
    pixmaps: AHashMap<PixmapId, Grid>,
    routes: SharedRoutes,
    next_window: u32,
    next_pixmap: u32,
    last_frame: Option<Grid>,
    pub rows_written: u64,
}

pub type SharedScreen = Arc<Mutex<TermScreen>>;

impl TermScreen {
    pub fn new(routes: SharedRoutes) -> Self {
        Self {
            windows: AHashMap::new(),
            order: Vec::new(),
            pixmaps: AHashMap::new(),
            routes,
            next_window: 0x100,
            next_pixmap: 1,
            last_frame: None,
            rows_written: 0,
        }
    }

    pub fn shared(routes: SharedRoutes) -> SharedScreen {
        Arc::new(Mutex::new(Self::new(routes)))
    }

    fn grid_mut(&mut self, d: Drawable) -> DisplayResult<&mut Grid> {
        match d {
            Drawable::Window(w) => self
                .windows
                .get_mut(&w)
                .map(|tw| &mut tw.grid)
                .ok_or(DisplayError::UnknownDrawable(d)),
            Drawable::Pixmap(p) => self
                .pixmaps
                .get_mut(&p)
                .ok_or(DisplayError::UnknownDrawable(d)),
        }
    }

    fn grid(&self, d: Drawable) -> DisplayResult<&Grid> {
        match d {
            Drawable::Window(w) => self
                .windows
                .get(&w)
                .map(|tw| &tw.grid)
                .ok_or(DisplayError::UnknownDrawable(d)),
            Drawable::Pixmap(p) => self.pixmaps.get(&p).ok_or(DisplayError::UnknownDrawable(d)),
        }
    }

    /// Root-relative rectangle of a window.
    pub fn root_rect(&self, window: WindowId) -> DisplayResult<Rect> {
        let tw = self
            .windows
            .get(&window)
            .ok_or(DisplayError::UnknownWindow(window))?;
        match tw.parent {
            None => {
                let routes = lock(&self.routes);
                let route = routes
                    .find(window)
                    .ok_or(DisplayError::UnknownWindow(window))?;
                Ok(route.area)
            }
            Some(parent) => {
                let p = self.root_rect(parent)?;
                Ok(Rect::new(
                    p.x + tw.area.x,
                    p.y + tw.area.y,
                    tw.area.width,
                    tw.area.height,
                ))
            }
        }
    }

    /// Resize top-level grids to match the current tiling.
    pub fn sync_toplevels(&mut self) {
        let routes: Vec<Route> = lock(&self.routes).routes().to_vec();
        for r in routes {
            if let Some(tw) = self.windows.get_mut(&r.window) {
                tw.grid.resize(r.area.width, r.area.height);
            }
        }
        self.last_frame = None;
    }

    fn compose(&self) -> Grid {
        let (w, h) = lock(&self.routes).screen();
        let mut frame = Grid::new(w, h);
        for id in &self.order {
            let Some(tw) = self.windows.get(id) else {
                continue;
            };
            let Ok(r) = self.root_rect(*id) else {
                continue;
            };
            let clip = match tw.parent {
                Some(parent) => self
                    .root_rect(parent)
                    .ok()
                    .and_then(|p| p.intersect(&r)),
                None => Some(r),
            };
            let Some(clip) = clip else { continue };
            for y in clip.y..clip.bottom() {
                for x in clip.x..clip.right() {
                    frame.set(x, y, tw.grid.get(x - r.x, y - r.y));
                }
            }
        }
        frame
    }

    /// Composite and write changed rows to `out`.
    pub fn flush_to<W: Write>(&mut self, out: &mut W) -> std::io::Result<()> {
        let frame = self.compose();
        let full = match &self.last_frame {
            Some(prev) => prev.width != frame.width || prev.height != frame.height,
            None => true,
        };
        for y in 0..frame.height as i32 {
            let start = y as usize * frame.width as usize;
            let row = &frame.cells[start..start + frame.width as usize];
            if !full
                && let Some(prev) = &self.last_frame
                && &prev.cells[start..start + prev.width as usize] == row
            {
                continue;
            }
            write_row(out, y as u16, row)?;
            self.rows_written += 1;
        }
        out.flush()?;
        self.last_frame = Some(frame);
        Ok(())
    }

    /// Text of one composed row, wide tails removed. Used by tests and the
    /// headless smoke run.
    pub fn row_text(&self, y: i32) -> String {
        let frame = self.compose();
        (0..frame.width as i32)
            .map(|x| frame.get(x, y).ch)
            .filter(|c| *c != WIDE_TAIL)
            .collect()
    }
}

fn write_row<W: Write>(out: &mut W, y: u16, row: &[Cell]) -> std::io::Result<()> {
    queue!(out, MoveTo(0, y))?;
    let mut current: Option<Paint> = None;
    let mut run = String::new();
    for cell in row {
        if cell.ch == WIDE_TAIL {
            continue;
        }
        if current != Some(cell.paint) {
            if !run.is_empty() {
                queue!(out, Print(std::mem::take(&mut run)))?;
            }
            apply_paint(out, cell.paint)?;
            current = Some(cell.paint);
        }
        run.push(cell.ch);
    }
    if !run.is_empty() {
        queue!(out, Print(run))?;
    }
    queue!(out, SetAttribute(Attribute::Reset), ResetColor)?;
    Ok(())
}

fn apply_paint<W: Write>(out: &mut W, paint: Paint) -> std::io::Result<()> {
    queue!(out, SetAttribute(Attribute::Reset), ResetColor)?;
    match paint {
        Paint::Background | Paint::Text => {}
        Paint::Inverse | Paint::Slider => queue!(out, SetAttribute(Attribute::Reverse))?,
        Paint::Title => queue!(
            out,
            SetAttribute(Attribute::Reverse),
            SetAttribute(Attribute::Bold)
        )?,
        Paint::Gutter => queue!(out, SetBackgroundColor(Color::DarkGrey))?,
        Paint::Arrow => queue!(
            out,
            SetBackgroundColor(Color::DarkGrey),
            SetAttribute(Attribute::Bold)
        )?,
    }
    Ok(())
}

// -------------------------------------------------------------------------------------------------
// Per-session connection
// -------------------------------------------------------------------------------------------------

/// One session's connection to the shared terminal screen.
pub struct TermDisplay {
    session: SessionId,
    screen: SharedScreen,
    routes: SharedRoutes,
    tx: Sender<Inbound>,
    owned: Vec<WindowId>,
}

impl TermDisplay {
    pub fn new(
        session: SessionId,
        screen: SharedScreen,
        routes: SharedRoutes,
        tx: Sender<Inbound>,
    ) -> Self {
        Self {
            session,
            screen,
            routes,
            tx,
            owned: Vec::new(),
        }
    }

    fn screen(&self) -> MutexGuard<'_, TermScreen> {
        lock(&self.screen)
    }
}

impl Drop for TermDisplay {
    fn drop(&mut self) {
        let changed = lock(&self.routes).remove_session(self.session);
        let time = lock(&self.routes).now_ms();
        let mut screen = lock(&self.screen);
        for w in &self.owned {
            screen.windows.remove(w);
        }
        let owned = std::mem::take(&mut self.owned);
        screen.order.retain(|w| !owned.contains(w));
        screen.sync_toplevels();
        drop(screen);
        announce_placement(&self.tx, &changed, time);
    }
}

impl Canvas for TermDisplay {
    fn fill_rect(&mut self, target: Drawable, rect: Rect, paint: Paint) -> DisplayResult<()> {
        self.screen().grid_mut(target)?.fill(rect, paint);
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
        self.screen().grid_mut(target)?.text(x, y, text, paint);
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
        let mut screen = self.screen();
        let cells = screen.grid(src)?.region(area);
        screen
            .grid_mut(dst)?
            .paste(&cells, area.width, dst_x, dst_y);
        Ok(())
    }
}

impl DisplayServer for TermDisplay {
    fn capabilities(&self) -> DisplayCapabilities {
        DisplayCapabilities::new(true, true)
    }

    fn screen_size(&self) -> (u32, u32) {
        lock(&self.routes).screen()
    }

    fn create_window(&mut self, parent: Option<WindowId>, area: Rect) -> DisplayResult<WindowId> {
        let mut screen = lock(&self.screen);
        if let Some(p) = parent
            && !screen.windows.contains_key(&p)
        {
            return Err(DisplayError::UnknownWindow(p));
        }
        let id = WindowId(screen.next_window);
        screen.next_window += 1;
        screen.windows.insert(
            id,
            TermWin {
                parent,
                area,
                grid: Grid::new(area.width, area.height),
            },
        );
        screen.order.push(id);
        self.owned.push(id);
        if parent.is_none() {
            let (changed, time) = {
                let mut routes = lock(&self.routes);
                (routes.add(self.session, id), routes.now_ms())
            };
            screen.sync_toplevels();
            drop(screen);
            debug!(target: "display", session = %self.session, window = %id, "toplevel_created");
            announce_placement(&self.tx, &changed, time);
            let map = Event::new(id, EventKind::Map, time);
            if self.tx.try_send(Inbound::display(self.session, map)).is_err() {
                warn!(target: "display", session = %self.session, "map_event_dropped");
            }
        }
        Ok(id)
    }

    fn place_window(&mut self, window: WindowId, area: Rect) -> DisplayResult<()> {
        let mut screen = self.screen();
        let tw = screen
            .windows
            .get_mut(&window)
            .ok_or(DisplayError::UnknownWindow(window))?;
        tw.area = area;
        if tw.parent.is_some() {
            tw.grid.resize(area.width, area.height);
        }
        Ok(())
    }

    fn window_origin(&self, window: WindowId) -> DisplayResult<(i32, i32)> {
        let r = self.screen().root_rect(window)?;
        Ok((r.x, r.y))
    }

    fn query_pointer(&mut self, window: WindowId) -> DisplayResult<PointerQuery> {
        let r = self.screen().root_rect(window)?;
        let (rx, ry) = lock(&self.routes).pointer();
        Ok(PointerQuery {
            root_x: rx,
            root_y: ry,
            win_x: rx - r.x,
            win_y: ry - r.y,
            inside: r.contains(rx, ry),
        })
    }

    fn warp_pointer(&mut self, window: WindowId, x: i32, y: i32) -> DisplayResult<()> {
        let r = self.screen().root_rect(window)?;
        let (rx, ry) = (r.x + x, r.y + y);
        let (hit, time) = {
            let mut routes = lock(&self.routes);
            routes.set_pointer(rx, ry);
            (routes.hit(rx, ry), routes.now_ms())
        };
        trace!(target: "display", window = %window, rx, ry, "term_warp");
        let Some(route) = hit else {
            return Ok(());
        };
        let echo = Event::new(
            route.window,
            EventKind::Motion {
                pos: PointerPos::new(rx - route.area.x, ry - route.area.y, rx, ry),
                state: ModMask::empty(),
            },
            time,
        );
        self.tx
            .try_send(Inbound::display(route.session, echo))
            .map_err(|_| DisplayError::ConnectionLost)
    }

    fn create_pixmap(&mut self, width: u32, height: u32) -> DisplayResult<Pixmap> {
        if width == 0 || height == 0 {
            return Err(DisplayError::PixmapAllocation { width, height });
        }
        let mut screen = self.screen();
        let id = PixmapId(screen.next_pixmap);
        screen.next_pixmap += 1;
        screen.pixmaps.insert(id, Grid::new(width, height));
        Ok(Pixmap { id, width, height })
    }

    fn free_pixmap(&mut self, pixmap: PixmapId) {
        self.screen().pixmaps.remove(&pixmap);
    }

    fn set_title(&mut self, _window: WindowId, title: &str) -> DisplayResult<()> {
        let mut out = stdout();
        queue!(out, SetTitle(title))?;
        Ok(())
    }

    fn flush(&mut self) -> DisplayResult<()> {
        let mut out = stdout();
        self.screen().flush_to(&mut out)?;
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------
// Terminal mode guard
// -------------------------------------------------------------------------------------------------

/// Raw mode, alternate screen, mouse capture and focus reporting for the
/// lifetime of the guard.
pub struct TerminalGuard {
    entered: bool,
}

impl TerminalGuard {
    pub fn enter() -> Result<Self> {
        enable_raw_mode()?;
        execute!(
            stdout(),
            EnterAlternateScreen,
            Hide,
            EnableMouseCapture,
            EnableFocusChange
        )?;
        Ok(Self { entered: true })
    }

    pub fn leave(&mut self) -> Result<()> {
        if self.entered {
            execute!(
                stdout(),
                DisableFocusChange,
                DisableMouseCapture,
                LeaveAlternateScreen,
                Show
            )?;
            disable_raw_mode()?;
            self.entered = false;
        }
        Ok(())
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = self.leave();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    fn setup(w: u32, h: u32) -> (SharedRoutes, SharedScreen, mpsc::Receiver<Inbound>, Sender<Inbound>) {
        let routes = Routes::shared(w, h);
        let screen = TermScreen::shared(Arc::clone(&routes));
        let (tx, rx) = mpsc::channel(64);
        (routes, screen, rx, tx)
    }

    #[test]
    fn bands_split_evenly_with_remainder_last() {
        let mut r = Routes::new(80, 25);
        r.add(SessionId(1), WindowId(1));
        let changed = r.add(SessionId(2), WindowId(2));
        assert_eq!(changed.len(), 2);
        assert_eq!(r.routes()[0].area, Rect::new(0, 0, 80, 12));
        assert_eq!(r.routes()[1].area, Rect::new(0, 12, 80, 13));
        assert_eq!(r.hit(5, 12).map(|x| x.session), Some(SessionId(2)));
    }

    #[test]
    fn toplevel_creation_announces_configure_and_map() {
        let (routes, screen, mut rx, tx) = setup(40, 10);
        let mut d = TermDisplay::new(SessionId(0), screen, routes, tx);
        let w = d.create_window(None, Rect::new(0, 0, 40, 10)).unwrap();
        let mut kinds = Vec::new();
        while let Ok(Inbound::Display { event, .. }) = rx.try_recv() {
            assert_eq!(event.window, w);
            kinds.push(event.class());
        }
        assert_eq!(
            kinds,
            vec![
                core_events::EventClass::Structure,
                core_events::EventClass::Exposure,
                core_events::EventClass::Structure
            ]
        );
    }

    #[test]
    fn warp_reports_motion_relative_to_toplevel() {
        let (routes, screen, mut rx, tx) = setup(40, 10);
        let mut d = TermDisplay::new(SessionId(3), screen, Arc::clone(&routes), tx);
        let top = d.create_window(None, Rect::new(0, 0, 40, 10)).unwrap();
        let child = d.create_window(Some(top), Rect::new(2, 1, 10, 5)).unwrap();
        while rx.try_recv().is_ok() {}
        d.warp_pointer(child, 3, 2).unwrap();
        match rx.try_recv() {
            Ok(Inbound::Display { session, event }) => {
                assert_eq!(session, SessionId(3));
                assert_eq!(event.window, top);
                assert_eq!(event.pointer().map(|p| (p.x, p.y)), Some((5, 3)));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(lock(&routes).pointer(), (5, 3));
    }

    #[test]
    fn copy_and_compose_show_child_over_parent() {
        let (routes, screen, _rx, tx) = setup(20, 3);
        let mut d = TermDisplay::new(SessionId(0), Arc::clone(&screen), routes, tx);
        let top = d.create_window(None, Rect::new(0, 0, 20, 3)).unwrap();
        let child = d.create_window(Some(top), Rect::new(0, 1, 20, 2)).unwrap();
        let pm = d.create_pixmap(20, 2).unwrap();
        d.draw_text(pm.drawable(), 0, 0, "hello", Paint::Text).unwrap();
        d.copy_area(pm.drawable(), Drawable::Window(child), pm.bounds(), 0, 0)
            .unwrap();
        d.draw_text(Drawable::Window(top), 0, 0, "title", Paint::Title)
            .unwrap();
        let s = lock(&screen);
        assert!(s.row_text(0).starts_with("title"));
        assert!(s.row_text(1).starts_with("hello"));
    }

    #[test]
    fn second_flush_writes_only_changed_rows() {
        let (routes, screen, _rx, tx) = setup(10, 4);
        let mut d = TermDisplay::new(SessionId(0), Arc::clone(&screen), routes, tx);
        let top = d.create_window(None, Rect::new(0, 0, 10, 4)).unwrap();
        let mut sink = Vec::new();
        lock(&screen).flush_to(&mut sink).unwrap();
        let first = lock(&screen).rows_written;
        assert_eq!(first, 4);
        d.draw_text(Drawable::Window(top), 0, 2, "x", Paint::Text)
            .unwrap();
        lock(&screen).flush_to(&mut sink).unwrap();
        assert_eq!(lock(&screen).rows_written, first + 1);
    }
}
