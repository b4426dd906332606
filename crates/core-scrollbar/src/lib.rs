//! Scrollbar interaction state machine.
//!
//! Each axis is an independent [`Scrollbar`]: a button press inside its
//! gutter window is classified against the two arrow caps, the computed
//! slider and the remaining gutter, which selects the next [`Phase`] and an
//! initial [`ScrollCommand`]. Held arrows and gutter clicks repeat on the
//! [`AutoRepeat`] cadence (the caller re-invokes [`Scrollbar::repeat`]);
//! slider drags invert the geometry mapping; release returns to idle.
//!
//! Scroll commands are the same values keyboard scrolling produces, so both
//! modalities share one execution path in the session.

mod geometry;
mod machine;
mod repeat;

pub use geometry::{Extents, Slider, Track};
pub use machine::{Phase, Region, Scrollbar, ScrollbarRects};
pub use repeat::AutoRepeat;

use core_config::ScrollbarConfig;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Vertical,
    Horizontal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    pub fn axis(self) -> Axis {
        match self {
            ScrollDirection::Up | ScrollDirection::Down => Axis::Vertical,
            ScrollDirection::Left | ScrollDirection::Right => Axis::Horizontal,
        }
    }

    /// +1 toward the end of content, -1 toward the start.
    pub fn sign(self) -> i64 {
        match self {
            ScrollDirection::Up | ScrollDirection::Left => -1,
            ScrollDirection::Down | ScrollDirection::Right => 1,
        }
    }
}

/// A scroll by `amount` lines (vertical) or columns (horizontal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScrollCommand {
    pub direction: ScrollDirection,
    pub amount: usize,
}

impl ScrollCommand {
    pub const fn new(direction: ScrollDirection, amount: usize) -> Self {
        Self { direction, amount }
    }

    pub fn signed(&self) -> i64 {
        self.direction.sign() * self.amount as i64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScrollbarError {
    #[error("gutter of {length}px cannot hold two arrows and a slider ({needed}px needed)")]
    GutterTooShort { length: u32, needed: u32 },
}

/// Both axes of one session plus the auto-hide mode.
#[derive(Debug, Clone)]
pub struct Scrollbars {
    pub vertical: Scrollbar,
    pub horizontal: Scrollbar,
    auto_hide: bool,
}

impl Scrollbars {
    /// `v_len`/`h_len` are the gutter window lengths along each axis.
    pub fn new(cfg: &ScrollbarConfig, v_len: u32, h_len: u32) -> Result<Self, ScrollbarError> {
        let track = |length| Track {
            length,
            arrow: cfg.arrow_size,
            min_slider: cfg.min_slider,
        };
        Ok(Self {
            vertical: Scrollbar::new(Axis::Vertical, track(v_len), cfg.thickness)?,
            horizontal: Scrollbar::new(Axis::Horizontal, track(h_len), cfg.thickness)?,
            auto_hide: cfg.auto_hide,
        })
    }

    pub fn auto_hide(&self) -> bool {
        self.auto_hide
    }

    pub fn set_auto_hide(&mut self, on: bool) {
        if self.auto_hide != on {
            info!(target: "scrollbar", on, "auto_hide_toggled");
        }
        self.auto_hide = on;
    }

    /// Whether an axis occupies layout space for the given extents.
    pub fn shown(&self, ext: Extents) -> bool {
        !(self.auto_hide && ext.fits())
    }

    pub fn get(&self, axis: Axis) -> &Scrollbar {
        match axis {
            Axis::Vertical => &self.vertical,
            Axis::Horizontal => &self.horizontal,
        }
    }

    pub fn get_mut(&mut self, axis: Axis) -> &mut Scrollbar {
        match axis {
            Axis::Vertical => &mut self.vertical,
            Axis::Horizontal => &mut self.horizontal,
        }
    }

    /// Axis currently holding the button, if any.
    pub fn active(&self) -> Option<Axis> {
        [Axis::Vertical, Axis::Horizontal]
            .into_iter()
            .find(|a| self.get(*a).phase() != Phase::Idle)
    }
}
