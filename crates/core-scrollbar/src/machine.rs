use crate::geometry::{Extents, LastFrame, Slider, Track, place_slider};
use crate::{Axis, ScrollCommand, ScrollDirection, ScrollbarError};
use core_events::Rect;
use tracing::{debug, trace};

/// Hit-test classification of a point along the gutter window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// Up or left arrow.
    ArrowBack,
    /// Down or right arrow.
    ArrowForward,
    GutterBack,
    GutterForward,
    Slider,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    ArrowUpHeld,
    ArrowDownHeld,
    ArrowLeftHeld,
    ArrowRightHeld,
    GutterHeld,
    SliderDragging,
}

impl Phase {
    /// Phases that auto-repeat while the button stays down.
    pub fn repeats(self) -> bool {
        matches!(
            self,
            Phase::ArrowUpHeld
                | Phase::ArrowDownHeld
                | Phase::ArrowLeftHeld
                | Phase::ArrowRightHeld
                | Phase::GutterHeld
        )
    }
}

/// Gutter-window rectangles for painting, in window-local pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollbarRects {
    pub arrow_back: Rect,
    pub arrow_forward: Rect,
    pub gutter: Rect,
    pub slider: Rect,
}

/// One axis of scrollbar interaction.
#[derive(Debug, Clone)]
pub struct Scrollbar {
    axis: Axis,
    track: Track,
    thickness: u32,
    phase: Phase,
    slider: Slider,
    last: Option<LastFrame>,
    /// Pointer position (along the axis) when the button went down.
    held_pos: i32,
    /// Pointer offset into the slider at grab time.
    drag_anchor: i32,
    /// One-shot correction between the slider's drawn start and the start the
    /// mapping reproduces for the same offset; consumed on first drag motion.
    drag_tweak: i32,
    /// Direction of the gutter click being held.
    gutter_forward: bool,
}

impl Scrollbar {
    pub fn new(axis: Axis, track: Track, thickness: u32) -> Result<Self, ScrollbarError> {
        let needed = 2 * track.arrow + track.min_slider;
        if track.length < needed {
            return Err(ScrollbarError::GutterTooShort {
                length: track.length,
                needed,
            });
        }
        Ok(Self {
            axis,
            track,
            thickness,
            phase: Phase::Idle,
            slider: Slider::default(),
            last: None,
            held_pos: 0,
            drag_anchor: 0,
            drag_tweak: 0,
            gutter_forward: false,
        })
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn track(&self) -> Track {
        self.track
    }

    pub fn slider(&self) -> Slider {
        self.slider
    }

    /// Resize the gutter after a layout change. Keeps interaction state.
    pub fn set_length(&mut self, length: u32) {
        self.track.length = length;
    }

    /// Recompute the slider for the current extents and remember the frame.
    pub fn update(&mut self, ext: Extents) -> Slider {
        self.slider = place_slider(self.track, ext, self.last);
        self.last = Some(LastFrame {
            ext,
            track: self.track,
            slider: self.slider,
        });
        self.slider
    }

    pub fn classify(&self, pos: i32) -> Region {
        let arrow = self.track.arrow as i32;
        let length = self.track.length as i32;
        if pos < arrow {
            Region::ArrowBack
        } else if pos >= length - arrow {
            Region::ArrowForward
        } else if self.slider.contains(pos) {
            Region::Slider
        } else if pos < self.slider.start as i32 {
            Region::GutterBack
        } else {
            Region::GutterForward
        }
    }

    fn back(&self) -> ScrollDirection {
        match self.axis {
            Axis::Vertical => ScrollDirection::Up,
            Axis::Horizontal => ScrollDirection::Left,
        }
    }

    fn forward(&self) -> ScrollDirection {
        match self.axis {
            Axis::Vertical => ScrollDirection::Down,
            Axis::Horizontal => ScrollDirection::Right,
        }
    }

    /// Button press at `pos` along the axis. Returns the initial scroll.
    pub fn press(&mut self, pos: i32, ext: Extents) -> Option<ScrollCommand> {
        self.update(ext);
        self.held_pos = pos;
        let region = self.classify(pos);
        let (phase, cmd) = match region {
            Region::ArrowBack => (
                match self.axis {
                    Axis::Vertical => Phase::ArrowUpHeld,
                    Axis::Horizontal => Phase::ArrowLeftHeld,
                },
                Some(ScrollCommand::new(self.back(), 1)),
            ),
            Region::ArrowForward => (
                match self.axis {
                    Axis::Vertical => Phase::ArrowDownHeld,
                    Axis::Horizontal => Phase::ArrowRightHeld,
                },
                Some(ScrollCommand::new(self.forward(), 1)),
            ),
            Region::GutterBack => (
                {
                    self.gutter_forward = false;
                    Phase::GutterHeld
                },
                Some(ScrollCommand::new(self.back(), ext.page())),
            ),
            Region::GutterForward => (
                {
                    self.gutter_forward = true;
                    Phase::GutterHeld
                },
                Some(ScrollCommand::new(self.forward(), ext.page())),
            ),
            Region::Slider => {
                self.drag_anchor = pos - self.slider.start as i32;
                let rel = i64::from(self.slider.start - self.track.arrow);
                let len = self.slider.len;
                let off = self.track.offset_for_start(ext, len, rel);
                let reproduced =
                    self.track.arrow + self.track.slider_start_rel(Extents { offset: off, ..ext }, len);
                self.drag_tweak = self.slider.start as i32 - reproduced as i32;
                (Phase::SliderDragging, None)
            }
        };
        debug!(
            target: "scrollbar",
            axis = ?self.axis,
            pos,
            region = ?region,
            phase = ?phase,
            "press"
        );
        self.phase = phase;
        cmd
    }

    /// Auto-repeat tick while the button is held. Gutter repeats stop once
    /// the slider has reached the held position.
    pub fn repeat(&mut self, ext: Extents) -> Option<ScrollCommand> {
        if !self.phase.repeats() {
            return None;
        }
        self.update(ext);
        let region = self.classify(self.held_pos);
        let cmd = match (self.phase, region) {
            (Phase::ArrowUpHeld | Phase::ArrowLeftHeld, _) => {
                Some(ScrollCommand::new(self.back(), 1))
            }
            (Phase::ArrowDownHeld | Phase::ArrowRightHeld, _) => {
                Some(ScrollCommand::new(self.forward(), 1))
            }
            (Phase::GutterHeld, Region::GutterBack) if !self.gutter_forward => {
                Some(ScrollCommand::new(self.back(), ext.page()))
            }
            (Phase::GutterHeld, Region::GutterForward) if self.gutter_forward => {
                Some(ScrollCommand::new(self.forward(), ext.page()))
            }
            _ => None,
        };
        trace!(target: "scrollbar", axis = ?self.axis, phase = ?self.phase, ?cmd, "repeat");
        cmd
    }

    /// Pointer motion while dragging the slider.
    pub fn drag(&mut self, pos: i32, ext: Extents) -> Option<ScrollCommand> {
        if self.phase != Phase::SliderDragging {
            return None;
        }
        let len = self.track.slider_len(ext);
        let want = pos - self.drag_anchor - self.track.arrow as i32 - self.drag_tweak;
        self.drag_tweak = 0;
        let target = self.track.offset_for_start(ext, len, i64::from(want));
        let cmd = if target > ext.offset {
            Some(ScrollCommand::new(self.forward(), target - ext.offset))
        } else if target < ext.offset {
            Some(ScrollCommand::new(self.back(), ext.offset - target))
        } else {
            None
        };
        trace!(target: "scrollbar", axis = ?self.axis, pos, offset = target, "drag");
        cmd
    }

    /// Button release: always back to idle; the caller redraws once.
    pub fn release(&mut self) -> bool {
        let was = self.phase;
        self.phase = Phase::Idle;
        self.drag_tweak = 0;
        debug!(target: "scrollbar", axis = ?self.axis, from = ?was, "release");
        was != Phase::Idle
    }

    /// Painting rectangles in gutter-window coordinates.
    pub fn rects(&self) -> ScrollbarRects {
        let t = self.thickness;
        let a = self.track.arrow;
        let l = self.track.length;
        let s = self.slider;
        let along = |start: u32, len: u32| match self.axis {
            Axis::Vertical => Rect::new(0, start as i32, t, len),
            Axis::Horizontal => Rect::new(start as i32, 0, len, t),
        };
        ScrollbarRects {
            arrow_back: along(0, a),
            arrow_forward: along(l.saturating_sub(a), a),
            gutter: along(a, self.track.usable()),
            slider: along(s.start, s.len),
        }
    }
}
