//! Slider geometry.
//!
//! All pixel positions are measured along the scrollbar axis from the leading
//! edge of the gutter window, arrows included. The usable track is the
//! window length minus both arrow caps. The slider length is proportional to
//! `visible / total` of the usable track (never below the configured minimum,
//! never above the track), and its leading edge travels over `usable - len`
//! pixels as the content offset runs from `0` to `total - visible`. That is
//! the "virtual gutter": the slider can always reach the true end of content,
//! even when the minimum length inflates it.

/// Content extents in lines (vertical) or columns (horizontal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extents {
    pub total: usize,
    pub visible: usize,
    pub offset: usize,
}

impl Extents {
    pub const fn new(total: usize, visible: usize, offset: usize) -> Self {
        Self {
            total,
            visible,
            offset,
        }
    }

    /// Largest offset that still fills the view.
    pub fn max_offset(&self) -> usize {
        self.total.saturating_sub(self.visible)
    }

    pub fn fits(&self) -> bool {
        self.total <= self.visible
    }

    /// Scroll step for a gutter click: one screen minus a line of overlap.
    pub fn page(&self) -> usize {
        self.visible.saturating_sub(1).max(1)
    }
}

/// Fixed per-axis dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Track {
    /// Length of the gutter window along the axis.
    pub length: u32,
    pub arrow: u32,
    pub min_slider: u32,
}

impl Track {
    pub fn usable(&self) -> u32 {
        self.length.saturating_sub(2 * self.arrow)
    }

    /// Slider length for the given extents.
    pub fn slider_len(&self, ext: Extents) -> u32 {
        let usable = self.usable();
        if ext.fits() || ext.total == 0 {
            return usable;
        }
        let prop = (u64::from(usable) * ext.visible as u64 / ext.total as u64) as u32;
        prop.max(self.min_slider).min(usable)
    }

    /// Pixel range the slider's leading edge travels over.
    pub fn travel(&self, len: u32) -> u32 {
        self.usable().saturating_sub(len)
    }

    /// Leading edge relative to the start of the usable track.
    pub fn slider_start_rel(&self, ext: Extents, len: u32) -> u32 {
        let span = ext.max_offset();
        if span == 0 {
            return 0;
        }
        let travel = self.travel(len);
        let off = ext.offset.min(span) as u64;
        ((off * u64::from(travel)) / span as u64) as u32
    }

    /// Inverse mapping: content offset whose slider would start at `rel`.
    /// Rounds to nearest so a round trip through `slider_start_rel` is stable.
    pub fn offset_for_start(&self, ext: Extents, len: u32, rel: i64) -> usize {
        let span = ext.max_offset();
        let travel = self.travel(len);
        if span == 0 || travel == 0 {
            return ext.offset.min(span);
        }
        let rel = rel.clamp(0, i64::from(travel)) as u64;
        let travel = u64::from(travel);
        ((rel * span as u64 + travel / 2) / travel) as usize
    }
}

/// Slider placement in gutter-window pixels (arrows included).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Slider {
    pub start: u32,
    pub len: u32,
}

impl Slider {
    pub fn end(&self) -> u32 {
        self.start + self.len
    }

    pub fn contains(&self, pos: i32) -> bool {
        pos >= self.start as i32 && pos < self.end() as i32
    }
}

/// Remembered previous frame for the direction-consistency rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LastFrame {
    pub ext: Extents,
    pub track: Track,
    pub slider: Slider,
}

/// Compute the slider, keeping it from stepping backwards against the
/// direction of a monotonic offset change when only rounding would move it.
pub(crate) fn place_slider(track: Track, ext: Extents, last: Option<LastFrame>) -> Slider {
    let len = track.slider_len(ext);
    let mut start = track.arrow + track.slider_start_rel(ext, len);
    if let Some(prev) = last
        && prev.track == track
        && prev.ext.total == ext.total
        && prev.ext.visible == ext.visible
        && prev.slider.len == len
    {
        if ext.offset > prev.ext.offset && start < prev.slider.start {
            start = prev.slider.start;
        } else if ext.offset < prev.ext.offset && start > prev.slider.start {
            start = prev.slider.start;
        }
    }
    Slider { start, len }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACK: Track = Track {
        length: 522,
        arrow: 11,
        min_slider: 6,
    };

    #[test]
    fn full_gutter_when_content_fits() {
        let s = place_slider(TRACK, Extents::new(10, 50, 0), None);
        assert_eq!(s, Slider { start: 11, len: 500 });
    }

    #[test]
    fn proportional_length_and_end_reachable() {
        let ext = Extents::new(1000, 50, 950);
        let s = place_slider(TRACK, ext, None);
        assert_eq!(s.len, 25);
        assert_eq!(s.end(), TRACK.length - TRACK.arrow);
    }

    #[test]
    fn minimum_length_applies() {
        let s = place_slider(TRACK, Extents::new(100_000, 10, 0), None);
        assert_eq!(s.len, 6);
    }

    #[test]
    fn inverse_round_trips() {
        let ext = Extents::new(1000, 50, 0);
        let len = TRACK.slider_len(ext);
        for off in [0usize, 1, 17, 400, 949, 950] {
            let rel = TRACK.slider_start_rel(Extents { offset: off, ..ext }, len);
            let back = TRACK.offset_for_start(ext, len, i64::from(rel));
            let again = TRACK.slider_start_rel(Extents { offset: back, ..ext }, len);
            assert_eq!(rel, again, "offset {off}");
        }
    }

    #[test]
    fn rounding_never_reverses_direction() {
        let ext = Extents::new(1000, 50, 100);
        let first = place_slider(TRACK, ext, None);
        let prev = LastFrame {
            ext,
            track: TRACK,
            slider: Slider {
                start: first.start + 1,
                ..first
            },
        };
        let next = place_slider(TRACK, Extents { offset: 101, ..ext }, Some(prev));
        assert!(next.start >= prev.slider.start);
    }
}
