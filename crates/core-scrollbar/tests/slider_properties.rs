use core_scrollbar::{
    Axis, Extents, Phase, ScrollCommand, ScrollDirection, Scrollbar, Track,
};
use proptest::prelude::*;

fn track() -> Track {
    Track {
        length: 522,
        arrow: 11,
        min_slider: 6,
    }
}

fn vbar() -> Scrollbar {
    Scrollbar::new(Axis::Vertical, track(), 11).unwrap()
}

proptest! {
    #[test]
    fn slider_length_monotonic_in_visible_ratio(
        total in 1usize..20_000,
        a in 0usize..20_000,
        b in 0usize..20_000,
    ) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let t = track();
        let short = t.slider_len(Extents::new(total, lo, 0));
        let long = t.slider_len(Extents::new(total, hi, 0));
        prop_assert!(short <= long);
        prop_assert!(short >= t.min_slider);
        prop_assert!(long <= t.usable());
    }

    #[test]
    fn slider_stays_inside_track(
        total in 1usize..50_000,
        visible in 1usize..500,
        offset in 0usize..60_000,
    ) {
        let mut sb = vbar();
        let s = sb.update(Extents::new(total, visible, offset));
        prop_assert!(s.start >= 11);
        prop_assert!(s.end() <= 522 - 11);
    }

    #[test]
    fn increasing_offset_never_moves_slider_back(
        total in 200usize..5_000,
        visible in 10usize..100,
        start in 0usize..100,
        steps in proptest::collection::vec(0usize..7, 1..40),
    ) {
        let mut sb = vbar();
        let mut offset = start;
        let mut prev = sb.update(Extents::new(total, visible, offset)).start;
        for step in steps {
            offset += step;
            let cur = sb.update(Extents::new(total, visible, offset)).start;
            prop_assert!(cur >= prev);
            prev = cur;
        }
    }
}

#[test]
fn scenario_top_of_content() {
    let mut sb = vbar();
    let s = sb.update(Extents::new(1000, 50, 0));
    // 5% of 500 usable pixels.
    assert_eq!(s.start, 11);
    assert_eq!(s.len, 25);
}

#[test]
fn scenario_end_of_content_reaches_bottom() {
    let mut sb = vbar();
    let s = sb.update(Extents::new(1000, 50, 950));
    assert_eq!(s.end(), 522 - 11);
}

#[test]
fn scenario_press_in_up_arrow() {
    let mut sb = vbar();
    let cmd = sb.press(2, Extents::new(1000, 50, 100));
    assert_eq!(cmd, Some(ScrollCommand::new(ScrollDirection::Up, 1)));
    assert_eq!(sb.phase(), Phase::ArrowUpHeld);
    assert_eq!(
        sb.repeat(Extents::new(1000, 50, 99)),
        Some(ScrollCommand::new(ScrollDirection::Up, 1))
    );
    sb.release();
    assert_eq!(sb.repeat(Extents::new(1000, 50, 98)), None);
}
