use core_config::ScrollbarConfig;
use std::time::Duration;

/// Auto-repeat cadence for held arrows and gutter clicks: one long initial
/// delay, then intervals shrinking by a fixed step down to a floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoRepeat {
    initial_ms: u32,
    start_ms: u32,
    min_ms: u32,
    step_ms: u32,
    fired: u32,
}

impl AutoRepeat {
    pub fn new(initial_ms: u32, start_ms: u32, min_ms: u32, step_ms: u32) -> Self {
        let min_ms = min_ms.min(start_ms);
        Self {
            initial_ms,
            start_ms,
            min_ms,
            step_ms,
            fired: 0,
        }
    }

    /// Build from config using the context-clamped repeat band.
    pub fn from_config(cfg: &ScrollbarConfig, start_ms: u32, min_ms: u32) -> Self {
        Self::new(cfg.initial_delay_ms, start_ms, min_ms, cfg.repeat_step_ms)
    }

    pub fn reset(&mut self) {
        self.fired = 0;
    }

    /// Delay before the next repeat; advances the cadence.
    pub fn next_delay(&mut self) -> Duration {
        let ms = if self.fired == 0 {
            self.initial_ms
        } else {
            let dec = self.step_ms.saturating_mul(self.fired - 1);
            self.start_ms.saturating_sub(dec).max(self.min_ms)
        };
        self.fired = self.fired.saturating_add(1);
        Duration::from_millis(u64::from(ms))
    }
}

impl Default for AutoRepeat {
    fn default() -> Self {
        let cfg = ScrollbarConfig::default();
        Self::from_config(&cfg, cfg.repeat_start_ms, cfg.repeat_min_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cadence_decreases_to_floor() {
        let mut r = AutoRepeat::default();
        let ms: Vec<u128> = (0..10).map(|_| r.next_delay().as_millis()).collect();
        assert_eq!(ms, vec![500, 250, 225, 200, 175, 150, 125, 100, 100, 100]);
        r.reset();
        assert_eq!(r.next_delay().as_millis(), 500);
    }
}
