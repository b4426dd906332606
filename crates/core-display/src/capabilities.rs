//! Display capability flags.
//!
//! Recorded once per connection and consulted by the compositor when deciding
//! whether a warp can be issued at all and whether the server will echo it
//! back as a motion event (the warp synchronizer only arms when it will).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct DisplayCapabilities {
    /// Server supports programmatic pointer moves.
    pub can_warp_pointer: bool,
    /// Server reports a motion/enter event after each warp.
    pub echoes_warp: bool,
}

impl DisplayCapabilities {
    pub const fn new(can_warp_pointer: bool, echoes_warp: bool) -> Self {
        Self {
            can_warp_pointer,
            echoes_warp,
        }
    }

    /// True when the warp synchronizer should expect a matching event.
    pub fn warp_is_observable(&self) -> bool {
        self.can_warp_pointer && self.echoes_warp
    }
}

impl Default for DisplayCapabilities {
    fn default() -> Self {
        Self::new(true, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_enables_observable_warps() {
        let caps = DisplayCapabilities::default();
        assert!(caps.warp_is_observable());
        assert!(!DisplayCapabilities::new(true, false).warp_is_observable());
    }
}
