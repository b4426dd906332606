/// Geometric progress thresholds: the first report fires at `first`
/// lines, each later one at `factor` times the previous threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressThresholds {
    next: usize,
    factor: usize,
}

impl ProgressThresholds {
    pub fn new(first: usize, factor: usize) -> Self {
        Self {
            next: first.max(1),
            factor: factor.max(2),
        }
    }

    pub fn next(&self) -> usize {
        self.next
    }

    /// Whether `total` crossed the pending threshold. Thresholds already
    /// passed are skipped so one large block yields one report.
    pub fn crossed(&mut self, total: usize) -> bool {
        if total < self.next {
            return false;
        }
        while self.next <= total {
            self.next = self.next.saturating_mul(self.factor);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_grow_geometrically() {
        let mut p = ProgressThresholds::new(1000, 2);
        assert!(!p.crossed(999));
        assert!(p.crossed(1024));
        assert_eq!(p.next(), 2000);
        assert!(!p.crossed(1999));
        assert!(p.crossed(2048));
        assert!(p.crossed(9000));
        assert_eq!(p.next(), 16000);
    }

    #[test]
    fn degenerate_factor_still_advances() {
        let mut p = ProgressThresholds::new(0, 0);
        assert!(p.crossed(1));
        assert_eq!(p.next(), 2);
    }
}
