/// Single-axis hysteresis filter
///
/// Holds the last committed value and only moves to a new one when it
/// differs from the committed value by at least `threshold`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hysteresis {
    threshold: f64,
    committed: f64,
}

impl Hysteresis {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            committed: 0.0,
        }
    }

    pub fn apply(&mut self, value: f64) -> f64 {
        if (value - self.committed).abs() >= self.threshold {
            self.committed = value;
        }
        self.committed
    }

    pub fn committed(&self) -> f64 {
        self.committed
    }

    pub fn reset(&mut self) {
        self.committed = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_changes_are_held() {
        let mut filter = Hysteresis::new(1.0);
        let emitted: Vec<f64> = [0.0, 0.3, 0.9, 2.0]
            .iter()
            .map(|&v| filter.apply(v))
            .collect();
        assert_eq!(emitted, vec![0.0, 0.0, 0.0, 2.0]);
    }

    #[test]
    fn test_change_exactly_at_threshold_commits() {
        let mut filter = Hysteresis::new(1.0);
        assert_eq!(filter.apply(-1.0), -1.0);
        assert_eq!(filter.apply(-0.5), -1.0);
        assert_eq!(filter.apply(0.0), 0.0);
    }

    #[test]
    fn test_zero_threshold_passes_everything() {
        let mut filter = Hysteresis::new(0.0);
        assert_eq!(filter.apply(0.25), 0.25);
        assert_eq!(filter.apply(0.26), 0.26);
    }

    #[test]
    fn test_reset_returns_to_zero() {
        let mut filter = Hysteresis::new(1.0);
        filter.apply(5.0);
        filter.reset();
        assert_eq!(filter.committed(), 0.0);
        assert_eq!(filter.apply(0.5), 0.0);
    }
}
