use std::collections::VecDeque;

/// Tracks invocation outcomes over a trailing window.
///
/// The ceiling is breached once the window is full and the fraction of
/// failures in it is at or above `max_failure_rate`.
#[derive(Debug, Clone)]
pub struct FailureTracker {
    window: usize,
    max_failure_rate: f64,
    outcomes: VecDeque<bool>,
    window_failures: usize,
    total_failures: usize,
}

impl FailureTracker {
    pub fn new(window: usize, max_failure_rate: f64) -> Self {
        let window = window.max(1);
        Self {
            window,
            max_failure_rate,
            outcomes: VecDeque::with_capacity(window),
            window_failures: 0,
            total_failures: 0,
        }
    }

    pub fn record_success(&mut self) {
        self.push(false);
    }

    pub fn record_failure(&mut self) {
        self.total_failures += 1;
        self.push(true);
    }

    fn push(&mut self, failed: bool) {
        if self.outcomes.len() == self.window && self.outcomes.pop_front() == Some(true) {
            self.window_failures -= 1;
        }
        if failed {
            self.window_failures += 1;
        }
        self.outcomes.push_back(failed);
    }

    pub fn is_exceeded(&self) -> bool {
        self.outcomes.len() == self.window
            && self.window_failures as f64 / self.window as f64 >= self.max_failure_rate
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn window_failures(&self) -> usize {
        self.window_failures
    }

    pub fn total_failures(&self) -> usize {
        self.total_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_exceeded_only_when_window_full() {
        let mut tracker = FailureTracker::new(4, 0.5);
        for _ in 0..3 {
            tracker.record_failure();
            assert!(!tracker.is_exceeded());
        }
        tracker.record_failure();
        assert!(tracker.is_exceeded());
        assert_eq!(tracker.window_failures(), 4);
    }

    #[test]
    fn test_window_slides() {
        let mut tracker = FailureTracker::new(4, 0.5);
        tracker.record_failure();
        tracker.record_failure();
        tracker.record_success();
        tracker.record_success();
        // 2 of 4
        assert!(tracker.is_exceeded());

        tracker.record_success();
        assert_eq!(tracker.window_failures(), 1);
        assert!(!tracker.is_exceeded());
        assert_eq!(tracker.total_failures(), 2);
    }

    #[test]
    fn test_occasional_failures_tolerated() {
        let mut tracker = FailureTracker::new(20, 0.5);
        for i in 0..200 {
            if i % 4 == 0 {
                tracker.record_failure();
            } else {
                tracker.record_success();
            }
            assert!(!tracker.is_exceeded());
        }
        assert_eq!(tracker.total_failures(), 50);
    }

    proptest! {
        #[test]
        fn prop_window_counts_match_trailing_outcomes(
            outcomes in proptest::collection::vec(any::<bool>(), 0..200),
            window in 1usize..30,
        ) {
            let mut tracker = FailureTracker::new(window, 0.5);
            for &failed in &outcomes {
                if failed {
                    tracker.record_failure();
                } else {
                    tracker.record_success();
                }
            }

            let start = outcomes.len().saturating_sub(window);
            let trailing = outcomes[start..].iter().filter(|&&f| f).count();
            prop_assert_eq!(tracker.window_failures(), trailing);
            prop_assert_eq!(tracker.total_failures(), outcomes.iter().filter(|&&f| f).count());
            prop_assert_eq!(
                tracker.is_exceeded(),
                outcomes.len() >= window && trailing as f64 / window as f64 >= 0.5
            );
        }
    }
}
