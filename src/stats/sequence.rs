//! Sequence number gap detection

/// Tracks the last sequence number of one stream and reports gaps.
///
/// The gap is `sequence - previous - 1`: zero for consecutive packets,
/// positive for lost packets, negative when the sequence went backwards.
/// Negative gaps are surfaced as-is and the baseline always moves to the
/// newest observation.
#[derive(Debug, Clone, Default)]
pub struct SequenceTracker {
    last: Option<u64>,
}

impl SequenceTracker {
    /// Create a tracker with no baseline
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe a sequence number.
    ///
    /// Returns `None` on the first observation, the gap otherwise.
    pub fn observe(&mut self, sequence: u64) -> Option<i64> {
        let gap = self.last.map(|previous| {
            let gap = i128::from(sequence) - i128::from(previous) - 1;
            i64::try_from(gap).unwrap_or(if gap < 0 { i64::MIN } else { i64::MAX })
        });
        self.last = Some(sequence);
        gap
    }

    /// Baseline for the next observation
    pub fn last_sequence(&self) -> Option<u64> {
        self.last
    }

    /// Forget the baseline
    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn reports_loss_and_reordering() {
        let mut tracker = SequenceTracker::new();
        assert_eq!(tracker.observe(5), None);
        assert_eq!(tracker.observe(6), Some(0));
        assert_eq!(tracker.observe(9), Some(2));
        assert_eq!(tracker.observe(8), Some(-2));
        assert_eq!(tracker.last_sequence(), Some(8));
    }

    #[test]
    fn duplicate_sequence_is_negative_one() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(3);
        assert_eq!(tracker.observe(3), Some(-1));
    }

    #[test]
    fn reset_starts_a_new_baseline() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(100);
        tracker.reset();
        assert_eq!(tracker.observe(1), None);
    }

    proptest! {
        #[test]
        fn gap_matches_difference(previous in 0u64..(i64::MAX as u64), next in 0u64..(i64::MAX as u64)) {
            let mut tracker = SequenceTracker::new();
            tracker.observe(previous);
            let gap = tracker.observe(next).expect("baseline exists");
            prop_assert_eq!(i128::from(gap), i128::from(next) - i128::from(previous) - 1);
        }
    }
}
