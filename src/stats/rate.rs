//! Windowed rate estimation

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use tracing::warn;

use crate::clock::host_now;

/// Sliding-window event rate estimator.
///
/// Keeps the `window_size` most recent timestamps in arrival order and
/// computes `(count - 1) / (newest - oldest)` after every insertion, which
/// smooths jitter better than the reciprocal of a single inter-arrival gap.
///
/// The rate stays at its previous value (0 initially) while fewer than two
/// samples are retained, and when the retained span is zero.
///
/// ```rust
/// use depthwatch::stats::RateEstimator;
/// use std::num::NonZeroUsize;
///
/// let mut fps = RateEstimator::new(NonZeroUsize::new(3).unwrap());
/// for t in [0.0, 1.0, 2.0, 3.0] {
///     fps.record_at(t);
/// }
/// assert_eq!(fps.current_rate(), 1.0);
/// assert_eq!(fps.len(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct RateEstimator {
    window: VecDeque<f64>,
    capacity: NonZeroUsize,
    rate: f64,
}

impl RateEstimator {
    /// Window size used when none is configured
    pub const DEFAULT_WINDOW: NonZeroUsize = NonZeroUsize::new(30).unwrap();

    /// Create an estimator with an empty window and a rate of 0
    pub fn new(window_size: NonZeroUsize) -> Self {
        Self { window: VecDeque::with_capacity(window_size.get()), capacity: window_size, rate: 0.0 }
    }

    /// Record an event at the current host time
    pub fn record(&mut self) -> f64 {
        self.record_at(host_now())
    }

    /// Record an event at an explicit timestamp in seconds.
    ///
    /// Non-finite timestamps are logged and dropped without touching the
    /// window. Returns the rate after the insertion.
    pub fn record_at(&mut self, timestamp: f64) -> f64 {
        if !timestamp.is_finite() {
            warn!(timestamp, "Dropping non-finite timestamp from rate window");
            return self.rate;
        }

        if self.window.len() == self.capacity.get() {
            self.window.pop_front();
        }
        self.window.push_back(timestamp);

        if let (Some(oldest), Some(newest)) = (self.window.front(), self.window.back()) {
            let elapsed = newest - oldest;
            if self.window.len() >= 2 && elapsed != 0.0 {
                let rate = (self.window.len() - 1) as f64 / elapsed;
                // Subnormal spans can still overflow
                if rate.is_finite() {
                    self.rate = rate;
                }
            }
        }

        self.rate
    }

    /// Latest computed rate in events per second
    pub fn current_rate(&self) -> f64 {
        self.rate
    }

    /// Number of retained timestamps
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// Whether no timestamps are retained
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Configured window size
    pub fn window_size(&self) -> NonZeroUsize {
        self.capacity
    }

    /// Clear the window and the rate
    pub fn reset(&mut self) {
        self.window.clear();
        self.rate = 0.0;
    }
}

impl Default for RateEstimator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WINDOW)
    }
}
