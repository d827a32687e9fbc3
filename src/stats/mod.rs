//! Streaming statistics: rate, loss and latency.
//!
//! The three leaf components are independent:
//!
//! - [`RateEstimator`] averages a sliding window of event timestamps
//! - [`SequenceTracker`] reports gaps between consecutive sequence numbers
//! - [`LatencyProbe`] measures capture-to-host elapsed time
//!
//! [`StreamStatistics`] composes them for one stream. None of these types
//! are thread-safe; each stream is tracked by its own instance.

mod latency;
mod rate;
mod sequence;
mod statistics;

pub use latency::LatencyProbe;
pub use rate::RateEstimator;
pub use sequence::SequenceTracker;
pub use statistics::{Observation, RateClock, StreamStatistics};
