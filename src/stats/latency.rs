//! Capture-to-host latency

use crate::clock::host_now;

/// Stateless latency and skew measurements.
///
/// Both inputs must come from the same clock domain. Results are never
/// clamped: a negative latency is a clock-skew diagnostic.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatencyProbe;

impl LatencyProbe {
    /// Host time minus capture time, in the unit of the inputs
    pub fn measure(packet_timestamp: f64, host_timestamp: f64) -> f64 {
        host_timestamp - packet_timestamp
    }

    /// Latency against the current host clock
    pub fn measure_now(packet_timestamp: f64) -> f64 {
        Self::measure(packet_timestamp, host_now())
    }

    /// Capture time of `other` relative to `reference`
    pub fn skew(reference_timestamp: f64, other_timestamp: f64) -> f64 {
        other_timestamp - reference_timestamp
    }
}
