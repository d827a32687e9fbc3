//! Per-stream statistics composed from the leaf estimators

use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

use super::{LatencyProbe, RateEstimator, SequenceTracker};
use crate::types::{Packet, StatsSnapshot};
use crate::Result;

/// Which timestamp feeds the rate window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "snake_case")]
pub enum RateClock {
    /// Host arrival time, what the consumer actually sees
    #[default]
    Host,
    /// Producer capture time, what the device actually produced
    Capture,
}

/// Result of feeding one packet into [`StreamStatistics`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Gap against the previous packet (`None` for the first)
    pub gap: Option<i64>,
    /// Host time minus capture time, seconds
    pub latency: f64,
    /// Windowed rate after this packet
    pub rate: f64,
}

/// Statistics for a single stream.
///
/// Owned by exactly one consumer; each stream gets its own instance.
#[derive(Debug, Clone)]
pub struct StreamStatistics {
    stream: String,
    clock: RateClock,
    rate: RateEstimator,
    sequence: SequenceTracker,
    packets: u64,
    bytes: u64,
    lost_total: u64,
    reordered_total: u64,
    invalid_samples: u64,
    last_gap: Option<i64>,
    last_latency: Option<f64>,
    last_timestamp: Option<f64>,
    skew: Option<f64>,
}

impl StreamStatistics {
    /// Create statistics for `stream` with the given rate window
    pub fn new(stream: impl Into<String>, window_size: NonZeroUsize, clock: RateClock) -> Self {
        Self {
            stream: stream.into(),
            clock,
            rate: RateEstimator::new(window_size),
            sequence: SequenceTracker::new(),
            packets: 0,
            bytes: 0,
            lost_total: 0,
            reordered_total: 0,
            invalid_samples: 0,
            last_gap: None,
            last_latency: None,
            last_timestamp: None,
            skew: None,
        }
    }

    /// Stream name
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Feed one packet observed at `host_timestamp`.
    ///
    /// Packets failing [`Packet::validate`] are counted and rejected without
    /// touching the estimators.
    pub fn observe(&mut self, packet: &Packet, host_timestamp: f64) -> Result<Observation> {
        if let Err(e) = packet.validate() {
            self.invalid_samples += 1;
            return Err(e);
        }

        let gap = self.sequence.observe(packet.sequence_number);
        match gap {
            Some(lost) if lost > 0 => self.lost_total += lost as u64,
            Some(lost) if lost < 0 => self.reordered_total += 1,
            _ => {}
        }

        let latency = LatencyProbe::measure(packet.timestamp, host_timestamp);
        let rate = match self.clock {
            RateClock::Host => self.rate.record_at(host_timestamp),
            RateClock::Capture => self.rate.record_at(packet.timestamp),
        };

        self.packets += 1;
        self.bytes += packet.len() as u64;
        self.last_gap = gap;
        self.last_latency = Some(latency);
        self.last_timestamp = Some(packet.timestamp);

        Ok(Observation { gap, latency, rate })
    }

    /// Capture time of the latest accepted packet
    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }

    /// Record capture-time skew against a reference stream, seconds
    pub fn record_skew(&mut self, skew: f64) {
        self.skew = Some(skew);
    }

    /// Windowed rate
    pub fn current_rate(&self) -> f64 {
        self.rate.current_rate()
    }

    /// Packets accepted so far
    pub fn packets(&self) -> u64 {
        self.packets
    }

    /// Total packets reported lost
    pub fn lost_total(&self) -> u64 {
        self.lost_total
    }

    /// Drop all accumulated state, keeping name and configuration
    pub fn reset(&mut self) {
        *self = Self::new(std::mem::take(&mut self.stream), self.rate.window_size(), self.clock);
    }

    /// Serializable snapshot with latencies scaled to milliseconds
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            stream: self.stream.clone(),
            packets: self.packets,
            rate_hz: self.rate.current_rate(),
            last_sequence: self.sequence.last_sequence(),
            last_gap: self.last_gap,
            lost_total: self.lost_total,
            reordered_total: self.reordered_total,
            latency_ms: self.last_latency.map(|s| s * 1000.0),
            skew_ms: self.skew.map(|s| s * 1000.0),
            bytes: self.bytes,
            invalid_samples: self.invalid_samples,
        }
    }
}
