//! Serializable statistics snapshots

use serde::Serialize;
use std::fmt;

/// Point-in-time statistics for one stream
///
/// Values are surfaced exactly as measured: a negative latency means the
/// producer clock is ahead of the host clock, a negative gap means the
/// sequence went backwards.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct StatsSnapshot {
    /// Stream name
    pub stream: String,

    /// Packets accepted into the estimators
    pub packets: u64,

    /// Windowed rate in packets per second
    pub rate_hz: f64,

    /// Most recent sequence number observed
    pub last_sequence: Option<u64>,

    /// Gap reported by the most recent observation
    pub last_gap: Option<i64>,

    /// Sum of all positive gaps
    pub lost_total: u64,

    /// Observations whose gap was negative
    pub reordered_total: u64,

    /// Host time minus capture time of the latest packet, milliseconds
    pub latency_ms: Option<f64>,

    /// Capture time difference against the reference stream, milliseconds
    pub skew_ms: Option<f64>,

    /// Payload bytes seen
    pub bytes: u64,

    /// Samples dropped because they failed validation
    pub invalid_samples: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>8} fps: {:5.2} ", self.stream, self.rate_hz)?;
        if let Some(latency) = self.latency_ms {
            write!(f, "latency: {latency:7.3} ms. ")?;
        }
        if let Some(skew) = self.skew_ms {
            write!(f, "skew: {skew:7.3} ms. ")?;
        }
        match self.last_gap {
            Some(gap) if gap > 0 => write!(f, "lost frames: {gap}"),
            Some(gap) if gap < 0 => write!(f, "out of order by: {}", -gap),
            _ => Ok(()),
        }
    }
}
