//! Report rate control for statistics snapshots

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How often statistics snapshots are delivered to a subscriber
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "snake_case")]
pub enum UpdateRate {
    /// Every snapshot the monitor publishes (one per processed cycle)
    #[default]
    EveryCycle,

    /// At most this many snapshots per second, latest wins
    /// A rate at or above the stream rate behaves like `EveryCycle`
    Max(u32),
}

impl UpdateRate {
    /// Normalize against the nominal cycle rate of the monitored streams
    pub fn normalize(self, cycle_hz: f64) -> Self {
        match self {
            UpdateRate::EveryCycle => UpdateRate::EveryCycle,
            UpdateRate::Max(0) => UpdateRate::EveryCycle,
            UpdateRate::Max(hz) if cycle_hz > 0.0 && hz as f64 >= cycle_hz => {
                UpdateRate::EveryCycle
            }
            UpdateRate::Max(hz) => UpdateRate::Max(hz),
        }
    }

    /// Throttle interval, if throttling is needed
    pub fn throttle_interval(self, cycle_hz: f64) -> Option<Duration> {
        match self.normalize(cycle_hz) {
            UpdateRate::EveryCycle => None,
            UpdateRate::Max(hz) => Some(Duration::from_secs_f64(1.0 / hz as f64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_above_cycle_rate_collapse_to_every_cycle() {
        assert_eq!(UpdateRate::Max(60).normalize(30.0), UpdateRate::EveryCycle);
        assert_eq!(UpdateRate::Max(2).normalize(30.0), UpdateRate::Max(2));
        assert_eq!(UpdateRate::Max(0).normalize(30.0), UpdateRate::EveryCycle);
    }

    #[test]
    fn unknown_cycle_rate_keeps_requested_throttle() {
        assert_eq!(UpdateRate::Max(5).throttle_interval(0.0), Some(Duration::from_millis(200)));
        assert_eq!(UpdateRate::EveryCycle.throttle_interval(30.0), None);
    }

    #[test]
    fn deserializes_from_yaml() {
        let rate: UpdateRate = serde_yaml_ng::from_str("max: 4").expect("valid rate");
        assert_eq!(rate, UpdateRate::Max(4));
        let rate: UpdateRate = serde_yaml_ng::from_str("every_cycle").expect("valid rate");
        assert_eq!(rate, UpdateRate::EveryCycle);
    }
}
