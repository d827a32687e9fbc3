//! Generated packets at a fixed rate

use std::sync::Arc;
use tokio::time::{Duration, Interval, MissedTickBehavior, interval};
use tracing::{debug, trace};

use crate::Result;
use crate::clock::host_now;
use crate::config::SyntheticConfig;
use crate::provider::Provider;
use crate::types::Packet;

/// Provider that behaves like a free-running camera.
///
/// Packets are paced at `fps`, stamped with the host clock minus the
/// configured transport latency, and optionally skip every Nth sequence
/// number so that loss shows up downstream.
pub struct SyntheticProvider {
    stream: Arc<str>,
    config: SyntheticConfig,
    interval: Interval,
    payload: Arc<[u8]>,
    sequence: u64,
    emitted: u64,
}

impl SyntheticProvider {
    /// Create a provider for `stream`
    pub fn new(stream: impl Into<Arc<str>>, config: SyntheticConfig) -> Self {
        let mut interval = interval(Duration::from_secs_f64(1.0 / config.fps));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let payload: Arc<[u8]> = vec![0u8; config.payload_bytes].into();

        Self { stream: stream.into(), config, interval, payload, sequence: 0, emitted: 0 }
    }

    fn skips(&self, sequence: u64) -> bool {
        match self.config.drop_every {
            Some(n) if n > 1 => (sequence + 1) % n == 0,
            _ => false,
        }
    }
}

#[async_trait::async_trait]
impl Provider for SyntheticProvider {
    async fn next_packet(&mut self) -> Result<Option<Packet>> {
        if self.config.frames.is_some_and(|limit| self.emitted >= limit) {
            debug!(stream = %self.stream, emitted = self.emitted, "Synthetic stream finished");
            return Ok(None);
        }

        self.interval.tick().await;

        while self.skips(self.sequence) {
            trace!(stream = %self.stream, sequence = self.sequence, "Simulating lost packet");
            self.sequence += 1;
        }

        let packet = Packet {
            stream: Arc::clone(&self.stream),
            sequence_number: self.sequence,
            timestamp: host_now() - self.config.latency_ms / 1000.0,
            payload: Arc::clone(&self.payload),
        };

        self.sequence += 1;
        self.emitted += 1;
        Ok(Some(packet))
    }

    fn nominal_rate(&self) -> f64 {
        self.config.fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(config: SyntheticConfig) -> SyntheticProvider {
        SyntheticProvider::new("rgb", config)
    }

    #[tokio::test(start_paused = true)]
    async fn emits_limited_frames() {
        let mut provider = provider(SyntheticConfig {
            fps: 100.0,
            payload_bytes: 8,
            frames: Some(3),
            ..Default::default()
        });

        let mut sequences = Vec::new();
        while let Some(packet) = provider.next_packet().await.expect("synthetic never fails") {
            assert_eq!(packet.len(), 8);
            assert_eq!(packet.stream.as_ref(), "rgb");
            sequences.push(packet.sequence_number);
        }
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_every_skips_sequence_numbers() {
        let mut provider = provider(SyntheticConfig {
            fps: 1000.0,
            drop_every: Some(3),
            frames: Some(5),
            ..Default::default()
        });

        let mut sequences = Vec::new();
        while let Some(packet) = provider.next_packet().await.expect("synthetic never fails") {
            sequences.push(packet.sequence_number);
        }
        assert_eq!(sequences, vec![0, 1, 3, 4, 6]);
    }

    #[tokio::test]
    async fn timestamps_include_latency() {
        let mut provider = provider(SyntheticConfig {
            fps: 1000.0,
            latency_ms: 50.0,
            ..Default::default()
        });
        let packet = provider.next_packet().await.expect("ok").expect("packet");
        let latency = host_now() - packet.timestamp;
        assert!(latency >= 0.05, "latency was {latency}");
        assert_eq!(provider.nominal_rate(), 1000.0);
    }
}
