//! Replay of recorded packet traces
//!
//! A trace is a YAML list of packet headers captured from a device:
//!
//! ```yaml
//! - { sequence: 0, timestamp: 12.000, size: 1024 }
//! - { sequence: 1, timestamp: 12.033, size: 1024 }
//! - { sequence: 3, timestamp: 12.100, size: 1024, latency: 0.004 }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::clock::host_now;
use crate::provider::Provider;
use crate::types::Packet;
use crate::{Result, StreamError};

/// Slowest supported replay speed
pub const MIN_SPEED: f64 = 0.1;

/// Fastest supported replay speed
pub const MAX_SPEED: f64 = 10.0;

/// One recorded packet header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Sequence number as recorded
    pub sequence: u64,

    /// Capture time in seconds on the recording clock
    pub timestamp: f64,

    /// Payload size in bytes
    #[serde(default)]
    pub size: usize,

    /// Capture-to-host delay observed at recording time, seconds
    #[serde(default)]
    pub latency: f64,
}

/// Provider replaying a trace at recorded pace.
///
/// Timestamps are rebased onto the host clock so latency measurements stay
/// meaningful; sequence numbers are replayed untouched, gaps and reordering
/// included.
pub struct TraceProvider {
    stream: Arc<str>,
    records: Vec<TraceRecord>,
    position: usize,
    speed: f64,
    /// Host time and trace time of the first replayed record
    anchor: Option<(f64, f64)>,
}

impl TraceProvider {
    /// Load a trace file for `stream`
    pub fn open<P: AsRef<Path>>(stream: impl Into<Arc<str>>, path: P, speed: f64) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            StreamError::config(format!("cannot read trace {}: {}", path.display(), e))
        })?;
        let records: Vec<TraceRecord> = serde_yaml_ng::from_str(&yaml)?;
        info!("Opened trace {}: {} packets", path.display(), records.len());
        Ok(Self::from_records(stream, records, speed))
    }

    /// Replay in-memory records
    pub fn from_records(stream: impl Into<Arc<str>>, records: Vec<TraceRecord>, speed: f64) -> Self {
        let stream = stream.into();
        let clamped = speed.clamp(MIN_SPEED, MAX_SPEED);
        if clamped != speed {
            warn!(stream = %stream, requested = speed, speed = clamped, "Replay speed out of range, clamped");
        }
        Self { stream, records, position: 0, speed: clamped, anchor: None }
    }

    /// Records not yet replayed
    pub fn remaining(&self) -> usize {
        self.records.len() - self.position
    }
}

#[async_trait::async_trait]
impl Provider for TraceProvider {
    async fn next_packet(&mut self) -> Result<Option<Packet>> {
        loop {
            let Some(record) = self.records.get(self.position) else {
                debug!(stream = %self.stream, "Reached end of trace");
                return Ok(None);
            };

            let (host_start, trace_start) = *self.anchor.get_or_insert((host_now(), record.timestamp));
            let due = host_start + (record.timestamp - trace_start) / self.speed;

            let wait = due - host_now();
            if wait > 0.0 {
                match Duration::try_from_secs_f64(wait) {
                    Ok(wait) => tokio::time::sleep(wait).await,
                    Err(_) => {
                        warn!(
                            stream = %self.stream,
                            sequence = record.sequence,
                            timestamp = record.timestamp,
                            "Skipping trace record with unreachable timestamp"
                        );
                        self.position += 1;
                        continue;
                    }
                }
            }

            trace!(
                stream = %self.stream,
                sequence = record.sequence,
                position = self.position,
                "Replaying trace packet"
            );

            // Non-finite timestamps pass through and fail validation downstream
            let packet = Packet {
                stream: Arc::clone(&self.stream),
                sequence_number: record.sequence,
                timestamp: due - record.latency,
                payload: vec![0u8; record.size].into(),
            };
            self.position += 1;
            return Ok(Some(packet));
        }
    }

    fn nominal_rate(&self) -> f64 {
        match (self.records.first(), self.records.last()) {
            (Some(first), Some(last)) if self.records.len() > 1 => {
                let span = last.timestamp - first.timestamp;
                if span > 0.0 { (self.records.len() - 1) as f64 / span * self.speed } else { 0.0 }
            }
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(sequence: u64, timestamp: f64) -> TraceRecord {
        TraceRecord { sequence, timestamp, size: 4, latency: 0.0 }
    }

    #[tokio::test]
    async fn replays_sequences_untouched() {
        let records = vec![record(5, 1.000), record(6, 1.001), record(9, 1.002), record(8, 1.003)];
        let mut provider = TraceProvider::from_records("imu", records, 1.0);
        assert!((provider.nominal_rate() - 1000.0).abs() < 1e-6);

        let mut sequences = Vec::new();
        while let Some(packet) = provider.next_packet().await.expect("in-memory trace") {
            sequences.push(packet.sequence_number);
        }
        assert_eq!(sequences, vec![5, 6, 9, 8]);
        assert_eq!(provider.remaining(), 0);
    }

    #[tokio::test]
    async fn timestamps_are_rebased_with_recorded_spacing() {
        let records = vec![record(0, 100.0), record(1, 100.02)];
        let mut provider = TraceProvider::from_records("rgb", records, 2.0);

        let first = provider.next_packet().await.expect("ok").expect("packet");
        let second = provider.next_packet().await.expect("ok").expect("packet");
        assert!(first.timestamp < 100.0, "rebased onto host clock");
        assert!(((second.timestamp - first.timestamp) - 0.01).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_timestamps_are_skipped() {
        let records = vec![record(0, 0.0), record(1, 1e300), record(2, f64::INFINITY), record(3, 0.01)];
        let mut provider = TraceProvider::from_records("rgb", records, 1.0);

        let mut sequences = Vec::new();
        while let Some(packet) = provider.next_packet().await.expect("in-memory trace") {
            sequences.push(packet.sequence_number);
        }
        assert_eq!(sequences, vec![0, 3]);
    }

    #[tokio::test]
    async fn unreachable_timestamp_still_closes_the_queue() {
        use crate::driver::Driver;
        use crate::queue::{OutputQueue, QueueEvents};
        use std::num::NonZeroUsize;
        use tokio_util::sync::CancellationToken;

        let queue = Arc::new(OutputQueue::new(
            "rgb",
            NonZeroUsize::new(4).expect("non-zero"),
            true,
            Arc::new(QueueEvents::new()),
        ));
        let provider = TraceProvider::from_records("rgb", vec![record(0, 0.0), record(1, 1e300)], 1.0);
        let handle = Driver::spawn(provider, Arc::clone(&queue), CancellationToken::new());

        let produced = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("producer finishes")
            .expect("producer does not panic");
        assert_eq!(produced, 1);
        assert!(queue.is_closed());
        assert_eq!(queue.get().await.expect("buffered").sequence_number, 0);
        assert!(matches!(queue.get().await, Err(StreamError::SessionClosed { .. })));
    }

    #[test]
    fn out_of_range_speed_is_clamped() {
        let provider = TraceProvider::from_records("rgb", vec![record(0, 0.0), record(1, 1.0)], 20.0);
        assert_eq!(provider.nominal_rate(), MAX_SPEED);
    }

    #[test]
    fn parses_trace_yaml() {
        let yaml = "- { sequence: 0, timestamp: 12.0, size: 1024 }\n- { sequence: 2, timestamp: 12.066, latency: 0.004 }\n";
        let records: Vec<TraceRecord> = serde_yaml_ng::from_str(yaml).expect("valid trace");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].size, 0);
        assert_eq!(records[1].latency, 0.004);
    }

    #[test]
    fn missing_trace_is_a_config_error() {
        let result = TraceProvider::open("rgb", "/nonexistent/trace.yaml", 1.0);
        assert!(matches!(result, Err(StreamError::Config { .. })));
    }
}
