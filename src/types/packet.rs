//! Packet type consumed from device output queues

use std::sync::Arc;

use crate::{Result, StreamError};

/// One timestamped, sequence-numbered unit emitted by a device stream.
///
/// The payload is never interpreted here; it is forwarded to sinks as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Name of the stream that produced this packet
    pub stream: Arc<str>,

    /// Producer sequence number, strictly increasing under normal operation
    pub sequence_number: u64,

    /// Capture time in seconds on the producer clock
    pub timestamp: f64,

    /// Opaque payload bytes (zero-copy via Arc)
    pub payload: Arc<[u8]>,
}

impl Packet {
    /// Create a new packet
    pub fn new(
        stream: impl Into<Arc<str>>,
        sequence_number: u64,
        timestamp: f64,
        payload: Vec<u8>,
    ) -> Self {
        Self { stream: stream.into(), sequence_number, timestamp, payload: payload.into() }
    }

    /// Reject samples that would corrupt estimator state.
    ///
    /// Timestamps must be finite and sequence numbers must fit in `i64` so
    /// that gap arithmetic stays exact.
    pub fn validate(&self) -> Result<()> {
        if !self.timestamp.is_finite() {
            return Err(StreamError::invalid_sample(
                self.stream.as_ref(),
                format!("non-finite timestamp {} at sequence {}", self.timestamp, self.sequence_number),
            ));
        }
        if self.sequence_number > i64::MAX as u64 {
            return Err(StreamError::invalid_sample(
                self.stream.as_ref(),
                format!("sequence number {} exceeds i64::MAX", self.sequence_number),
            ));
        }
        Ok(())
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finite_samples_validate() {
        let packet = Packet::new("left", 7, 12.5, vec![1, 2, 3]);
        assert!(packet.validate().is_ok());
        assert_eq!(packet.len(), 3);
    }

    #[test]
    fn non_finite_timestamps_are_rejected() {
        for timestamp in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let packet = Packet::new("left", 1, timestamp, Vec::new());
            assert!(matches!(packet.validate(), Err(StreamError::InvalidSample { .. })));
        }
    }

    #[test]
    fn oversized_sequence_numbers_are_rejected() {
        let packet = Packet::new("imu", u64::MAX, 1.0, Vec::new());
        let err = packet.validate().unwrap_err();
        assert!(err.to_string().contains("imu"));
    }
}
