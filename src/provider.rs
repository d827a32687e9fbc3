//! Provider trait for device streams

use crate::Result;
use crate::types::Packet;

/// Source of packets for one device stream
///
/// Providers abstract over where packets come from (a device link, a
/// recorded trace, a generator) and handle their own pacing internally.
#[async_trait::async_trait]
pub trait Provider: Send + 'static {
    /// Get the next packet
    ///
    /// Returns:
    /// - `Ok(Some(packet))` - New packet available
    /// - `Ok(None)` - Stream ended (normal termination)
    /// - `Err(e)` - Error occurred
    async fn next_packet(&mut self) -> Result<Option<Packet>>;

    /// Nominal packet rate in Hz, 0 when unknown
    fn nominal_rate(&self) -> f64;
}

#[async_trait::async_trait]
impl<P: Provider + ?Sized> Provider for Box<P> {
    async fn next_packet(&mut self) -> Result<Option<Packet>> {
        (**self).next_packet().await
    }

    fn nominal_rate(&self) -> f64 {
        (**self).nominal_rate()
    }
}
