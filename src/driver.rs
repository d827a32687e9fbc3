//! Driver spawns and manages producer tasks

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::provider::Provider;
use crate::queue::OutputQueue;

/// Maximum consecutive provider errors before a stream is given up
const MAX_ERRORS: u32 = 10;

/// Driver moves packets from a provider into its output queue
///
/// One task per stream owns the provider. The queue is closed when the
/// provider ends, fails too often, or the session is cancelled, so the
/// consumer side never waits on a dead stream.
pub struct Driver;

impl Driver {
    /// Spawn the producer task for one stream
    ///
    /// The returned handle resolves to the number of packets enqueued.
    pub fn spawn<P>(provider: P, queue: Arc<OutputQueue>, cancel: CancellationToken) -> JoinHandle<u64>
    where
        P: Provider,
    {
        tokio::spawn(async move { Self::producer_task(provider, queue, cancel).await })
    }

    async fn producer_task<P>(mut provider: P, queue: Arc<OutputQueue>, cancel: CancellationToken) -> u64
    where
        P: Provider,
    {
        info!(stream = queue.name(), rate = provider.nominal_rate(), "Producer task started");
        let mut packet_count = 0u64;
        let mut error_count = 0u32;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(stream = queue.name(), "Producer cancelled during read");
                    break;
                }
                result = provider.next_packet() => result,
            };

            match result {
                Ok(Some(packet)) => {
                    error_count = 0;
                    trace!(
                        stream = queue.name(),
                        sequence = packet.sequence_number,
                        timestamp = packet.timestamp,
                        "Packet produced"
                    );

                    // A blocking queue may stall here until the consumer catches up
                    let pushed = tokio::select! {
                        _ = cancel.cancelled() => {
                            info!(stream = queue.name(), "Producer cancelled while queue was full");
                            break;
                        }
                        pushed = queue.push(packet) => pushed,
                    };

                    if pushed.is_err() {
                        debug!(stream = queue.name(), "Queue closed, stopping producer");
                        break;
                    }
                    packet_count += 1;
                }
                Ok(None) => {
                    info!(stream = queue.name(), "Provider stream ended after {} packets", packet_count);
                    break;
                }
                Err(e) => {
                    // Provider error - don't give up on transient failures
                    error_count += 1;
                    error!(stream = queue.name(), "Provider error ({}/{}): {}", error_count, MAX_ERRORS, e);

                    if error_count >= MAX_ERRORS {
                        error!(stream = queue.name(), "Too many provider errors, closing stream");
                        break;
                    }

                    // Exponential backoff: 100ms, 200ms, 400ms, ...
                    let backoff = Duration::from_millis(50 * (1 << error_count.min(5)));
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }

        queue.close();
        info!(stream = queue.name(), "Producer task ended ({} packets)", packet_count);
        packet_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueEvents;
    use crate::types::Packet;
    use crate::{Result, StreamError};
    use std::num::NonZeroUsize;

    struct Scripted {
        steps: Vec<Result<Option<Packet>>>,
    }

    #[async_trait::async_trait]
    impl Provider for Scripted {
        async fn next_packet(&mut self) -> Result<Option<Packet>> {
            if self.steps.is_empty() {
                return Ok(None);
            }
            self.steps.remove(0)
        }

        fn nominal_rate(&self) -> f64 {
            0.0
        }
    }

    struct Failing;

    #[async_trait::async_trait]
    impl Provider for Failing {
        async fn next_packet(&mut self) -> Result<Option<Packet>> {
            Err(StreamError::provider_failed("link down"))
        }

        fn nominal_rate(&self) -> f64 {
            0.0
        }
    }

    struct Endless;

    #[async_trait::async_trait]
    impl Provider for Endless {
        async fn next_packet(&mut self) -> Result<Option<Packet>> {
            std::future::pending().await
        }

        fn nominal_rate(&self) -> f64 {
            0.0
        }
    }

    fn queue(max_size: usize) -> Arc<OutputQueue> {
        Arc::new(OutputQueue::new(
            "left",
            NonZeroUsize::new(max_size).expect("non-zero"),
            true,
            Arc::new(QueueEvents::new()),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn forwards_packets_and_closes_at_end() {
        let queue = queue(8);
        let steps = vec![
            Ok(Some(Packet::new("left", 0, 0.0, Vec::new()))),
            Err(StreamError::provider_failed("transient")),
            Ok(Some(Packet::new("left", 1, 0.1, Vec::new()))),
        ];

        let handle = Driver::spawn(Scripted { steps }, Arc::clone(&queue), CancellationToken::new());
        assert_eq!(handle.await.expect("task"), 2);

        assert!(queue.is_closed());
        assert_eq!(queue.try_get().expect("buffered").map(|p| p.sequence_number), Some(0));
        assert_eq!(queue.try_get().expect("buffered").map(|p| p.sequence_number), Some(1));
        assert!(queue.try_get().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_repeated_errors() {
        let queue = queue(1);
        let handle = Driver::spawn(Failing, Arc::clone(&queue), CancellationToken::new());
        assert_eq!(handle.await.expect("task"), 0);
        assert!(queue.is_closed());
    }

    #[tokio::test]
    async fn cancellation_stops_a_waiting_producer() {
        let queue = queue(1);
        let cancel = CancellationToken::new();
        let handle = Driver::spawn(Endless, Arc::clone(&queue), cancel.clone());

        cancel.cancel();
        let produced = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cancellation must end the task")
            .expect("task");
        assert_eq!(produced, 0);
        assert!(queue.is_closed());
    }
}
