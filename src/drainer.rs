//! Consumption policies over named output queues

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::queue::{OutputQueue, QueueEvents};
use crate::types::Packet;
use crate::{Result, StreamError};

/// Reads packets from a session's output queues.
///
/// Three policies are offered:
///
/// - [`get`](Self::get) waits for the next packet of one queue
/// - [`try_get`](Self::try_get) returns the oldest packet or nothing, never waits
/// - [`drain_latest`](Self::drain_latest) waits for activity on any of several
///   queues, then keeps only the newest packet of each and discards the rest
///
/// `drain_latest` sheds load on purpose: when the host is slower than the
/// device, intermediate packets are dropped instead of building a backlog.
///
/// Every wait also listens to a shutdown token and fails with
/// [`StreamError::Interrupted`] when it fires.
#[derive(Debug, Clone)]
pub struct QueueDrainer {
    queues: HashMap<String, Arc<OutputQueue>>,
    events: Arc<QueueEvents>,
    shutdown: CancellationToken,
}

impl QueueDrainer {
    /// Create a drainer over `queues`, all reporting to `events`
    pub fn new(
        queues: impl IntoIterator<Item = Arc<OutputQueue>>,
        events: Arc<QueueEvents>,
        shutdown: CancellationToken,
    ) -> Self {
        let queues = queues.into_iter().map(|q| (q.name().to_string(), q)).collect();
        Self { queues, events, shutdown }
    }

    fn queue(&self, name: &str) -> Result<&Arc<OutputQueue>> {
        self.queues.get(name).ok_or_else(|| StreamError::not_found(name))
    }

    fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<&Arc<OutputQueue>>> {
        names.iter().map(|name| self.queue(name.as_ref())).collect()
    }

    /// Wait for the next packet on `name`, oldest first
    pub async fn get(&self, name: &str) -> Result<Packet> {
        let queue = self.queue(name)?;
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(StreamError::Interrupted),
            result = queue.get() => result,
        }
    }

    /// Oldest packet on `name`, or `None` when nothing is buffered
    pub fn try_get(&self, name: &str) -> Result<Option<Packet>> {
        self.queue(name)?.try_get()
    }

    /// Whether `name` has a buffered packet
    pub fn has_pending(&self, name: &str) -> Result<bool> {
        Ok(self.queue(name)?.has_pending())
    }

    /// Wait until any of `names` has new data, then take the newest packet of each.
    ///
    /// Queues without new data are absent from the result. Fails with
    /// `SessionClosed` once every named queue is closed and empty.
    pub async fn drain_latest<S: AsRef<str>>(&self, names: &[S]) -> Result<HashMap<String, Packet>> {
        let queues = self.resolve(names)?;
        if queues.is_empty() {
            return Ok(HashMap::new());
        }

        loop {
            let activity = self.events.notified();
            tokio::pin!(activity);
            activity.as_mut().enable();

            if queues.iter().any(|q| q.has_pending()) {
                break;
            }
            if queues.iter().all(|q| q.is_closed()) {
                return Err(closed_error(&queues));
            }

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Err(StreamError::Interrupted),
                _ = activity => {}
            }
        }

        self.collect_latest(&queues)
    }

    /// Non-waiting variant of [`drain_latest`](Self::drain_latest).
    ///
    /// Returns an empty map when nothing new arrived since the last drain.
    pub fn try_drain_latest<S: AsRef<str>>(&self, names: &[S]) -> Result<HashMap<String, Packet>> {
        let queues = self.resolve(names)?;
        self.collect_latest(&queues)
    }

    fn collect_latest(&self, queues: &[&Arc<OutputQueue>]) -> Result<HashMap<String, Packet>> {
        let mut latest = HashMap::with_capacity(queues.len());
        let mut closed = 0;

        for queue in queues {
            let mut packets = match queue.try_get_all() {
                Ok(packets) => packets,
                Err(StreamError::SessionClosed { .. }) => {
                    closed += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if let Some(newest) = packets.pop() {
                if !packets.is_empty() {
                    trace!(
                        stream = queue.name(),
                        discarded = packets.len(),
                        kept = newest.sequence_number,
                        "Shedding stale packets"
                    );
                }
                latest.insert(queue.name().to_string(), newest);
            }
        }

        if latest.is_empty() && closed > 0 && closed == queues.len() {
            return Err(closed_error(queues));
        }
        Ok(latest)
    }

    /// Sleep for `period` unless shutdown fires first
    pub async fn idle(&self, period: Duration) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(StreamError::Interrupted),
            _ = tokio::time::sleep(period) => Ok(()),
        }
    }

    /// Whether `name` is readable through this drainer
    pub fn contains(&self, name: &str) -> bool {
        self.queues.contains_key(name)
    }
}

fn closed_error(queues: &[&Arc<OutputQueue>]) -> StreamError {
    let names: Vec<&str> = queues.iter().map(|q| q.name()).collect();
    StreamError::session_closed(names.join(","))
}
