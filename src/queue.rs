//! Capacity-bounded output queues fed by device streams
//!
//! Each named stream gets one [`OutputQueue`]. The driver task is the only
//! producer and the host loop the only consumer. Every push and close also
//! pings the session-wide [`QueueEvents`] so a consumer can wait on several
//! queues at once.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::sync::futures::Notified;
use tracing::trace;

use crate::types::Packet;
use crate::{Result, StreamError};

/// Session-wide "some queue changed" notification
#[derive(Debug, Default)]
pub struct QueueEvents {
    notify: Notify,
}

impl QueueEvents {
    /// Create a new event primitive
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake every task currently waiting for queue activity
    pub(crate) fn notify(&self) {
        self.notify.notify_waiters();
    }

    /// Future resolving on the next queue activity.
    ///
    /// Callers must `enable()` it before checking queue state to avoid
    /// missing a push that lands between the check and the await.
    pub(crate) fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }
}

#[derive(Debug, Default)]
struct QueueState {
    buffer: VecDeque<Packet>,
    closed: bool,
    pushed: u64,
    overflowed: u64,
}

/// Bounded FIFO of packets for one named stream.
///
/// When full, a blocking queue makes the producer wait for space and a
/// non-blocking queue evicts its oldest packet.
#[derive(Debug)]
pub struct OutputQueue {
    name: Arc<str>,
    max_size: NonZeroUsize,
    blocking: bool,
    state: Mutex<QueueState>,
    readable: Notify,
    writable: Notify,
    events: Arc<QueueEvents>,
}

impl OutputQueue {
    /// Create a queue reporting activity to `events`
    pub fn new(
        name: impl Into<Arc<str>>,
        max_size: NonZeroUsize,
        blocking: bool,
        events: Arc<QueueEvents>,
    ) -> Self {
        Self {
            name: name.into(),
            max_size,
            blocking,
            state: Mutex::new(QueueState::default()),
            readable: Notify::new(),
            writable: Notify::new(),
            events,
        }
    }

    /// Stream name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Capacity
    pub fn max_size(&self) -> NonZeroUsize {
        self.max_size
    }

    /// Whether a full queue makes the producer wait
    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // Packets are atomic units, a panic mid-push cannot leave a torn one
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wake_readers(&self) {
        self.readable.notify_waiters();
        self.events.notify();
    }

    /// Enqueue a packet.
    ///
    /// Fails with `SessionClosed` once the queue is closed.
    pub async fn push(&self, packet: Packet) -> Result<()> {
        let mut packet = Some(packet);
        loop {
            let space = self.writable.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return Err(StreamError::session_closed(self.name.as_ref()));
                }

                let full = state.buffer.len() >= self.max_size.get();
                if full && !self.blocking {
                    if let Some(evicted) = state.buffer.pop_front() {
                        state.overflowed += 1;
                        trace!(
                            stream = %self.name,
                            sequence = evicted.sequence_number,
                            "Queue full, evicting oldest packet"
                        );
                    }
                }

                if !full || !self.blocking {
                    if let Some(packet) = packet.take() {
                        state.buffer.push_back(packet);
                        state.pushed += 1;
                    }
                    drop(state);
                    self.wake_readers();
                    return Ok(());
                }
            }

            space.await;
        }
    }

    /// Wait for and remove the oldest packet.
    ///
    /// Buffered packets stay readable after close; once the queue is closed
    /// and empty this fails with `SessionClosed` instead of waiting.
    pub async fn get(&self) -> Result<Packet> {
        loop {
            let arrival = self.readable.notified();
            tokio::pin!(arrival);
            arrival.as_mut().enable();

            if let Some(packet) = self.try_get()? {
                return Ok(packet);
            }

            arrival.await;
        }
    }

    /// Remove the oldest packet if one is buffered
    pub fn try_get(&self) -> Result<Option<Packet>> {
        let mut state = self.lock();
        match state.buffer.pop_front() {
            Some(packet) => {
                drop(state);
                self.writable.notify_waiters();
                Ok(Some(packet))
            }
            None if state.closed => Err(StreamError::session_closed(self.name.as_ref())),
            None => Ok(None),
        }
    }

    /// Remove every buffered packet, oldest first
    pub fn try_get_all(&self) -> Result<Vec<Packet>> {
        let mut state = self.lock();
        if state.buffer.is_empty() && state.closed {
            return Err(StreamError::session_closed(self.name.as_ref()));
        }
        let packets: Vec<Packet> = state.buffer.drain(..).collect();
        drop(state);
        if !packets.is_empty() {
            self.writable.notify_waiters();
        }
        Ok(packets)
    }

    /// Whether at least one packet is buffered
    pub fn has_pending(&self) -> bool {
        !self.lock().buffer.is_empty()
    }

    /// Number of buffered packets
    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    /// Whether no packets are buffered
    pub fn is_empty(&self) -> bool {
        self.lock().buffer.is_empty()
    }

    /// Whether the producer side has gone away
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Packets evicted by a full non-blocking queue
    pub fn overflowed(&self) -> u64 {
        self.lock().overflowed
    }

    /// Packets accepted since creation
    pub fn pushed(&self) -> u64 {
        self.lock().pushed
    }

    /// Close the queue and wake every waiter
    pub fn close(&self) {
        let was_closed = std::mem::replace(&mut self.lock().closed, true);
        if !was_closed {
            trace!(stream = %self.name, "Queue closed");
        }
        self.writable.notify_waiters();
        self.wake_readers();
    }
}
