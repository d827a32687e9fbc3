//! Device session: queues plus the producer tasks feeding them

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::drainer::QueueDrainer;
use crate::driver::Driver;
use crate::provider::Provider;
use crate::providers;
use crate::queue::{OutputQueue, QueueEvents};
use crate::{Result, StreamError};

/// An open session with a device.
///
/// Owns one output queue per configured stream and the producer tasks
/// feeding them. Dropping the session cancels every producer and closes
/// every queue, so a host loop blocked on a read returns instead of hanging.
/// Prefer [`close`](Self::close) to also wait for the tasks to finish.
///
/// ```rust,no_run
/// use depthwatch::{DeviceSession, SessionConfig};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() -> depthwatch::Result<()> {
/// let config = SessionConfig::from_file("session.yaml")?;
/// let session = DeviceSession::open(config).await?;
/// let drainer = session.drainer(CancellationToken::new());
/// let packet = drainer.get("left").await?;
/// println!("seq {} at {:.3}s", packet.sequence_number, packet.timestamp);
/// session.close().await;
/// # Ok(())
/// # }
/// ```
pub struct DeviceSession {
    config: SessionConfig,
    queues: Vec<Arc<OutputQueue>>,
    events: Arc<QueueEvents>,
    tasks: Vec<JoinHandle<u64>>,
    cycle_hz: f64,
    cancel: CancellationToken,
}

impl DeviceSession {
    /// Open a session whose providers are built from each stream's source
    pub async fn open(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let mut providers = Vec::with_capacity(config.streams.len());
        for stream in &config.streams {
            providers.push((stream.name.clone(), providers::from_config(stream)?));
        }
        Self::with_providers(config, providers).await
    }

    /// Open a session with caller-supplied providers, one per declared stream
    pub async fn with_providers(
        config: SessionConfig,
        providers: Vec<(String, Box<dyn Provider>)>,
    ) -> Result<Self> {
        config.validate()?;
        let mut providers: HashMap<String, Box<dyn Provider>> = providers.into_iter().collect();

        let events = Arc::new(QueueEvents::new());
        let cancel = CancellationToken::new();
        let mut queues = Vec::with_capacity(config.streams.len());
        let mut pending = Vec::with_capacity(config.streams.len());

        for stream in &config.streams {
            let provider = providers.remove(&stream.name).ok_or_else(|| {
                StreamError::config(format!("no provider for stream '{}'", stream.name))
            })?;
            let max_size = NonZeroUsize::new(stream.max_size).ok_or_else(|| {
                StreamError::config(format!("stream '{}' has a zero queue size", stream.name))
            })?;

            let queue = Arc::new(OutputQueue::new(
                stream.name.as_str(),
                max_size,
                stream.blocking,
                Arc::clone(&events),
            ));
            queues.push(Arc::clone(&queue));
            pending.push((provider, queue));
        }

        for (name, _) in providers {
            warn!(stream = %name, "Ignoring provider for undeclared stream");
        }

        let cycle_hz = pending.iter().map(|(p, _)| p.nominal_rate()).fold(0.0, f64::max);

        // Spawn only once every stream resolved, so a config error leaks no tasks
        let tasks = pending
            .into_iter()
            .map(|(provider, queue)| Driver::spawn(provider, queue, cancel.child_token()))
            .collect();

        info!(streams = queues.len(), cycle_hz, "Device session opened");

        Ok(Self { config, queues, events, tasks, cycle_hz, cancel })
    }

    /// Queue for `name`
    pub fn output_queue(&self, name: &str) -> Result<Arc<OutputQueue>> {
        self.queues
            .iter()
            .find(|q| q.name() == name)
            .cloned()
            .ok_or_else(|| StreamError::not_found(name))
    }

    /// Drainer over every queue, interrupted by `shutdown`
    pub fn drainer(&self, shutdown: CancellationToken) -> QueueDrainer {
        QueueDrainer::new(self.queues.iter().cloned(), Arc::clone(&self.events), shutdown)
    }

    /// Stream names in declaration order
    pub fn stream_names(&self) -> Vec<String> {
        self.config.stream_names()
    }

    /// Configuration the session was opened with
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Highest nominal rate among the providers, 0 when unknown
    pub fn cycle_hz(&self) -> f64 {
        self.cycle_hz
    }

    /// Token stopping every producer when cancelled.
    ///
    /// Each producer closes its queue on the way out, so readers drain what
    /// is buffered and then see `SessionClosed`.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether the session has been cancelled
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop every producer, close every queue, and wait for the tasks.
    pub async fn close(mut self) {
        self.shutdown();
        for task in std::mem::take(&mut self.tasks) {
            match task.await {
                Ok(packets) => debug!(packets, "Producer joined"),
                Err(e) => warn!("Producer task failed: {}", e),
            }
        }
        info!("Device session closed");
    }

    fn shutdown(&self) {
        self.cancel.cancel();
        for queue in &self.queues {
            queue.close();
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        debug!("Dropping device session");
        self.shutdown();
    }
}
