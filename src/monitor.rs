//! Host loop turning drained packets into statistics
//!
//! The monitor repeatedly drains the session queues with one of three
//! policies, feeds every selected packet into that stream's
//! [`StreamStatistics`], forwards it to the sinks, and publishes snapshots on
//! a watch channel. UI-style control arrives as [`MonitorCommand`] messages
//! instead of callbacks mutating shared state.

use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

use crate::clock::host_now;
use crate::config::MonitorConfig;
use crate::drainer::QueueDrainer;
use crate::session::DeviceSession;
use crate::sink::PacketSink;
use crate::stats::{LatencyProbe, StreamStatistics};
use crate::stream::ThrottleExt;
use crate::types::{Packet, StatsSnapshot, UpdateRate};
use crate::{Result, StreamError};

/// How the host loop consumes its queues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "snake_case")]
pub enum DrainPolicy {
    /// Wait for one packet from every stream per cycle, in declaration order
    #[default]
    Blocking,
    /// Take everything buffered on every stream without waiting
    NonBlocking,
    /// Wait for any activity, keep only the newest packet per stream
    LatestOnly,
}

/// Control message for a running monitor
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorCommand {
    /// Clear statistics for one stream, or all of them
    Reset { stream: Option<String> },
    /// Start or pause forwarding packets to the sinks
    SetRecording(bool),
    /// Leave the loop after closing the sinks
    Stop,
}

/// Why the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A `Stop` command was received
    Stopped,
    /// The shutdown token fired
    Interrupted,
    /// The device session closed
    SessionClosed,
}

/// Outcome of a monitor run
#[derive(Debug, Clone)]
pub struct MonitorSummary {
    /// Completed drain cycles
    pub cycles: u64,
    /// Final statistics, one per stream in declaration order
    pub snapshots: Vec<StatsSnapshot>,
    /// Why the loop ended
    pub reason: StopReason,
}

/// One published statistics batch, one snapshot per stream
pub type Snapshots = Arc<Vec<StatsSnapshot>>;

enum Step {
    Command(MonitorCommand),
    Drained(Result<()>),
}

/// Packets gathered by the current drain cycle
#[derive(Default)]
struct Cycle {
    packets: Vec<Packet>,
    /// Next stream a blocking cycle waits on
    next_stream: usize,
}

impl Cycle {
    fn finish(&mut self) -> Vec<Packet> {
        self.next_stream = 0;
        std::mem::take(&mut self.packets)
    }
}

/// Host-side statistics loop over a set of streams
pub struct StreamMonitor {
    streams: Vec<String>,
    stats: Vec<StreamStatistics>,
    reference: Option<usize>,
    config: MonitorConfig,
    cycle_hz: f64,
    recording: bool,
    snapshot_tx: watch::Sender<Option<Snapshots>>,
    snapshot_rx: watch::Receiver<Option<Snapshots>>,
}

impl StreamMonitor {
    /// Monitor `streams` with the given settings.
    ///
    /// `cycle_hz` is the expected drain rate, used to normalize report rates.
    pub fn new(streams: Vec<String>, config: MonitorConfig, cycle_hz: f64) -> Result<Self> {
        if streams.is_empty() {
            return Err(StreamError::config("monitor needs at least one stream"));
        }

        let reference = match &config.reference_stream {
            Some(name) => Some(
                streams.iter().position(|s| s == name).ok_or_else(|| StreamError::not_found(name))?,
            ),
            None => None,
        };

        let stats = streams
            .iter()
            .map(|name| StreamStatistics::new(name.as_str(), config.window_size, config.rate_clock))
            .collect();
        let (snapshot_tx, snapshot_rx) = watch::channel(None);

        Ok(Self {
            streams,
            stats,
            reference,
            config,
            cycle_hz,
            recording: true,
            snapshot_tx,
            snapshot_rx,
        })
    }

    /// Monitor every stream of `session` with its configured settings
    pub fn for_session(session: &DeviceSession) -> Result<Self> {
        Self::new(session.stream_names(), session.config().monitor.clone(), session.cycle_hz())
    }

    /// Snapshot subscription at `rate`, latest wins
    pub fn snapshots(&self, rate: UpdateRate) -> BoxStream<'static, Snapshots> {
        let snapshots = WatchStream::new(self.snapshot_rx.clone()).filter_map(|opt| async move { opt });

        match rate.throttle_interval(self.cycle_hz) {
            None => snapshots.boxed(),
            Some(interval) => snapshots.throttle(interval).boxed(),
        }
    }

    /// Snapshot subscription at the configured report rate
    pub fn reports(&self) -> BoxStream<'static, Snapshots> {
        self.snapshots(self.config.report_rate)
    }

    /// Current statistics, one per stream in declaration order
    pub fn current(&self) -> Vec<StatsSnapshot> {
        self.stats.iter().map(StreamStatistics::snapshot).collect()
    }

    /// Statistics for one stream
    pub fn statistics(&self, stream: &str) -> Result<&StreamStatistics> {
        self.stats.iter().find(|s| s.stream() == stream).ok_or_else(|| StreamError::not_found(stream))
    }

    /// Run the host loop until stopped, interrupted, or the session closes.
    ///
    /// Sinks are closed on every exit path, including errors.
    pub async fn run(
        &mut self,
        drainer: &QueueDrainer,
        sinks: &mut [Box<dyn PacketSink>],
        mut commands: Option<mpsc::Receiver<MonitorCommand>>,
    ) -> Result<MonitorSummary> {
        let outcome = self.run_loop(drainer, sinks, &mut commands).await;
        let closed = close_sinks(sinks);

        let (cycles, reason) = outcome?;
        closed?;

        info!(cycles, ?reason, "Monitor stopped");
        Ok(MonitorSummary { cycles, snapshots: self.current(), reason })
    }

    async fn run_loop(
        &mut self,
        drainer: &QueueDrainer,
        sinks: &mut [Box<dyn PacketSink>],
        commands: &mut Option<mpsc::Receiver<MonitorCommand>>,
    ) -> Result<(u64, StopReason)> {
        if let Some(missing) = self.streams.iter().find(|s| !drainer.contains(s)) {
            return Err(StreamError::not_found(missing.as_str()));
        }

        info!(streams = ?self.streams, policy = ?self.config.policy, "Monitor started");
        let mut cycles = 0u64;
        // Packets already taken off the queues survive an interrupted cycle
        let mut cycle = Cycle::default();

        loop {
            let step = tokio::select! {
                biased;
                Some(command) = next_command(commands) => Step::Command(command),
                drained = Self::drain_cycle(drainer, &self.streams, &self.config, &mut cycle) => {
                    Step::Drained(drained)
                }
            };

            let drained = match step {
                Step::Command(command) => {
                    if self.apply(command) {
                        if self.process(cycle.finish(), sinks)? {
                            cycles += 1;
                        }
                        return Ok((cycles, StopReason::Stopped));
                    }
                    continue;
                }
                Step::Drained(drained) => drained,
            };

            if self.process(cycle.finish(), sinks)? {
                cycles += 1;
            }

            match drained {
                Ok(()) => {}
                Err(StreamError::Interrupted) => return Ok((cycles, StopReason::Interrupted)),
                Err(StreamError::SessionClosed { stream }) => {
                    info!(stream = %stream, "Session closed, leaving monitor loop");
                    return Ok((cycles, StopReason::SessionClosed));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Ingest, record and publish one batch; false when it was empty
    fn process(&mut self, packets: Vec<Packet>, sinks: &mut [Box<dyn PacketSink>]) -> Result<bool> {
        if packets.is_empty() {
            return Ok(false);
        }

        let host_timestamp = host_now();
        for packet in &packets {
            if !self.ingest(packet, host_timestamp) {
                continue;
            }
            if self.recording {
                for sink in sinks.iter_mut() {
                    sink.write(packet)?;
                }
            }
        }

        self.update_skew();
        self.publish();
        Ok(true)
    }

    /// Fill `cycle` according to the drain policy.
    ///
    /// Packets collected before an error stay in `cycle`, and a cycle dropped
    /// while waiting resumes at the stream it was waiting on.
    async fn drain_cycle(
        drainer: &QueueDrainer,
        streams: &[String],
        config: &MonitorConfig,
        cycle: &mut Cycle,
    ) -> Result<()> {
        match config.policy {
            DrainPolicy::Blocking => {
                while let Some(stream) = streams.get(cycle.next_stream) {
                    let packet = drainer.get(stream).await?;
                    cycle.packets.push(packet);
                    cycle.next_stream += 1;
                }
                Ok(())
            }
            DrainPolicy::NonBlocking => {
                let mut closed = None;
                for stream in streams {
                    loop {
                        match drainer.try_get(stream) {
                            Ok(Some(packet)) => cycle.packets.push(packet),
                            Ok(None) => break,
                            Err(e) => {
                                closed.get_or_insert(e);
                                break;
                            }
                        }
                    }
                }
                if let Some(e) = closed {
                    return Err(e);
                }
                if cycle.packets.is_empty() {
                    drainer.idle(Duration::from_millis(config.idle_backoff_ms)).await?;
                }
                Ok(())
            }
            DrainPolicy::LatestOnly => {
                let mut latest = drainer.drain_latest(streams).await?;
                cycle.packets.extend(streams.iter().filter_map(|s| latest.remove(s)));
                Ok(())
            }
        }
    }

    /// Feed one packet into its stream's statistics; false when it was rejected
    fn ingest(&mut self, packet: &Packet, host_timestamp: f64) -> bool {
        let Some(stats) = self.stats.iter_mut().find(|s| s.stream() == packet.stream.as_ref()) else {
            warn!(stream = %packet.stream, "Packet for unmonitored stream");
            return false;
        };

        match stats.observe(packet, host_timestamp) {
            Ok(observation) => {
                match observation.gap {
                    Some(gap) if gap > 0 => {
                        debug!(stream = %packet.stream, lost = gap, "Lost frames")
                    }
                    Some(gap) if gap < 0 => {
                        debug!(stream = %packet.stream, gap, "Sequence went backwards")
                    }
                    _ => {}
                }
                true
            }
            Err(e) => {
                warn!("Dropping sample: {}", e);
                false
            }
        }
    }

    fn update_skew(&mut self) {
        let Some(reference) = self.reference else { return };
        let Some(reference_timestamp) = self.stats[reference].last_timestamp() else { return };

        for (index, stats) in self.stats.iter_mut().enumerate() {
            if index == reference {
                continue;
            }
            if let Some(timestamp) = stats.last_timestamp() {
                stats.record_skew(LatencyProbe::skew(reference_timestamp, timestamp));
            }
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(Some(Arc::new(self.current())));
    }

    /// Apply a control message; true when the loop should stop
    fn apply(&mut self, command: MonitorCommand) -> bool {
        debug!(?command, "Monitor command");
        match command {
            MonitorCommand::Reset { stream: None } => {
                self.stats.iter_mut().for_each(StreamStatistics::reset);
                self.publish();
            }
            MonitorCommand::Reset { stream: Some(name) } => {
                match self.stats.iter_mut().find(|s| s.stream() == name) {
                    Some(stats) => {
                        stats.reset();
                        self.publish();
                    }
                    None => warn!(stream = %name, "Reset requested for unknown stream"),
                }
            }
            MonitorCommand::SetRecording(recording) => {
                info!(recording, "Sink recording toggled");
                self.recording = recording;
            }
            MonitorCommand::Stop => return true,
        }
        false
    }
}

async fn next_command(commands: &mut Option<mpsc::Receiver<MonitorCommand>>) -> Option<MonitorCommand> {
    match commands {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn close_sinks(sinks: &mut [Box<dyn PacketSink>]) -> Result<()> {
    let mut first_error = None;
    for sink in sinks.iter_mut() {
        if let Err(e) = sink.close() {
            warn!("Failed to close sink: {}", e);
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}
