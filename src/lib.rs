//! Host-side consumption and statistics for multi-stream device output.
//!
//! A device produces several named streams (frames, encoded video, detections)
//! into bounded output queues. Depthwatch drains those queues with a choice of
//! policies and measures each stream as it goes: windowed frame rate,
//! sequence gaps, and capture-to-host latency.
//!
//! # Features
//!
//! - **Bounded queues**: blocking backpressure or drop-oldest per stream
//! - **Drain policies**: one-by-one, non-blocking, or latest-only load shedding
//! - **Statistics**: rate, lost frames, latency and inter-stream skew
//! - **Providers**: synthetic generators and recorded traces behind one trait
//!
//! ## Example
//!
//! ```rust,no_run
//! use depthwatch::{DeviceSession, SessionConfig, StreamMonitor};
//! use futures::StreamExt;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::from_file("session.yaml")?;
//!     let session = DeviceSession::open(config).await?;
//!     let drainer = session.drainer(CancellationToken::new());
//!
//!     let mut monitor = StreamMonitor::for_session(&session)?;
//!     let mut reports = monitor.reports();
//!     tokio::spawn(async move {
//!         while let Some(batch) = reports.next().await {
//!             for snapshot in batch.iter() {
//!                 println!("{snapshot}");
//!             }
//!         }
//!     });
//!
//!     let summary = monitor.run(&drainer, &mut [], None).await?;
//!     println!("{} cycles", summary.cycles);
//!     session.close().await;
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod clock;
pub mod config;
mod error;
pub mod types;

// Queues and their consumers
pub mod drainer;
pub mod monitor;
pub mod queue;
pub mod session;
pub mod sink;
pub mod stats;
pub mod stream;

// Producers
pub mod driver;
pub mod provider;
pub mod providers;

// Core exports
pub use error::*;
pub use types::*;

pub use config::{MonitorConfig, SessionConfig, SourceConfig, StreamConfig, SyntheticConfig};
pub use drainer::QueueDrainer;
pub use monitor::{DrainPolicy, MonitorCommand, MonitorSummary, StopReason, StreamMonitor};
pub use provider::Provider;
pub use queue::OutputQueue;
pub use session::DeviceSession;
pub use sink::{FileSink, PacketSink};
pub use stats::{RateClock, StreamStatistics};
