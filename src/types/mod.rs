//! Core types for device stream monitoring.
//!
//! ## Architecture
//!
//! - [`Packet`] is the unit of data that flows from a device stream through
//!   an output queue to the host loop, with zero-copy payload sharing
//! - [`StatsSnapshot`] is the serializable view of one stream's statistics
//! - [`UpdateRate`] controls how often snapshots reach a subscriber
//!
//! ## Usage Example
//!
//! ```rust
//! use depthwatch::types::Packet;
//!
//! let packet = Packet::new("depth", 42, 10.0, vec![0u8; 16]);
//! assert!(packet.validate().is_ok());
//! assert_eq!(packet.sequence_number, 42);
//! ```

mod packet;
mod snapshot;
mod update_rate;

pub use packet::Packet;
pub use snapshot::StatsSnapshot;
pub use update_rate::UpdateRate;
