//! YAML session configuration
//!
//! A session file declares the device streams to open and how the host
//! loop should consume them:
//!
//! ```yaml
//! streams:
//!   - name: left
//!     max_size: 1
//!     blocking: true
//!     source: { kind: synthetic, fps: 55 }
//!   - name: right
//!     max_size: 1
//!     blocking: true
//!     source: { kind: synthetic, fps: 55, drop_every: 40 }
//! monitor:
//!   policy: blocking
//!   window_size: 30
//!   reference_stream: left
//!   report_rate: { max: 2 }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::monitor::DrainPolicy;
use crate::providers::trace::{MAX_SPEED, MIN_SPEED};
use crate::stats::{RateClock, RateEstimator};
use crate::types::UpdateRate;
use crate::{Result, StreamError};

/// Complete session description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Output streams, in the order the host loop visits them
    pub streams: Vec<StreamConfig>,

    /// Host loop settings
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// One named output stream and its queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Queue name
    pub name: String,

    /// Queue capacity in packets
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Whether a full queue stalls the producer instead of evicting
    #[serde(default)]
    pub blocking: bool,

    /// Where the packets come from
    #[serde(default)]
    pub source: SourceConfig,
}

/// Packet source backing a stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Generated packets at a fixed rate
    Synthetic(SyntheticConfig),

    /// Replay of a recorded YAML packet trace
    Trace {
        path: PathBuf,
        #[serde(default = "default_speed")]
        speed: f64,
    },
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Synthetic(SyntheticConfig::default())
    }
}

/// Settings for generated packets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticConfig {
    /// Frames per second
    #[serde(default = "default_fps")]
    pub fps: f64,

    /// Bytes per payload
    #[serde(default)]
    pub payload_bytes: usize,

    /// Skip every Nth sequence number to simulate loss
    #[serde(default)]
    pub drop_every: Option<u64>,

    /// Capture-to-host transport delay in milliseconds
    #[serde(default)]
    pub latency_ms: f64,

    /// Stop after this many packets
    #[serde(default)]
    pub frames: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self { fps: default_fps(), payload_bytes: 0, drop_every: None, latency_ms: 0.0, frames: None }
    }
}

/// Host loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// How queues are consumed
    #[serde(default)]
    pub policy: DrainPolicy,

    /// Rate window length in samples
    #[serde(default = "default_window")]
    pub window_size: NonZeroUsize,

    /// Timestamp feeding the rate window
    #[serde(default)]
    pub rate_clock: RateClock,

    /// Stream other streams' capture times are compared against
    #[serde(default)]
    pub reference_stream: Option<String>,

    /// How often snapshots are reported
    #[serde(default)]
    pub report_rate: UpdateRate,

    /// Directory receiving raw payloads, one file per stream
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Extension of payload files
    #[serde(default = "default_extension")]
    pub output_extension: String,

    /// Sleep between empty non-blocking polls, milliseconds
    #[serde(default = "default_idle_ms")]
    pub idle_backoff_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            policy: DrainPolicy::default(),
            window_size: default_window(),
            rate_clock: RateClock::default(),
            reference_stream: None,
            report_rate: UpdateRate::default(),
            output_dir: None,
            output_extension: default_extension(),
            idle_backoff_ms: default_idle_ms(),
        }
    }
}

fn default_max_size() -> usize {
    4
}

fn default_speed() -> f64 {
    1.0
}

fn default_fps() -> f64 {
    30.0
}

fn default_window() -> NonZeroUsize {
    RateEstimator::DEFAULT_WINDOW
}

fn default_extension() -> String {
    "bin".to_string()
}

fn default_idle_ms() -> u64 {
    1
}

impl SessionConfig {
    /// Parse and validate a YAML session description
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: SessionConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        debug!(streams = config.streams.len(), policy = ?config.monitor.policy, "Session config loaded");
        Ok(config)
    }

    /// Read, parse and validate a YAML session file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            StreamError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.streams.is_empty() {
            return Err(StreamError::config("at least one stream is required"));
        }

        let mut seen = HashSet::new();
        for stream in &self.streams {
            if stream.name.is_empty() {
                return Err(StreamError::config("stream names must not be empty"));
            }
            if !seen.insert(stream.name.as_str()) {
                return Err(StreamError::config(format!("duplicate stream '{}'", stream.name)));
            }
            if stream.max_size == 0 {
                return Err(StreamError::config(format!(
                    "stream '{}' needs a queue size of at least 1",
                    stream.name
                )));
            }
            match &stream.source {
                SourceConfig::Synthetic(synthetic) => {
                    if !(synthetic.fps.is_finite() && synthetic.fps > 0.0) {
                        return Err(StreamError::config(format!(
                            "stream '{}' needs a positive fps, got {}",
                            stream.name, synthetic.fps
                        )));
                    }
                    if !synthetic.latency_ms.is_finite() {
                        return Err(StreamError::config(format!(
                            "stream '{}' latency must be finite",
                            stream.name
                        )));
                    }
                }
                SourceConfig::Trace { speed, .. } => {
                    if !(MIN_SPEED..=MAX_SPEED).contains(speed) {
                        return Err(StreamError::config(format!(
                            "stream '{}' replay speed must be within {}..={}, got {}",
                            stream.name, MIN_SPEED, MAX_SPEED, speed
                        )));
                    }
                }
            }
        }

        if let Some(reference) = &self.monitor.reference_stream {
            if !seen.contains(reference.as_str()) {
                return Err(StreamError::config(format!(
                    "reference stream '{}' is not declared",
                    reference
                )));
            }
        }

        Ok(())
    }

    /// Names of all declared streams, in declaration order
    pub fn stream_names(&self) -> Vec<String> {
        self.streams.iter().map(|s| s.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEREO: &str = r#"
streams:
  - name: left
    max_size: 1
    blocking: true
    source: { kind: synthetic, fps: 55, drop_every: 40 }
  - name: right
    max_size: 1
    blocking: true
monitor:
  policy: blocking
  window_size: 10
  reference_stream: left
  report_rate: { max: 2 }
"#;

    #[test]
    fn parses_full_session() {
        let config = SessionConfig::from_yaml_str(STEREO).expect("valid config");
        assert_eq!(config.stream_names(), vec!["left", "right"]);
        assert_eq!(config.streams[0].max_size, 1);
        assert!(config.streams[0].blocking);
        assert_eq!(
            config.streams[0].source,
            SourceConfig::Synthetic(SyntheticConfig {
                fps: 55.0,
                drop_every: Some(40),
                ..Default::default()
            })
        );
        assert_eq!(config.streams[1].source, SourceConfig::default());
        assert_eq!(config.monitor.policy, DrainPolicy::Blocking);
        assert_eq!(config.monitor.window_size.get(), 10);
        assert_eq!(config.monitor.report_rate, UpdateRate::Max(2));
        assert_eq!(config.monitor.reference_stream.as_deref(), Some("left"));
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let config = SessionConfig::from_yaml_str("streams:\n  - name: rgb\n").expect("valid");
        assert_eq!(config.streams[0].max_size, 4);
        assert!(!config.streams[0].blocking);
        assert_eq!(config.monitor, MonitorConfig::default());
        assert_eq!(config.monitor.window_size.get(), 30);
    }

    #[test]
    fn parses_trace_source() {
        let yaml = "streams:\n  - name: imu\n    source: { kind: trace, path: imu.yaml, speed: 2.0 }\n";
        let config = SessionConfig::from_yaml_str(yaml).expect("valid");
        assert_eq!(
            config.streams[0].source,
            SourceConfig::Trace { path: PathBuf::from("imu.yaml"), speed: 2.0 }
        );
    }

    #[test]
    fn rejects_invalid_sessions() {
        let cases = [
            "streams: []\n",
            "streams:\n  - name: a\n  - name: a\n",
            "streams:\n  - name: a\n    max_size: 0\n",
            "streams:\n  - name: a\n    source: { kind: synthetic, fps: 0 }\n",
            "streams:\n  - name: a\nmonitor:\n  reference_stream: b\n",
            "streams:\n  - name: a\nmonitor:\n  window_size: 0\n",
            "streams:\n  - name: a\n    source: { kind: trace, path: a.yaml, speed: 20.0 }\n",
            "streams:\n  - name: a\n    source: { kind: trace, path: a.yaml, speed: 0.01 }\n",
        ];
        for yaml in cases {
            let result = SessionConfig::from_yaml_str(yaml);
            assert!(matches!(result, Err(StreamError::Config { .. })), "accepted: {yaml}");
        }
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let result = SessionConfig::from_file("/nonexistent/depthwatch/session.yaml");
        assert!(matches!(result, Err(StreamError::Config { .. })));
    }
}
