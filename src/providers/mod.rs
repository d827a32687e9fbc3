//! Built-in packet providers

pub mod synthetic;
pub mod trace;

pub use synthetic::SyntheticProvider;
pub use trace::{TraceProvider, TraceRecord};

use crate::Result;
use crate::config::{SourceConfig, StreamConfig};
use crate::provider::Provider;

/// Build the provider a stream's source section describes
pub fn from_config(stream: &StreamConfig) -> Result<Box<dyn Provider>> {
    let provider: Box<dyn Provider> = match &stream.source {
        SourceConfig::Synthetic(config) => {
            Box::new(SyntheticProvider::new(stream.name.as_str(), config.clone()))
        }
        SourceConfig::Trace { path, speed } => {
            Box::new(TraceProvider::open(stream.name.as_str(), path, *speed)?)
        }
    };
    Ok(provider)
}
