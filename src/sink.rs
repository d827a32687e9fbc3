//! Output sinks for packet payloads

use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::types::Packet;
use crate::{Result, StreamError};

/// Destination for packets selected by the host loop
pub trait PacketSink: Send {
    /// Consume one packet
    fn write(&mut self, packet: &Packet) -> Result<()>;

    /// Flush and release everything held open.
    ///
    /// Called on every loop exit path; must be safe to call twice.
    fn close(&mut self) -> Result<()>;
}

/// Appends each stream's raw payload bytes to `<dir>/<stream>.<extension>`
///
/// Files are opened lazily on the first packet of a stream. Encoded
/// bitstreams written this way stay playable up to the last complete packet
/// when the loop is interrupted.
pub struct FileSink {
    dir: PathBuf,
    extension: String,
    files: HashMap<String, (PathBuf, BufWriter<File>)>,
    /// Streams whose file was created by this sink
    created: HashSet<String>,
    bytes_written: u64,
}

impl FileSink {
    /// Create the output directory if needed
    pub fn create<P: AsRef<Path>>(dir: P, extension: impl Into<String>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| StreamError::sink_error(dir.clone(), e))?;
        Ok(Self {
            dir,
            extension: extension.into(),
            files: HashMap::new(),
            created: HashSet::new(),
            bytes_written: 0,
        })
    }

    /// Path the payloads of `stream` go to
    pub fn path_for(&self, stream: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", stream, self.extension))
    }

    /// Payload bytes accepted so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl PacketSink for FileSink {
    fn write(&mut self, packet: &Packet) -> Result<()> {
        let stream = packet.stream.as_ref();
        if !self.files.contains_key(stream) {
            let path = self.path_for(stream);
            // A stream written before a close continues its file
            let file = if self.created.insert(stream.to_string()) {
                File::create(&path)
            } else {
                OpenOptions::new().append(true).open(&path)
            }
            .map_err(|e| StreamError::sink_error(path.clone(), e))?;
            info!("Opened for writing: {}", path.display());
            self.files.insert(stream.to_string(), (path, BufWriter::new(file)));
        }

        if let Some((path, writer)) = self.files.get_mut(stream) {
            writer.write_all(&packet.payload).map_err(|e| StreamError::sink_error(path.clone(), e))?;
        }
        self.bytes_written += packet.len() as u64;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut first_error = None;
        for (stream, (path, mut writer)) in self.files.drain() {
            match writer.flush() {
                Ok(()) => debug!(stream = %stream, "Flushed {}", path.display()),
                Err(e) => {
                    first_error.get_or_insert(StreamError::sink_error(path, e));
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
