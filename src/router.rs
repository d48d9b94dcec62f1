//! Routing of binary data packets to the console and to log files

use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::console::Console;
use crate::error::ListenerError;
use crate::packet::StreamId;

/// Open append-mode log file for one stream
struct FileSink {
    path: PathBuf,
    file: File,
}

/// Per-stream routing state
#[derive(Default)]
struct StreamChannel {
    /// Hex-dump every packet of this stream to the console
    echo: bool,
    sink: Option<FileSink>,
}

/// Routing table for the three data streams
#[derive(Default)]
pub struct StreamRouter {
    channels: [StreamChannel; 3],
}

impl StreamRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn echo(&self, stream: StreamId) -> bool {
        self.channels[stream.index()].echo
    }

    pub fn set_echo(&mut self, stream: StreamId, enabled: bool) {
        self.channels[stream.index()].echo = enabled;
    }

    /// Path of the stream's open log file, if any
    pub fn sink_path(&self, stream: StreamId) -> Option<&Path> {
        self.channels[stream.index()]
            .sink
            .as_ref()
            .map(|s| s.path.as_path())
    }

    /// Replace the stream's log file
    ///
    /// Any previous file is closed first. With `None` the stream is left
    /// without a file. If `path` can not be opened the stream is also left
    /// without a file.
    pub fn set_sink(&mut self, stream: StreamId, path: Option<&Path>) -> Result<(), ListenerError> {
        let channel = &mut self.channels[stream.index()];
        if let Some(old) = channel.sink.take() {
            debug!("Closing data stream {} file {}", stream.index(), old.path.display());
        }

        let Some(path) = path else {
            return Ok(());
        };
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| ListenerError::SinkOpen {
                path: path.to_path_buf(),
                source,
            })?;
        info!("Data stream {} -> {}", stream.index(), path.display());
        channel.sink = Some(FileSink {
            path: path.to_path_buf(),
            file,
        });
        Ok(())
    }

    /// Close every log file
    pub fn close_all(&mut self) {
        for channel in &mut self.channels {
            channel.sink = None;
        }
    }

    /// Deliver one data packet
    ///
    /// `packet` is the full received buffer (for the console dump), `payload`
    /// the decoded payload (for the file).
    pub fn route(
        &mut self,
        stream: StreamId,
        packet: &[u8],
        payload: &[u8],
        console: &mut Console,
    ) -> Result<(), ListenerError> {
        let channel = &mut self.channels[stream.index()];
        if channel.echo {
            console.text(hex_dump(packet));
        }
        if let Some(sink) = channel.sink.as_mut() {
            sink.file
                .write_all(payload)
                .map_err(|source| ListenerError::SinkWrite {
                    stream: stream.index(),
                    source,
                })?;
        }
        Ok(())
    }
}

/// Console packet dump: a `recv N bytes:` line, then 16 hex bytes per line
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = format!("\nrecv {} bytes:\n", bytes.len());
    for row in bytes.chunks(16) {
        for (i, b) in row.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let _ = write!(out, "{b:02X}");
        }
        out.push('\n');
    }
    out
}
