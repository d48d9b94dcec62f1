//! Listener error types
//!
//! Display strings are what the operator sees on the console. Several of them
//! are matched by existing front-end scripts, so keep the wording stable.

use std::path::PathBuf;

use rawhid_transport::TransportError;
use thiserror::Error;

use crate::command::CommandError;
use crate::packet::PacketError;

/// Errors from listener operations
#[derive(Error, Debug)]
pub enum ListenerError {
    /// No device matched any configured profile
    #[error("no rawhid device found")]
    DeviceNotFound,

    #[error("Device already open!")]
    DeviceAlreadyOpen,

    #[error("Device not open!")]
    DeviceNotOpen,

    /// Devices were found but none reported the requested identity
    #[error("Could not open device.")]
    NoMatchingIdentity(u8),

    /// A chunk could not be sent within the retry budget
    #[error("Giving up on send after {attempts} attempt(s): {source}")]
    SendFailure {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// Receive failed; the device has been closed
    #[error("error reading, device went offline")]
    DeviceOffline(#[source] TransportError),

    #[error(transparent)]
    Packet(#[from] PacketError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Could not open {}: {source}", path.display())]
    SinkOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed writing data stream {stream}: {source}")]
    SinkWrite {
        stream: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
