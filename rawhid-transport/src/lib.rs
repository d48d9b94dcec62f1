//! Transport abstraction layer for raw HID packet devices
//!
//! This crate exposes the four primitive operations the listener needs from
//! the link layer, independent of the backend doing the work:
//!
//! - `open` up to N devices matching a VID/PID/usage profile
//! - `send` one 64-byte report with a timeout
//! - `receive` one 64-byte report with a timeout
//! - `close` a handle
//!
//! Backends:
//!
//! - [`HidApiTransport`] - real devices through hidapi
//! - `SimulatedTransport` - scriptable in-memory devices for tests, built
//!   with the `testing` feature

pub mod error;
pub mod profile;
#[cfg(any(test, feature = "testing"))]
pub mod sim;

mod hid;

pub use error::TransportError;
pub use hid::{HidApiTransport, HidDeviceSummary};
pub use profile::{DeviceProfile, ARDUINO_RAWHID, DEFAULT_PROFILES, TEENSY_RAWHID};
#[cfg(any(test, feature = "testing"))]
pub use sim::{Responder, SimDeviceId, SimulatedTransport};

use std::fmt;

/// Size of every report exchanged with a device (without report ID)
pub const REPORT_SIZE: usize = 64;

/// Opaque handle for an open device connection
///
/// Handles are small integers allocated by the backend; they stay valid
/// until passed to [`RawHid::close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HidHandle(pub usize);

impl fmt::Display for HidHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The core transport trait - all backends implement this
///
/// Calls are synchronous and may block up to the given timeout. Callers are
/// expected to serialize access (the listener keeps the transport behind its
/// session lock).
pub trait RawHid: Send {
    /// Open up to `max` devices matching `profile`
    ///
    /// # Returns
    /// Handles of the devices that were opened (possibly empty)
    fn open(
        &mut self,
        max: usize,
        profile: &DeviceProfile,
    ) -> Result<Vec<HidHandle>, TransportError>;

    /// Send one report
    ///
    /// # Arguments
    /// * `handle` - Open device handle
    /// * `report` - Report data (without report ID)
    /// * `timeout_ms` - Upper bound on the write in milliseconds
    ///
    /// # Returns
    /// Number of report bytes written
    fn send(
        &mut self,
        handle: HidHandle,
        report: &[u8; REPORT_SIZE],
        timeout_ms: u32,
    ) -> Result<usize, TransportError>;

    /// Receive one report
    ///
    /// # Returns
    /// `Ok(0)` on timeout, otherwise the number of bytes written into `buf`
    fn receive(
        &mut self,
        handle: HidHandle,
        buf: &mut [u8; REPORT_SIZE],
        timeout_ms: u32,
    ) -> Result<usize, TransportError>;

    /// Close a handle. Closing an unknown handle is a no-op.
    fn close(&mut self, handle: HidHandle);
}

/// Type alias for a boxed transport
pub type BoxedTransport = Box<dyn RawHid>;
