//! In-memory simulated devices
//!
//! `SimulatedTransport` implements [`RawHid`] over scripted devices so the
//! session, discovery and listener logic can be exercised without hardware.
//! The transport is a cheap clone around shared state: keep one clone for
//! inspection and hand the other to the code under test.
//!
//! ```text
//! test ──clone──> SimulatedTransport ──> session (boxed RawHid)
//!   │                    │
//!   └── queue_report ───>│ inbox ──receive──> session
//!   <── sent_reports ────│ <──send── session
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::TransportError;
use crate::profile::DeviceProfile;
use crate::{HidHandle, RawHid, REPORT_SIZE};

/// Device-side reaction to a report sent by the host
///
/// Returning `Some(bytes)` queues `bytes` as the device's next inbound report.
pub type Responder = Box<dyn FnMut(&[u8; REPORT_SIZE]) -> Option<Vec<u8>> + Send>;

/// Index of a simulated device (stable for the transport's lifetime)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimDeviceId(usize);

struct SimDevice {
    profile: DeviceProfile,
    inbox: VecDeque<Vec<u8>>,
    sent: Vec<[u8; REPORT_SIZE]>,
    responder: Option<Responder>,
    failing_sends: usize,
    failing_receives: usize,
    unplugged: bool,
    receive_calls: usize,
    opens: usize,
    closes: usize,
}

#[derive(Default)]
struct SimState {
    devices: Vec<SimDevice>,
    handles: BTreeMap<HidHandle, usize>,
    next_handle: usize,
}

impl SimState {
    fn device_mut(&mut self, handle: HidHandle) -> Result<&mut SimDevice, TransportError> {
        let index = *self
            .handles
            .get(&handle)
            .ok_or(TransportError::UnknownHandle(handle))?;
        Ok(&mut self.devices[index])
    }
}

/// Scriptable transport backed by in-memory devices
#[derive(Clone, Default)]
pub struct SimulatedTransport {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plug in a device answering to `profile`
    pub fn add_device(&self, profile: DeviceProfile) -> SimDeviceId {
        let mut state = self.state.lock();
        state.devices.push(SimDevice {
            profile,
            inbox: VecDeque::new(),
            sent: Vec::new(),
            responder: None,
            failing_sends: 0,
            failing_receives: 0,
            unplugged: false,
            receive_calls: 0,
            opens: 0,
            closes: 0,
        });
        SimDeviceId(state.devices.len() - 1)
    }

    /// Install a responder that reacts to every report the host sends
    pub fn set_responder(&self, id: SimDeviceId, responder: Responder) {
        self.state.lock().devices[id.0].responder = Some(responder);
    }

    /// Queue a report for the host to receive (may be shorter than 64 bytes)
    pub fn queue_report(&self, id: SimDeviceId, report: &[u8]) {
        self.state.lock().devices[id.0]
            .inbox
            .push_back(report.to_vec());
    }

    /// Make the next `count` sends to this device fail
    pub fn fail_sends(&self, id: SimDeviceId, count: usize) {
        self.state.lock().devices[id.0].failing_sends = count;
    }

    /// Make the next `count` receives from this device fail
    pub fn fail_receives(&self, id: SimDeviceId, count: usize) {
        self.state.lock().devices[id.0].failing_receives = count;
    }

    /// Simulate a cable pull: every later send/receive on open handles fails
    /// and the device no longer enumerates.
    pub fn unplug(&self, id: SimDeviceId) {
        self.state.lock().devices[id.0].unplugged = true;
    }

    /// Reports the host successfully sent to this device
    pub fn sent_reports(&self, id: SimDeviceId) -> Vec<[u8; REPORT_SIZE]> {
        self.state.lock().devices[id.0].sent.clone()
    }

    /// Number of receive attempts made against this device
    pub fn receive_calls(&self, id: SimDeviceId) -> usize {
        self.state.lock().devices[id.0].receive_calls
    }

    /// Number of times this device was opened
    pub fn open_count(&self, id: SimDeviceId) -> usize {
        self.state.lock().devices[id.0].opens
    }

    /// Number of times a handle to this device was closed
    pub fn close_count(&self, id: SimDeviceId) -> usize {
        self.state.lock().devices[id.0].closes
    }

    /// Handles currently open across all devices
    pub fn open_handles(&self) -> Vec<HidHandle> {
        self.state.lock().handles.keys().copied().collect()
    }

    /// Device behind an open handle
    pub fn device_for(&self, handle: HidHandle) -> Option<SimDeviceId> {
        self.state.lock().handles.get(&handle).copied().map(SimDeviceId)
    }
}

impl RawHid for SimulatedTransport {
    fn open(
        &mut self,
        max: usize,
        profile: &DeviceProfile,
    ) -> Result<Vec<HidHandle>, TransportError> {
        let mut state = self.state.lock();
        let matching: Vec<usize> = state
            .devices
            .iter()
            .enumerate()
            .filter(|(_, d)| d.profile == *profile && !d.unplugged)
            .map(|(i, _)| i)
            .take(max)
            .collect();

        let mut handles = Vec::with_capacity(matching.len());
        for index in matching {
            let handle = HidHandle(state.next_handle);
            state.next_handle += 1;
            state.handles.insert(handle, index);
            state.devices[index].opens += 1;
            handles.push(handle);
        }
        debug!("Simulated open {}: {:?}", profile, handles);
        Ok(handles)
    }

    fn send(
        &mut self,
        handle: HidHandle,
        report: &[u8; REPORT_SIZE],
        _timeout_ms: u32,
    ) -> Result<usize, TransportError> {
        let mut state = self.state.lock();
        let device = state.device_mut(handle)?;
        if device.unplugged {
            return Err(TransportError::Disconnected);
        }
        if device.failing_sends > 0 {
            device.failing_sends -= 1;
            return Err(TransportError::HidError("simulated write failure".into()));
        }

        device.sent.push(*report);
        if let Some(reply) = device.responder.as_mut().and_then(|r| r(report)) {
            device.inbox.push_back(reply);
        }
        Ok(REPORT_SIZE)
    }

    fn receive(
        &mut self,
        handle: HidHandle,
        buf: &mut [u8; REPORT_SIZE],
        timeout_ms: u32,
    ) -> Result<usize, TransportError> {
        let next = {
            let mut state = self.state.lock();
            let device = state.device_mut(handle)?;
            device.receive_calls += 1;
            if device.unplugged {
                return Err(TransportError::Disconnected);
            }
            if device.failing_receives > 0 {
                device.failing_receives -= 1;
                return Err(TransportError::HidError("simulated read failure".into()));
            }
            device.inbox.pop_front()
        };

        match next {
            Some(report) => {
                let len = report.len().min(REPORT_SIZE);
                buf[..len].copy_from_slice(&report[..len]);
                Ok(len)
            }
            None => {
                // Idle devices time out, but keep tests fast
                if timeout_ms > 0 {
                    std::thread::sleep(Duration::from_millis(1));
                }
                Ok(0)
            }
        }
    }

    fn close(&mut self, handle: HidHandle) {
        let mut state = self.state.lock();
        if let Some(index) = state.handles.remove(&handle) {
            state.devices[index].closes += 1;
        }
    }
}
