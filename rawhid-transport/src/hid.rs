//! hidapi-backed transport for real devices

use std::collections::BTreeMap;

use hidapi::{DeviceInfo, HidApi, HidDevice};
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::profile::DeviceProfile;
use crate::{HidHandle, RawHid, REPORT_SIZE};

/// One line of `--list` output
#[derive(Debug, Clone)]
pub struct HidDeviceSummary {
    pub vendor_id: u16,
    pub product_id: u16,
    pub usage_page: u16,
    pub usage: u16,
    pub interface_number: i32,
    pub product: Option<String>,
    pub path: String,
}

/// Raw HID transport over hidapi
///
/// Every opened interface gets its own handle. Handles are never reused
/// within one process, so a stale handle can not alias a newer device.
pub struct HidApiTransport {
    api: HidApi,
    devices: BTreeMap<HidHandle, HidDevice>,
    next_handle: usize,
}

impl HidApiTransport {
    /// Initialize hidapi
    pub fn new() -> Result<Self, TransportError> {
        let api = HidApi::new()?;
        Ok(Self {
            api,
            devices: BTreeMap::new(),
            next_handle: 0,
        })
    }

    /// Every HID interface currently visible to hidapi
    pub fn device_summaries(&mut self) -> Result<Vec<HidDeviceSummary>, TransportError> {
        self.api.refresh_devices()?;
        Ok(self
            .api
            .device_list()
            .map(|d| HidDeviceSummary {
                vendor_id: d.vendor_id(),
                product_id: d.product_id(),
                usage_page: d.usage_page(),
                usage: d.usage(),
                interface_number: d.interface_number(),
                product: d.product_string().map(|s| s.to_string()),
                path: d.path().to_string_lossy().to_string(),
            })
            .collect())
    }

    fn device(&self, handle: HidHandle) -> Result<&HidDevice, TransportError> {
        self.devices
            .get(&handle)
            .ok_or(TransportError::UnknownHandle(handle))
    }
}

impl RawHid for HidApiTransport {
    fn open(
        &mut self,
        max: usize,
        profile: &DeviceProfile,
    ) -> Result<Vec<HidHandle>, TransportError> {
        self.api.refresh_devices()?;

        let candidates: Vec<DeviceInfo> = self
            .api
            .device_list()
            .filter(|d| profile.matches(d.vendor_id(), d.product_id(), d.usage_page(), d.usage()))
            .take(max)
            .cloned()
            .collect();

        let mut handles = Vec::with_capacity(candidates.len());
        for info in candidates {
            match info.open_device(&self.api) {
                Ok(device) => {
                    let handle = HidHandle(self.next_handle);
                    self.next_handle += 1;
                    debug!(
                        "Opened {} as {} path={}",
                        profile,
                        handle,
                        info.path().to_string_lossy()
                    );
                    self.devices.insert(handle, device);
                    handles.push(handle);
                }
                Err(e) => {
                    warn!(
                        "Failed to open {} at {}: {}",
                        profile,
                        info.path().to_string_lossy(),
                        TransportError::from(e)
                    );
                }
            }
        }

        Ok(handles)
    }

    /// hidapi writes have no timeout of their own; `_timeout_ms` is accepted
    /// for contract compatibility and the write blocks until the OS takes it.
    fn send(
        &mut self,
        handle: HidHandle,
        report: &[u8; REPORT_SIZE],
        _timeout_ms: u32,
    ) -> Result<usize, TransportError> {
        let device = self.device(handle)?;

        // Report ID 0 prefix, then the 64 report bytes
        let mut buf = [0u8; REPORT_SIZE + 1];
        buf[1..].copy_from_slice(report);

        let written = device.write(&buf)?.saturating_sub(1);
        if written < REPORT_SIZE {
            return Err(TransportError::ShortWrite {
                written,
                expected: REPORT_SIZE,
            });
        }
        Ok(REPORT_SIZE)
    }

    fn receive(
        &mut self,
        handle: HidHandle,
        buf: &mut [u8; REPORT_SIZE],
        timeout_ms: u32,
    ) -> Result<usize, TransportError> {
        let device = self.device(handle)?;
        let timeout = i32::try_from(timeout_ms).unwrap_or(i32::MAX);
        Ok(device.read_timeout(buf, timeout)?)
    }

    fn close(&mut self, handle: HidHandle) {
        if self.devices.remove(&handle).is_some() {
            debug!("Closed {}", handle);
        }
    }
}
