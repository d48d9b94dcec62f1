//! Device discovery and identification
//!
//! Every firmware answers an identification query with its configured
//! numeric identity, which is how several identical boards on one host are
//! told apart. Discovery opens all matching devices, asks each one, and either
//! reports the answers or keeps exactly the device asked for.

use rawhid_transport::{DeviceProfile, HidHandle, RawHid};
use tracing::{debug, info};

use crate::config::ListenerConfig;
use crate::console::Console;
use crate::error::ListenerError;
use crate::packet::{build_identity_query, parse_identity_response, PACKET_SIZE};

/// Result of identifying one device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// Handle the device was probed through (closed after enumeration)
    pub handle: HidHandle,
    /// Identity reported by the device, `None` if it never answered
    pub identity: Option<u8>,
}

/// Open up to `max` devices, trying each profile in order
///
/// The first profile yielding any device wins; later profiles are not tried.
pub fn open_matching(
    transport: &mut dyn RawHid,
    profiles: &[DeviceProfile],
    max: usize,
) -> Result<Vec<HidHandle>, ListenerError> {
    for profile in profiles {
        let handles = transport.open(max, profile)?;
        if !handles.is_empty() {
            debug!("Profile {} matched {} device(s)", profile, handles.len());
            return Ok(handles);
        }
    }
    Err(ListenerError::DeviceNotFound)
}

/// Ask one device for its identity
///
/// Sends the identification query, then waits through up to
/// `identify_attempts` receive timeouts. Unrelated traffic is skipped; the
/// first identification response ends the wait, as does a receive failure.
pub fn identify(
    transport: &mut dyn RawHid,
    handle: HidHandle,
    config: &ListenerConfig,
) -> Option<u8> {
    if let Err(e) = transport.send(handle, &build_identity_query(), config.tx_timeout_ms) {
        debug!("Identity query to {} failed: {}", handle, e);
        return None;
    }

    let mut buf = [0u8; PACKET_SIZE];
    for _ in 0..config.identify_attempts {
        match transport.receive(handle, &mut buf, config.rx_timeout_ms) {
            Ok(0) => {}
            Ok(n) => {
                if let Some(identity) = parse_identity_response(&buf[..n]) {
                    debug!("Device {} has identity {}", handle, identity);
                    return Some(identity);
                }
            }
            Err(e) => {
                debug!("Receive from {} failed during identify: {}", handle, e);
                return None;
            }
        }
    }
    debug!("Device {} never answered the identity query", handle);
    None
}

/// Identify every attached device and print the identities
///
/// Each identity is printed as uppercase hex on its own line, followed by a
/// device count. No device is left open.
pub fn enumerate(
    transport: &mut dyn RawHid,
    config: &ListenerConfig,
    console: &mut Console,
) -> Result<Vec<DiscoveredDevice>, ListenerError> {
    let handles = open_matching(transport, &config.profiles, config.discovery_limit)?;

    let mut found = Vec::with_capacity(handles.len());
    for handle in handles {
        let identity = identify(transport, handle, config);
        if let Some(identity) = identity {
            console.line(format_args!("{identity:X}"));
        }
        transport.close(handle);
        found.push(DiscoveredDevice { handle, identity });
    }

    console.line(format_args!("Found {} devices", found.len()));
    Ok(found)
}

/// Open the device reporting `target`, closing every other candidate
pub fn open_by_identity(
    transport: &mut dyn RawHid,
    config: &ListenerConfig,
    target: u8,
) -> Result<HidHandle, ListenerError> {
    let handles = open_matching(transport, &config.profiles, config.discovery_limit)?;

    let mut kept = None;
    for handle in handles {
        if kept.is_none() && identify(transport, handle, config) == Some(target) {
            info!("Opened device {} as {}", target, handle);
            kept = Some(handle);
            continue;
        }
        transport.close(handle);
    }
    kept.ok_or(ListenerError::NoMatchingIdentity(target))
}
