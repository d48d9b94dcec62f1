//! Device profiles - which HID interfaces count as a rawhid device
//!
//! A profile is the VID/PID pair plus the vendor usage page/usage of the raw
//! HID interface. Devices are always searched profile by profile, in order.

use std::fmt;

use serde::{Deserialize, Serialize};

/// VID/PID/usage tuple identifying a raw HID interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// HID usage page of the raw interface
    pub usage_page: u16,
    /// HID usage of the raw interface
    pub usage: u16,
}

/// Teensy raw HID firmware built from the C example (16C0:0480:FFAB:0200)
pub const TEENSY_RAWHID: DeviceProfile = DeviceProfile::new(0x16C0, 0x0480, 0xFFAB, 0x0200);

/// Teensyduino raw HID firmware (16C0:0486:FFAB:0200)
pub const ARDUINO_RAWHID: DeviceProfile = DeviceProfile::new(0x16C0, 0x0486, 0xFFAB, 0x0200);

/// Profiles tried, in order, whenever a device is opened
pub const DEFAULT_PROFILES: &[DeviceProfile] = &[TEENSY_RAWHID, ARDUINO_RAWHID];

impl DeviceProfile {
    pub const fn new(vendor_id: u16, product_id: u16, usage_page: u16, usage: u16) -> Self {
        Self {
            vendor_id,
            product_id,
            usage_page,
            usage,
        }
    }

    /// Check whether an enumerated interface belongs to this profile
    #[inline]
    pub fn matches(&self, vendor_id: u16, product_id: u16, usage_page: u16, usage: u16) -> bool {
        self.vendor_id == vendor_id
            && self.product_id == product_id
            && self.usage_page == usage_page
            && self.usage == usage
    }
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04X}:{:04X}:{:04X}:{:04X}",
            self.vendor_id, self.product_id, self.usage_page, self.usage
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_order() {
        assert_eq!(DEFAULT_PROFILES[0], TEENSY_RAWHID);
        assert_eq!(DEFAULT_PROFILES[1], ARDUINO_RAWHID);
    }

    #[test]
    fn test_matches_requires_all_fields() {
        assert!(TEENSY_RAWHID.matches(0x16C0, 0x0480, 0xFFAB, 0x0200));
        assert!(!TEENSY_RAWHID.matches(0x16C0, 0x0486, 0xFFAB, 0x0200));
        assert!(!TEENSY_RAWHID.matches(0x16C0, 0x0480, 0xFF00, 0x0200));
        assert!(!TEENSY_RAWHID.matches(0x16C0, 0x0480, 0xFFAB, 0x0001));
    }

    #[test]
    fn test_display() {
        assert_eq!(ARDUINO_RAWHID.to_string(), "16C0:0486:FFAB:0200");
    }
}
