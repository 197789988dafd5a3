//! Device discovery.
//!
//! One enumeration pass produces an ordered list of [`DeviceRecord`]s with
//! canonical hex labels; the list is replaced wholesale on every refresh.
//! An empty list simply means no devices are attached.

use crate::hal::AirspyDriver;
use std::sync::Arc;

/// Upper bound on devices retained from one enumeration pass.
pub const MAX_DEVICES: usize = 256;

/// One enumerated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Hardware serial number.
    pub serial: u64,
    /// Canonical display label: fixed-width uppercase hex.
    pub label: String,
}

/// Canonical device label for a serial number (16 uppercase hex digits).
#[must_use]
pub fn format_serial(serial: u64) -> String {
    format!("{serial:016X}")
}

/// Maintains the current device list.
pub struct DeviceEnumerator {
    driver: Arc<dyn AirspyDriver>,
    devices: Vec<DeviceRecord>,
}

impl std::fmt::Debug for DeviceEnumerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceEnumerator")
            .field("devices", &self.devices)
            .finish_non_exhaustive()
    }
}

impl DeviceEnumerator {
    #[must_use]
    pub fn new(driver: Arc<dyn AirspyDriver>) -> Self {
        Self {
            driver,
            devices: Vec::new(),
        }
    }

    /// Replace the device list with a fresh enumeration pass.
    pub fn refresh(&mut self) {
        self.devices.clear();
        for serial in self.driver.list_devices().into_iter().take(MAX_DEVICES) {
            self.devices.push(DeviceRecord {
                serial,
                label: format_serial(serial),
            });
        }
        log::debug!("Enumeration found {} Airspy device(s)", self.devices.len());
    }

    #[must_use]
    pub fn devices(&self) -> &[DeviceRecord] {
        &self.devices
    }

    /// Exact, case-sensitive label lookup.
    #[must_use]
    pub fn find_by_label(&self, label: &str) -> Option<&DeviceRecord> {
        self.devices.iter().find(|d| d.label == label)
    }

    #[must_use]
    pub fn first(&self) -> Option<&DeviceRecord> {
        self.devices.first()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::MockDriver;

    #[test]
    fn test_format_serial_fixed_width() {
        assert_eq!(format_serial(0x1111), "0000000000001111");
        assert_eq!(format_serial(0xDEAD_BEEF_0042_AAFF), "DEADBEEF0042AAFF");
    }

    #[test]
    fn test_refresh_replaces_list() {
        let driver = MockDriver::new(&[0x1111, 0x2222], &[]);
        let mut enumerator = DeviceEnumerator::new(driver.clone());
        enumerator.refresh();
        assert_eq!(enumerator.devices().len(), 2);

        driver.serials.lock().unwrap().clear();
        enumerator.refresh();
        assert!(enumerator.is_empty());
    }

    #[test]
    fn test_refresh_caps_at_max_devices() {
        let serials: Vec<u64> = (0..300).collect();
        let driver = MockDriver::new(&serials, &[]);
        let mut enumerator = DeviceEnumerator::new(driver);
        enumerator.refresh();
        assert_eq!(enumerator.devices().len(), MAX_DEVICES);
    }

    #[test]
    fn test_find_by_label_is_exact() {
        let driver = MockDriver::new(&[0xABCD], &[]);
        let mut enumerator = DeviceEnumerator::new(driver);
        enumerator.refresh();
        assert!(enumerator.find_by_label("000000000000ABCD").is_some());
        assert!(enumerator.find_by_label("000000000000abcd").is_none());
        assert!(enumerator.find_by_label("ABCD").is_none());
    }
}
