//! Hardware capability boundary.
//!
//! The vendor driver is treated as an opaque capability: enumerate, open,
//! configure, start/stop streaming, close. [`AirspyDriver`] and
//! [`DeviceHandle`] capture exactly that surface so the rest of the crate
//! never touches libairspy directly. Enable the `hardware` feature to compile
//! the real binding; without it [`default_driver`] returns a stub that
//! enumerates nothing.

#[cfg(feature = "hardware")]
pub mod ffi;

use num_complex::Complex32;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by the vendor driver boundary.
///
/// These never cross into the host application; every caller converts them
/// into a log entry plus a safe fallback state.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The device could not be opened (absent, busy, or permission denied).
    #[error("could not open device {serial}: error {code}")]
    Open { serial: String, code: i32 },

    /// A register or streaming call failed on an open handle.
    #[error("{call} failed: error {code}")]
    Call { call: &'static str, code: i32 },

    /// No usable backend on this build (`hardware` feature disabled).
    #[error("hardware support not compiled in (enable the 'hardware' feature)")]
    Unavailable,
}

/// Callback invoked by the driver's streaming thread with each block of
/// interleaved complex samples.
///
/// Returning `false` tells the driver to cease invoking the callback; this is
/// how a stopped stream terminates the vendor's RX thread.
pub type SampleCallback = Box<dyn FnMut(&[Complex32]) -> bool + Send>;

/// An open device. Closing is dropping: the handle owns the vendor device and
/// releases it (halting any streaming thread) when dropped.
pub trait DeviceHandle: Send {
    /// Sample rates supported by this device, in Hz, as reported by hardware.
    fn supported_sample_rates(&self) -> Result<Vec<u32>, DriverError>;

    fn set_sample_rate(&self, hz: u32) -> Result<(), DriverError>;
    fn set_frequency(&self, hz: f64) -> Result<(), DriverError>;
    fn set_lna_gain(&self, gain: i32) -> Result<(), DriverError>;
    fn set_mixer_gain(&self, gain: i32) -> Result<(), DriverError>;
    fn set_vga_gain(&self, gain: i32) -> Result<(), DriverError>;
    fn set_sensitivity_gain(&self, gain: i32) -> Result<(), DriverError>;
    fn set_linearity_gain(&self, gain: i32) -> Result<(), DriverError>;
    fn set_lna_agc(&self, enabled: bool) -> Result<(), DriverError>;
    fn set_mixer_agc(&self, enabled: bool) -> Result<(), DriverError>;
    fn set_rf_bias(&self, enabled: bool) -> Result<(), DriverError>;

    /// Install the streaming callback and start the vendor RX thread.
    fn start_rx(&mut self, callback: SampleCallback) -> Result<(), DriverError>;
}

/// Device enumeration and opening.
pub trait AirspyDriver: Send + Sync {
    /// Serial numbers of all attached devices. An empty list is a valid
    /// result, not an error.
    fn list_devices(&self) -> Vec<u64>;

    /// Open a device by serial number.
    fn open(&self, serial: u64) -> Result<Box<dyn DeviceHandle>, DriverError>;
}

/// Stub driver used when the `hardware` feature is disabled.
#[cfg(not(feature = "hardware"))]
#[derive(Debug)]
struct StubDriver;

#[cfg(not(feature = "hardware"))]
impl AirspyDriver for StubDriver {
    fn list_devices(&self) -> Vec<u64> {
        log::warn!("Airspy hardware support not compiled (enable 'hardware' feature)");
        Vec::new()
    }

    fn open(&self, _serial: u64) -> Result<Box<dyn DeviceHandle>, DriverError> {
        Err(DriverError::Unavailable)
    }
}

/// The platform driver: the libairspy binding when compiled with the
/// `hardware` feature, otherwise a stub that enumerates nothing.
#[must_use]
pub fn default_driver() -> Arc<dyn AirspyDriver> {
    #[cfg(feature = "hardware")]
    {
        Arc::new(ffi::LibAirspyDriver::new())
    }
    #[cfg(not(feature = "hardware"))]
    {
        Arc::new(StubDriver)
    }
}
