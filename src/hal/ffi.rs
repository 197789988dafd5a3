//! libairspy binding.
//!
//! The vendor API hands sample blocks to a raw C callback with a `void*`
//! context; here the context is a heap-boxed Rust closure reclaimed when the
//! handle closes. Android has no generic USB enumeration, so the driver
//! reports a single synthetic device when the platform supplies a device
//! file descriptor.

use super::{AirspyDriver, DeviceHandle, DriverError, SampleCallback};
use crate::enumerate::{format_serial, MAX_DEVICES};
use num_complex::Complex32;
use std::os::raw::{c_int, c_void};
use std::ptr;
#[cfg(target_os = "android")]
use std::sync::atomic::{AtomicI32, Ordering};

const AIRSPY_SUCCESS: c_int = 0;

/// Serial reported for the file-descriptor-backed device on Android.
#[cfg(target_os = "android")]
pub const SYNTHETIC_SERIAL: u64 = 0xDEAD_BEEF;

#[repr(C)]
struct AirspyTransfer {
    device: *mut c_void,
    ctx: *mut c_void,
    samples: *mut c_void,
    sample_count: c_int,
    dropped_samples: u64,
    sample_type: c_int,
}

#[link(name = "airspy")]
extern "C" {
    fn airspy_init() -> c_int;
    fn airspy_exit() -> c_int;
    fn airspy_list_devices(serials: *mut u64, count: c_int) -> c_int;
    fn airspy_open_sn(device: *mut *mut c_void, serial_number: u64) -> c_int;
    #[cfg(target_os = "android")]
    fn airspy_open_fd(device: *mut *mut c_void, fd: c_int) -> c_int;
    fn airspy_close(device: *mut c_void) -> c_int;
    fn airspy_get_samplerates(device: *mut c_void, buffer: *mut u32, len: u32) -> c_int;
    fn airspy_set_samplerate(device: *mut c_void, samplerate: u32) -> c_int;
    fn airspy_set_freq(device: *mut c_void, freq_hz: u32) -> c_int;
    fn airspy_set_lna_gain(device: *mut c_void, value: u8) -> c_int;
    fn airspy_set_mixer_gain(device: *mut c_void, value: u8) -> c_int;
    fn airspy_set_vga_gain(device: *mut c_void, value: u8) -> c_int;
    fn airspy_set_sensitivity_gain(device: *mut c_void, value: u8) -> c_int;
    fn airspy_set_linearity_gain(device: *mut c_void, value: u8) -> c_int;
    fn airspy_set_lna_agc(device: *mut c_void, value: u8) -> c_int;
    fn airspy_set_mixer_agc(device: *mut c_void, value: u8) -> c_int;
    fn airspy_set_rf_bias(device: *mut c_void, value: u8) -> c_int;
    fn airspy_start_rx(
        device: *mut c_void,
        callback: unsafe extern "C" fn(*mut AirspyTransfer) -> c_int,
        ctx: *mut c_void,
    ) -> c_int;
    fn airspy_stop_rx(device: *mut c_void) -> c_int;
}

fn check(call: &'static str, code: c_int) -> Result<(), DriverError> {
    if code == AIRSPY_SUCCESS {
        Ok(())
    } else {
        Err(DriverError::Call { call, code })
    }
}

/// Context passed to the RX callback.
struct RxContext {
    callback: SampleCallback,
}

unsafe extern "C" fn rx_callback(transfer: *mut AirspyTransfer) -> c_int {
    // SAFETY: the driver guarantees a valid transfer whose ctx is the
    // RxContext installed by start_rx and whose samples point at
    // sample_count float32 IQ pairs (the library's default sample type).
    unsafe {
        let ctx = &mut *((*transfer).ctx as *mut RxContext);
        let count = (*transfer).sample_count as usize;
        let samples = std::slice::from_raw_parts((*transfer).samples as *const Complex32, count);
        if (ctx.callback)(samples) {
            0
        } else {
            -1
        }
    }
}

/// Driver backed by libairspy.
#[derive(Debug)]
pub struct LibAirspyDriver {
    #[cfg(target_os = "android")]
    device_fd: AtomicI32,
}

impl LibAirspyDriver {
    #[must_use]
    pub fn new() -> Self {
        // SAFETY: plain library init; paired with airspy_exit in Drop.
        let r = unsafe { airspy_init() };
        if r != AIRSPY_SUCCESS {
            log::error!("airspy_init failed: {r}");
        }
        Self {
            #[cfg(target_os = "android")]
            device_fd: AtomicI32::new(-1),
        }
    }

    /// Install the platform-provided USB device descriptor.
    #[cfg(target_os = "android")]
    pub fn set_device_fd(&self, fd: i32) {
        self.device_fd.store(fd, Ordering::Relaxed);
    }
}

impl Default for LibAirspyDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LibAirspyDriver {
    fn drop(&mut self) {
        // SAFETY: balances the airspy_init in new(); no handles outlive the
        // driver because every open handle holds its own device pointer.
        unsafe {
            airspy_exit();
        }
    }
}

impl AirspyDriver for LibAirspyDriver {
    #[cfg(not(target_os = "android"))]
    fn list_devices(&self) -> Vec<u64> {
        let mut serials = [0u64; MAX_DEVICES];
        // SAFETY: the buffer holds MAX_DEVICES u64 slots and the driver
        // writes at most that many serials.
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_possible_wrap,
            reason = "MAX_DEVICES is 256"
        )]
        let n = unsafe { airspy_list_devices(serials.as_mut_ptr(), MAX_DEVICES as c_int) };
        if n < 0 {
            log::error!("airspy_list_devices failed: {n}");
            return Vec::new();
        }
        serials[..n as usize].to_vec()
    }

    #[cfg(target_os = "android")]
    fn list_devices(&self) -> Vec<u64> {
        // No generic USB enumeration here; report the platform descriptor as
        // a single synthetic device when one was provided.
        if self.device_fd.load(Ordering::Relaxed) >= 0 {
            vec![SYNTHETIC_SERIAL]
        } else {
            Vec::new()
        }
    }

    fn open(&self, serial: u64) -> Result<Box<dyn DeviceHandle>, DriverError> {
        let mut dev: *mut c_void = ptr::null_mut();

        #[cfg(not(target_os = "android"))]
        // SAFETY: dev is a valid out-pointer; on success the driver hands us
        // an owned device pointer.
        let r = unsafe { airspy_open_sn(&mut dev, serial) };

        #[cfg(target_os = "android")]
        // SAFETY: as above, opening by the platform-provided descriptor.
        let r = unsafe { airspy_open_fd(&mut dev, self.device_fd.load(Ordering::Relaxed)) };

        if r != AIRSPY_SUCCESS {
            return Err(DriverError::Open {
                serial: format_serial(serial),
                code: r,
            });
        }

        Ok(Box::new(LibAirspyHandle {
            dev,
            ctx: ptr::null_mut(),
            streaming: false,
        }))
    }
}

/// An open libairspy device.
#[derive(Debug)]
pub struct LibAirspyHandle {
    dev: *mut c_void,
    /// RX context leaked to the driver while streaming; reclaimed on drop.
    ctx: *mut RxContext,
    streaming: bool,
}

// SAFETY: the device pointer has a single owner and libairspy serializes
// command-path calls internally.
unsafe impl Send for LibAirspyHandle {}

impl std::fmt::Debug for RxContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RxContext").finish_non_exhaustive()
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "gain and frequency values are range-checked by the caller"
)]
impl DeviceHandle for LibAirspyHandle {
    fn supported_sample_rates(&self) -> Result<Vec<u32>, DriverError> {
        let mut count: u32 = 0;
        // SAFETY: with len 0 the driver writes the rate count into the
        // single-element buffer.
        check("airspy_get_samplerates", unsafe {
            airspy_get_samplerates(self.dev, &mut count, 0)
        })?;
        let mut rates = vec![0u32; count as usize];
        // SAFETY: the buffer holds exactly `count` slots as reported above.
        check("airspy_get_samplerates", unsafe {
            airspy_get_samplerates(self.dev, rates.as_mut_ptr(), count)
        })?;
        Ok(rates)
    }

    fn set_sample_rate(&self, hz: u32) -> Result<(), DriverError> {
        // SAFETY: dev is the owned, open device pointer (all calls below).
        check("airspy_set_samplerate", unsafe {
            airspy_set_samplerate(self.dev, hz)
        })
    }

    fn set_frequency(&self, hz: f64) -> Result<(), DriverError> {
        // SAFETY: see set_sample_rate.
        check("airspy_set_freq", unsafe {
            airspy_set_freq(self.dev, hz as u32)
        })
    }

    fn set_lna_gain(&self, gain: i32) -> Result<(), DriverError> {
        // SAFETY: see set_sample_rate.
        check("airspy_set_lna_gain", unsafe {
            airspy_set_lna_gain(self.dev, gain as u8)
        })
    }

    fn set_mixer_gain(&self, gain: i32) -> Result<(), DriverError> {
        // SAFETY: see set_sample_rate.
        check("airspy_set_mixer_gain", unsafe {
            airspy_set_mixer_gain(self.dev, gain as u8)
        })
    }

    fn set_vga_gain(&self, gain: i32) -> Result<(), DriverError> {
        // SAFETY: see set_sample_rate.
        check("airspy_set_vga_gain", unsafe {
            airspy_set_vga_gain(self.dev, gain as u8)
        })
    }

    fn set_sensitivity_gain(&self, gain: i32) -> Result<(), DriverError> {
        // SAFETY: see set_sample_rate.
        check("airspy_set_sensitivity_gain", unsafe {
            airspy_set_sensitivity_gain(self.dev, gain as u8)
        })
    }

    fn set_linearity_gain(&self, gain: i32) -> Result<(), DriverError> {
        // SAFETY: see set_sample_rate.
        check("airspy_set_linearity_gain", unsafe {
            airspy_set_linearity_gain(self.dev, gain as u8)
        })
    }

    fn set_lna_agc(&self, enabled: bool) -> Result<(), DriverError> {
        // SAFETY: see set_sample_rate.
        check("airspy_set_lna_agc", unsafe {
            airspy_set_lna_agc(self.dev, u8::from(enabled))
        })
    }

    fn set_mixer_agc(&self, enabled: bool) -> Result<(), DriverError> {
        // SAFETY: see set_sample_rate.
        check("airspy_set_mixer_agc", unsafe {
            airspy_set_mixer_agc(self.dev, u8::from(enabled))
        })
    }

    fn set_rf_bias(&self, enabled: bool) -> Result<(), DriverError> {
        // SAFETY: see set_sample_rate.
        check("airspy_set_rf_bias", unsafe {
            airspy_set_rf_bias(self.dev, u8::from(enabled))
        })
    }

    fn start_rx(&mut self, callback: SampleCallback) -> Result<(), DriverError> {
        let ctx = Box::into_raw(Box::new(RxContext { callback }));
        // SAFETY: ctx stays alive until drop; the callback trampoline only
        // dereferences it while the driver is streaming.
        let r = unsafe { airspy_start_rx(self.dev, rx_callback, ctx.cast::<c_void>()) };
        if r != AIRSPY_SUCCESS {
            // SAFETY: the driver rejected the context, so we still own it.
            drop(unsafe { Box::from_raw(ctx) });
            return Err(DriverError::Call {
                call: "airspy_start_rx",
                code: r,
            });
        }
        self.ctx = ctx;
        self.streaming = true;
        Ok(())
    }
}

impl Drop for LibAirspyHandle {
    fn drop(&mut self) {
        // SAFETY: stop the RX thread before releasing the device, then
        // reclaim the context box the callback was using.
        unsafe {
            if self.streaming {
                airspy_stop_rx(self.dev);
            }
            airspy_close(self.dev);
            if !self.ctx.is_null() {
                drop(Box::from_raw(self.ctx));
            }
        }
    }
}
