// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The source itself: selection state, gain strategy, lifecycle, and the
//! handler record registered with the host.
//!
//! All control-surface operations are synchronous and complete before
//! returning. Hardware failures never escape as errors; they become log
//! entries plus a safe fallback state, because a fault crossing the source
//! boundary would destabilize the whole host application. Every mutation is
//! persisted under the selected device's serial before the operation
//! returns.

use crate::config::{ConfigStore, DEFAULT_SAMPLE_RATE};
use crate::enumerate::{format_serial, DeviceEnumerator, DeviceRecord};
use crate::gain::{self, AgcStage, GainMode, GainSettings, GainStage};
use crate::hal::{AirspyDriver, DeviceHandle, DriverError};
use crate::stream::{SampleStream, StreamReader};
use log::{error, info, warn};
use std::sync::{Arc, Mutex};

/// A selectable sample rate with its display label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRateOption {
    pub hertz: u32,
    pub label: String,
}

/// Format a rate the way the device menu shows it, e.g. `10.0MHz`.
#[must_use]
pub fn format_sample_rate(hz: u32) -> String {
    let bw = f64::from(hz);
    if bw >= 1_000_000.0 {
        format!("{:.1}MHz", bw / 1_000_000.0)
    } else if bw >= 1000.0 {
        format!("{:.1}KHz", bw / 1000.0)
    } else {
        format!("{bw:.1}Hz")
    }
}

/// The Airspy source core.
///
/// Owns the enumerator, the selection and gain state, the persistent
/// configuration handle, and the sample stream bridge. The open device handle
/// exists only while running and never leaves this struct.
pub struct AirspySource {
    driver: Arc<dyn AirspyDriver>,
    config: Arc<ConfigStore>,
    enumerator: DeviceEnumerator,

    selected_serial: u64,
    selected_label: String,
    sample_rates: Vec<SampleRateOption>,
    sr_id: usize,
    sample_rate: u32,

    gain_mode: GainMode,
    gains: GainSettings,
    bias_t: bool,
    freq: f64,

    running: bool,
    open_dev: Option<Box<dyn DeviceHandle>>,
    stream: SampleStream,
}

impl std::fmt::Debug for AirspySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AirspySource")
            .field("selected_label", &self.selected_label)
            .field("sample_rate", &self.sample_rate)
            .field("gain_mode", &self.gain_mode)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

impl AirspySource {
    /// Build the source: enumerate devices and restore the last selection
    /// from the persisted configuration, falling back to the first device.
    #[must_use]
    pub fn new(driver: Arc<dyn AirspyDriver>, config: Arc<ConfigStore>) -> Self {
        let mut source = Self {
            enumerator: DeviceEnumerator::new(Arc::clone(&driver)),
            driver,
            config,
            selected_serial: 0,
            selected_label: String::new(),
            sample_rates: Vec::new(),
            sr_id: 0,
            sample_rate: DEFAULT_SAMPLE_RATE,
            gain_mode: GainMode::default(),
            gains: GainSettings::default(),
            bias_t: false,
            freq: 0.0,
            running: false,
            open_dev: None,
            stream: SampleStream::new(),
        };
        source.enumerator.refresh();
        let last = source.config.last_device();
        source.select_by_label(&last);
        source
    }

    // ---- selection ----------------------------------------------------

    /// Select the device whose label matches exactly; fall back to the first
    /// enumerated device when the label is empty or unknown (e.g. first run).
    pub fn select_by_label(&mut self, label: &str) {
        let serial = self.enumerator.find_by_label(label).map(|d| d.serial);
        match serial {
            Some(serial) => self.select_by_serial(serial),
            None => self.select_first(),
        }
    }

    /// Select the first enumerated device, if any exist.
    pub fn select_first(&mut self) {
        if let Some(serial) = self.enumerator.first().map(|d| d.serial) {
            self.select_by_serial(serial);
        }
    }

    /// Probe-open the device to retrieve its supported sample rates, then
    /// restore (or create) its persisted configuration.
    ///
    /// The probe handle is released before returning; the persistent open
    /// happens in [`start`](Self::start). A failed probe aborts the
    /// selection: it is logged and `selected_serial` is zeroed so a later
    /// start refuses to run blind.
    pub fn select_by_serial(&mut self, serial: u64) {
        let label = format_serial(serial);
        let dev = match self.driver.open(serial) {
            Ok(dev) => dev,
            Err(e) => {
                error!("Could not open Airspy {label}: {e}");
                self.selected_serial = 0;
                return;
            }
        };

        let rates = match dev.supported_sample_rates() {
            Ok(rates) if !rates.is_empty() => rates,
            Ok(_) => {
                error!("Airspy {label} reported no sample rates");
                self.selected_serial = 0;
                return;
            }
            Err(e) => {
                error!("Could not query sample rates for Airspy {label}: {e}");
                self.selected_serial = 0;
                return;
            }
        };
        // Transient probe only; the handle is closed here
        drop(dev);

        self.selected_serial = serial;
        self.selected_label = label;
        self.sample_rates = rates
            .into_iter()
            .map(|hertz| SampleRateOption {
                hertz,
                label: format_sample_rate(hertz),
            })
            .collect();

        // Restore this device's settings, creating defaults on first sight
        let config = self.config.device_config(&self.selected_label);
        self.sr_id = self
            .sample_rates
            .iter()
            .position(|r| r.hertz == config.sample_rate)
            .unwrap_or(0);
        self.sample_rate = self.sample_rates[self.sr_id].hertz;
        self.gain_mode = config.gain_mode;
        self.gains = config.gains;
        self.bias_t = config.bias_t;

        info!(
            "Selected Airspy {} ({} sample rates)",
            self.selected_label,
            self.sample_rates.len()
        );
    }

    // ---- control surface ----------------------------------------------

    /// Device pick from the control panel. Also records the selection as the
    /// last-used device.
    pub fn select_device(&mut self, label: &str) {
        self.select_by_label(label);
        if !self.selected_label.is_empty() {
            let last = self.selected_label.clone();
            self.config.update(|doc| doc.device = last);
        }
    }

    /// Re-enumerate and re-select the persisted device (the panel's Refresh
    /// button).
    pub fn refresh_devices(&mut self) {
        self.enumerator.refresh();
        let last = self.config.last_device();
        self.select_by_label(&last);
    }

    /// Pick a sample rate by index into the current rate list. Applied to
    /// hardware on the next start.
    pub fn select_sample_rate(&mut self, index: usize) {
        if index >= self.sample_rates.len() {
            warn!("Sample rate index {index} out of range");
            return;
        }
        self.sr_id = index;
        self.sample_rate = self.sample_rates[index].hertz;
        let rate = self.sample_rate;
        self.persist(move |config| config.sample_rate = rate);
    }

    /// Switch the active gain strategy, reprogramming the hardware when
    /// running. Values belonging to the other strategies are untouched.
    pub fn select_gain_mode(&mut self, mode: GainMode) {
        self.gain_mode = mode;
        if let Some(dev) = &self.open_dev {
            if let Err(e) = gain::apply_mode(dev.as_ref(), mode, &self.gains) {
                warn!("Could not program gain mode: {e}");
            }
        }
        self.persist(move |config| config.gain_mode = mode);
    }

    /// Set one gain value, clamped to its hardware range. The register write
    /// is issued only while running and only when the stage is live under the
    /// active strategy (an AGC-governed stage is not written).
    pub fn set_gain(&mut self, stage: GainStage, value: i32) {
        let value = value.clamp(0, stage.max());
        match stage {
            GainStage::Sensitive => self.gains.sensitive_gain = value,
            GainStage::Linear => self.gains.linear_gain = value,
            GainStage::Lna => self.gains.lna_gain = value,
            GainStage::Mixer => self.gains.mixer_gain = value,
            GainStage::Vga => self.gains.vga_gain = value,
        }
        if self.stage_is_live(stage) {
            if let Some(dev) = &self.open_dev {
                if let Err(e) = gain::apply_gain(dev.as_ref(), stage, &self.gains) {
                    warn!("Could not program gain: {e}");
                }
            }
        }
        self.persist(move |config| match stage {
            GainStage::Sensitive => config.gains.sensitive_gain = value,
            GainStage::Linear => config.gains.linear_gain = value,
            GainStage::Lna => config.gains.lna_gain = value,
            GainStage::Mixer => config.gains.mixer_gain = value,
            GainStage::Vga => config.gains.vga_gain = value,
        });
    }

    /// Toggle one AGC loop. Only meaningful in Free mode; the VGA register is
    /// never touched by this path.
    pub fn set_agc(&mut self, stage: AgcStage, enabled: bool) {
        match stage {
            AgcStage::Lna => self.gains.lna_agc = enabled,
            AgcStage::Mixer => self.gains.mixer_agc = enabled,
        }
        if self.gain_mode == GainMode::Free {
            if let Some(dev) = &self.open_dev {
                if let Err(e) = gain::apply_agc(dev.as_ref(), stage, &self.gains) {
                    warn!("Could not program AGC: {e}");
                }
            }
        }
        self.persist(move |config| match stage {
            AgcStage::Lna => config.gains.lna_agc = enabled,
            AgcStage::Mixer => config.gains.mixer_agc = enabled,
        });
    }

    /// Toggle bias-tee accessory power.
    pub fn set_bias_tee(&mut self, enabled: bool) {
        self.bias_t = enabled;
        if let Some(dev) = &self.open_dev {
            if let Err(e) = dev.set_rf_bias(enabled) {
                warn!("Could not program bias tee: {e}");
            }
        }
        self.persist(move |config| config.bias_t = enabled);
    }

    // ---- lifecycle -----------------------------------------------------

    /// Open the device and start streaming.
    ///
    /// No-op while running. Refusing to start with no device ever selected is
    /// an error (logged), not a silent failure. A failed open is logged and
    /// leaves the source stopped with no handle leaked. Register programming
    /// order is fixed: sample rate, frequency, gain sequence, bias-tee, then
    /// the streaming callback.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        if self.selected_serial == 0 {
            error!("Tried to start Airspy source with no device selected");
            return;
        }

        self.stream.clear_read_stop();

        let mut dev = match self.driver.open(self.selected_serial) {
            Ok(dev) => dev,
            Err(e) => {
                error!("Could not open Airspy {}: {e}", self.selected_label);
                return;
            }
        };

        if let Err(e) = self.program(dev.as_ref()) {
            error!("Could not configure Airspy {}: {e}", self.selected_label);
            return;
        }

        let writer = self.stream.writer();
        if let Err(e) = dev.start_rx(Box::new(move |samples| writer.write(samples))) {
            error!(
                "Could not start streaming on Airspy {}: {e}",
                self.selected_label
            );
            return;
        }

        self.open_dev = Some(dev);
        self.running = true;
        info!(
            "Airspy source started: {} @ {}",
            self.selected_label, self.sample_rates[self.sr_id].label
        );
    }

    /// Full device programming sequence issued on start.
    fn program(&self, dev: &dyn DeviceHandle) -> Result<(), DriverError> {
        dev.set_sample_rate(self.sample_rates[self.sr_id].hertz)?;
        dev.set_frequency(self.freq)?;
        gain::apply_mode(dev, self.gain_mode, &self.gains)?;
        dev.set_rf_bias(self.bias_t)?;
        Ok(())
    }

    /// Stop streaming and close the device. No-op while stopped.
    ///
    /// The write side is halted before the handle is closed so an in-flight
    /// callback cannot swap into a bridge mid-teardown; the stop flag is
    /// cleared only after the close completes, leaving the bridge ready for
    /// the next start.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.stream.stop_writer();
        // Dropping the handle closes the device and halts the vendor
        // callback thread
        self.open_dev = None;
        self.stream.clear_write_stop();
        info!("Airspy source stopped: {}", self.selected_label);
    }

    /// Retune. The frequency is always remembered; the live register write
    /// happens only while running. Never fails.
    pub fn tune(&mut self, freq: f64) {
        if let Some(dev) = &self.open_dev {
            if let Err(e) = dev.set_frequency(freq) {
                warn!("Could not tune Airspy {}: {e}", self.selected_label);
            }
        }
        self.freq = freq;
        info!("Airspy source tuned to {freq} Hz");
    }

    // ---- accessors ------------------------------------------------------

    #[must_use]
    pub fn devices(&self) -> &[DeviceRecord] {
        self.enumerator.devices()
    }

    #[must_use]
    pub fn sample_rates(&self) -> &[SampleRateOption] {
        &self.sample_rates
    }

    #[must_use]
    pub fn sample_rate_index(&self) -> usize {
        self.sr_id
    }

    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub fn selected_serial(&self) -> u64 {
        self.selected_serial
    }

    #[must_use]
    pub fn selected_label(&self) -> &str {
        &self.selected_label
    }

    #[must_use]
    pub fn gain_mode(&self) -> GainMode {
        self.gain_mode
    }

    #[must_use]
    pub fn gains(&self) -> &GainSettings {
        &self.gains
    }

    #[must_use]
    pub fn bias_tee(&self) -> bool {
        self.bias_t
    }

    #[must_use]
    pub fn frequency(&self) -> f64 {
        self.freq
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Consumer handle for the sample stream. The bridge is single-consumer.
    #[must_use]
    pub fn reader(&self) -> StreamReader {
        self.stream.reader()
    }

    /// Unblock the stream consumer for final teardown.
    pub fn stop_reader(&self) {
        self.stream.stop_reader();
    }

    // ---- internals ------------------------------------------------------

    /// Whether a register write for `stage` should be issued under the
    /// current strategy (mirrors which panel controls are enabled).
    fn stage_is_live(&self, stage: GainStage) -> bool {
        match (self.gain_mode, stage) {
            (GainMode::Sensitive, GainStage::Sensitive)
            | (GainMode::Linear, GainStage::Linear)
            | (GainMode::Free, GainStage::Vga) => true,
            (GainMode::Free, GainStage::Lna) => !self.gains.lna_agc,
            (GainMode::Free, GainStage::Mixer) => !self.gains.mixer_agc,
            _ => false,
        }
    }

    /// Persist one field mutation under the selected device, synchronously.
    fn persist(&self, mutate: impl FnOnce(&mut crate::config::DeviceConfig)) {
        if self.selected_label.is_empty() {
            return;
        }
        let label = self.selected_label.clone();
        self.config.update(move |doc| {
            mutate(doc.devices.entry(label).or_default());
        });
    }
}

/// Handler record registered with the host's source registry.
///
/// The host owns only this table of bound callbacks plus the stream handle it
/// reads sample blocks from; the source itself stays behind its mutex. The
/// `menu` callback is a placeholder for the control panel collaborator, which
/// drives the setters directly.
pub struct SourceHandler {
    pub select: Box<dyn Fn() + Send>,
    pub deselect: Box<dyn Fn() + Send>,
    pub menu: Box<dyn Fn() + Send>,
    pub start: Box<dyn Fn() + Send>,
    pub stop: Box<dyn Fn() + Send>,
    pub tune: Box<dyn Fn(f64) + Send>,
    pub stream: StreamReader,
}

impl std::fmt::Debug for SourceHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceHandler").finish_non_exhaustive()
    }
}

impl AirspySource {
    /// Build the registration record for a shared source instance.
    #[must_use]
    pub fn handler(source: &Arc<Mutex<AirspySource>>) -> SourceHandler {
        let stream = source.lock().unwrap().reader();

        let select = {
            let source = Arc::clone(source);
            Box::new(move || {
                let source = source.lock().unwrap();
                info!("Airspy source selected ({} Hz)", source.sample_rate);
            }) as Box<dyn Fn() + Send>
        };
        let deselect = Box::new(|| info!("Airspy source deselected")) as Box<dyn Fn() + Send>;
        let menu = Box::new(|| {}) as Box<dyn Fn() + Send>;
        let start = {
            let source = Arc::clone(source);
            Box::new(move || source.lock().unwrap().start()) as Box<dyn Fn() + Send>
        };
        let stop = {
            let source = Arc::clone(source);
            Box::new(move || source.lock().unwrap().stop()) as Box<dyn Fn() + Send>
        };
        let tune = {
            let source = Arc::clone(source);
            Box::new(move |freq| source.lock().unwrap().tune(freq)) as Box<dyn Fn(f64) + Send>
        };

        SourceHandler {
            select,
            deselect,
            menu,
            start,
            stop,
            tune,
            stream,
        }
    }
}
