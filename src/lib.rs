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

//! Airspy acquisition source: device discovery, configuration state, and a
//! backpressured IQ sample stream.
//!
//! This library adapts Airspy receiver hardware for a host application that
//! supplies the control panel and the DSP chain. It is organized in layers
//! that can be used independently or composed together:
//!
//! - **Hardware layer** ([`hal`]): the opaque vendor-driver boundary
//!   (enumerate, open, configure, stream). The real libairspy binding is
//!   behind the `hardware` feature; without it a stub enumerates nothing.
//! - **Configuration layer** ([`config`]): the persisted per-device settings
//!   document, written synchronously on every change.
//! - **Stream layer** ([`stream`]): the two-buffer producer/consumer bridge
//!   between the vendor callback thread and the sample consumer, with
//!   blocking backpressure and a clean shutdown protocol.
//! - **Source layer** ([`source`]): selection, gain strategies, start/stop/
//!   tune, and the handler record registered with the host.
//!
//! # Quick Start
//!
//! ```no_run
//! use airspy_source::{AirspySource, ConfigStore, hal};
//! use std::sync::{Arc, Mutex};
//!
//! let driver = hal::default_driver();
//! let config = Arc::new(ConfigStore::open_default());
//! let source = Arc::new(Mutex::new(AirspySource::new(driver, config)));
//!
//! // The host keeps only the handler record; the source stays behind the mutex.
//! let mut handler = AirspySource::handler(&source);
//! (handler.start)();
//! while let Some(block) = handler.stream.read() {
//!     // hand the block to the DSP chain
//!     let _ = block.len();
//! }
//! ```

pub mod config;
pub mod enumerate;
pub mod gain;
pub mod hal;
pub mod source;
pub mod stream;

pub use config::{ConfigStore, DeviceConfig, PersistedConfig, DEFAULT_SAMPLE_RATE};
pub use enumerate::{format_serial, DeviceEnumerator, DeviceRecord, MAX_DEVICES};
pub use gain::{AgcStage, GainMode, GainSettings, GainStage};
pub use hal::{default_driver, AirspyDriver, DeviceHandle, DriverError, SampleCallback};
pub use source::{format_sample_rate, AirspySource, SampleRateOption, SourceHandler};
pub use stream::{SampleStream, StreamReader, StreamWriter};
