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

//! Persistent per-device configuration.
//!
//! Settings are stored as a JSON document keyed by device serial label, plus
//! the label of the last selected device. Every mutation is written to disk
//! synchronously, so a crash immediately after a change does not lose it.
//! Defaults for a newly seen device are persisted exactly once, the first
//! time its serial is encountered.

use crate::gain::{GainMode, GainSettings};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Sample rate assumed before a device has reported its rate list, in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 10_000_000;

/// Stored settings for one device serial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceConfig {
    /// Selected sample rate in Hz.
    pub sample_rate: u32,

    /// Active gain strategy (0 = Sensitive, 1 = Linear, 2 = Free).
    pub gain_mode: GainMode,

    /// All gain values and AGC flags, stored flat in the document.
    #[serde(flatten)]
    pub gains: GainSettings,

    /// Bias-tee accessory power. Serialized as `biasT`.
    pub bias_t: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            gain_mode: GainMode::Sensitive,
            gains: GainSettings::default(),
            bias_t: false,
        }
    }
}

/// The whole persisted document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedConfig {
    /// Serial label of the last selected device, empty before the first
    /// selection.
    pub device: String,

    /// Per-device settings keyed by 16-digit serial label.
    pub devices: BTreeMap<String, DeviceConfig>,
}

/// Handle to the persisted document.
///
/// Mutations go through [`ConfigStore::update`], which acquires the internal
/// lock, applies the change, and writes the document back before releasing —
/// the lock is held only for that read-modify-write.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    doc: Mutex<PersistedConfig>,
}

impl ConfigStore {
    /// Load the document at `path`, starting from defaults when the file is
    /// missing or unreadable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let doc = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(doc) => doc,
                Err(e) => {
                    log::warn!(
                        "Could not parse config {}: {e} - starting from defaults",
                        path.display()
                    );
                    PersistedConfig::default()
                }
            },
            Err(_) => PersistedConfig::default(),
        };
        Self {
            path,
            doc: Mutex::new(doc),
        }
    }

    /// Open the document at the platform config location
    /// (e.g. `~/.config/airspy-source/airspy_config.json`).
    pub fn open_default() -> Self {
        let dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::open(dir.join("airspy-source").join("airspy_config.json"))
    }

    /// Settings for `label`, creating and persisting the documented defaults
    /// the first time this serial is seen.
    pub fn device_config(&self, label: &str) -> DeviceConfig {
        let mut doc = self.doc.lock().unwrap();
        if let Some(config) = doc.devices.get(label) {
            return *config;
        }
        let config = DeviceConfig::default();
        doc.devices.insert(label.to_string(), config);
        self.save(&doc);
        config
    }

    /// Label of the last selected device.
    pub fn last_device(&self) -> String {
        self.doc.lock().unwrap().device.clone()
    }

    /// Acquire, mutate, write back, release.
    pub fn update<R>(&self, mutate: impl FnOnce(&mut PersistedConfig) -> R) -> R {
        let mut doc = self.doc.lock().unwrap();
        let result = mutate(&mut doc);
        self.save(&doc);
        result
    }

    fn save(&self, doc: &PersistedConfig) {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(doc) {
            Ok(text) => {
                if let Err(e) = std::fs::write(&self.path, text) {
                    log::warn!("Could not write config {}: {e}", self.path.display());
                }
            }
            Err(e) => log::warn!("Could not serialize config: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(name: &str) -> ConfigStore {
        let path = std::env::temp_dir().join(format!("airspy_source_{name}.json"));
        let _ = std::fs::remove_file(&path);
        ConfigStore::open(path)
    }

    #[test]
    fn test_document_field_names_and_defaults() {
        let value = serde_json::to_value(DeviceConfig::default()).unwrap();
        assert_eq!(value["sampleRate"], 10_000_000);
        assert_eq!(value["gainMode"], 0);
        assert_eq!(value["sensitiveGain"], 0);
        assert_eq!(value["linearGain"], 0);
        assert_eq!(value["lnaGain"], 0);
        assert_eq!(value["mixerGain"], 0);
        assert_eq!(value["vgaGain"], 0);
        assert_eq!(value["lnaAgc"], false);
        assert_eq!(value["mixerAgc"], false);
        assert_eq!(value["biasT"], false);
    }

    #[test]
    fn test_defaults_persisted_on_first_encounter() {
        let store = temp_store("first_encounter");
        let config = store.device_config("0000000000001111");
        assert_eq!(config, DeviceConfig::default());

        // The defaults must already be on disk, not just in memory
        let reloaded = ConfigStore::open(store.path.clone());
        assert_eq!(
            reloaded.device_config("0000000000001111"),
            DeviceConfig::default()
        );
    }

    #[test]
    fn test_update_is_written_synchronously() {
        let store = temp_store("synchronous_write");
        store.device_config("0000000000002222");
        store.update(|doc| {
            doc.devices.get_mut("0000000000002222").unwrap().bias_t = true;
            doc.device = "0000000000002222".to_string();
        });

        let reloaded = ConfigStore::open(store.path.clone());
        assert!(reloaded.device_config("0000000000002222").bias_t);
        assert_eq!(reloaded.last_device(), "0000000000002222");
    }

    #[test]
    fn test_existing_entry_is_not_reset() {
        let store = temp_store("no_reset");
        store.device_config("0000000000003333");
        store.update(|doc| {
            doc.devices.get_mut("0000000000003333").unwrap().gains.vga_gain = 11;
        });
        assert_eq!(store.device_config("0000000000003333").gains.vga_gain, 11);
    }

    #[test]
    fn test_unreadable_document_starts_fresh() {
        let path = std::env::temp_dir().join("airspy_source_garbage.json");
        std::fs::write(&path, "not json {{{").unwrap();
        let store = ConfigStore::open(path);
        assert_eq!(store.last_device(), "");
        assert!(store.doc.lock().unwrap().devices.is_empty());
    }
}
