//! Gain strategies and their hardware programming sequences.
//!
//! The receiver offers three mutually exclusive strategies: two blended
//! curves (Sensitive, Linear) that drive the whole front end from a single
//! value, and Free mode with independent LNA/mixer/VGA stages where the LNA
//! and mixer can each be handed to the hardware AGC instead. Values for every
//! strategy are retained while another is active, so switching modes restores
//! prior settings rather than resetting them.

use crate::hal::{DeviceHandle, DriverError};
use serde::{Deserialize, Serialize};

/// Upper bound of the blended Sensitive/Linear gain curves.
pub const BLENDED_GAIN_MAX: i32 = 21;

/// Upper bound of the individual LNA/mixer/VGA stages.
pub const STAGE_GAIN_MAX: i32 = 15;

/// The active gain strategy. Persisted as 0/1/2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum GainMode {
    #[default]
    Sensitive,
    Linear,
    Free,
}

impl From<u8> for GainMode {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Linear,
            2 => Self::Free,
            _ => Self::Sensitive,
        }
    }
}

impl From<GainMode> for u8 {
    fn from(mode: GainMode) -> Self {
        match mode {
            GainMode::Sensitive => 0,
            GainMode::Linear => 1,
            GainMode::Free => 2,
        }
    }
}

/// Every gain value and AGC flag, regardless of which mode is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GainSettings {
    pub sensitive_gain: i32,
    pub linear_gain: i32,
    pub lna_gain: i32,
    pub mixer_gain: i32,
    pub vga_gain: i32,
    pub lna_agc: bool,
    pub mixer_agc: bool,
}

/// Selects one manual gain value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainStage {
    Sensitive,
    Linear,
    Lna,
    Mixer,
    Vga,
}

impl GainStage {
    /// Upper bound of this stage's hardware range (the lower bound is 0).
    #[must_use]
    pub fn max(self) -> i32 {
        match self {
            Self::Sensitive | Self::Linear => BLENDED_GAIN_MAX,
            Self::Lna | Self::Mixer | Self::Vga => STAGE_GAIN_MAX,
        }
    }
}

/// Selects one of the AGC-capable stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgcStage {
    Lna,
    Mixer,
}

/// Program the full register sequence for `mode`.
///
/// Issued on start and whenever a mode is entered while running. The order is
/// fixed: AGC flags are written before the gain values they govern, and Free
/// mode always writes VGA last.
pub fn apply_mode(
    dev: &dyn DeviceHandle,
    mode: GainMode,
    gains: &GainSettings,
) -> Result<(), DriverError> {
    match mode {
        GainMode::Sensitive => {
            dev.set_lna_agc(false)?;
            dev.set_mixer_agc(false)?;
            dev.set_sensitivity_gain(gains.sensitive_gain)?;
        }
        GainMode::Linear => {
            dev.set_lna_agc(false)?;
            dev.set_mixer_agc(false)?;
            dev.set_linearity_gain(gains.linear_gain)?;
        }
        GainMode::Free => {
            if gains.lna_agc {
                dev.set_lna_agc(true)?;
            } else {
                dev.set_lna_agc(false)?;
                dev.set_lna_gain(gains.lna_gain)?;
            }
            if gains.mixer_agc {
                dev.set_mixer_agc(true)?;
            } else {
                dev.set_mixer_agc(false)?;
                dev.set_mixer_gain(gains.mixer_gain)?;
            }
            dev.set_vga_gain(gains.vga_gain)?;
        }
    }
    Ok(())
}

/// Re-apply one AGC toggle in Free mode: enable the loop, or disable it and
/// restore the manual gain it was overriding. VGA is never touched here.
pub fn apply_agc(
    dev: &dyn DeviceHandle,
    stage: AgcStage,
    gains: &GainSettings,
) -> Result<(), DriverError> {
    match stage {
        AgcStage::Lna => {
            if gains.lna_agc {
                dev.set_lna_agc(true)?;
            } else {
                dev.set_lna_agc(false)?;
                dev.set_lna_gain(gains.lna_gain)?;
            }
        }
        AgcStage::Mixer => {
            if gains.mixer_agc {
                dev.set_mixer_agc(true)?;
            } else {
                dev.set_mixer_agc(false)?;
                dev.set_mixer_gain(gains.mixer_gain)?;
            }
        }
    }
    Ok(())
}

/// Program a single manual gain stage from the stored settings.
pub fn apply_gain(
    dev: &dyn DeviceHandle,
    stage: GainStage,
    gains: &GainSettings,
) -> Result<(), DriverError> {
    match stage {
        GainStage::Sensitive => dev.set_sensitivity_gain(gains.sensitive_gain),
        GainStage::Linear => dev.set_linearity_gain(gains.linear_gain),
        GainStage::Lna => dev.set_lna_gain(gains.lna_gain),
        GainStage::Mixer => dev.set_mixer_gain(gains.mixer_gain),
        GainStage::Vga => dev.set_vga_gain(gains.vga_gain),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::{CallLog, MockHandle};

    fn handle() -> (MockHandle, CallLog) {
        let calls = CallLog::default();
        (MockHandle::new(calls.clone()), calls)
    }

    #[test]
    fn test_gain_mode_serde_round_trip() {
        assert_eq!(serde_json::to_value(GainMode::Sensitive).unwrap(), 0);
        assert_eq!(serde_json::to_value(GainMode::Linear).unwrap(), 1);
        assert_eq!(serde_json::to_value(GainMode::Free).unwrap(), 2);
        assert_eq!(serde_json::from_str::<GainMode>("2").unwrap(), GainMode::Free);
        // Out-of-range values fall back to the default strategy
        assert_eq!(
            serde_json::from_str::<GainMode>("7").unwrap(),
            GainMode::Sensitive
        );
    }

    #[test]
    fn test_sensitive_sequence() {
        let (dev, calls) = handle();
        let gains = GainSettings {
            sensitive_gain: 7,
            ..GainSettings::default()
        };
        apply_mode(&dev, GainMode::Sensitive, &gains).unwrap();
        assert_eq!(
            calls.lock().unwrap().as_slice(),
            ["lna_agc 0", "mixer_agc 0", "sensitivity_gain 7"]
        );
    }

    #[test]
    fn test_linear_sequence() {
        let (dev, calls) = handle();
        let gains = GainSettings {
            linear_gain: 12,
            ..GainSettings::default()
        };
        apply_mode(&dev, GainMode::Linear, &gains).unwrap();
        assert_eq!(
            calls.lock().unwrap().as_slice(),
            ["lna_agc 0", "mixer_agc 0", "linearity_gain 12"]
        );
    }

    #[test]
    fn test_free_sequence_with_mixed_agc() {
        let (dev, calls) = handle();
        let gains = GainSettings {
            lna_agc: true,
            mixer_agc: false,
            mixer_gain: 5,
            vga_gain: 10,
            ..GainSettings::default()
        };
        apply_mode(&dev, GainMode::Free, &gains).unwrap();
        assert_eq!(
            calls.lock().unwrap().as_slice(),
            ["lna_agc 1", "mixer_agc 0", "mixer_gain 5", "vga_gain 10"]
        );
    }

    #[test]
    fn test_agc_toggle_restores_manual_gain_and_leaves_vga_alone() {
        let (dev, calls) = handle();
        let gains = GainSettings {
            lna_agc: false,
            lna_gain: 3,
            vga_gain: 9,
            ..GainSettings::default()
        };
        apply_agc(&dev, AgcStage::Lna, &gains).unwrap();
        assert_eq!(calls.lock().unwrap().as_slice(), ["lna_agc 0", "lna_gain 3"]);
    }

    #[test]
    fn test_agc_enable_suppresses_manual_gain() {
        let (dev, calls) = handle();
        let gains = GainSettings {
            mixer_agc: true,
            mixer_gain: 8,
            ..GainSettings::default()
        };
        apply_agc(&dev, AgcStage::Mixer, &gains).unwrap();
        assert_eq!(calls.lock().unwrap().as_slice(), ["mixer_agc 1"]);
    }

    #[test]
    fn test_stage_ranges() {
        assert_eq!(GainStage::Sensitive.max(), BLENDED_GAIN_MAX);
        assert_eq!(GainStage::Linear.max(), BLENDED_GAIN_MAX);
        assert_eq!(GainStage::Vga.max(), STAGE_GAIN_MAX);
    }
}
