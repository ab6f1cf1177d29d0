//! Channel-to-frequency resolution for SmartNet bandplans
//!
//! SmartNet control channels address voice channels by index; the mapping to
//! an RF frequency depends on the system's bandplan family. The 800 MHz
//! plans map channel ranges piecewise-linearly with several breakpoints, the
//! 900 MHz plan is a single linear ramp, and OBT (off-band trunking) systems
//! carry an explicit base/high/spacing/offset plan in their configuration.

use serde::{Deserialize, Serialize};
use trunkscan_core::{Error, Result, SystemConfig};

/// Round a frequency to five decimal places in MHz (10 Hz).
fn round5(freq_mhz: f64) -> f64 {
    (freq_mhz * 100_000.0).round() / 100_000.0
}

/// A SmartNet bandplan family
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum Bandplan {
    /// Domestic 800 MHz, pre-rebanding
    Standard800,
    /// Domestic 800 MHz after rebanding
    Rebanded800,
    /// Domestic 800 MHz splinter plan
    Splinter800,
    /// 900 MHz
    Band900,
    /// Off-band trunking with a configured custom plan
    Obt {
        /// Lowest RX frequency, MHz
        base_mhz: f64,
        /// Highest RX frequency, MHz
        high_mhz: f64,
        /// Channel spacing, MHz
        spacing_mhz: f64,
        /// Channel number of the base frequency
        offset: i32,
    },
}

/// OBT transmit channels sit this far below the receive channel block.
const OBT_TX_CHANNEL_OFFSET: i32 = 380;

impl Bandplan {
    /// Resolve a bandplan from a system configuration, honoring the legacy
    /// name aliases.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bandplan`] when the name is not a known family.
    pub fn from_system_config(config: &SystemConfig) -> Result<Self> {
        match config.bandplan.as_str() {
            "800" | "800_standard" | "800_domestic" => Ok(Self::Standard800),
            "800_reband" | "800_rebanded" => Ok(Self::Rebanded800),
            "800_splinter" | "800_domestic_splinter" => Ok(Self::Splinter800),
            "900" => Ok(Self::Band900),
            "400" | "400_custom" | "OBT" | "obt" => Ok(Self::Obt {
                base_mhz: config.bandplan_base,
                high_mhz: config.bandplan_high,
                spacing_mhz: config.bandplan_spacing,
                offset: config.bandplan_offset,
            }),
            other => Err(Error::bandplan(other)),
        }
    }

    /// Whether this is an off-band trunking plan
    #[must_use]
    pub const fn is_obt(&self) -> bool {
        matches!(self, Self::Obt { .. })
    }

    /// Map a channel number to a frequency in MHz, 0.0 when the channel is
    /// not assigned in this plan.
    #[must_use]
    pub fn freq_mhz(&self, chan: u16, tx: bool) -> f64 {
        let chan_f = f64::from(chan);
        let mut freq = 0.0;

        match *self {
            Self::Standard800 | Self::Rebanded800 | Self::Splinter800 => {
                match self {
                    Self::Rebanded800 => {
                        if chan <= 0x1b7 {
                            freq = 851.0125 + 0.025 * chan_f;
                        } else if (0x1b8..=0x22f).contains(&chan) {
                            freq = 851.0250 + 0.025 * f64::from(chan - 0x1b8);
                        }
                    }
                    Self::Splinter800 => {
                        if chan <= 0x257 {
                            freq = 851.0000 + 0.025 * chan_f;
                        } else if (0x258..=0x2cf).contains(&chan) {
                            freq = 866.0125 + 0.025 * f64::from(chan - 0x258);
                        }
                    }
                    _ => {
                        if chan <= 0x2cf {
                            freq = 851.0125 + 0.025 * chan_f;
                        }
                    }
                }

                // High-band channel blocks shared by all domestic 800 plans
                if (0x2d0..=0x2f7).contains(&chan) {
                    freq = 866.0000 + 0.025 * f64::from(chan - 0x2d0);
                } else if (0x32f..=0x33f).contains(&chan) {
                    freq = 867.0000 + 0.025 * f64::from(chan - 0x32f);
                } else if (0x3c1..=0x3fe).contains(&chan) {
                    freq = 867.4250 + 0.025 * f64::from(chan - 0x3c1);
                } else if chan == 0x3be {
                    freq = 868.9750;
                }

                if tx && freq != 0.0 {
                    freq -= 45.0;
                }
            }
            Self::Band900 => {
                freq = 935.0125 + 0.0125 * chan_f;
                if tx {
                    freq -= 39.0;
                }
            }
            Self::Obt {
                base_mhz,
                high_mhz,
                spacing_mhz,
                offset,
            } => {
                if !tx {
                    let high_cmd = f64::from(offset) + (high_mhz - base_mhz) / spacing_mhz;
                    let chan_i = i32::from(chan);
                    if chan_i >= offset && f64::from(chan_i) < high_cmd {
                        freq = base_mhz + spacing_mhz * f64::from(chan_i - offset);
                    }
                }
            }
        }

        round5(freq)
    }

    /// Whether a command word value is a legal channel number in this plan
    #[must_use]
    pub fn is_channel(&self, chan: u16, tx: bool) -> bool {
        match *self {
            Self::Standard800 | Self::Rebanded800 | Self::Splinter800 => {
                if (0x2d0..=0x2f7).contains(&chan)
                    || (0x32f..=0x33f).contains(&chan)
                    || (0x3c1..=0x3fe).contains(&chan)
                    || chan == 0x3be
                {
                    return true;
                }
                if matches!(self, Self::Rebanded800) {
                    chan <= 0x22f
                } else {
                    chan <= 0x2cf
                }
            }
            Self::Band900 => chan <= 0x1de,
            Self::Obt {
                base_mhz,
                high_mhz,
                spacing_mhz,
                offset,
            } => {
                let chan_i = i32::from(chan);
                let high_cmd = f64::from(offset) + (high_mhz - base_mhz) / spacing_mhz;
                let tx_offset = offset - OBT_TX_CHANNEL_OFFSET;
                if tx {
                    chan_i >= tx_offset && chan_i < offset
                } else {
                    chan_i >= offset && f64::from(chan_i) < high_cmd
                }
            }
        }
    }

    /// Expected OBT transmit frequency for a receive frequency, per the
    /// commercial band offsets. Returns 0.0 outside the known bands.
    #[must_use]
    pub fn expected_obt_tx_freq(rx_mhz: f64) -> f64 {
        if (136.0..174.0).contains(&rx_mhz) {
            rx_mhz
        } else if (380.0..406.0).contains(&rx_mhz) {
            rx_mhz + 10.0
        } else if (406.0..420.0).contains(&rx_mhz) {
            rx_mhz + 9.0
        } else if (450.0..470.0).contains(&rx_mhz) {
            rx_mhz + 5.0
        } else if (470.0..512.0).contains(&rx_mhz) {
            rx_mhz + 3.0
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn obt_plan() -> Bandplan {
        Bandplan::Obt {
            base_mhz: 451.0,
            high_mhz: 455.0,
            spacing_mhz: 0.025,
            offset: 380,
        }
    }

    #[test]
    fn test_standard_800_channel_zero() {
        let plan = Bandplan::Standard800;
        assert_eq!(plan.freq_mhz(0, false), 851.0125);
        assert_eq!(plan.freq_mhz(0, true), 806.0125);
    }

    #[test]
    fn test_standard_800_breakpoints() {
        let plan = Bandplan::Standard800;
        assert_eq!(plan.freq_mhz(0x2cf, false), 868.9875);
        assert_eq!(plan.freq_mhz(0x2d0, false), 866.0000);
        assert_eq!(plan.freq_mhz(0x2f7, false), 866.975);
        assert_eq!(plan.freq_mhz(0x32f, false), 867.0000);
        assert_eq!(plan.freq_mhz(0x3be, false), 868.9750);
        assert_eq!(plan.freq_mhz(0x3c1, false), 867.4250);
        // Gap between the high-band blocks
        assert_eq!(plan.freq_mhz(0x300, false), 0.0);
        assert_eq!(plan.freq_mhz(0x3ff, false), 0.0);
    }

    #[test]
    fn test_rebanded_800() {
        let plan = Bandplan::Rebanded800;
        assert_eq!(plan.freq_mhz(0, false), 851.0125);
        assert_eq!(plan.freq_mhz(0x1b8, false), 851.0250);
        assert_eq!(plan.freq_mhz(0x22f, false), 854.0);
        // Above the rebanded low block, below the high blocks: unassigned
        assert_eq!(plan.freq_mhz(0x230, false), 0.0);
        assert!(!plan.is_channel(0x230, false));
        assert!(plan.is_channel(0x2d0, false));
    }

    #[test]
    fn test_splinter_800() {
        let plan = Bandplan::Splinter800;
        assert_eq!(plan.freq_mhz(0, false), 851.0000);
        assert_eq!(plan.freq_mhz(0x258, false), 866.0125);
        assert_eq!(plan.freq_mhz(0x258, true), 821.0125);
    }

    #[test]
    fn test_band_900() {
        let plan = Bandplan::Band900;
        assert_eq!(plan.freq_mhz(0, false), 935.0125);
        assert_eq!(plan.freq_mhz(0, true), 896.0125);
        assert!(plan.is_channel(0x1de, false));
        assert!(!plan.is_channel(0x1df, false));
    }

    #[test]
    fn test_obt_rx_channels() {
        let plan = obt_plan();
        assert_eq!(plan.freq_mhz(380, false), 451.0);
        assert_eq!(plan.freq_mhz(400, false), 451.5);
        assert!(plan.is_channel(380, false));
        assert!(plan.is_channel(539, false));
        assert!(!plan.is_channel(540, false));
        // TX side has no direct frequency mapping
        assert_eq!(plan.freq_mhz(100, true), 0.0);
        assert!(plan.is_channel(100, true));
        assert!(!plan.is_channel(380, true));
    }

    #[test]
    fn test_expected_obt_tx_freq() {
        assert_eq!(Bandplan::expected_obt_tx_freq(150.0), 150.0);
        assert_eq!(Bandplan::expected_obt_tx_freq(390.0), 400.0);
        assert_eq!(Bandplan::expected_obt_tx_freq(410.0), 419.0);
        assert_eq!(Bandplan::expected_obt_tx_freq(460.0), 465.0);
        assert_eq!(Bandplan::expected_obt_tx_freq(480.0), 483.0);
        assert_eq!(Bandplan::expected_obt_tx_freq(900.0), 0.0);
    }

    #[test]
    fn test_from_system_config_aliases() {
        let mut config = SystemConfig::default();
        for name in ["800", "800_standard", "800_domestic"] {
            config.bandplan = name.to_string();
            assert_eq!(
                Bandplan::from_system_config(&config).unwrap(),
                Bandplan::Standard800
            );
        }
        config.bandplan = "800_reband".to_string();
        assert_eq!(
            Bandplan::from_system_config(&config).unwrap(),
            Bandplan::Rebanded800
        );
        config.bandplan = "400".to_string();
        config.bandplan_base = 451.0;
        config.bandplan_high = 455.0;
        assert!(Bandplan::from_system_config(&config).unwrap().is_obt());

        config.bandplan = "700_imaginary".to_string();
        assert!(Bandplan::from_system_config(&config).is_err());
    }

    proptest! {
        /// For every legal channel of the 800 standard plan, the channel
        /// whose frequency matches is the channel itself.
        #[test]
        fn test_standard_800_roundtrip(chan in 0u16..=0x3feu16) {
            let plan = Bandplan::Standard800;
            prop_assume!(plan.is_channel(chan, false));
            let freq = plan.freq_mhz(chan, false);
            prop_assert!(freq > 0.0);
            let found = (0u16..=0x3fe)
                .find(|&c| plan.is_channel(c, false) && plan.freq_mhz(c, false) == freq);
            prop_assert_eq!(found, Some(chan));
        }

        /// TX is always 45 MHz below RX on assigned 800 channels.
        #[test]
        fn test_standard_800_tx_offset(chan in 0u16..=0x3feu16) {
            let plan = Bandplan::Standard800;
            let rx = plan.freq_mhz(chan, false);
            prop_assume!(rx > 0.0);
            prop_assert_eq!(plan.freq_mhz(chan, true), round5(rx - 45.0));
        }
    }
}
