//! Device configuration query interface
//!
//! The core never talks to hardware. It asks a [`DeviceConfig`] for the few
//! per-channel calibration values it needs to map raw codes to pixels. Every
//! query is optional; missing values fall back to defaults at the call site.

use serde::{Deserialize, Serialize};

/// Per-channel configuration values queried from the device layer
#[cfg_attr(test, mockall::automock)]
pub trait DeviceConfig: Send + Sync {
    /// Bit depth of one raw analog value
    fn unit_bits(&self) -> Option<u8>;

    /// Raw value at the top of the reference range
    fn ref_min(&self) -> Option<u32>;

    /// Raw value at the bottom of the reference range
    fn ref_max(&self) -> Option<u32>;

    /// Raw value of the user-positioned zero line
    fn probe_offset(&self, channel: u16) -> Option<u16>;

    /// Raw value the hardware reports for 0 V
    fn hw_offset(&self, channel: u16) -> Option<u16>;

    /// Volts per division in millivolts
    fn vdiv(&self, channel: u16) -> Option<u64>;

    /// Probe attenuation factor
    fn factor(&self, channel: u16) -> Option<u64>;

    /// Physical value range the reference range maps to, `(min, max)`
    fn map_range(&self, channel: u16) -> Option<(f64, f64)>;

    /// Unit label of the mapped physical value
    fn map_unit(&self, channel: u16) -> Option<String>;
}

/// Calibration of one channel in a [`StaticDeviceConfig`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticChannel {
    /// Device channel index this entry calibrates
    pub index: u16,
    #[serde(default)]
    pub probe_offset: Option<u16>,
    #[serde(default)]
    pub hw_offset: Option<u16>,
    #[serde(default = "default_vdiv")]
    pub vdiv: u64,
    #[serde(default = "default_factor")]
    pub factor: u64,
    #[serde(default = "default_map_min")]
    pub map_min: f64,
    #[serde(default = "default_map_max")]
    pub map_max: f64,
    #[serde(default = "default_map_unit")]
    pub map_unit: String,
}

fn default_vdiv() -> u64 {
    1000
}

fn default_factor() -> u64 {
    1
}

fn default_map_min() -> f64 {
    -1.0
}

fn default_map_max() -> f64 {
    1.0
}

fn default_map_unit() -> String {
    "V".to_string()
}

impl Default for StaticChannel {
    fn default() -> Self {
        Self {
            index: 0,
            probe_offset: None,
            hw_offset: None,
            vdiv: default_vdiv(),
            factor: default_factor(),
            map_min: default_map_min(),
            map_max: default_map_max(),
            map_unit: default_map_unit(),
        }
    }
}

/// Fixed device configuration, loaded from the `[device]` config table
///
/// Stands in for the live device layer in the demo binary and in tests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticDeviceConfig {
    #[serde(default)]
    pub unit_bits: Option<u8>,
    #[serde(default)]
    pub ref_min: Option<u32>,
    #[serde(default)]
    pub ref_max: Option<u32>,
    /// Per-channel calibration
    #[serde(default)]
    pub channels: Vec<StaticChannel>,
}

impl StaticDeviceConfig {
    /// Configure `bits`-deep channels with the full reference range
    pub fn with_bits(bits: u8) -> Self {
        Self {
            unit_bits: Some(bits),
            ref_min: Some(0),
            ref_max: Some(((1u64 << bits.clamp(1, 32)) - 1) as u32),
            channels: Vec::new(),
        }
    }

    /// Add or replace the calibration of `config.index`
    pub fn with_channel(mut self, config: StaticChannel) -> Self {
        self.channels.retain(|c| c.index != config.index);
        self.channels.push(config);
        self
    }

    fn channel(&self, index: u16) -> Option<&StaticChannel> {
        self.channels.iter().find(|c| c.index == index)
    }
}

impl DeviceConfig for StaticDeviceConfig {
    fn unit_bits(&self) -> Option<u8> {
        self.unit_bits
    }

    fn ref_min(&self) -> Option<u32> {
        self.ref_min
    }

    fn ref_max(&self) -> Option<u32> {
        self.ref_max
    }

    fn probe_offset(&self, channel: u16) -> Option<u16> {
        self.channel(channel).and_then(|c| c.probe_offset)
    }

    fn hw_offset(&self, channel: u16) -> Option<u16> {
        self.channel(channel).and_then(|c| c.hw_offset)
    }

    fn vdiv(&self, channel: u16) -> Option<u64> {
        self.channel(channel).map(|c| c.vdiv)
    }

    fn factor(&self, channel: u16) -> Option<u64> {
        self.channel(channel).map(|c| c.factor)
    }

    fn map_range(&self, channel: u16) -> Option<(f64, f64)> {
        self.channel(channel).map(|c| (c.map_min, c.map_max))
    }

    fn map_unit(&self, channel: u16) -> Option<String> {
        self.channel(channel).map(|c| c.map_unit.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_config_lookup() {
        let dev = StaticDeviceConfig::with_bits(8).with_channel(StaticChannel {
            index: 1,
            hw_offset: Some(128),
            ..Default::default()
        });
        assert_eq!(dev.ref_max(), Some(255));
        assert_eq!(dev.hw_offset(1), Some(128));
        assert_eq!(dev.hw_offset(0), None);
        assert_eq!(dev.map_unit(1).as_deref(), Some("V"));
        assert_eq!(dev.factor(1), Some(1));
    }

    #[test]
    fn test_with_channel_replaces() {
        let dev = StaticDeviceConfig::default()
            .with_channel(StaticChannel {
                index: 2,
                vdiv: 500,
                ..Default::default()
            })
            .with_channel(StaticChannel {
                index: 2,
                vdiv: 200,
                ..Default::default()
            });
        assert_eq!(dev.channels.len(), 1);
        assert_eq!(dev.vdiv(2), Some(200));
    }
}
