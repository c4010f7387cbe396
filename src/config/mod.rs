//! Configuration module for tracevis-rs
//!
//! This module handles the capture pipeline configuration:
//! - Capture sizing (sample limit, samplerate, frame layout)
//! - Envelope index tuning (threshold, bucket ratios, level count)
//! - Render defaults used by the demo binary
//! - Spectrum trace settings
//! - A static device configuration standing in for the device layer
//!
//! # File Format
//!
//! Configuration is stored as TOML:
//!
//! ```toml
//! [capture]
//! sample_limit = 1048576
//! samplerate = 1000000.0
//! layout = { kind = "analog", channel_count = 2, unit_bytes = 1 }
//!
//! [envelope]
//! threshold = 16.0
//!
//! [spectrum]
//! length = 4096
//! window = "Hann"
//! ```
//!
//! Every table and field is optional; missing values take their defaults.

use crate::analysis::{SpectrumViewMode, WindowFunction, DBV_RANGES};
use crate::device::StaticDeviceConfig;
use crate::error::{Result, TraceError};
use crate::types::{SampleLayout, MAX_UNIT_BYTES};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Samples-per-pixel above which traces render from the envelope index
pub const DEFAULT_ENVELOPE_THRESHOLD: f64 = 16.0;

/// Raw samples per level-0 envelope bucket
pub const DEFAULT_ENVELOPE_BASE_SCALE: u64 = 16;

/// Ratio between the bucket scales of adjacent envelope levels
pub const DEFAULT_ENVELOPE_SCALE_FACTOR: u64 = 16;

/// Maximum number of envelope levels
pub const DEFAULT_ENVELOPE_LEVELS: usize = 10;

/// Default ring capacity in frames
pub const DEFAULT_SAMPLE_LIMIT: u64 = 1 << 20;

/// Default samplerate in Hz
pub const DEFAULT_SAMPLERATE: f64 = 1_000_000.0;

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceConfig {
    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub envelope: EnvelopeConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub spectrum: SpectrumConfig,

    #[serde(default)]
    pub device: StaticDeviceConfig,
}

impl TraceConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| TraceError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TraceError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load a configuration file, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the configuration to disk as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| TraceError::Serialization(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            TraceError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// JSON rendering of the configuration, for diagnostics
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| TraceError::Serialization(format!("Failed to serialize config: {}", e)))
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.capture.sample_limit == 0 {
            return Err(TraceError::Config("sample_limit must be > 0".to_string()));
        }
        if self.capture.layout.channel_count() == 0 {
            return Err(TraceError::Config("layout needs at least one channel".to_string()));
        }
        if !self.capture.layout.is_supported() {
            return Err(TraceError::Config(format!(
                "layout {} needs 1 to {} bytes per value",
                self.capture.layout, MAX_UNIT_BYTES
            )));
        }
        if !(self.capture.samplerate > 0.0) {
            return Err(TraceError::Config("samplerate must be > 0".to_string()));
        }
        if !(self.envelope.threshold > 0.0) {
            return Err(TraceError::Config("envelope threshold must be > 0".to_string()));
        }
        if self.envelope.base_scale < 2 || self.envelope.scale_factor < 2 {
            return Err(TraceError::Config(
                "envelope base_scale and scale_factor must be >= 2".to_string(),
            ));
        }
        if !self.spectrum.length.is_power_of_two() {
            return Err(TraceError::Config(format!(
                "spectrum length {} is not a power of two",
                self.spectrum.length
            )));
        }
        if self.spectrum.interval == 0 {
            return Err(TraceError::Config("spectrum interval must be > 0".to_string()));
        }
        if !DBV_RANGES.contains(&self.spectrum.dbv_range) {
            return Err(TraceError::Config(format!(
                "dbv_range {} is not one of {:?}",
                self.spectrum.dbv_range, DBV_RANGES
            )));
        }
        Ok(())
    }
}

/// Capture sizing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Ring capacity in frames
    #[serde(default = "default_sample_limit")]
    pub sample_limit: u64,

    /// Samplerate in Hz
    #[serde(default = "default_samplerate")]
    pub samplerate: f64,

    /// Frame layout
    #[serde(default)]
    pub layout: SampleLayout,
}

fn default_sample_limit() -> u64 {
    DEFAULT_SAMPLE_LIMIT
}

fn default_samplerate() -> f64 {
    DEFAULT_SAMPLERATE
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_limit: DEFAULT_SAMPLE_LIMIT,
            samplerate: DEFAULT_SAMPLERATE,
            layout: SampleLayout::default(),
        }
    }
}

/// Envelope index tuning
///
/// The threshold and bucket ratios are empirically tuned, not derived.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeConfig {
    /// Samples-per-pixel at or above which the envelope path is used
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Raw samples per level-0 bucket
    #[serde(default = "default_base_scale")]
    pub base_scale: u64,

    /// Scale ratio between adjacent levels
    #[serde(default = "default_scale_factor")]
    pub scale_factor: u64,

    /// Maximum number of levels
    #[serde(default = "default_max_levels")]
    pub max_levels: usize,
}

fn default_threshold() -> f64 {
    DEFAULT_ENVELOPE_THRESHOLD
}

fn default_base_scale() -> u64 {
    DEFAULT_ENVELOPE_BASE_SCALE
}

fn default_scale_factor() -> u64 {
    DEFAULT_ENVELOPE_SCALE_FACTOR
}

fn default_max_levels() -> usize {
    DEFAULT_ENVELOPE_LEVELS
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_ENVELOPE_THRESHOLD,
            base_scale: DEFAULT_ENVELOPE_BASE_SCALE,
            scale_factor: DEFAULT_ENVELOPE_SCALE_FACTOR,
            max_levels: DEFAULT_ENVELOPE_LEVELS,
        }
    }
}

/// Render defaults for the demo binary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// View width in pixels
    #[serde(default = "default_view_width")]
    pub view_width: f64,

    /// Height of one channel's band in pixels
    #[serde(default = "default_trace_height")]
    pub trace_height: f64,

    /// Initial samples-per-pixel
    #[serde(default = "default_samples_per_pixel")]
    pub samples_per_pixel: f64,
}

fn default_view_width() -> f64 {
    1000.0
}

fn default_trace_height() -> f64 {
    100.0
}

fn default_samples_per_pixel() -> f64 {
    1.0
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            view_width: default_view_width(),
            trace_height: default_trace_height(),
            samples_per_pixel: default_samples_per_pixel(),
        }
    }
}

/// Spectrum trace settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectrumConfig {
    /// FFT length (power of two)
    #[serde(default = "default_fft_length")]
    pub length: usize,

    /// Take every `interval`-th sample
    #[serde(default = "default_interval")]
    pub interval: u64,

    #[serde(default = "default_window")]
    pub window: WindowFunction,

    /// Skip the DC bin when drawing
    #[serde(default = "default_true")]
    pub dc_ignored: bool,

    #[serde(default)]
    pub view_mode: SpectrumViewMode,

    /// Displayed dBV range
    #[serde(default = "default_dbv_range")]
    pub dbv_range: u32,
}

fn default_fft_length() -> usize {
    4096
}

fn default_interval() -> u64 {
    1
}

fn default_window() -> WindowFunction {
    WindowFunction::Hann
}

fn default_true() -> bool {
    true
}

fn default_dbv_range() -> u32 {
    120
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            length: default_fft_length(),
            interval: default_interval(),
            window: default_window(),
            dc_ignored: true,
            view_mode: SpectrumViewMode::default(),
            dbv_range: default_dbv_range(),
        }
    }
}

// ==================== Tests ====================
