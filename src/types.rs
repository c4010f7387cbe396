//! Core data types for tracevis-rs
//!
//! This module contains the plain data shared by every layer of the pipeline:
//! how frames are laid out, per-channel metadata, the horizontal view state
//! and the pixel-space geometry handed to a renderer.
//!
//! # Main Types
//!
//! - [`SampleLayout`] - How one frame of interleaved channel data is packed
//! - [`ChannelMeta`] - Vertical calibration of one channel
//! - [`ViewState`] - Horizontal zoom (seconds per pixel) and pan (pixels)
//! - [`Band`] / [`ViewRect`] - Pixel-space regions a trace draws into
//! - [`Point`] / [`Rect`] / [`LineSegment`] - Draw primitive geometry
//! - [`CaptureState`] - `Idle` → `Live` → `Stopped` → `Idle`

use crate::device::DeviceConfig;
use serde::{Deserialize, Serialize};

/// Default bit depth when the device does not report one
pub const DEFAULT_BITS: u8 = 8;

/// Widest analog value a frame can carry, in bytes
pub const MAX_UNIT_BYTES: u8 = 8;

/// How one frame (one sample-unit of all channels) is packed in the ring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SampleLayout {
    /// Interleaved multi-byte little-endian values, one per channel
    Analog { channel_count: u16, unit_bytes: u8 },
    /// Packed bits, channel `order` is bit `order % 8` of byte `order / 8`
    Logic { channel_count: u16 },
}

impl Default for SampleLayout {
    fn default() -> Self {
        SampleLayout::Analog {
            channel_count: 1,
            unit_bytes: 1,
        }
    }
}

impl SampleLayout {
    /// Number of channels carried by one frame
    pub fn channel_count(&self) -> u16 {
        match *self {
            SampleLayout::Analog { channel_count, .. } => channel_count,
            SampleLayout::Logic { channel_count } => channel_count,
        }
    }

    /// Bytes per channel value (1 for logic, where values are single bits)
    pub fn unit_bytes(&self) -> u8 {
        match *self {
            SampleLayout::Analog { unit_bytes, .. } => unit_bytes,
            SampleLayout::Logic { .. } => 1,
        }
    }

    /// Size of one frame in bytes
    pub fn frame_bytes(&self) -> usize {
        match *self {
            SampleLayout::Analog {
                channel_count,
                unit_bytes,
            } => channel_count as usize * unit_bytes as usize,
            SampleLayout::Logic { channel_count } => (channel_count as usize).div_ceil(8),
        }
    }

    /// Whether this is a logic (packed-bit) layout
    pub fn is_logic(&self) -> bool {
        matches!(self, SampleLayout::Logic { .. })
    }

    /// Whether frames of this layout can be stored and decoded
    ///
    /// Needs at least one channel and, for analog, `1..=8` bytes per value.
    pub fn is_supported(&self) -> bool {
        self.channel_count() > 0 && (1..=MAX_UNIT_BYTES).contains(&self.unit_bytes())
    }

    /// Decode the raw value of channel `order` from one frame
    ///
    /// Returns `None` when `order` is not part of this layout, the frame
    /// is too short, or the value is wider than a `u64`.
    pub fn decode(&self, frame: &[u8], order: u16) -> Option<u64> {
        if order >= self.channel_count() || self.unit_bytes() > MAX_UNIT_BYTES {
            return None;
        }
        match *self {
            SampleLayout::Analog { unit_bytes, .. } => {
                let start = order as usize * unit_bytes as usize;
                let bytes = frame.get(start..start + unit_bytes as usize)?;
                Some(
                    bytes
                        .iter()
                        .enumerate()
                        .fold(0u64, |acc, (i, &b)| acc | (u64::from(b) << (i * 8))),
                )
            }
            SampleLayout::Logic { .. } => {
                let byte = frame.get(order as usize / 8)?;
                Some(u64::from((byte >> (order % 8)) & 1))
            }
        }
    }
}

impl std::fmt::Display for SampleLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleLayout::Analog {
                channel_count,
                unit_bytes,
            } => write!(f, "analog {}ch x {}B", channel_count, unit_bytes),
            SampleLayout::Logic { channel_count } => write!(f, "logic {}ch", channel_count),
        }
    }
}

/// Vertical calibration of one channel
///
/// `scale` is vertical pixels per raw unit. Larger raw values move the trace
/// down the band, matching how the hardware reports inverted ADC codes;
/// `hw_offset` is the raw code of 0 V.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelMeta {
    /// Device channel index
    pub index: u16,
    /// Position of the channel within the interleaved frame
    pub order: u16,
    /// Bit depth of a raw value
    pub bits: u8,
    /// Raw value at the top of the reference range
    pub ref_min: f64,
    /// Raw value at the bottom of the reference range
    pub ref_max: f64,
    /// Raw value where the zero line sits
    pub zero_offset: u16,
    /// Raw value the hardware reports for 0 V
    pub hw_offset: u16,
    /// Vertical pixels per raw unit
    pub scale: f64,
}

impl Default for ChannelMeta {
    fn default() -> Self {
        Self::new(0, 0, DEFAULT_BITS)
    }
}

impl ChannelMeta {
    /// Create metadata with the full-range reference of `bits`
    pub fn new(index: u16, order: u16, bits: u8) -> Self {
        let bits = bits.clamp(1, 32);
        Self {
            index,
            order,
            bits,
            ref_min: 0.0,
            ref_max: ((1u64 << bits) - 1) as f64,
            zero_offset: 0,
            hw_offset: 0,
            scale: 1.0,
        }
    }

    /// Query calibration for channel `index` at frame position `order`
    ///
    /// Missing values fall back to an 8-bit full-range reference with the
    /// zero line and hardware zero at mid scale, each fallback logged.
    pub fn from_device(index: u16, order: u16, device: &dyn DeviceConfig) -> Self {
        let bits = device.unit_bits().unwrap_or_else(|| {
            tracing::warn!(channel = index, "device reports no unit bits, using {}", DEFAULT_BITS);
            DEFAULT_BITS
        });
        let mut meta = ChannelMeta::new(index, order, bits);

        meta.ref_min = match device.ref_min() {
            Some(v) => f64::from(v),
            None => {
                tracing::warn!(channel = index, "device reports no reference minimum, using 1");
                1.0
            }
        };
        match device.ref_max() {
            Some(v) => meta.ref_max = f64::from(v),
            None => tracing::warn!(
                channel = index,
                "device reports no reference maximum, using {}",
                meta.ref_max
            ),
        }

        let mid = ((meta.ref_min + meta.ref_max) / 2.0)
            .round()
            .clamp(0.0, f64::from(u16::MAX)) as u16;
        meta.zero_offset = device.probe_offset(index).unwrap_or_else(|| {
            tracing::warn!(channel = index, "device reports no zero offset, using {}", mid);
            mid
        });
        meta.hw_offset = device.hw_offset(index).unwrap_or_else(|| {
            tracing::warn!(channel = index, "device reports no hardware offset");
            meta.zero_offset
        });
        meta
    }

    /// Set the reference range
    pub fn with_reference(mut self, ref_min: f64, ref_max: f64) -> Self {
        self.ref_min = ref_min;
        self.ref_max = ref_max;
        self
    }

    /// Set zero-line and hardware offsets
    pub fn with_offsets(mut self, zero_offset: u16, hw_offset: u16) -> Self {
        self.zero_offset = zero_offset;
        self.hw_offset = hw_offset;
        self
    }

    /// Set the vertical scale (pixels per raw unit)
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Width of the reference range, never zero
    pub fn ref_span(&self) -> f64 {
        let span = self.ref_max - self.ref_min;
        if span.abs() < f64::EPSILON {
            1.0
        } else {
            span
        }
    }

    /// Fit `scale` so the reference range fills a band of `height` pixels
    pub fn fit_to_height(&mut self, height: f64) {
        self.scale = height / self.ref_span();
    }
}

/// Horizontal view parameters shared by every trace in a view
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    /// Seconds per pixel, always > 0
    pub scale: f64,
    /// Pan anchor in pixels
    pub offset: i64,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            scale: 1e-6,
            offset: 0,
        }
    }
}

impl ViewState {
    /// Smallest scale accepted, keeps samples-per-pixel strictly positive
    pub const MIN_SCALE: f64 = 1e-15;

    /// Create a view state, clamping `scale` to be positive
    pub fn new(scale: f64, offset: i64) -> Self {
        let scale = if scale.is_finite() && scale > Self::MIN_SCALE {
            scale
        } else {
            Self::MIN_SCALE
        };
        Self { scale, offset }
    }

    /// Build the view state that shows `samples_per_pixel` at `samplerate`
    pub fn from_samples_per_pixel(samples_per_pixel: f64, samplerate: f64, offset: i64) -> Self {
        let samplerate = if samplerate > 0.0 { samplerate } else { 1.0 };
        Self::new(samples_per_pixel / samplerate, offset)
    }

    /// Samples per pixel at `samplerate`
    #[inline]
    pub fn samples_per_pixel(&self, samplerate: f64) -> f64 {
        samplerate * self.scale
    }
}

/// A pixel-space point
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A pixel-space axis-aligned rectangle
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

/// A pixel-space line segment
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LineSegment {
    pub from: Point,
    pub to: Point,
}

impl LineSegment {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            from: Point::new(x0, y0),
            to: Point::new(x1, y1),
        }
    }
}

/// The view rectangle a trace renders into, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl ViewRect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// Inclusive containment test, matching the renderer's pixel grid
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.left && p.x <= self.right() && p.y >= self.top && p.y <= self.bottom()
    }
}

/// Vertical band allotted to one channel
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Band {
    pub top: f64,
    pub bottom: f64,
}

impl Band {
    pub fn new(top: f64, bottom: f64) -> Self {
        if top <= bottom {
            Self { top, bottom }
        } else {
            Self {
                top: bottom,
                bottom: top,
            }
        }
    }

    /// Band of `height` pixels centred on `y`
    pub fn centered(y: f64, height: f64) -> Self {
        Self::new(y - height * 0.5, y + height * 0.5)
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    #[inline]
    pub fn clamp(&self, y: f64) -> f64 {
        y.clamp(self.top, self.bottom)
    }

    pub fn contains(&self, y: f64) -> bool {
        y >= self.top && y <= self.bottom
    }
}

/// Capture lifecycle shared by the session and every adapter on it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CaptureState {
    /// No data
    #[default]
    Idle,
    /// Ring store actively appended
    Live,
    /// Ring frozen, full query support
    Stopped,
}

impl CaptureState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureState::Idle => "idle",
            CaptureState::Live => "live",
            CaptureState::Stopped => "stopped",
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            CaptureState::Idle => 0,
            CaptureState::Live => 1,
            CaptureState::Stopped => 2,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => CaptureState::Live,
            2 => CaptureState::Stopped,
            _ => CaptureState::Idle,
        }
    }

    /// Whether traces may be rendered in this state
    pub fn is_renderable(&self) -> bool {
        !matches!(self, CaptureState::Idle)
    }
}

impl std::fmt::Display for CaptureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MockDeviceConfig;

    #[test]
    fn test_layout_frame_bytes() {
        let analog = SampleLayout::Analog {
            channel_count: 2,
            unit_bytes: 2,
        };
        assert_eq!(analog.frame_bytes(), 4);
        assert_eq!(SampleLayout::Logic { channel_count: 9 }.frame_bytes(), 2);
        assert_eq!(SampleLayout::Logic { channel_count: 8 }.frame_bytes(), 1);
    }

    #[test]
    fn test_layout_decode_analog_little_endian() {
        let layout = SampleLayout::Analog {
            channel_count: 2,
            unit_bytes: 2,
        };
        let frame = [0x34, 0x12, 0xCD, 0xAB];
        assert_eq!(layout.decode(&frame, 0), Some(0x1234));
        assert_eq!(layout.decode(&frame, 1), Some(0xABCD));
        assert_eq!(layout.decode(&frame, 2), None);
    }

    #[test]
    fn test_layout_unit_bytes_limits() {
        let wide = SampleLayout::Analog {
            channel_count: 1,
            unit_bytes: 9,
        };
        assert!(!wide.is_supported());
        assert_eq!(wide.decode(&[1; 9], 0), None);

        let empty = SampleLayout::Analog {
            channel_count: 1,
            unit_bytes: 0,
        };
        assert!(!empty.is_supported());
        assert!(!SampleLayout::Logic { channel_count: 0 }.is_supported());

        let widest = SampleLayout::Analog {
            channel_count: 1,
            unit_bytes: 8,
        };
        assert!(widest.is_supported());
        assert_eq!(widest.decode(&[0xFF; 8], 0), Some(u64::MAX));
    }

    #[test]
    fn test_layout_decode_logic_bits() {
        let layout = SampleLayout::Logic { channel_count: 10 };
        let frame = [0b0000_0101, 0b0000_0010];
        assert_eq!(layout.decode(&frame, 0), Some(1));
        assert_eq!(layout.decode(&frame, 1), Some(0));
        assert_eq!(layout.decode(&frame, 2), Some(1));
        assert_eq!(layout.decode(&frame, 9), Some(1));
        assert_eq!(layout.decode(&frame, 10), None);
    }

    #[test]
    fn test_view_state_scale_is_positive() {
        assert!(ViewState::new(0.0, 0).scale > 0.0);
        assert!(ViewState::new(-1.0, 0).scale > 0.0);
        let v = ViewState::from_samples_per_pixel(20.0, 1_000_000.0, 5);
        assert!((v.samples_per_pixel(1_000_000.0) - 20.0).abs() < 1e-9);
        assert_eq!(v.offset, 5);
    }

    #[test]
    fn test_meta_from_device_fallbacks() {
        let mut device = MockDeviceConfig::new();
        device.expect_unit_bits().return_const(None::<u8>);
        device.expect_ref_min().return_const(None::<u32>);
        device.expect_ref_max().return_const(None::<u32>);
        device.expect_probe_offset().return_const(None::<u16>);
        device.expect_hw_offset().return_const(Some(100u16));

        let meta = ChannelMeta::from_device(3, 1, &device);
        assert_eq!(meta.bits, DEFAULT_BITS);
        assert_eq!(meta.ref_min, 1.0);
        assert_eq!(meta.ref_max, 255.0);
        assert_eq!(meta.zero_offset, 128);
        assert_eq!(meta.hw_offset, 100);
        assert_eq!((meta.index, meta.order), (3, 1));
    }

    #[test]
    fn test_channel_meta_fit() {
        let mut meta = ChannelMeta::new(0, 0, 8);
        assert_eq!(meta.ref_max, 255.0);
        meta.fit_to_height(255.0);
        assert!((meta.scale - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_band_orders_edges() {
        let band = Band::new(100.0, 0.0);
        assert_eq!(band.top, 0.0);
        assert_eq!(band.clamp(150.0), 100.0);
        assert_eq!(Band::centered(50.0, 20.0), Band::new(40.0, 60.0));
    }

    #[test]
    fn test_capture_state_roundtrip() {
        for s in [CaptureState::Idle, CaptureState::Live, CaptureState::Stopped] {
            assert_eq!(CaptureState::from_u8(s.to_u8()), s);
        }
        assert!(!CaptureState::Idle.is_renderable());
        assert!(CaptureState::Stopped.is_renderable());
    }
}
