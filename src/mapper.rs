//! Coordinate mapping
//!
//! Pure transforms between sample space and pixel space. Nothing here knows
//! about ring buffers: horizontal mapping works on logical sample indices,
//! vertical mapping on raw values plus a channel's [`ChannelMeta`] and
//! [`Band`].
//!
//! Horizontal coordinates are relative to the left edge of the view; callers
//! translate by the view rectangle's `left` when emitting primitives.
//!
//! Start boundaries round down and spans round up, so the computed window
//! always covers the requested pixel range.

use crate::types::{Band, ChannelMeta, ViewState};

/// Horizontal sample <-> pixel mapping for one view
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    samples_per_pixel: f64,
    pixel_offset: f64,
}

/// Visible slice of the logical sample range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleWindow {
    /// First logical index drawn
    pub start: u64,
    /// Pixel x of `start`, at or left of the view edge
    pub start_pixel: f64,
    /// Samples drawn from `start`
    pub length: u64,
}

impl SampleWindow {
    /// One past the last logical index
    pub fn end(&self) -> u64 {
        self.start + self.length
    }
}

impl CoordinateMapper {
    /// Mapper for `view` at `samplerate`
    pub fn new(view: &ViewState, samplerate: f64) -> Self {
        Self::from_samples_per_pixel(view.samples_per_pixel(samplerate), view.offset)
    }

    /// Mapper with an explicit samples-per-pixel ratio
    pub fn from_samples_per_pixel(samples_per_pixel: f64, pixel_offset: i64) -> Self {
        let samples_per_pixel = if samples_per_pixel.is_finite() && samples_per_pixel > 0.0 {
            samples_per_pixel
        } else {
            f64::MIN_POSITIVE
        };
        Self {
            samples_per_pixel,
            pixel_offset: pixel_offset as f64,
        }
    }

    #[inline]
    pub fn samples_per_pixel(&self) -> f64 {
        self.samples_per_pixel
    }

    #[inline]
    pub fn pixel_offset(&self) -> f64 {
        self.pixel_offset
    }

    /// Pixel x of a (possibly fractional) logical index
    #[inline]
    pub fn sample_to_pixel(&self, index: f64) -> f64 {
        index / self.samples_per_pixel - self.pixel_offset
    }

    /// Nearest logical index under pixel `x`, `None` left of sample 0
    pub fn pixel_to_sample(&self, x: f64) -> Option<u64> {
        let index = ((x + self.pixel_offset) * self.samples_per_pixel + 0.5).floor();
        if index.is_finite() && index >= 0.0 {
            Some(index as u64)
        } else {
            None
        }
    }

    /// Logical samples needed to draw `width` pixels out of `count`
    ///
    /// Returns `None` when the view lies entirely past the last sample.
    pub fn visible_window(&self, count: u64, width: f64) -> Option<SampleWindow> {
        if count == 0 || !(width > 0.0) {
            return None;
        }

        let index_offset = (self.pixel_offset * self.samples_per_pixel).floor();
        let start = if index_offset > 0.0 { index_offset as u64 } else { 0 };
        if start >= count {
            return None;
        }

        let span = (width * self.samples_per_pixel + 1.0).ceil();
        let span = if span >= (count - start) as f64 {
            count - start
        } else {
            span as u64
        };

        Some(SampleWindow {
            start,
            start_pixel: self.sample_to_pixel(start as f64),
            length: span,
        })
    }
}

/// Raw value at `ratio` of the reference range
pub fn ratio_to_value(ratio: f64, meta: &ChannelMeta) -> f64 {
    ratio * meta.ref_span() + meta.ref_min
}

/// Fraction of the reference range below `value`, never negative
pub fn value_to_ratio(value: f64, meta: &ChannelMeta) -> f64 {
    ((value - meta.ref_min) / meta.ref_span()).max(0.0)
}

/// Pixel y at `ratio` of the band height
pub fn ratio_to_pos(ratio: f64, band: Band) -> f64 {
    ratio * band.height() + band.top
}

/// Fraction of the band height above pixel `pos`, clamped to `[0, 1]`
pub fn pos_to_ratio(pos: f64, band: Band) -> f64 {
    let height = band.height();
    if height <= 0.0 {
        return 0.0;
    }
    (pos - band.top).clamp(0.0, height) / height
}

/// Pixel y of the channel's zero line
pub fn zero_y(meta: &ChannelMeta, band: Band) -> f64 {
    ratio_to_pos(value_to_ratio(f64::from(meta.zero_offset), meta), band)
}

/// Vertical scale that fits the reference range into `band`
pub fn vertical_scale_for(band: Band, meta: &ChannelMeta) -> f64 {
    band.height() / meta.ref_span()
}

/// Pixel y of `raw`, clamped into the band
pub fn value_to_pixel_y(raw: f64, meta: &ChannelMeta, band: Band) -> f64 {
    band.clamp(zero_y(meta, band) + (raw - f64::from(meta.hw_offset)) * meta.scale)
}
