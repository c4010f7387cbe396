//! Spectrum trace of an analog channel
//!
//! The trace keeps the last computed [`FftResult`] and redraws from it; call
//! [`SpectrumTrace::update`] after new samples arrive to recompute.
//!
//! Zoom and pan are normalized to the bin range: `scale` is the visible
//! fraction of bins and `offset` the fraction left of the view.

use super::analog::{raw_to_physical, AnalogSignal};
use super::{DrawPath, DrawPrimitives, Hit, PrimitiveIter, SignalAdapter, SignalKind};
use crate::analysis::{format_freq, FftAnalyzer, FftResult, SpectrumViewMode, DBV_RANGES};
use crate::config::SpectrumConfig;
use crate::device::DeviceConfig;
use crate::error::{Result, TraceError};
use crate::session::CaptureSession;
use crate::types::{CaptureState, ChannelMeta, Point, ViewRect};
use std::sync::Arc;

/// Horizontal divisions of the oscilloscope screen
const HORIZONTAL_DIVS: f64 = 10.0;

/// Full-scale magnitude relative to `vdiv * divs * factor`
const VERTICAL_RATE: f64 = 1.0 / 2000.0;

/// Zoom ratio per wheel step
const ZOOM_STEP: f64 = 3.0 / 2.0;

/// Fewest bins a fully zoomed-in view shows
const MIN_VISIBLE_BINS: f64 = 100.0;

/// FFT view of one analog channel
pub struct SpectrumTrace {
    session: Arc<CaptureSession>,
    meta: ChannelMeta,
    map_range: (f64, f64),
    vdiv: u64,
    factor: u64,
    analyzer: FftAnalyzer,
    interval: u64,
    dc_ignored: bool,
    view_mode: SpectrumViewMode,
    dbv_range: u32,
    result: FftResult,
    scale: f64,
    offset: f64,
}

impl SpectrumTrace {
    /// Spectrum of `source` at `vdiv` millivolts per division
    pub fn new(source: &AnalogSignal, config: &SpectrumConfig, vdiv: u64, factor: u64) -> Self {
        let dbv_range = if DBV_RANGES.contains(&config.dbv_range) {
            config.dbv_range
        } else {
            tracing::warn!(range = config.dbv_range, "unsupported dBV range, using 120");
            120
        };
        Self {
            session: source.session().clone(),
            meta: *source.meta(),
            map_range: source.map_range(),
            vdiv: vdiv.max(1),
            factor: factor.max(1),
            analyzer: FftAnalyzer::new(config.length, config.window),
            interval: config.interval.max(1),
            dc_ignored: config.dc_ignored,
            view_mode: config.view_mode,
            dbv_range,
            result: FftResult::default(),
            scale: 1.0,
            offset: 0.0,
        }
    }

    /// Spectrum with vertical settings queried from the device layer
    pub fn from_device(
        source: &AnalogSignal,
        config: &SpectrumConfig,
        device: &dyn DeviceConfig,
    ) -> Self {
        let index = source.meta().index;
        let vdiv = device.vdiv(index).unwrap_or_else(|| {
            tracing::warn!(channel = index, "device reports no vdiv, using 1000 mV");
            1000
        });
        let factor = device.factor(index).unwrap_or(1);
        Self::new(source, config, vdiv, factor)
    }

    /// Recompute the spectrum from the newest samples
    ///
    /// Returns `false` (keeping the previous result) until the capture holds
    /// `length * interval` samples.
    pub fn update(&mut self) -> bool {
        if !self.state().is_renderable() {
            return false;
        }
        let length = self.analyzer.length() as u64;
        let needed = length * self.interval;

        let (samples, samplerate) = {
            let snapshot = self.session.snapshot();
            let count = snapshot.sample_count();
            if count < needed {
                return false;
            }
            let first = count - needed;
            let samples: Vec<f64> = (0..length)
                .filter_map(|k| snapshot.value(first + k * self.interval, self.meta.order).ok())
                .map(|raw| raw_to_physical(raw as f64, &self.meta, self.map_range))
                .collect();
            (samples, snapshot.samplerate())
        };

        self.result = self
            .analyzer
            .compute(&samples, samplerate / self.interval as f64);
        tracing::trace!(bins = self.result.magnitudes.len(), "spectrum updated");
        true
    }

    pub fn result(&self) -> &FftResult {
        &self.result
    }

    pub fn view_mode(&self) -> SpectrumViewMode {
        self.view_mode
    }

    pub fn set_view_mode(&mut self, mode: SpectrumViewMode) {
        self.view_mode = mode;
    }

    pub fn dbv_range(&self) -> u32 {
        self.dbv_range
    }

    /// Select one of [`DBV_RANGES`]
    pub fn set_dbv_range(&mut self, range: u32) -> Result<()> {
        if !DBV_RANGES.contains(&range) {
            return Err(TraceError::Config(format!(
                "dbv_range {} is not one of {:?}",
                range, DBV_RANGES
            )));
        }
        self.dbv_range = range;
        Ok(())
    }

    pub fn set_dc_ignored(&mut self, ignored: bool) {
        self.dc_ignored = ignored;
    }

    /// `(scale, offset)` of the bin view
    pub fn zoom_state(&self) -> (f64, f64) {
        (self.scale, self.offset)
    }

    fn min_scale(&self) -> f64 {
        (MIN_VISIBLE_BINS / self.analyzer.length() as f64).min(1.0)
    }

    fn clamp_view(&mut self) {
        self.scale = self.scale.clamp(self.min_scale(), 1.0);
        self.offset = self.offset.clamp(0.0, 1.0 - self.scale);
    }

    /// Zoom by `steps` wheel steps, keeping the bin under `anchor` pixels
    /// (from the left of a `width`-pixel view) in place
    pub fn zoom(&mut self, steps: f64, anchor: f64, width: f64) {
        if width <= 0.0 {
            return;
        }
        let cursor = self.offset + self.scale * anchor / width;
        self.scale *= ZOOM_STEP.powf(-steps);
        self.scale = self.scale.clamp(self.min_scale(), 1.0);
        self.offset = cursor - self.scale * anchor / width;
        self.clamp_view();
    }

    /// Pan by `delta` pixels of a `width`-pixel view
    pub fn pan(&mut self, delta: f64, width: f64) {
        if width <= 0.0 {
            return;
        }
        self.offset += self.scale * delta / width;
        self.clamp_view();
    }

    /// `(min, max)` of the vertical axis in the current view mode
    pub fn vertical_range(&self) -> (f64, f64) {
        let linear = self.vdiv as f64 * HORIZONTAL_DIVS * self.factor as f64 * VERTICAL_RATE;
        match self.view_mode {
            SpectrumViewMode::LinearRms => (0.0, linear),
            SpectrumViewMode::DbvRms => {
                let max = 20.0 * linear.log10();
                (max - f64::from(self.dbv_range), max)
            }
        }
    }

    /// Frequency label of spectrum bin `bin`
    pub fn frequency_label(&self, bin: u64) -> String {
        format_freq(self.result.frequency_at(bin as usize), 2)
    }

    fn layout(&self, rect: &ViewRect) -> Option<BinLayout> {
        let bins = self.result.magnitudes.len();
        if bins == 0 || rect.width <= 0.0 || !self.state().is_renderable() {
            return None;
        }
        let view_off = bins as f64 * self.offset;
        let view_size = ((bins as f64 * self.scale) as usize).max(1);
        let start = view_off as usize;
        let (vmin, vmax) = self.vertical_range();
        Some(BinLayout {
            start,
            end: (start + view_size).min(bins),
            view_off,
            pixels_per_bin: rect.width / view_size as f64,
            vmin,
            scale_y: rect.height / (vmax - vmin),
        })
    }
}

/// Bin range and scaling of one draw call
#[derive(Debug, Clone, Copy)]
struct BinLayout {
    start: usize,
    end: usize,
    view_off: f64,
    pixels_per_bin: f64,
    vmin: f64,
    scale_y: f64,
}

impl BinLayout {
    fn point(&self, rect: &ViewRect, bin: usize, value: f64) -> Point {
        Point::new(
            rect.left + (bin as f64 - self.view_off) * self.pixels_per_bin,
            (rect.bottom() - self.scale_y * (value - self.vmin)).clamp(rect.top, rect.bottom()),
        )
    }
}

impl SignalAdapter for SpectrumTrace {
    fn kind(&self) -> SignalKind {
        SignalKind::Spectrum
    }

    fn index(&self) -> u16 {
        self.meta.index
    }

    fn state(&self) -> CaptureState {
        self.session.state()
    }

    fn draw_primitives(&self, rect: &ViewRect) -> DrawPrimitives<'_> {
        let Some(layout) = self.layout(rect) else {
            return DrawPrimitives::empty();
        };
        DrawPrimitives::new(
            DrawPath::Spectrum,
            PrimitiveIter::Spectrum(SpectrumPoints {
                magnitudes: &self.result.magnitudes,
                mode: self.view_mode,
                dc_ignored: self.dc_ignored,
                rect: *rect,
                layout,
                next: layout.start,
            }),
        )
    }

    fn hit_test(&self, rect: &ViewRect, point: Point) -> Option<Hit> {
        if !rect.contains(point) {
            return None;
        }
        let layout = self.layout(rect)?;
        let bin = ((point.x - rect.left) / layout.pixels_per_bin + layout.view_off).round();
        if bin < 0.0 {
            return None;
        }
        let bin = bin as usize;
        let value = self.view_mode.apply(self.result.magnitude_at(bin)?);
        Some(Hit {
            index: bin as u64,
            value,
            point: layout.point(rect, bin, value),
        })
    }

    /// Magnitude of bin `index` in the current view mode
    fn measure_at_cursor(&self, index: u64) -> Option<f64> {
        if !self.state().is_renderable() {
            return None;
        }
        let bin = usize::try_from(index).ok()?;
        self.result
            .magnitude_at(bin)
            .map(|m| self.view_mode.apply(m))
    }
}

/// Polyline vertices over the visible spectrum bins
pub struct SpectrumPoints<'a> {
    magnitudes: &'a [f64],
    mode: SpectrumViewMode,
    dc_ignored: bool,
    rect: ViewRect,
    layout: BinLayout,
    next: usize,
}

impl Iterator for SpectrumPoints<'_> {
    type Item = Point;

    fn next(&mut self) -> Option<Point> {
        while self.next < self.layout.end {
            let bin = self.next;
            self.next += 1;
            if bin == 0 && self.dc_ignored {
                continue;
            }
            let magnitude = *self.magnitudes.get(bin)?;
            return Some(self.layout.point(&self.rect, bin, self.mode.apply(magnitude)));
        }
        None
    }
}
