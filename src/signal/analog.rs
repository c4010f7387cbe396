//! Analog channel adapter

use super::{
    BucketColumns, DrawPath, DrawPrimitives, Hit, PrimitiveIter, SignalAdapter, SignalKind,
    VisibleSpan,
};
use crate::device::DeviceConfig;
use crate::mapper::{value_to_pixel_y, vertical_scale_for, CoordinateMapper};
use crate::session::{CaptureSession, Snapshot, SnapshotGuard};
use crate::types::{Band, CaptureState, ChannelMeta, Point, Rect, ViewRect, ViewState};
use std::sync::Arc;

/// Default physical range when the device reports none
const DEFAULT_MAP_RANGE: (f64, f64) = (-1.0, 1.0);

pub(crate) fn raw_to_physical(raw: f64, meta: &ChannelMeta, map_range: (f64, f64)) -> f64 {
    (f64::from(meta.hw_offset) - raw) * (map_range.1 - map_range.0) / meta.ref_span()
}

/// Adapter drawing one analog channel
pub struct AnalogSignal {
    session: Arc<CaptureSession>,
    meta: ChannelMeta,
    view: ViewState,
    band: Band,
    map_range: (f64, f64),
    map_unit: String,
}

impl AnalogSignal {
    pub fn new(session: Arc<CaptureSession>, meta: ChannelMeta) -> Self {
        let band = Band::new(0.0, 100.0);
        let mut meta = meta;
        meta.scale = vertical_scale_for(band, &meta);
        Self {
            session,
            meta,
            view: ViewState::default(),
            band,
            map_range: DEFAULT_MAP_RANGE,
            map_unit: "V".to_string(),
        }
    }

    /// Adapter calibrated from the device layer
    pub fn from_device(
        session: Arc<CaptureSession>,
        index: u16,
        order: u16,
        device: &dyn DeviceConfig,
    ) -> Self {
        let mut signal = Self::new(session, ChannelMeta::from_device(index, order, device));
        signal.map_range = device.map_range(index).unwrap_or(DEFAULT_MAP_RANGE);
        if let Some(unit) = device.map_unit(index) {
            signal.map_unit = unit;
        }
        signal
    }

    /// Set the band and refit the vertical scale to it
    pub fn with_band(mut self, band: Band) -> Self {
        self.set_band(band);
        self
    }

    pub fn with_view(mut self, view: ViewState) -> Self {
        self.view = view;
        self
    }

    pub fn set_band(&mut self, band: Band) {
        self.band = band;
        self.meta.scale = vertical_scale_for(band, &self.meta);
    }

    pub fn band(&self) -> Band {
        self.band
    }

    pub fn set_view(&mut self, view: ViewState) {
        self.view = view;
    }

    pub fn view(&self) -> ViewState {
        self.view
    }

    pub fn meta(&self) -> &ChannelMeta {
        &self.meta
    }

    /// Replace the calibration, keeping its scale as given
    pub fn set_meta(&mut self, meta: ChannelMeta) {
        self.meta = meta;
    }

    pub fn map_unit(&self) -> &str {
        &self.map_unit
    }

    /// Physical `(min, max)` the reference range maps to
    pub fn map_range(&self) -> (f64, f64) {
        self.map_range
    }

    pub(crate) fn session(&self) -> &Arc<CaptureSession> {
        &self.session
    }

    /// Physical value of a raw code, in `map_unit`
    ///
    /// The hardware zero maps to 0 and the reference span to the map range
    /// span. Codes above the hardware zero read negative.
    pub fn voltage(&self, raw: f64) -> f64 {
        raw_to_physical(raw, &self.meta, self.map_range)
    }

    /// Drawn point and raw value of logical sample `index`
    pub fn point_at(&self, rect: &ViewRect, index: u64) -> Option<(Point, u64)> {
        if !self.state().is_renderable() {
            return None;
        }
        let snapshot = self.session.snapshot();
        let mapper = CoordinateMapper::new(&self.view, snapshot.samplerate());
        self.point_in(&snapshot, &mapper, rect, index)
    }

    fn point_in(
        &self,
        snapshot: &Snapshot,
        mapper: &CoordinateMapper,
        rect: &ViewRect,
        index: u64,
    ) -> Option<(Point, u64)> {
        let raw = snapshot.value(index, self.meta.order).ok()?;
        let point = Point::new(
            rect.left + mapper.sample_to_pixel(index as f64),
            value_to_pixel_y(raw as f64, &self.meta, self.band),
        );
        Some((point, raw))
    }

    /// Hover measurement, only offered once the capture is stopped
    pub fn hover(&self, rect: &ViewRect, point: Point) -> Option<Hit> {
        if self.state() != CaptureState::Stopped {
            return None;
        }
        self.hit_test(rect, point)
    }
}

impl SignalAdapter for AnalogSignal {
    fn kind(&self) -> SignalKind {
        SignalKind::Analog
    }

    fn index(&self) -> u16 {
        self.meta.index
    }

    fn state(&self) -> CaptureState {
        self.session.state()
    }

    fn draw_primitives(&self, rect: &ViewRect) -> DrawPrimitives<'_> {
        let order = self.meta.order;
        let Some(span) = VisibleSpan::resolve(&self.session, &self.view, rect, order) else {
            return DrawPrimitives::empty();
        };

        if !span.use_envelope() {
            return DrawPrimitives::new(
                DrawPath::Raw,
                PrimitiveIter::AnalogRaw(TracePoints::new(span, self.meta, self.band, rect.left)),
            );
        }

        let Some(bounds) = span.envelope_bounds(order) else {
            tracing::trace!(order, "no envelope for channel");
            return DrawPrimitives::empty();
        };
        DrawPrimitives::new(
            DrawPath::Envelope,
            PrimitiveIter::AnalogEnvelope(EnvelopeRects {
                columns: BucketColumns::new(span, bounds, order),
                meta: self.meta,
                band: self.band,
                left: rect.left,
                width: rect.width,
                previous: None,
            }),
        )
    }

    fn hit_test(&self, rect: &ViewRect, point: Point) -> Option<Hit> {
        if !rect.contains(point) || !self.band.contains(point.y) {
            return None;
        }
        if !self.state().is_renderable() {
            return None;
        }
        // Index and value come from the same snapshot
        let snapshot = self.session.snapshot();
        let mapper = CoordinateMapper::new(&self.view, snapshot.samplerate());
        let index = mapper.pixel_to_sample(point.x - rect.left)?;
        let (drawn, raw) = self.point_in(&snapshot, &mapper, rect, index)?;
        Some(Hit {
            index,
            value: raw as f64,
            point: drawn,
        })
    }

    fn measure_at_cursor(&self, index: u64) -> Option<f64> {
        if !self.state().is_renderable() {
            return None;
        }
        let snapshot = self.session.snapshot();
        snapshot.value(index, self.meta.order).ok().map(|v| v as f64)
    }
}

/// Raw-path polyline vertices, one per sample
pub struct TracePoints<'a> {
    snapshot: SnapshotGuard<'a>,
    mapper: CoordinateMapper,
    meta: ChannelMeta,
    band: Band,
    left: f64,
    next: u64,
    end: u64,
}

impl<'a> TracePoints<'a> {
    fn new(span: VisibleSpan<'a>, meta: ChannelMeta, band: Band, left: f64) -> Self {
        Self {
            next: span.window.start,
            end: span.window.end(),
            snapshot: span.snapshot,
            mapper: span.mapper,
            meta,
            band,
            left,
        }
    }
}

impl Iterator for TracePoints<'_> {
    type Item = Point;

    fn next(&mut self) -> Option<Point> {
        while self.next < self.end {
            let index = self.next;
            self.next += 1;
            if let Ok(raw) = self.snapshot.value(index, self.meta.order) {
                return Some(Point::new(
                    self.left + self.mapper.sample_to_pixel(index as f64),
                    value_to_pixel_y(raw as f64, &self.meta, self.band),
                ));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.end - self.next).unwrap_or(usize::MAX);
        (0, Some(remaining))
    }
}

/// Envelope-path column rectangles, at most one per pixel
///
/// A column that does not overlap its left neighbour is stretched to touch
/// it, so a steep edge stays connected.
pub struct EnvelopeRects<'a> {
    columns: BucketColumns<'a>,
    meta: ChannelMeta,
    band: Band,
    left: f64,
    width: f64,
    /// `(top, bottom)` of the previous column before stretching
    previous: Option<(f64, f64)>,
}

impl EnvelopeRects<'_> {
    fn pixel_y(&self, raw: u64) -> f64 {
        (value_to_pixel_y(raw as f64, &self.meta, self.band) + 0.5).floor()
    }
}

impl Iterator for EnvelopeRects<'_> {
    type Item = Rect;

    fn next(&mut self) -> Option<Rect> {
        while let Some((column, sample)) = self.columns.next() {
            let a = self.pixel_y(sample.min);
            let b = self.pixel_y(sample.max);
            let (own_top, own_bottom) = (a.min(b), a.max(b));

            let (mut top, mut bottom) = (own_top, own_bottom);
            if let Some((prev_top, prev_bottom)) = self.previous {
                if prev_top > bottom {
                    bottom = prev_top;
                } else if prev_bottom < top {
                    top = prev_bottom;
                }
            }
            self.previous = Some((own_top, own_bottom));

            if column < 0 || column as f64 >= self.width {
                continue;
            }
            return Some(Rect::new(
                self.left + column as f64,
                top,
                1.0,
                (bottom - top).max(1.0),
            ));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvelopeConfig;
    use crate::device::MockDeviceConfig;
    use crate::signal::Primitive;
    use crate::types::SampleLayout;

    const RATE: f64 = 1_024.0;

    fn session_with(values: &[u8]) -> Arc<CaptureSession> {
        let session = Arc::new(CaptureSession::with_layout(
            SampleLayout::default(),
            1 << 16,
            RATE,
            EnvelopeConfig::default(),
        ));
        session.start().unwrap();
        session.append_frames(values).unwrap();
        session
    }

    fn signal(session: Arc<CaptureSession>, spp: f64) -> AnalogSignal {
        let meta = ChannelMeta::new(0, 0, 8).with_reference(0.0, 255.0);
        AnalogSignal::new(session, meta)
            .with_band(Band::new(0.0, 100.0))
            .with_view(ViewState::from_samples_per_pixel(spp, RATE, 0))
    }

    fn triangle(n: usize) -> Vec<u8> {
        (0..n)
            .map(|i| {
                let p = (i % 510) as i32;
                (255 - (p - 255).abs()) as u8
            })
            .collect()
    }

    #[test]
    fn test_raw_path_below_threshold() {
        let session = session_with(&triangle(4000));
        let sig = signal(session, 2.0);
        let rect = ViewRect::new(10.0, 0.0, 100.0, 100.0);
        let prims = sig.draw_primitives(&rect);
        assert_eq!(prims.path(), DrawPath::Raw);

        let points: Vec<Point> = prims
            .map(|p| match p {
                Primitive::Point(p) => p,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        // ceil(100 * 2 + 1) samples
        assert_eq!(points.len(), 201);
        assert_eq!(points[0].x, 10.0);
        assert!(points.iter().all(|p| (0.0..=100.0).contains(&p.y)));
    }

    #[test]
    fn test_envelope_path_above_threshold() {
        let session = session_with(&triangle(4000));
        let sig = signal(session, 20.0);
        let rect = ViewRect::new(0.0, 0.0, 100.0, 100.0);
        let prims = sig.draw_primitives(&rect);
        assert_eq!(prims.path(), DrawPath::Envelope);

        let rects: Vec<Rect> = prims
            .map(|p| match p {
                Primitive::Rect(r) => r,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert!(!rects.is_empty());
        assert!(rects.len() <= 100, "{} rects", rects.len());
        assert!(rects.windows(2).all(|w| w[0].x < w[1].x));
        assert!(rects.iter().all(|r| r.x >= 0.0 && r.x < 100.0 && r.y >= 0.0));
    }

    #[test]
    fn test_decimation_reduces_primitives() {
        let session = session_with(&triangle(60_000));
        let rect = ViewRect::new(0.0, 0.0, 50.0, 100.0);

        let zoomed_out = signal(session.clone(), 1000.0).draw_primitives(&rect).count();
        let visible_samples = 50 * 1000;
        assert!(zoomed_out * 10 <= visible_samples);
        assert!(zoomed_out <= 50);
    }

    #[test]
    fn test_columns_bridge_gaps() {
        // Square wave with 32-sample half periods at 32 samples per pixel:
        // columns alternate between rails and must touch each other
        let values: Vec<u8> = (0..8192).map(|i| if (i / 32) % 2 == 0 { 0 } else { 255 }).collect();
        let session = session_with(&values);
        let sig = signal(session, 32.0);
        let rect = ViewRect::new(0.0, 0.0, 100.0, 100.0);
        let rects: Vec<Rect> = sig
            .draw_primitives(&rect)
            .filter_map(|p| match p {
                Primitive::Rect(r) => Some(r),
                _ => None,
            })
            .collect();
        assert_eq!(rects.len(), 100);
        // Every column after the first spans the full band
        assert!(rects[1..].iter().all(|r| r.y == 0.0 && r.bottom() >= 100.0));
    }

    #[test]
    fn test_hit_test() {
        let session = session_with(&[10, 20, 30, 40]);
        let sig = signal(session, 0.125);
        let rect = ViewRect::new(0.0, 0.0, 100.0, 100.0);

        // 8 px per sample: x = 17 rounds to sample 2
        let hit = sig.hit_test(&rect, Point::new(17.0, 50.0)).unwrap();
        assert_eq!(hit.index, 2);
        assert_eq!(hit.value, 30.0);
        assert_eq!(hit.point.x, 16.0);

        assert!(sig.hit_test(&rect, Point::new(17.0, 150.0)).is_none());
        assert!(sig.hit_test(&rect, Point::new(95.0, 50.0)).is_none());
        // Live capture: no hover measurement yet
        assert!(sig.hover(&rect, Point::new(17.0, 50.0)).is_none());
    }

    #[test]
    fn test_hit_test_follows_samplerate() {
        let session = session_with(&[10, 20, 30, 40]);
        let sig = signal(session.clone(), 0.125);
        let rect = ViewRect::new(0.0, 0.0, 100.0, 100.0);

        // Same view at twice the rate: 4 px per sample, x = 9 rounds to sample 2
        session.set_samplerate(2.0 * RATE);
        let hit = sig.hit_test(&rect, Point::new(9.0, 50.0)).unwrap();
        assert_eq!(hit.index, 2);
        assert_eq!(hit.value, 30.0);
        assert_eq!(hit.point.x, 8.0);
        assert_eq!(sig.point_at(&rect, 2).map(|(p, _)| p), Some(hit.point));
    }

    #[test]
    fn test_hover_when_stopped() {
        let session = session_with(&[10, 20, 30, 40]);
        session.stop().unwrap();
        let sig = signal(session, 0.125);
        let rect = ViewRect::new(0.0, 0.0, 100.0, 100.0);
        assert_eq!(sig.hover(&rect, Point::new(0.0, 10.0)).unwrap().index, 0);
    }

    #[test]
    fn test_measure_independent_of_zoom() {
        let session = session_with(&triangle(1000));
        let a = signal(session.clone(), 1.0);
        let b = signal(session, 500.0);
        assert_eq!(a.measure_at_cursor(300), b.measure_at_cursor(300));
        assert_eq!(a.measure_at_cursor(300), Some(210.0));
        assert_eq!(a.measure_at_cursor(5000), None);
    }

    #[test]
    fn test_voltage() {
        let session = session_with(&[0]);
        let meta = ChannelMeta::new(0, 0, 8)
            .with_reference(0.0, 255.0)
            .with_offsets(128, 128);
        let sig = AnalogSignal::new(session, meta);
        assert_eq!(sig.voltage(128.0), 0.0);
        // Full reference span maps to the 2 V default range
        assert!((sig.voltage(128.0 - 255.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_from_device_map_range() {
        let mut device = MockDeviceConfig::new();
        device.expect_unit_bits().return_const(Some(8u8));
        device.expect_ref_min().return_const(Some(0u32));
        device.expect_ref_max().return_const(Some(255u32));
        device.expect_probe_offset().return_const(Some(128u16));
        device.expect_hw_offset().return_const(Some(128u16));
        device.expect_map_range().return_const(Some((-5.0f64, 5.0f64)));
        device.expect_map_unit().return_const(Some("mA".to_string()));

        let sig = AnalogSignal::from_device(session_with(&[0]), 0, 0, &device);
        assert_eq!(sig.map_unit(), "mA");
        assert!((sig.voltage(128.0 - 25.5) - 1.0).abs() < 1e-9);
    }
}
